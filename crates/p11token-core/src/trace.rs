//! Attribute set tracing and JSON dump.

use serde::Serialize;

use crate::abi::ids::{attr_kind, attr_name, AttrKind};
use crate::attrs::{Attribute, AttributeSet};

/// Log every attribute of `set` at debug level.
pub fn trace_attributes(prefix: &str, set: &AttributeSet) {
    tracing::debug!(
        prefix = %prefix,
        count = set.len(),
        size = set.attrs_size(),
        class = set.class_raw(),
        key_type = set.key_type_raw(),
        "attribute set"
    );

    for a in set.iter() {
        tracing::debug!(
            prefix = %prefix,
            id = a.id,
            name = attr_name(a.id),
            size = a.value.len(),
            "attribute"
        );
        if attr_kind(a.id) == Some(AttrKind::Indirect) {
            if let Ok(nested) = AttributeSet::from_bytes(&a.value) {
                trace_attributes(&format!("{prefix}  "), &nested);
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct AttributeDump {
    id: String,
    name: &'static str,
    size: usize,
    value: serde_json::Value,
}

fn dump_value(a: &Attribute) -> serde_json::Value {
    let as_u32 = || {
        <[u8; 4]>::try_from(a.value.as_slice())
            .map(|b| serde_json::Value::from(u32::from_le_bytes(b)))
            .unwrap_or_else(|_| serde_json::Value::from(hex::encode(&a.value)))
    };

    match attr_kind(a.id) {
        Some(AttrKind::Bool(_)) => {
            serde_json::Value::Bool(a.value.first().is_some_and(|b| *b != 0))
        }
        Some(AttrKind::Class | AttrKind::KeyType | AttrKind::Fixed(4)) => as_u32(),
        Some(AttrKind::MechanismList) => a
            .value
            .chunks_exact(4)
            .filter_map(|c| <[u8; 4]>::try_from(c).ok())
            .map(|b| serde_json::Value::from(u32::from_le_bytes(b)))
            .collect(),
        Some(AttrKind::Indirect) => match AttributeSet::from_bytes(&a.value) {
            Ok(nested) => dump_json(&nested),
            Err(_) => serde_json::Value::from(hex::encode(&a.value)),
        },
        _ => serde_json::Value::from(hex::encode(&a.value)),
    }
}

/// JSON view of an attribute set: one object per entry, in order.
pub fn dump_json(set: &AttributeSet) -> serde_json::Value {
    let entries: Vec<AttributeDump> = set
        .iter()
        .map(|a| AttributeDump {
            id: format!("{:#x}", a.id),
            name: attr_name(a.id),
            size: a.value.len(),
            value: dump_value(a),
        })
        .collect();
    serde_json::to_value(entries).unwrap_or(serde_json::Value::Null)
}
