//! Template sanitizer: untrusted client bytes in, canonical attribute set out.
//!
//! Canonical order is class, key type, booleans (first occurrence order),
//! then every other attribute in template order. Feeding canonical output
//! back in yields the same bytes.

use p11token_core::abi::blob::{decode_records, AttrRecord};
use p11token_core::abi::ids::{
    attr_kind, attr_name, AttrKind, ObjectClass, CKA_CLASS, CKA_KEY_TYPE,
};
use p11token_core::error::{P11Error, Result};
use p11token_core::AttributeSet;

/// Templates may nest one level (a wrap template inside a key template).
const MAX_NESTING: usize = 1;

/// Validate and normalize a serialized client template.
pub fn sanitize(src: &[u8]) -> Result<AttributeSet> {
    sanitize_nested(src, 0)
}

fn sanitize_nested(src: &[u8], depth: usize) -> Result<AttributeSet> {
    let records = decode_records(src)?;
    let mut out = AttributeSet::new();

    let class = scalar(&records, CKA_CLASS)?;
    let key_type = scalar(&records, CKA_KEY_TYPE)?;
    if let Some(c) = class {
        out.add_u32(CKA_CLASS, c);
    }
    if let Some(t) = key_type {
        out.add_u32(CKA_KEY_TYPE, t);
    }

    sanitize_booleans(&records, &mut out)?;

    let key_class = class
        .and_then(ObjectClass::from_u32)
        .is_some_and(ObjectClass::is_key);

    for r in &records {
        match attr_kind(r.id) {
            Some(AttrKind::Class | AttrKind::KeyType | AttrKind::Bool(_)) => {}
            Some(AttrKind::Indirect) => {
                if !key_class {
                    return Err(P11Error::TemplateInconsistent(format!(
                        "{} only applies to key objects",
                        attr_name(r.id)
                    )));
                }
                if depth >= MAX_NESTING {
                    return Err(P11Error::TemplateInconsistent(format!(
                        "{} nested too deep",
                        attr_name(r.id)
                    )));
                }
                let nested = sanitize_nested(r.value, depth + 1)?;
                add_unique(&mut out, r.id, &nested.to_bytes()?)?;
            }
            Some(AttrKind::MechanismList) => {
                if r.value.len() % 4 != 0 {
                    return Err(P11Error::AttributeValueInvalid(format!(
                        "{} size {} is not a multiple of 4",
                        attr_name(r.id),
                        r.value.len()
                    )));
                }
                out.add(r.id, r.value);
            }
            Some(AttrKind::Fixed(size)) => {
                if r.value.len() != size as usize {
                    return Err(P11Error::AttributeTypeInvalid(format!(
                        "{} expects {size} bytes, got {}",
                        attr_name(r.id),
                        r.value.len()
                    )));
                }
                add_unique(&mut out, r.id, r.value)?;
            }
            Some(AttrKind::Date) => {
                if !r.value.is_empty() && r.value.len() != 8 {
                    return Err(P11Error::AttributeTypeInvalid(format!(
                        "{} expects 0 or 8 bytes, got {}",
                        attr_name(r.id),
                        r.value.len()
                    )));
                }
                add_unique(&mut out, r.id, r.value)?;
            }
            Some(AttrKind::Variable) => add_unique(&mut out, r.id, r.value)?,
            None => {
                tracing::debug!(id = r.id, "unknown attribute id in template");
                return Err(P11Error::AttributeTypeInvalid(format!(
                    "unknown attribute id {:#x}",
                    r.id
                )));
            }
        }
    }

    Ok(out)
}

/// Single u32 value for `id`; repeats must agree.
fn scalar(records: &[AttrRecord<'_>], id: u32) -> Result<Option<u32>> {
    let mut found: Option<u32> = None;
    for r in records.iter().filter(|r| r.id == id) {
        let bytes: [u8; 4] = r.value.try_into().map_err(|_| {
            P11Error::TemplateInconsistent(format!(
                "{} expects 4 bytes, got {}",
                attr_name(id),
                r.value.len()
            ))
        })?;
        let v = u32::from_le_bytes(bytes);
        match found {
            Some(prev) if prev != v => {
                return Err(P11Error::TemplateInconsistent(format!(
                    "conflicting {} values {prev:#x} and {v:#x}",
                    attr_name(id)
                )));
            }
            _ => found = Some(v),
        }
    }
    Ok(found)
}

fn sanitize_booleans(records: &[AttrRecord<'_>], out: &mut AttributeSet) -> Result<()> {
    for r in records {
        if !matches!(attr_kind(r.id), Some(AttrKind::Bool(_))) {
            continue;
        }
        let value = match r.value {
            [0] => false,
            [1] => true,
            [b] => {
                return Err(P11Error::AttributeValueInvalid(format!(
                    "{} must be 0 or 1, got {b:#04x}",
                    attr_name(r.id)
                )));
            }
            _ => {
                return Err(P11Error::AttributeValueInvalid(format!(
                    "{} expects 1 byte, got {}",
                    attr_name(r.id),
                    r.value.len()
                )));
            }
        };

        match out.bool_value(r.id) {
            Some(prev) if prev != value => {
                return Err(P11Error::TemplateInconsistent(format!(
                    "conflicting {} values",
                    attr_name(r.id)
                )));
            }
            Some(_) => {}
            None => out.add_bool(r.id, value),
        }
    }
    Ok(())
}

/// Append unless an equal entry exists; a different value is a conflict.
fn add_unique(out: &mut AttributeSet, id: u32, value: &[u8]) -> Result<()> {
    match out.get(id) {
        Some(prev) if prev == value => Ok(()),
        Some(_) => Err(P11Error::TemplateInconsistent(format!(
            "conflicting {} values",
            attr_name(id)
        ))),
        None => {
            out.add(id, value);
            Ok(())
        }
    }
}
