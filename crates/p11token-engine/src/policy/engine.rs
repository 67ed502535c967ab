use p11token_core::abi::ids::*;
use p11token_core::error::{P11Error, Result};
use p11token_core::AttributeSet;

use crate::mechanism::ProcessingFunction;
use crate::sanitize::sanitize;

use super::tables::*;

/// Sanitize raw client bytes, then synthesize the object's attribute set.
pub fn create_from_template(
    raw: &[u8],
    parent: Option<&AttributeSet>,
    function: ProcessingFunction,
) -> Result<AttributeSet> {
    let template = sanitize(raw)?;
    create_from_sanitized(&template, parent, function)
}

/// Synthesize a complete attribute set from an already sanitized template.
///
/// Nothing is returned unless every step succeeds.
pub fn create_from_sanitized(
    template: &AttributeSet,
    parent: Option<&AttributeSet>,
    function: ProcessingFunction,
) -> Result<AttributeSet> {
    let class = check_class_and_type(template)?;

    let mut out = AttributeSet::new();
    out.add_u32(CKA_CLASS, class.as_u32());
    if class.is_key() {
        out.add_u32(CKA_KEY_TYPE, template.key_type_raw());
    }

    set_boolprops(&mut out, template, ANY_OBJECT_BOOLPROPS);
    set_optional(&mut out, template, ANY_OBJECT_OPTIONAL);

    match class {
        ObjectClass::Data => set_optional(&mut out, template, DATA_OPTIONAL),
        ObjectClass::SecretKey => {
            set_key_common(&mut out, template);
            set_boolprops(&mut out, template, SYMM_KEY_BOOLPROPS);
            set_optional(&mut out, template, SYMM_KEY_OPTIONAL);
        }
        ObjectClass::PublicKey => {
            set_key_common(&mut out, template);
            set_boolprops(&mut out, template, PUBLIC_KEY_BOOLPROPS);
            set_mandated(&mut out, template, PUBLIC_KEY_MANDATED);
            set_optional(&mut out, template, PUBLIC_KEY_OPTIONAL);
            match template.key_type() {
                Some(KeyType::Rsa) => {
                    set_mandated(&mut out, template, RSA_PUBLIC_KEY_MANDATED);
                    set_optional(&mut out, template, RSA_PUBLIC_KEY_OPTIONAL);
                }
                Some(KeyType::Ec) => {
                    set_mandated(&mut out, template, EC_PUBLIC_KEY_MANDATED);
                    set_optional(&mut out, template, EC_PUBLIC_KEY_OPTIONAL);
                }
                _ => return Err(unexpected_key_type(template)),
            }
        }
        ObjectClass::PrivateKey => {
            set_key_common(&mut out, template);
            set_boolprops(&mut out, template, PRIVATE_KEY_BOOLPROPS);
            set_mandated(&mut out, template, PRIVATE_KEY_MANDATED);
            set_optional(&mut out, template, PRIVATE_KEY_OPTIONAL);
            match template.key_type() {
                Some(KeyType::Rsa) => set_optional(&mut out, template, RSA_PRIVATE_KEY_OPTIONAL),
                Some(KeyType::Ec) => {
                    set_mandated(&mut out, template, EC_PRIVATE_KEY_MANDATED);
                    set_optional(&mut out, template, EC_PRIVATE_KEY_OPTIONAL);
                }
                _ => return Err(unexpected_key_type(template)),
            }
        }
        other => {
            return Err(P11Error::TemplateInconsistent(format!(
                "unsupported object class {}",
                other.as_str()
            )));
        }
    }

    if class.is_key() {
        set_local(&mut out, parent, function)?;
        set_sensitivity_history(&mut out, parent, function)?;
    }

    for a in template.iter() {
        if DERIVED_ATTRIBUTES.contains(&a.id) {
            tracing::debug!(
                name = attr_name(a.id),
                "computed attribute set by client, ignored"
            );
        } else if !out.contains(a.id) {
            tracing::debug!(
                id = a.id,
                name = attr_name(a.id),
                class = class.as_str(),
                "template attribute not applicable, ignored"
            );
        }
    }

    check_attrs_misc_integrity(&out)?;

    Ok(out)
}

fn unexpected_key_type(template: &AttributeSet) -> P11Error {
    P11Error::TemplateInconsistent(format!(
        "key type {:#x} not valid for class {:#x}",
        template.key_type_raw(),
        template.class_raw()
    ))
}

/// Class must be known and the key type must suit it.
pub fn check_class_and_type(template: &AttributeSet) -> Result<ObjectClass> {
    let class = template.class().ok_or_else(|| {
        P11Error::TemplateInconsistent(format!(
            "missing or unknown object class {:#x}",
            template.class_raw()
        ))
    })?;

    let type_ok = match class {
        ObjectClass::Data => template.key_type_raw() == UNDEFINED_ID,
        ObjectClass::SecretKey => template.key_type().is_some_and(KeyType::is_symmetric),
        ObjectClass::PublicKey | ObjectClass::PrivateKey => {
            matches!(template.key_type(), Some(KeyType::Rsa | KeyType::Ec))
        }
        _ => false,
    };
    if !type_ok {
        tracing::warn!(
            class = template.class_raw(),
            key_type = template.key_type_raw(),
            "inconsistent class and key type"
        );
        return Err(unexpected_key_type(template));
    }
    Ok(class)
}

fn set_key_common(out: &mut AttributeSet, template: &AttributeSet) {
    set_boolprops(out, template, ANY_KEY_BOOLPROPS);
    set_optional(out, template, ANY_KEY_OPTIONAL);
}

/// Client value when present, class default otherwise.
fn set_boolprops(out: &mut AttributeSet, template: &AttributeSet, ids: &[u32]) {
    for &id in ids {
        let value = template
            .bool_value(id)
            .unwrap_or_else(|| default_boolprop(id));
        out.add_bool(id, value);
    }
}

/// Copy every occurrence present in the template.
fn set_optional(out: &mut AttributeSet, template: &AttributeSet, ids: &[u32]) {
    for &id in ids {
        for value in template.get_all(id) {
            out.add(id, value);
        }
    }
}

/// Always present in the result; empty when the template omits it.
fn set_mandated(out: &mut AttributeSet, template: &AttributeSet, ids: &[u32]) {
    for &id in ids {
        let value = template.get(id).unwrap_or_else(|| {
            tracing::debug!(name = attr_name(id), "mandatory attribute missing, set empty");
            &[][..]
        });
        out.add(id, value);
    }
}

fn require_parent<'a>(
    parent: Option<&'a AttributeSet>,
    function: ProcessingFunction,
) -> Result<&'a AttributeSet> {
    parent.ok_or_else(|| {
        P11Error::General(format!("{} requires a parent object", function.as_str()))
    })
}

fn set_local(
    out: &mut AttributeSet,
    parent: Option<&AttributeSet>,
    function: ProcessingFunction,
) -> Result<()> {
    let local = match function {
        ProcessingFunction::Generate | ProcessingFunction::GeneratePair => true,
        ProcessingFunction::Copy => require_parent(parent, function)?.get_bool(CKA_LOCAL),
        _ => false,
    };
    out.add_bool(CKA_LOCAL, local);
    Ok(())
}

fn set_sensitivity_history(
    out: &mut AttributeSet,
    parent: Option<&AttributeSet>,
    function: ProcessingFunction,
) -> Result<()> {
    let sensitive = out.get_bool(CKA_SENSITIVE);
    let extractable = out.get_bool(CKA_EXTRACTABLE);

    let (always_sensitive, never_extractable) = match function {
        ProcessingFunction::Generate | ProcessingFunction::GeneratePair => {
            (sensitive, !extractable)
        }
        ProcessingFunction::Derive | ProcessingFunction::Copy => {
            let parent = require_parent(parent, function)?;
            (
                parent.get_bool(CKA_ALWAYS_SENSITIVE) && sensitive,
                parent.get_bool(CKA_NEVER_EXTRACTABLE) && !extractable,
            )
        }
        _ => (false, false),
    };

    out.add_bool(CKA_ALWAYS_SENSITIVE, always_sensitive);
    out.add_bool(CKA_NEVER_EXTRACTABLE, never_extractable);
    Ok(())
}

/// Cross-checks between sensitivity attributes.
pub fn check_attrs_misc_integrity(attrs: &AttributeSet) -> Result<()> {
    if attrs.get_bool(CKA_NEVER_EXTRACTABLE) && attrs.get_bool(CKA_EXTRACTABLE) {
        return Err(P11Error::TemplateInconsistent(
            "never-extractable object is extractable".into(),
        ));
    }
    if attrs.get_bool(CKA_ALWAYS_SENSITIVE) && !attrs.get_bool(CKA_SENSITIVE) {
        return Err(P11Error::TemplateInconsistent(
            "always-sensitive object is not sensitive".into(),
        ));
    }
    Ok(())
}

/// Merge a copy request into the parent's attributes.
///
/// Only storage booleans and the label change freely. Sensitive may only be
/// raised and extractable only lowered; any other attribute must repeat the
/// parent's value.
pub fn copy_template(parent: &AttributeSet, overrides: &AttributeSet) -> Result<AttributeSet> {
    let mut merged = parent.clone();

    for a in overrides.iter() {
        match a.id {
            CKA_TOKEN | CKA_PRIVATE | CKA_MODIFIABLE | CKA_COPYABLE | CKA_DESTROYABLE => {
                merged.set_bool(a.id, overrides.get_bool(a.id));
            }
            CKA_LABEL => merged.set(a.id, &a.value),
            CKA_SENSITIVE => {
                let wanted = overrides.get_bool(a.id);
                if parent.get_bool(a.id) && !wanted {
                    return Err(P11Error::AttributeReadOnly(a.id));
                }
                merged.set_bool(a.id, wanted);
            }
            CKA_EXTRACTABLE => {
                let wanted = overrides.get_bool(a.id);
                if !parent.get_bool(a.id) && wanted {
                    return Err(P11Error::AttributeReadOnly(a.id));
                }
                merged.set_bool(a.id, wanted);
            }
            id => {
                if parent.get(id) != Some(a.value.as_slice()) {
                    return Err(P11Error::AttributeReadOnly(id));
                }
            }
        }
    }

    Ok(merged)
}
