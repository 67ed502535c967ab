#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use p11token_core::abi::ids::*;
use p11token_core::{AttributeSet, ReturnCode};

fn secret_key() -> AttributeSet {
    let mut set = AttributeSet::new();
    set.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    set.add_u32(CKA_KEY_TYPE, CKK_AES);
    set.add_bool(CKA_ENCRYPT, true);
    set.add_bool(CKA_SIGN, false);
    set.add(CKA_LABEL, b"aes-1");
    set
}

#[test]
fn derived_views_follow_entries() {
    let mut set = secret_key();
    assert_eq!(set.class(), Some(ObjectClass::SecretKey));
    assert_eq!(set.key_type(), Some(KeyType::Aes));
    assert!(set.get_bool(CKA_ENCRYPT));
    assert!(!set.get_bool(CKA_SIGN));
    assert_eq!(set.bools().lo() & (1 << 4), 1 << 4);

    set.set_bool(CKA_ENCRYPT, false);
    assert!(!set.get_bool(CKA_ENCRYPT));

    set.remove(CKA_CLASS).unwrap();
    assert_eq!(set.class(), None);
    assert_eq!(set.class_raw(), UNDEFINED_ID);
}

#[test]
fn bool_value_tells_absent_from_false() {
    let set = secret_key();
    assert_eq!(set.bool_value(CKA_SIGN), Some(false));
    assert_eq!(set.bool_value(CKA_VERIFY), None);
    assert!(!set.get_bool(CKA_VERIFY));
}

#[test]
fn copy_into_requires_exact_size() {
    let set = secret_key();

    let mut small = [0u8; 3];
    let err = set.copy_into(CKA_LABEL, &mut small).unwrap_err();
    assert_eq!(err.rv(), ReturnCode::BufferTooSmall);
    assert_eq!(err, p11token_core::P11Error::BufferTooSmall { required: 5 });

    let mut exact = [0u8; 5];
    assert_eq!(set.copy_into(CKA_LABEL, &mut exact).unwrap(), 5);
    assert_eq!(&exact, b"aes-1");

    let err = set.copy_into(CKA_ID, &mut exact).unwrap_err();
    assert_eq!(err.rv(), ReturnCode::NotFound);
}

#[test]
fn attrs_size_is_sum_of_records() {
    let set = secret_key();
    // class, key type: 8 + 4 each; two booleans: 8 + 1 each; label: 8 + 5
    assert_eq!(set.attrs_size(), 12 + 12 + 9 + 9 + 13);

    let bytes = set.to_bytes().unwrap();
    assert_eq!(bytes.len(), 8 + set.attrs_size());
    assert_eq!(AttributeSet::from_bytes(&bytes).unwrap(), set);
}

#[test]
fn remove_variants() {
    let mut set = secret_key();
    set.add(CKA_ID, b"");
    set.add(CKA_ALLOWED_MECHANISMS, &CKM_AES_CBC.to_le_bytes());
    set.add(CKA_ALLOWED_MECHANISMS, &CKM_AES_ECB.to_le_bytes());

    assert_eq!(set.remove_if_empty(CKA_ID), 1);
    assert!(!set.contains(CKA_ID));
    assert_eq!(set.remove_if_empty(CKA_LABEL), 0);

    let err = set.remove(CKA_ALLOWED_MECHANISMS).unwrap_err();
    assert_eq!(err.rv(), ReturnCode::TemplateInconsistent);

    let err = set.remove_checked(CKA_ALLOWED_MECHANISMS, 1).unwrap_err();
    assert_eq!(err.rv(), ReturnCode::TemplateInconsistent);
    assert_eq!(set.get_all(CKA_ALLOWED_MECHANISMS).count(), 2);

    assert_eq!(set.remove_checked(CKA_ALLOWED_MECHANISMS, 2).unwrap(), 2);
    assert!(!set.contains(CKA_ALLOWED_MECHANISMS));

    assert_eq!(set.remove(CKA_LABEL).unwrap(), b"aes-1".to_vec());
    assert_eq!(set.remove(CKA_LABEL).unwrap_err().rv(), ReturnCode::NotFound);
}

#[test]
fn matches_reference_subset() {
    let set = secret_key();

    let mut reference = AttributeSet::new();
    reference.add_u32(CKA_KEY_TYPE, CKK_AES);
    reference.add(CKA_LABEL, b"aes-1");
    assert!(set.matches(&reference));

    reference.add_bool(CKA_SIGN, true);
    assert!(!set.matches(&reference));

    assert!(set.matches(&AttributeSet::new()));
}

#[test]
fn get_u32_checks_shape() {
    let set = secret_key();
    assert_eq!(set.get_u32(CKA_KEY_TYPE).unwrap(), CKK_AES);
    assert_eq!(
        set.get_u32(CKA_LABEL).unwrap_err().rv(),
        ReturnCode::AttributeValueInvalid
    );
    assert_eq!(set.get_u32(CKA_VALUE_LEN).unwrap_err().rv(), ReturnCode::NotFound);
}

#[test]
fn dump_renders_typed_values() {
    let set = secret_key();
    let json = p11token_core::trace::dump_json(&set);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0]["name"], "CLASS");
    assert_eq!(entries[0]["value"], CKO_SECRET_KEY);
    assert_eq!(entries[2]["value"], true);
    assert_eq!(entries[4]["value"], "6165732d31");
}
