//! Per-class attribute lists applied by the policy engine.

use p11token_core::abi::ids::*;

// Any object
pub const ANY_OBJECT_BOOLPROPS: &[u32] = &[
    CKA_TOKEN,
    CKA_PRIVATE,
    CKA_MODIFIABLE,
    CKA_COPYABLE,
    CKA_DESTROYABLE,
];
pub const ANY_OBJECT_OPTIONAL: &[u32] = &[CKA_LABEL];

// Data objects
pub const DATA_OPTIONAL: &[u32] = &[CKA_OBJECT_ID, CKA_APPLICATION, CKA_VALUE];

// Any key
pub const ANY_KEY_BOOLPROPS: &[u32] = &[CKA_DERIVE];
pub const ANY_KEY_OPTIONAL: &[u32] = &[
    CKA_ID,
    CKA_START_DATE,
    CKA_END_DATE,
    CKA_ALLOWED_MECHANISMS,
];

// Secret keys
pub const SYMM_KEY_BOOLPROPS: &[u32] = &[
    CKA_ENCRYPT,
    CKA_DECRYPT,
    CKA_SIGN,
    CKA_VERIFY,
    CKA_WRAP,
    CKA_UNWRAP,
    CKA_SENSITIVE,
    CKA_EXTRACTABLE,
    CKA_WRAP_WITH_TRUSTED,
    CKA_TRUSTED,
];
pub const SYMM_KEY_OPTIONAL: &[u32] = &[
    CKA_WRAP_TEMPLATE,
    CKA_UNWRAP_TEMPLATE,
    CKA_DERIVE_TEMPLATE,
    CKA_VALUE,
    CKA_VALUE_LEN,
];

// Public keys
pub const PUBLIC_KEY_BOOLPROPS: &[u32] = &[
    CKA_ENCRYPT,
    CKA_VERIFY,
    CKA_VERIFY_RECOVER,
    CKA_WRAP,
    CKA_TRUSTED,
];
pub const PUBLIC_KEY_MANDATED: &[u32] = &[CKA_SUBJECT];
pub const PUBLIC_KEY_OPTIONAL: &[u32] = &[CKA_WRAP_TEMPLATE, CKA_PUBLIC_KEY_INFO];

// Private keys
pub const PRIVATE_KEY_BOOLPROPS: &[u32] = &[
    CKA_DECRYPT,
    CKA_SIGN,
    CKA_SIGN_RECOVER,
    CKA_UNWRAP,
    CKA_SENSITIVE,
    CKA_EXTRACTABLE,
    CKA_WRAP_WITH_TRUSTED,
    CKA_ALWAYS_AUTHENTICATE,
];
pub const PRIVATE_KEY_MANDATED: &[u32] = &[CKA_SUBJECT];
pub const PRIVATE_KEY_OPTIONAL: &[u32] = &[CKA_UNWRAP_TEMPLATE, CKA_PUBLIC_KEY_INFO];

// RSA
pub const RSA_PUBLIC_KEY_MANDATED: &[u32] = &[CKA_MODULUS_BITS];
pub const RSA_PUBLIC_KEY_OPTIONAL: &[u32] = &[CKA_MODULUS, CKA_PUBLIC_EXPONENT];
pub const RSA_PRIVATE_KEY_OPTIONAL: &[u32] = &[
    CKA_MODULUS,
    CKA_MODULUS_BITS,
    CKA_PUBLIC_EXPONENT,
    CKA_PRIVATE_EXPONENT,
    CKA_PRIME_1,
    CKA_PRIME_2,
    CKA_EXPONENT_1,
    CKA_EXPONENT_2,
    CKA_COEFFICIENT,
];

// EC
pub const EC_PUBLIC_KEY_MANDATED: &[u32] = &[CKA_EC_PARAMS];
pub const EC_PUBLIC_KEY_OPTIONAL: &[u32] = &[CKA_EC_POINT];
pub const EC_PRIVATE_KEY_MANDATED: &[u32] = &[CKA_EC_PARAMS];
pub const EC_PRIVATE_KEY_OPTIONAL: &[u32] = &[CKA_VALUE];

/// Attributes the policy engine computes itself; client values are ignored.
pub const DERIVED_ATTRIBUTES: &[u32] = &[
    CKA_LOCAL,
    CKA_ALWAYS_SENSITIVE,
    CKA_NEVER_EXTRACTABLE,
    CKA_KEY_GEN_MECHANISM,
];

/// Boolean default when the template is silent.
pub fn default_boolprop(id: u32) -> bool {
    matches!(id, CKA_MODIFIABLE | CKA_COPYABLE | CKA_DESTROYABLE)
}
