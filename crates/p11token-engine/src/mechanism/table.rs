use p11token_core::abi::ids::*;

const CIPHER: u32 = CKFM_ENCRYPT | CKFM_DECRYPT;
const WRAP_UNWRAP: u32 = CKFM_WRAP | CKFM_UNWRAP;
const CIPHER_WRAP: u32 = CIPHER | WRAP_UNWRAP;
const CIPHER_WRAP_DERIVE: u32 = CIPHER_WRAP | CKFM_DERIVE;
const AUTH: u32 = CKFM_SIGN | CKFM_VERIFY;
const AUTH_RECOVER: u32 = CKFM_SIGN_RECOVER | CKFM_VERIFY_RECOVER;

const ALL_FUNCTIONS: u32 = CIPHER
    | CKFM_DIGEST
    | AUTH
    | AUTH_RECOVER
    | CKFM_GENERATE
    | CKFM_GENERATE_KEY_PAIR
    | WRAP_UNWRAP
    | CKFM_DERIVE;

const SINGLE_PART: bool = true;
const MULTI_PART: bool = false;

/// No key size constraint.
const ANY_SIZE: (u32, u32) = (0, 0);
/// Symmetric sizes are in bytes.
const AES_SIZES: (u32, u32) = (16, 32);
/// Asymmetric sizes are in bits.
const EC_SIZES: (u32, u32) = (160, 521);
const RSA_SIZES: (u32, u32) = (256, 4096);

/// One row of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechanismInfo {
    pub id: u32,
    pub name: &'static str,
    /// Functions the mechanism may serve.
    pub flags: u32,
    /// Single-part only: no update step.
    pub one_shot: bool,
    /// Functions this token implements, a subset of `flags`.
    pub token_flags: u32,
    pub min_key_size: u32,
    pub max_key_size: u32,
}

const fn mech(
    id: u32,
    name: &'static str,
    flags: u32,
    one_shot: bool,
    token_flags: u32,
    sizes: (u32, u32),
) -> MechanismInfo {
    MechanismInfo {
        id,
        name,
        flags,
        one_shot,
        token_flags,
        min_key_size: sizes.0,
        max_key_size: sizes.1,
    }
}

static MECHANISMS: &[MechanismInfo] = &[
    // AES
    mech(CKM_AES_ECB, "AES_ECB", CIPHER_WRAP_DERIVE, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_CBC, "AES_CBC", CIPHER_WRAP_DERIVE, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_CBC_PAD, "AES_CBC_PAD", CIPHER_WRAP_DERIVE, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_CTS, "AES_CTS", CIPHER_WRAP, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_CTR, "AES_CTR", CIPHER_WRAP, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_GCM, "AES_GCM", CIPHER_WRAP, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_CCM, "AES_CCM", CIPHER_WRAP, MULTI_PART, CIPHER, AES_SIZES),
    mech(CKM_AES_GMAC, "AES_GMAC", AUTH | CKFM_DERIVE, MULTI_PART, AUTH, AES_SIZES),
    mech(CKM_AES_CMAC, "AES_CMAC", AUTH, MULTI_PART, AUTH, AES_SIZES),
    mech(CKM_AES_CMAC_GENERAL, "AES_CMAC_GENERAL", AUTH, MULTI_PART, AUTH, AES_SIZES),
    mech(CKM_AES_ECB_ENCRYPT_DATA, "AES_ECB_ENCRYPT_DATA", CKFM_DERIVE, MULTI_PART, CKFM_DERIVE, AES_SIZES),
    mech(CKM_AES_CBC_ENCRYPT_DATA, "AES_CBC_ENCRYPT_DATA", CKFM_DERIVE, MULTI_PART, CKFM_DERIVE, AES_SIZES),
    mech(CKM_AES_KEY_GEN, "AES_KEY_GEN", CKFM_GENERATE, MULTI_PART, CKFM_GENERATE, AES_SIZES),
    mech(CKM_GENERIC_SECRET_KEY_GEN, "GENERIC_SECRET_KEY_GEN", CKFM_GENERATE, MULTI_PART, CKFM_GENERATE, (1, 4096)),
    // HMAC, key bounds in bytes
    mech(CKM_MD5_HMAC, "MD5_HMAC", AUTH, MULTI_PART, AUTH, (8, 64)),
    mech(CKM_SHA_1_HMAC, "SHA_1_HMAC", AUTH, MULTI_PART, AUTH, (10, 64)),
    mech(CKM_SHA224_HMAC, "SHA224_HMAC", AUTH, MULTI_PART, AUTH, (14, 64)),
    mech(CKM_SHA256_HMAC, "SHA256_HMAC", AUTH, MULTI_PART, AUTH, (24, 128)),
    mech(CKM_SHA384_HMAC, "SHA384_HMAC", AUTH, MULTI_PART, AUTH, (32, 128)),
    mech(CKM_SHA512_HMAC, "SHA512_HMAC", AUTH, MULTI_PART, AUTH, (32, 128)),
    mech(CKM_AES_XCBC_MAC, "AES_XCBC_MAC", AUTH, MULTI_PART, AUTH, (16, 16)),
    // EC
    mech(CKM_EC_KEY_PAIR_GEN, "EC_KEY_PAIR_GEN", CKFM_GENERATE_KEY_PAIR, MULTI_PART, CKFM_GENERATE_KEY_PAIR, EC_SIZES),
    mech(CKM_ECDSA, "ECDSA", AUTH, SINGLE_PART, 0, EC_SIZES),
    mech(CKM_ECDSA_SHA1, "ECDSA_SHA1", AUTH, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDSA_SHA224, "ECDSA_SHA224", AUTH, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDSA_SHA256, "ECDSA_SHA256", AUTH, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDSA_SHA384, "ECDSA_SHA384", AUTH, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDSA_SHA512, "ECDSA_SHA512", AUTH, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDH1_DERIVE, "ECDH1_DERIVE", CKFM_DERIVE, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDH1_COFACTOR_DERIVE, "ECDH1_COFACTOR_DERIVE", CKFM_DERIVE, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECMQV_DERIVE, "ECMQV_DERIVE", CKFM_DERIVE, MULTI_PART, 0, EC_SIZES),
    mech(CKM_ECDH_AES_KEY_WRAP, "ECDH_AES_KEY_WRAP", WRAP_UNWRAP, MULTI_PART, 0, EC_SIZES),
    // RSA
    mech(CKM_RSA_PKCS_KEY_PAIR_GEN, "RSA_PKCS_KEY_PAIR_GEN", CKFM_GENERATE_KEY_PAIR, MULTI_PART, CKFM_GENERATE_KEY_PAIR, RSA_SIZES),
    mech(CKM_RSA_PKCS, "RSA_PKCS", CIPHER_WRAP | AUTH | AUTH_RECOVER, SINGLE_PART, AUTH, RSA_SIZES),
    mech(CKM_RSA_PKCS_PSS, "RSA_PKCS_PSS", AUTH, SINGLE_PART, AUTH, RSA_SIZES),
    mech(CKM_RSA_PKCS_OAEP, "RSA_PKCS_OAEP", CIPHER_WRAP, SINGLE_PART, CIPHER_WRAP, RSA_SIZES),
    mech(CKM_RSA_9796, "RSA_9796", WRAP_UNWRAP | AUTH | AUTH_RECOVER, SINGLE_PART, 0, RSA_SIZES),
    mech(CKM_RSA_X_509, "RSA_X_509", CIPHER_WRAP | AUTH | AUTH_RECOVER, SINGLE_PART, 0, RSA_SIZES),
    mech(CKM_SHA1_RSA_PKCS, "SHA1_RSA_PKCS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA1_RSA_PKCS_PSS, "SHA1_RSA_PKCS_PSS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA256_RSA_PKCS, "SHA256_RSA_PKCS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA384_RSA_PKCS, "SHA384_RSA_PKCS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA512_RSA_PKCS, "SHA512_RSA_PKCS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA256_RSA_PKCS_PSS, "SHA256_RSA_PKCS_PSS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA384_RSA_PKCS_PSS, "SHA384_RSA_PKCS_PSS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA512_RSA_PKCS_PSS, "SHA512_RSA_PKCS_PSS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA224_RSA_PKCS, "SHA224_RSA_PKCS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_SHA224_RSA_PKCS_PSS, "SHA224_RSA_PKCS_PSS", AUTH, MULTI_PART, AUTH, RSA_SIZES),
    mech(CKM_RSA_AES_KEY_WRAP, "RSA_AES_KEY_WRAP", WRAP_UNWRAP, MULTI_PART, 0, RSA_SIZES),
    // DH
    mech(CKM_DH_PKCS_DERIVE, "DH_PKCS_DERIVE", CKFM_DERIVE, MULTI_PART, 0, RSA_SIZES),
    // Digests
    mech(CKM_MD5, "MD5", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
    mech(CKM_SHA_1, "SHA_1", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
    mech(CKM_SHA224, "SHA224", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
    mech(CKM_SHA256, "SHA256", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
    mech(CKM_SHA384, "SHA384", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
    mech(CKM_SHA512, "SHA512", CKFM_DIGEST, MULTI_PART, CKFM_DIGEST, ANY_SIZE),
];

pub fn mechanism_info(id: u32) -> Option<&'static MechanismInfo> {
    MECHANISMS.iter().find(|m| m.id == id)
}

pub fn mechanism_is_valid(id: u32) -> bool {
    mechanism_info(id).is_some()
}

pub fn mechanism_is_one_shot_only(id: u32) -> bool {
    mechanism_info(id).is_some_and(|m| m.one_shot)
}

/// Functions the token implements for `id`, 0 for unknown ids.
pub fn mechanism_supported_flags(id: u32) -> u32 {
    mechanism_info(id).map(|m| m.token_flags).unwrap_or(0)
}

/// `(min, max)` key size; `(0, 0)` when the mechanism has no key constraint.
pub fn mechanism_supported_key_sizes(id: u32) -> (u32, u32) {
    mechanism_info(id)
        .map(|m| (m.min_key_size, m.max_key_size))
        .unwrap_or(ANY_SIZE)
}

/// True when `flags` only names functions the mechanism may serve.
pub fn mechanism_flags_comply(id: u32, flags: u32) -> bool {
    let valid = flags & ALL_FUNCTIONS;
    match mechanism_info(id) {
        Some(m) => valid & !m.flags == 0,
        None => false,
    }
}

pub fn mechanism_name(id: u32) -> &'static str {
    if id == PROCESSING_IMPORT {
        return "IMPORT";
    }
    mechanism_info(id).map(|m| m.name).unwrap_or("UNKNOWN")
}

/// Ids of every mechanism this token implements, in table order.
pub fn supported_mechanisms() -> Vec<u32> {
    MECHANISMS
        .iter()
        .filter(|m| m.token_flags != 0)
        .map(|m| m.id)
        .collect()
}
