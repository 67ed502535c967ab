//! Fixed identifier spaces of the token ABI.
//!
//! Attribute, class, key type and mechanism ids are externally defined
//! constants. The attribute table below is the single source for names,
//! value shapes and the boolean shift positions.

use serde::Serialize;

/// Marker for "no value" in class/type/mechanism fields.
pub const UNDEFINED_ID: u32 = 0xFFFF_FFFF;

/// Boolean encoding on the wire.
pub const CK_TRUE: u8 = 1;
pub const CK_FALSE: u8 = 0;

// Attribute ids.
pub const CKA_CLASS: u32 = 0x0000;
pub const CKA_TOKEN: u32 = 0x0001;
pub const CKA_PRIVATE: u32 = 0x0002;
pub const CKA_LABEL: u32 = 0x0003;
pub const CKA_APPLICATION: u32 = 0x0010;
pub const CKA_VALUE: u32 = 0x0011;
pub const CKA_OBJECT_ID: u32 = 0x0012;
pub const CKA_TRUSTED: u32 = 0x0086;
pub const CKA_KEY_TYPE: u32 = 0x0100;
pub const CKA_SUBJECT: u32 = 0x0101;
pub const CKA_ID: u32 = 0x0102;
pub const CKA_SENSITIVE: u32 = 0x0103;
pub const CKA_ENCRYPT: u32 = 0x0104;
pub const CKA_DECRYPT: u32 = 0x0105;
pub const CKA_WRAP: u32 = 0x0106;
pub const CKA_UNWRAP: u32 = 0x0107;
pub const CKA_SIGN: u32 = 0x0108;
pub const CKA_SIGN_RECOVER: u32 = 0x0109;
pub const CKA_VERIFY: u32 = 0x010a;
pub const CKA_VERIFY_RECOVER: u32 = 0x010b;
pub const CKA_DERIVE: u32 = 0x010c;
pub const CKA_START_DATE: u32 = 0x0110;
pub const CKA_END_DATE: u32 = 0x0111;
pub const CKA_MODULUS: u32 = 0x0120;
pub const CKA_MODULUS_BITS: u32 = 0x0121;
pub const CKA_PUBLIC_EXPONENT: u32 = 0x0122;
pub const CKA_PRIVATE_EXPONENT: u32 = 0x0123;
pub const CKA_PRIME_1: u32 = 0x0124;
pub const CKA_PRIME_2: u32 = 0x0125;
pub const CKA_EXPONENT_1: u32 = 0x0126;
pub const CKA_EXPONENT_2: u32 = 0x0127;
pub const CKA_COEFFICIENT: u32 = 0x0128;
pub const CKA_PUBLIC_KEY_INFO: u32 = 0x0129;
pub const CKA_VALUE_LEN: u32 = 0x0161;
pub const CKA_EXTRACTABLE: u32 = 0x0162;
pub const CKA_LOCAL: u32 = 0x0163;
pub const CKA_NEVER_EXTRACTABLE: u32 = 0x0164;
pub const CKA_ALWAYS_SENSITIVE: u32 = 0x0165;
pub const CKA_KEY_GEN_MECHANISM: u32 = 0x0166;
pub const CKA_MODIFIABLE: u32 = 0x0170;
pub const CKA_COPYABLE: u32 = 0x0171;
pub const CKA_DESTROYABLE: u32 = 0x0172;
pub const CKA_EC_PARAMS: u32 = 0x0180;
pub const CKA_EC_POINT: u32 = 0x0181;
pub const CKA_ALWAYS_AUTHENTICATE: u32 = 0x0202;
pub const CKA_WRAP_WITH_TRUSTED: u32 = 0x0210;
pub const CKA_WRAP_TEMPLATE: u32 = 0x4000_0211;
pub const CKA_UNWRAP_TEMPLATE: u32 = 0x4000_0212;
pub const CKA_DERIVE_TEMPLATE: u32 = 0x4000_0213;
pub const CKA_MECHANISM_TYPE: u32 = 0x0500;
pub const CKA_ALLOWED_MECHANISMS: u32 = 0x4000_0600;

// Object classes.
pub const CKO_DATA: u32 = 0x000;
pub const CKO_CERTIFICATE: u32 = 0x001;
pub const CKO_PUBLIC_KEY: u32 = 0x002;
pub const CKO_PRIVATE_KEY: u32 = 0x003;
pub const CKO_SECRET_KEY: u32 = 0x004;
pub const CKO_HW_FEATURE: u32 = 0x005;
pub const CKO_DOMAIN_PARAMETERS: u32 = 0x006;
pub const CKO_MECHANISM: u32 = 0x007;
pub const CKO_OTP_KEY: u32 = 0x008;

// Key types.
pub const CKK_RSA: u32 = 0x000;
pub const CKK_DSA: u32 = 0x001;
pub const CKK_DH: u32 = 0x002;
pub const CKK_EC: u32 = 0x003;
pub const CKK_GENERIC_SECRET: u32 = 0x010;
pub const CKK_AES: u32 = 0x01f;
pub const CKK_MD5_HMAC: u32 = 0x027;
pub const CKK_SHA_1_HMAC: u32 = 0x028;
pub const CKK_SHA256_HMAC: u32 = 0x02b;
pub const CKK_SHA384_HMAC: u32 = 0x02c;
pub const CKK_SHA512_HMAC: u32 = 0x02d;
pub const CKK_SHA224_HMAC: u32 = 0x02e;

// Mechanism function flags.
pub const CKFM_ENCRYPT: u32 = 1 << 8;
pub const CKFM_DECRYPT: u32 = 1 << 9;
pub const CKFM_DIGEST: u32 = 1 << 10;
pub const CKFM_SIGN: u32 = 1 << 11;
pub const CKFM_SIGN_RECOVER: u32 = 1 << 12;
pub const CKFM_VERIFY: u32 = 1 << 13;
pub const CKFM_VERIFY_RECOVER: u32 = 1 << 14;
pub const CKFM_GENERATE: u32 = 1 << 15;
pub const CKFM_GENERATE_KEY_PAIR: u32 = 1 << 16;
pub const CKFM_WRAP: u32 = 1 << 17;
pub const CKFM_UNWRAP: u32 = 1 << 18;
pub const CKFM_DERIVE: u32 = 1 << 19;

// Mechanism ids.
pub const CKM_RSA_PKCS_KEY_PAIR_GEN: u32 = 0x0000;
pub const CKM_RSA_PKCS: u32 = 0x0001;
pub const CKM_RSA_9796: u32 = 0x0002;
pub const CKM_RSA_X_509: u32 = 0x0003;
pub const CKM_SHA1_RSA_PKCS: u32 = 0x0006;
pub const CKM_RSA_PKCS_OAEP: u32 = 0x0009;
pub const CKM_RSA_PKCS_PSS: u32 = 0x000d;
pub const CKM_SHA1_RSA_PKCS_PSS: u32 = 0x000e;
pub const CKM_DH_PKCS_DERIVE: u32 = 0x0021;
pub const CKM_SHA256_RSA_PKCS: u32 = 0x0040;
pub const CKM_SHA384_RSA_PKCS: u32 = 0x0041;
pub const CKM_SHA512_RSA_PKCS: u32 = 0x0042;
pub const CKM_SHA256_RSA_PKCS_PSS: u32 = 0x0043;
pub const CKM_SHA384_RSA_PKCS_PSS: u32 = 0x0044;
pub const CKM_SHA512_RSA_PKCS_PSS: u32 = 0x0045;
pub const CKM_SHA224_RSA_PKCS: u32 = 0x0046;
pub const CKM_SHA224_RSA_PKCS_PSS: u32 = 0x0047;
pub const CKM_MD5: u32 = 0x0210;
pub const CKM_MD5_HMAC: u32 = 0x0211;
pub const CKM_SHA_1: u32 = 0x0220;
pub const CKM_SHA_1_HMAC: u32 = 0x0221;
pub const CKM_SHA256: u32 = 0x0250;
pub const CKM_SHA256_HMAC: u32 = 0x0251;
pub const CKM_SHA224: u32 = 0x0255;
pub const CKM_SHA224_HMAC: u32 = 0x0256;
pub const CKM_SHA384: u32 = 0x0260;
pub const CKM_SHA384_HMAC: u32 = 0x0261;
pub const CKM_SHA512: u32 = 0x0270;
pub const CKM_SHA512_HMAC: u32 = 0x0271;
pub const CKM_GENERIC_SECRET_KEY_GEN: u32 = 0x0350;
pub const CKM_EC_KEY_PAIR_GEN: u32 = 0x1040;
pub const CKM_ECDSA: u32 = 0x1041;
pub const CKM_ECDSA_SHA1: u32 = 0x1042;
pub const CKM_ECDSA_SHA224: u32 = 0x1043;
pub const CKM_ECDSA_SHA256: u32 = 0x1044;
pub const CKM_ECDSA_SHA384: u32 = 0x1045;
pub const CKM_ECDSA_SHA512: u32 = 0x1046;
pub const CKM_ECDH1_DERIVE: u32 = 0x1050;
pub const CKM_ECDH1_COFACTOR_DERIVE: u32 = 0x1051;
pub const CKM_ECMQV_DERIVE: u32 = 0x1052;
pub const CKM_ECDH_AES_KEY_WRAP: u32 = 0x1053;
pub const CKM_RSA_AES_KEY_WRAP: u32 = 0x1054;
pub const CKM_AES_KEY_GEN: u32 = 0x1080;
pub const CKM_AES_ECB: u32 = 0x1081;
pub const CKM_AES_CBC: u32 = 0x1082;
pub const CKM_AES_CBC_PAD: u32 = 0x1085;
pub const CKM_AES_CTR: u32 = 0x1086;
pub const CKM_AES_GCM: u32 = 0x1087;
pub const CKM_AES_CCM: u32 = 0x1088;
pub const CKM_AES_CTS: u32 = 0x1089;
pub const CKM_AES_CMAC: u32 = 0x108a;
pub const CKM_AES_CMAC_GENERAL: u32 = 0x108b;
pub const CKM_AES_XCBC_MAC: u32 = 0x108c;
pub const CKM_AES_GMAC: u32 = 0x108e;
pub const CKM_AES_ECB_ENCRYPT_DATA: u32 = 0x1104;
pub const CKM_AES_CBC_ENCRYPT_DATA: u32 = 0x1105;

/// Pseudo mechanism id used when an object is imported from a client template.
pub const PROCESSING_IMPORT: u32 = 0x8000_0000;

/// Value shape of an attribute id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Object class, u32.
    Class,
    /// Key type, u32.
    KeyType,
    /// One byte boolean held in the bitmask at the given shift.
    Bool(u32),
    /// Nested attribute list.
    Indirect,
    /// Array of u32 mechanism ids.
    MechanismList,
    /// Fixed size value.
    Fixed(u32),
    /// `YYYYMMDD` date, or empty.
    Date,
    /// Any size.
    Variable,
}

struct AttrInfo {
    id: u32,
    name: &'static str,
    kind: AttrKind,
}

const fn attr(id: u32, name: &'static str, kind: AttrKind) -> AttrInfo {
    AttrInfo { id, name, kind }
}

static ATTRIBUTES: &[AttrInfo] = &[
    attr(CKA_CLASS, "CLASS", AttrKind::Class),
    attr(CKA_KEY_TYPE, "KEY_TYPE", AttrKind::KeyType),
    attr(CKA_TOKEN, "TOKEN", AttrKind::Bool(0)),
    attr(CKA_PRIVATE, "PRIVATE", AttrKind::Bool(1)),
    attr(CKA_TRUSTED, "TRUSTED", AttrKind::Bool(2)),
    attr(CKA_SENSITIVE, "SENSITIVE", AttrKind::Bool(3)),
    attr(CKA_ENCRYPT, "ENCRYPT", AttrKind::Bool(4)),
    attr(CKA_DECRYPT, "DECRYPT", AttrKind::Bool(5)),
    attr(CKA_WRAP, "WRAP", AttrKind::Bool(6)),
    attr(CKA_UNWRAP, "UNWRAP", AttrKind::Bool(7)),
    attr(CKA_SIGN, "SIGN", AttrKind::Bool(8)),
    attr(CKA_SIGN_RECOVER, "SIGN_RECOVER", AttrKind::Bool(9)),
    attr(CKA_VERIFY, "VERIFY", AttrKind::Bool(10)),
    attr(CKA_VERIFY_RECOVER, "VERIFY_RECOVER", AttrKind::Bool(11)),
    attr(CKA_DERIVE, "DERIVE", AttrKind::Bool(12)),
    attr(CKA_EXTRACTABLE, "EXTRACTABLE", AttrKind::Bool(13)),
    attr(CKA_LOCAL, "LOCAL", AttrKind::Bool(14)),
    attr(CKA_NEVER_EXTRACTABLE, "NEVER_EXTRACTABLE", AttrKind::Bool(15)),
    attr(CKA_ALWAYS_SENSITIVE, "ALWAYS_SENSITIVE", AttrKind::Bool(16)),
    attr(CKA_MODIFIABLE, "MODIFIABLE", AttrKind::Bool(17)),
    attr(CKA_COPYABLE, "COPYABLE", AttrKind::Bool(18)),
    attr(CKA_DESTROYABLE, "DESTROYABLE", AttrKind::Bool(19)),
    attr(CKA_ALWAYS_AUTHENTICATE, "ALWAYS_AUTHENTICATE", AttrKind::Bool(20)),
    attr(CKA_WRAP_WITH_TRUSTED, "WRAP_WITH_TRUSTED", AttrKind::Bool(21)),
    attr(CKA_WRAP_TEMPLATE, "WRAP_TEMPLATE", AttrKind::Indirect),
    attr(CKA_UNWRAP_TEMPLATE, "UNWRAP_TEMPLATE", AttrKind::Indirect),
    attr(CKA_DERIVE_TEMPLATE, "DERIVE_TEMPLATE", AttrKind::Indirect),
    attr(CKA_ALLOWED_MECHANISMS, "ALLOWED_MECHANISMS", AttrKind::MechanismList),
    attr(CKA_VALUE, "VALUE", AttrKind::Variable),
    attr(CKA_VALUE_LEN, "VALUE_LEN", AttrKind::Fixed(4)),
    attr(CKA_LABEL, "LABEL", AttrKind::Variable),
    attr(CKA_START_DATE, "START_DATE", AttrKind::Date),
    attr(CKA_END_DATE, "END_DATE", AttrKind::Date),
    attr(CKA_OBJECT_ID, "OBJECT_ID", AttrKind::Variable),
    attr(CKA_APPLICATION, "APPLICATION", AttrKind::Variable),
    attr(CKA_MECHANISM_TYPE, "MECHANISM_TYPE", AttrKind::Fixed(4)),
    attr(CKA_KEY_GEN_MECHANISM, "KEY_GEN_MECHANISM", AttrKind::Fixed(4)),
    attr(CKA_ID, "ID", AttrKind::Variable),
    attr(CKA_SUBJECT, "SUBJECT", AttrKind::Variable),
    attr(CKA_PUBLIC_KEY_INFO, "PUBLIC_KEY_INFO", AttrKind::Variable),
    attr(CKA_EC_POINT, "EC_POINT", AttrKind::Variable),
    attr(CKA_EC_PARAMS, "EC_PARAMS", AttrKind::Variable),
    attr(CKA_MODULUS, "MODULUS", AttrKind::Variable),
    attr(CKA_MODULUS_BITS, "MODULUS_BITS", AttrKind::Fixed(4)),
    attr(CKA_PUBLIC_EXPONENT, "PUBLIC_EXPONENT", AttrKind::Variable),
    attr(CKA_PRIVATE_EXPONENT, "PRIVATE_EXPONENT", AttrKind::Variable),
    attr(CKA_PRIME_1, "PRIME_1", AttrKind::Variable),
    attr(CKA_PRIME_2, "PRIME_2", AttrKind::Variable),
    attr(CKA_EXPONENT_1, "EXPONENT_1", AttrKind::Variable),
    attr(CKA_EXPONENT_2, "EXPONENT_2", AttrKind::Variable),
    attr(CKA_COEFFICIENT, "COEFFICIENT", AttrKind::Variable),
];

fn attr_info(id: u32) -> Option<&'static AttrInfo> {
    ATTRIBUTES.iter().find(|a| a.id == id)
}

/// Value shape of a known attribute id, `None` for unknown ids.
pub fn attr_kind(id: u32) -> Option<AttrKind> {
    attr_info(id).map(|a| a.kind)
}

/// Bitmask position of a boolean attribute.
pub fn boolprop_shift(id: u32) -> Option<u32> {
    match attr_kind(id) {
        Some(AttrKind::Bool(shift)) => Some(shift),
        _ => None,
    }
}

/// Printable attribute name for traces.
pub fn attr_name(id: u32) -> &'static str {
    attr_info(id).map(|a| a.name).unwrap_or("UNKNOWN")
}

/// Object classes known to the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectClass {
    Data,
    Certificate,
    PublicKey,
    PrivateKey,
    SecretKey,
    HwFeature,
    DomainParameters,
    Mechanism,
    OtpKey,
}

impl ObjectClass {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            CKO_DATA => ObjectClass::Data,
            CKO_CERTIFICATE => ObjectClass::Certificate,
            CKO_PUBLIC_KEY => ObjectClass::PublicKey,
            CKO_PRIVATE_KEY => ObjectClass::PrivateKey,
            CKO_SECRET_KEY => ObjectClass::SecretKey,
            CKO_HW_FEATURE => ObjectClass::HwFeature,
            CKO_DOMAIN_PARAMETERS => ObjectClass::DomainParameters,
            CKO_MECHANISM => ObjectClass::Mechanism,
            CKO_OTP_KEY => ObjectClass::OtpKey,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        match self {
            ObjectClass::Data => CKO_DATA,
            ObjectClass::Certificate => CKO_CERTIFICATE,
            ObjectClass::PublicKey => CKO_PUBLIC_KEY,
            ObjectClass::PrivateKey => CKO_PRIVATE_KEY,
            ObjectClass::SecretKey => CKO_SECRET_KEY,
            ObjectClass::HwFeature => CKO_HW_FEATURE,
            ObjectClass::DomainParameters => CKO_DOMAIN_PARAMETERS,
            ObjectClass::Mechanism => CKO_MECHANISM,
            ObjectClass::OtpKey => CKO_OTP_KEY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectClass::Data => "data",
            ObjectClass::Certificate => "certificate",
            ObjectClass::PublicKey => "public_key",
            ObjectClass::PrivateKey => "private_key",
            ObjectClass::SecretKey => "secret_key",
            ObjectClass::HwFeature => "hw_feature",
            ObjectClass::DomainParameters => "domain_parameters",
            ObjectClass::Mechanism => "mechanism",
            ObjectClass::OtpKey => "otp_key",
        }
    }

    pub fn is_key(self) -> bool {
        matches!(
            self,
            ObjectClass::SecretKey | ObjectClass::PublicKey | ObjectClass::PrivateKey
        )
    }

    pub fn is_asymmetric_key(self) -> bool {
        matches!(self, ObjectClass::PublicKey | ObjectClass::PrivateKey)
    }
}

/// Key types known to the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    Rsa,
    Dsa,
    Dh,
    Ec,
    GenericSecret,
    Aes,
    Md5Hmac,
    Sha1Hmac,
    Sha224Hmac,
    Sha256Hmac,
    Sha384Hmac,
    Sha512Hmac,
}

impl KeyType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            CKK_RSA => KeyType::Rsa,
            CKK_DSA => KeyType::Dsa,
            CKK_DH => KeyType::Dh,
            CKK_EC => KeyType::Ec,
            CKK_GENERIC_SECRET => KeyType::GenericSecret,
            CKK_AES => KeyType::Aes,
            CKK_MD5_HMAC => KeyType::Md5Hmac,
            CKK_SHA_1_HMAC => KeyType::Sha1Hmac,
            CKK_SHA224_HMAC => KeyType::Sha224Hmac,
            CKK_SHA256_HMAC => KeyType::Sha256Hmac,
            CKK_SHA384_HMAC => KeyType::Sha384Hmac,
            CKK_SHA512_HMAC => KeyType::Sha512Hmac,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        match self {
            KeyType::Rsa => CKK_RSA,
            KeyType::Dsa => CKK_DSA,
            KeyType::Dh => CKK_DH,
            KeyType::Ec => CKK_EC,
            KeyType::GenericSecret => CKK_GENERIC_SECRET,
            KeyType::Aes => CKK_AES,
            KeyType::Md5Hmac => CKK_MD5_HMAC,
            KeyType::Sha1Hmac => CKK_SHA_1_HMAC,
            KeyType::Sha224Hmac => CKK_SHA224_HMAC,
            KeyType::Sha256Hmac => CKK_SHA256_HMAC,
            KeyType::Sha384Hmac => CKK_SHA384_HMAC,
            KeyType::Sha512Hmac => CKK_SHA512_HMAC,
        }
    }

    /// Symmetric key types acceptable for a secret key object.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            KeyType::GenericSecret
                | KeyType::Aes
                | KeyType::Md5Hmac
                | KeyType::Sha1Hmac
                | KeyType::Sha224Hmac
                | KeyType::Sha256Hmac
                | KeyType::Sha384Hmac
                | KeyType::Sha512Hmac
        )
    }

    pub fn is_hmac(self) -> bool {
        self.is_symmetric() && !matches!(self, KeyType::GenericSecret | KeyType::Aes)
    }
}
