//! Processing compliance: mechanism, session and key attribute checks run
//! before any transform reaches the crypto backend.

use rand::RngCore;

use p11token_core::abi::ids::*;
use p11token_core::error::{P11Error, Result};
use p11token_core::AttributeSet;

use crate::mechanism::{
    mechanism_is_one_shot_only, mechanism_name, mechanism_supported_flags,
    mechanism_supported_key_sizes, ProcessingFunction, ProcessingStep,
};
use crate::session::Session;

/// A mechanism reached a point it was validated away from. The token
/// cannot continue in a known state.
#[cold]
#[allow(clippy::panic)]
fn contract_violation(check: &'static str, mechanism: u32) -> ! {
    tracing::error!(
        check,
        mechanism,
        name = mechanism_name(mechanism),
        "internal contract violation"
    );
    panic!("{check}: unexpected mechanism {mechanism:#x}");
}

fn not_permitted(mechanism: u32, function: ProcessingFunction, why: &str) -> P11Error {
    tracing::debug!(
        mech = mechanism_name(mechanism),
        function = function.as_str(),
        why,
        "processing not permitted"
    );
    P11Error::KeyFunctionNotPermitted(format!(
        "{} {}: {why}",
        mechanism_name(mechanism),
        function.as_str()
    ))
}

/// Mechanism and session state against the processing step.
///
/// - init: the token must implement `function` for the mechanism; object
///   management functions pass.
/// - update: one-shot-only mechanisms refuse it.
/// - one-shot: refused once an update went through.
/// - update, one-shot and final all need the context-specific login when
///   the key asks for one.
pub fn check_mechanism(
    session: &Session,
    mechanism: u32,
    function: ProcessingFunction,
    step: ProcessingStep,
) -> Result<()> {
    if step == ProcessingStep::Init {
        if function.is_object_management() {
            return Ok(());
        }
        if mechanism_supported_flags(mechanism) & function.ckfm() == 0 {
            return Err(not_permitted(mechanism, function, "not supported by token"));
        }
        return Ok(());
    }

    let processing = session
        .processing
        .as_ref()
        .ok_or(P11Error::OperationNotInitialized)?;

    if processing.always_authen && !processing.relogged {
        tracing::debug!(
            mech = mechanism_name(mechanism),
            "key requires context specific login"
        );
        return Err(P11Error::UserNotLoggedIn);
    }

    match step {
        ProcessingStep::Update if mechanism_is_one_shot_only(mechanism) => {
            Err(not_permitted(mechanism, function, "single-part mechanism"))
        }
        ProcessingStep::Oneshot if processing.updated => Err(P11Error::OperationActive),
        _ => Ok(()),
    }
}

/// Key family each mechanism applies to.
enum Family {
    Aes,
    Hmac(KeyType),
    Ec,
    Rsa,
}

fn mechanism_family(mechanism: u32) -> Option<Family> {
    let family = match mechanism {
        CKM_AES_ECB | CKM_AES_CBC | CKM_AES_CBC_PAD | CKM_AES_CTS | CKM_AES_CTR | CKM_AES_GCM
        | CKM_AES_CCM | CKM_AES_GMAC | CKM_AES_CMAC | CKM_AES_CMAC_GENERAL | CKM_AES_XCBC_MAC
        | CKM_AES_ECB_ENCRYPT_DATA | CKM_AES_CBC_ENCRYPT_DATA => Family::Aes,
        CKM_MD5_HMAC => Family::Hmac(KeyType::Md5Hmac),
        CKM_SHA_1_HMAC => Family::Hmac(KeyType::Sha1Hmac),
        CKM_SHA224_HMAC => Family::Hmac(KeyType::Sha224Hmac),
        CKM_SHA256_HMAC => Family::Hmac(KeyType::Sha256Hmac),
        CKM_SHA384_HMAC => Family::Hmac(KeyType::Sha384Hmac),
        CKM_SHA512_HMAC => Family::Hmac(KeyType::Sha512Hmac),
        CKM_ECDSA | CKM_ECDSA_SHA1 | CKM_ECDSA_SHA224 | CKM_ECDSA_SHA256 | CKM_ECDSA_SHA384
        | CKM_ECDSA_SHA512 | CKM_ECDH1_DERIVE | CKM_ECDH1_COFACTOR_DERIVE | CKM_ECMQV_DERIVE
        | CKM_ECDH_AES_KEY_WRAP => Family::Ec,
        CKM_RSA_PKCS | CKM_RSA_9796 | CKM_RSA_X_509 | CKM_SHA1_RSA_PKCS | CKM_RSA_PKCS_OAEP
        | CKM_RSA_PKCS_PSS | CKM_SHA1_RSA_PKCS_PSS | CKM_SHA256_RSA_PKCS | CKM_SHA384_RSA_PKCS
        | CKM_SHA512_RSA_PKCS | CKM_SHA256_RSA_PKCS_PSS | CKM_SHA384_RSA_PKCS_PSS
        | CKM_SHA512_RSA_PKCS_PSS | CKM_SHA224_RSA_PKCS | CKM_SHA224_RSA_PKCS_PSS
        | CKM_RSA_AES_KEY_WRAP => Family::Rsa,
        _ => return None,
    };
    Some(family)
}

/// Parent key attributes against the mechanism and function using it.
pub fn check_parent_attrs(
    mechanism: u32,
    function: ProcessingFunction,
    key: &AttributeSet,
) -> Result<()> {
    if let Some(id) = function.key_attribute() {
        if !key.get_bool(id) {
            return Err(not_permitted(mechanism, function, attr_name(id)));
        }
    }

    let class = key.class();
    let key_type = key.key_type();
    let asymmetric = class.is_some_and(ObjectClass::is_asymmetric_key);

    let family_ok = match mechanism_family(mechanism) {
        Some(Family::Aes) => {
            class == Some(ObjectClass::SecretKey) && key_type == Some(KeyType::Aes)
        }
        Some(Family::Hmac(hmac_type)) => {
            class == Some(ObjectClass::SecretKey)
                && (key_type == Some(KeyType::GenericSecret) || key_type == Some(hmac_type))
        }
        Some(Family::Ec) => asymmetric && key_type == Some(KeyType::Ec),
        Some(Family::Rsa) => asymmetric && key_type == Some(KeyType::Rsa),
        None => {
            tracing::debug!(mechanism, "mechanism has no key family");
            return Err(P11Error::MechanismInvalid(mechanism));
        }
    };
    if !family_ok {
        tracing::warn!(
            mech = mechanism_name(mechanism),
            class = key.class_raw(),
            key_type = key.key_type_raw(),
            "key does not suit mechanism"
        );
        return Err(not_permitted(mechanism, function, "key family mismatch"));
    }

    if !allowed_by_key(mechanism, key) {
        return Err(not_permitted(mechanism, function, "not in allowed mechanisms"));
    }

    Ok(())
}

/// True when the key carries no allowed-mechanisms list or lists `mechanism`.
fn allowed_by_key(mechanism: u32, key: &AttributeSet) -> bool {
    let mut lists = key.get_all(CKA_ALLOWED_MECHANISMS).peekable();
    if lists.peek().is_none() {
        return true;
    }
    lists
        .flat_map(|v| v.chunks_exact(4))
        .any(|c| c == mechanism.to_le_bytes().as_slice())
}

/// New object attributes against the mechanism that produced them.
///
/// Only import, derivation and generation mechanisms create objects; any
/// other mechanism here is a broken caller and aborts.
pub fn check_created_attrs_against_processing(
    mechanism: u32,
    attrs: &AttributeSet,
) -> Result<()> {
    let local = attrs.bool_value(CKA_LOCAL);

    let expect_local = match mechanism {
        PROCESSING_IMPORT | CKM_ECDH1_DERIVE | CKM_ECDH1_COFACTOR_DERIVE | CKM_DH_PKCS_DERIVE
        | CKM_AES_ECB_ENCRYPT_DATA | CKM_AES_CBC_ENCRYPT_DATA => false,
        CKM_GENERIC_SECRET_KEY_GEN | CKM_AES_KEY_GEN | CKM_EC_KEY_PAIR_GEN
        | CKM_RSA_PKCS_KEY_PAIR_GEN => true,
        other => contract_violation("check_created_attrs_against_processing", other),
    };
    if local != Some(expect_local) {
        tracing::debug!(
            mech = mechanism_name(mechanism),
            ?local,
            "local flag does not match processing"
        );
        return Err(P11Error::TemplateInconsistent(format!(
            "local flag does not match {}",
            mechanism_name(mechanism)
        )));
    }

    let type_ok = match mechanism {
        CKM_GENERIC_SECRET_KEY_GEN => attrs.key_type() == Some(KeyType::GenericSecret),
        CKM_AES_KEY_GEN => attrs.key_type() == Some(KeyType::Aes),
        CKM_EC_KEY_PAIR_GEN => attrs.key_type() == Some(KeyType::Ec),
        CKM_RSA_PKCS_KEY_PAIR_GEN => attrs.key_type() == Some(KeyType::Rsa),
        CKM_ECDH1_DERIVE | CKM_ECDH1_COFACTOR_DERIVE | CKM_DH_PKCS_DERIVE
        | CKM_AES_ECB_ENCRYPT_DATA | CKM_AES_CBC_ENCRYPT_DATA => {
            attrs.class() == Some(ObjectClass::SecretKey)
        }
        _ => true,
    };
    if !type_ok {
        return Err(P11Error::TemplateInconsistent(format!(
            "key type {:#x} cannot come from {}",
            attrs.key_type_raw(),
            mechanism_name(mechanism)
        )));
    }

    Ok(())
}

/// Size bounds for a key type, through the mechanism that governs it.
fn key_size_range(key_type: u32) -> Result<(u32, u32)> {
    let mechanism = match KeyType::from_u32(key_type) {
        Some(KeyType::GenericSecret) => CKM_GENERIC_SECRET_KEY_GEN,
        Some(KeyType::Md5Hmac) => CKM_MD5_HMAC,
        Some(KeyType::Sha1Hmac) => CKM_SHA_1_HMAC,
        Some(KeyType::Sha224Hmac) => CKM_SHA224_HMAC,
        Some(KeyType::Sha256Hmac) => CKM_SHA256_HMAC,
        Some(KeyType::Sha384Hmac) => CKM_SHA384_HMAC,
        Some(KeyType::Sha512Hmac) => CKM_SHA512_HMAC,
        Some(KeyType::Aes) => CKM_AES_KEY_GEN,
        Some(KeyType::Ec) => CKM_EC_KEY_PAIR_GEN,
        Some(KeyType::Rsa | KeyType::Dsa | KeyType::Dh) => CKM_RSA_PKCS_KEY_PAIR_GEN,
        None => {
            return Err(P11Error::TemplateInconsistent(format!(
                "no size range for key type {key_type:#x}"
            )));
        }
    };
    Ok(mechanism_supported_key_sizes(mechanism))
}

/// Byte length of a secret: value-len, else the value itself.
fn secret_length(secret: &AttributeSet) -> Result<u32> {
    match secret.get_u32(CKA_VALUE_LEN) {
        Ok(len) => Ok(len),
        Err(P11Error::NotFound(_)) => secret
            .get(CKA_VALUE)
            .and_then(|v| u32::try_from(v.len()).ok())
            .ok_or_else(|| P11Error::TemplateIncomplete("secret key has no length".into())),
        Err(e) => Err(e),
    }
}

/// Bit length of an RSA key: modulus-bits, else the modulus itself.
/// An empty modulus-bits entry counts as absent.
fn modulus_bits(key: &AttributeSet) -> Result<u32> {
    let bits = match key.get(CKA_MODULUS_BITS) {
        Some([]) => Err(P11Error::NotFound(CKA_MODULUS_BITS)),
        _ => key.get_u32(CKA_MODULUS_BITS),
    };
    match bits {
        Ok(bits) => Ok(bits),
        Err(P11Error::NotFound(_)) => key
            .get(CKA_MODULUS)
            .and_then(|m| u32::try_from(m.len()).ok())
            .and_then(|n| n.checked_mul(8))
            .ok_or_else(|| P11Error::TemplateIncomplete("RSA key has no modulus size".into())),
        Err(e) => Err(e),
    }
}

/// Class, pairing and size checks on a freshly built key or key pair.
pub fn check_created_attrs(key1: &AttributeSet, key2: Option<&AttributeSet>) -> Result<()> {
    let mut secret = None;
    let mut public = None;
    let mut private = None;

    match key1.class() {
        Some(ObjectClass::SecretKey) => secret = Some(key1),
        Some(ObjectClass::PublicKey) => public = Some(key1),
        Some(ObjectClass::PrivateKey) => private = Some(key1),
        _ => {
            return Err(P11Error::AttributeValueInvalid(format!(
                "class {:#x} is not a key class",
                key1.class_raw()
            )));
        }
    }

    if let Some(key2) = key2 {
        match key2.class() {
            Some(ObjectClass::PublicKey) if private.is_some() => public = Some(key2),
            Some(ObjectClass::PrivateKey) if public.is_some() => private = Some(key2),
            Some(ObjectClass::PublicKey | ObjectClass::PrivateKey) => {
                return Err(P11Error::TemplateInconsistent(
                    "key pair needs one public and one private key".into(),
                ));
            }
            _ => {
                return Err(P11Error::AttributeValueInvalid(format!(
                    "class {:#x} cannot be paired",
                    key2.class_raw()
                )));
            }
        }
        if key1.key_type_raw() != key2.key_type_raw() {
            return Err(P11Error::TemplateInconsistent(
                "key pair halves differ in key type".into(),
            ));
        }
    }

    let mut key_length = 0;

    if let Some(secret) = secret {
        if !secret.key_type().is_some_and(KeyType::is_symmetric) {
            return Err(P11Error::TemplateInconsistent(format!(
                "key type {:#x} is not a secret key type",
                secret.key_type_raw()
            )));
        }
        key_length = secret_length(secret)?;
    }

    if let Some(public) = public {
        match public.key_type() {
            Some(KeyType::Rsa | KeyType::Dsa | KeyType::Dh) => key_length = modulus_bits(public)?,
            Some(KeyType::Ec) => {}
            _ => {
                return Err(P11Error::TemplateInconsistent(format!(
                    "key type {:#x} is not a public key type",
                    public.key_type_raw()
                )));
            }
        }
    }

    if let Some(private) = private {
        match private.key_type() {
            Some(KeyType::Rsa | KeyType::Dsa | KeyType::Dh) => {
                if public.is_none() {
                    key_length = modulus_bits(private)?;
                }
            }
            Some(KeyType::Ec) => {}
            _ => {
                return Err(P11Error::TemplateInconsistent(format!(
                    "key type {:#x} is not a private key type",
                    private.key_type_raw()
                )));
            }
        }
    }

    // EC sizes are fixed by the curve
    if key1.key_type() == Some(KeyType::Ec) {
        return Ok(());
    }

    let (min, max) = key_size_range(key1.key_type_raw())?;
    if key_length < min || key_length > max {
        tracing::warn!(len = key_length, min, max, "key size out of range");
        return Err(P11Error::KeySizeRange {
            len: key_length,
            min,
            max,
        });
    }

    Ok(())
}

/// Derived and unwrapped keys must satisfy the parent's template.
pub fn check_created_attrs_against_parent_key(
    function: ProcessingFunction,
    parent: &AttributeSet,
    attrs: &AttributeSet,
) -> Result<()> {
    let template_id = match function {
        ProcessingFunction::Derive => CKA_DERIVE_TEMPLATE,
        ProcessingFunction::Unwrap => CKA_UNWRAP_TEMPLATE,
        _ => return Ok(()),
    };

    match parent.nested(template_id)? {
        Some(template) if !attrs.matches(&template) => {
            tracing::debug!(
                template = attr_name(template_id),
                "new key does not match parent template"
            );
            Err(P11Error::TemplateInconsistent(format!(
                "new key does not match parent {}",
                attr_name(template_id)
            )))
        }
        _ => Ok(()),
    }
}

/// Private keys, and objects flagged private, are private.
pub fn object_is_private(attrs: &AttributeSet) -> bool {
    attrs.class() == Some(ObjectClass::PrivateKey) || attrs.get_bool(CKA_PRIVATE)
}

/// Object access against the session login state.
pub fn check_access_attrs_against_token(session: &Session, attrs: &AttributeSet) -> Result<()> {
    match attrs.class() {
        Some(
            ObjectClass::Data
            | ObjectClass::SecretKey
            | ObjectClass::PublicKey
            | ObjectClass::PrivateKey,
        ) => {}
        _ => {
            return Err(P11Error::KeyFunctionNotPermitted(format!(
                "no access rule for class {:#x}",
                attrs.class_raw()
            )));
        }
    }

    if object_is_private(attrs) && !session.is_user() {
        tracing::debug!(login = session.login.as_str(), "private object access refused");
        return Err(P11Error::KeyFunctionNotPermitted(
            "private object needs a user login".into(),
        ));
    }
    Ok(())
}

/// New object attributes against the session that creates it.
pub fn check_created_attrs_against_token(session: &Session, attrs: &AttributeSet) -> Result<()> {
    crate::policy::check_attrs_misc_integrity(attrs)?;

    if attrs.get_bool(CKA_TRUSTED) && !session.is_so() {
        tracing::debug!(login = session.login.as_str(), "trusted object needs SO");
        return Err(P11Error::KeyFunctionNotPermitted(
            "only the security officer may create trusted objects".into(),
        ));
    }

    if attrs.get_bool(CKA_TOKEN) {
        if !session.is_read_write() {
            return Err(P11Error::SessionReadOnly);
        }
        if object_is_private(attrs) && !session.is_user() {
            return Err(P11Error::UserNotLoggedIn);
        }
    }

    Ok(())
}

/// Give keys without an id a random one of `len` bytes. A pair ends up
/// sharing one id. `len == 0` leaves the keys alone.
pub fn add_missing_attribute_id(
    key1: &mut AttributeSet,
    key2: Option<&mut AttributeSet>,
    len: usize,
) -> Result<()> {
    let id1 = key1.get(CKA_ID).map(<[u8]>::to_vec);

    match key2 {
        Some(key2) => {
            let id2 = key2.get(CKA_ID).map(<[u8]>::to_vec);
            match (id1, id2) {
                (Some(_), Some(_)) => {}
                (Some(id), None) => key2.add(CKA_ID, &id),
                (None, Some(id)) => key1.add(CKA_ID, &id),
                (None, None) => {
                    if let Some(id) = random_id(len)? {
                        key1.add(CKA_ID, &id);
                        key2.add(CKA_ID, &id);
                    }
                }
            }
        }
        None => {
            if id1.is_none() {
                if let Some(id) = random_id(len)? {
                    key1.add(CKA_ID, &id);
                }
            }
        }
    }
    Ok(())
}

fn random_id(len: usize) -> Result<Option<Vec<u8>>> {
    if len == 0 {
        return Ok(None);
    }
    let mut id = Vec::new();
    id.try_reserve_exact(len).map_err(|_| P11Error::DeviceMemory)?;
    id.resize(len, 0);
    rand::thread_rng().fill_bytes(&mut id);
    Ok(Some(id))
}

/// Whether attribute `id` of `object` may leave the token.
pub fn attribute_is_exportable(id: u32, object: &AttributeSet) -> bool {
    let secret_part = match id {
        CKA_PRIVATE_EXPONENT | CKA_PRIME_1 | CKA_PRIME_2 | CKA_EXPONENT_1 | CKA_EXPONENT_2
        | CKA_COEFFICIENT => true,
        CKA_VALUE => matches!(
            object.class(),
            Some(ObjectClass::SecretKey | ObjectClass::PrivateKey)
        ),
        _ => false,
    };
    if !secret_part {
        return true;
    }
    object.get_bool(CKA_EXTRACTABLE) && !object.get_bool(CKA_SENSITIVE)
}
