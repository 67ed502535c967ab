//! End-to-end token flows over a scripted backend and the in-memory store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use p11token_core::abi::ids::*;
use p11token_core::error::{P11Error, Result};
use p11token_core::AttributeSet;
use p11token_engine::mechanism::{ProcessingFunction as F, ProcessingStep as S};
use p11token_engine::session::{Processing, UserType};
use p11token_engine::{CryptoBackend, MemoryStore, ObjectStore, Token, TokenConfig};

const USER_PIN: &[u8] = b"1234";
const SO_PIN: &[u8] = b"12345678";
const P256: &[u8] = &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];

/// Fills key material with fixed bytes and echoes processing input.
struct ScriptedBackend;

impl CryptoBackend for ScriptedBackend {
    fn generate_secret(&self, _mechanism: u32, key: &mut AttributeSet) -> Result<()> {
        let len = key.get_u32(CKA_VALUE_LEN)? as usize;
        key.set(CKA_VALUE, &vec![0xa5; len]);
        Ok(())
    }

    fn generate_key_pair(
        &self,
        mechanism: u32,
        public: &mut AttributeSet,
        private: &mut AttributeSet,
    ) -> Result<()> {
        match mechanism {
            CKM_RSA_PKCS_KEY_PAIR_GEN => {
                let bytes = public.get_u32(CKA_MODULUS_BITS)? as usize / 8;
                public.set(CKA_MODULUS, &vec![0xc3; bytes]);
                public.set(CKA_PUBLIC_EXPONENT, &[1, 0, 1]);
                private.set(CKA_MODULUS, &vec![0xc3; bytes]);
                private.set(CKA_PRIVATE_EXPONENT, &vec![0x11; bytes]);
            }
            _ => {
                public.set(CKA_EC_POINT, &[4; 65]);
                private.set(CKA_VALUE, &[0x22; 32]);
            }
        }
        Ok(())
    }

    fn derive_secret(
        &self,
        _mechanism: u32,
        params: &[u8],
        _parent: &AttributeSet,
        key: &mut AttributeSet,
    ) -> Result<()> {
        let len = key.get_u32(CKA_VALUE_LEN)? as usize;
        let fill = params.first().copied().unwrap_or(0);
        key.set(CKA_VALUE, &vec![fill; len]);
        Ok(())
    }

    fn process(
        &self,
        _processing: &Processing,
        _key: Option<&AttributeSet>,
        step: S,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        if input == b"fail" {
            return Err(P11Error::FunctionFailed("scripted failure".into()));
        }
        Ok(match step {
            S::Init => Vec::new(),
            S::Update => input.to_vec(),
            S::Oneshot | S::Final => b"done".to_vec(),
        })
    }
}

fn config() -> TokenConfig {
    let mut cfg = TokenConfig::default();
    cfg.token.pins.user = Some("1234".into());
    cfg.token.pins.so = Some("12345678".into());
    cfg
}

fn token_with(store: Arc<MemoryStore>) -> Token {
    Token::new(config(), Arc::new(ScriptedBackend), store).unwrap()
}

fn token() -> Token {
    token_with(Arc::new(MemoryStore::from_config(&config())))
}

fn blob(t: &AttributeSet) -> Vec<u8> {
    t.to_bytes().unwrap().to_vec()
}

fn code<T: std::fmt::Debug>(r: Result<T>) -> &'static str {
    r.unwrap_err().rv().as_str()
}

fn aes_template(extra: &[(u32, bool)]) -> AttributeSet {
    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_AES);
    t.add_u32(CKA_VALUE_LEN, 16);
    for &(id, v) in extra {
        t.add_bool(id, v);
    }
    t
}

fn data_template(label: &[u8]) -> AttributeSet {
    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_DATA);
    t.add(CKA_LABEL, label);
    t.add(CKA_VALUE, b"payload");
    t
}

#[test]
fn sessions_open_and_close() {
    let token = token();
    let a = token.open_session(true).unwrap();
    let b = token.open_session(false).unwrap();
    assert_ne!(a, b);
    assert_eq!(token.session_count().unwrap(), 2);

    assert_eq!(code(token.close_session(99)), "SESSION_HANDLE_INVALID");
    token.close_session(a).unwrap();
    assert_eq!(code(token.close_session(a)), "SESSION_HANDLE_INVALID");
    assert_eq!(token.session_count().unwrap(), 1);
}

#[test]
fn import_data_object_and_read_it_back() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let h = token.create_object(s, &blob(&data_template(b"notes"))).unwrap();

    assert_eq!(token.get_attribute_value(s, h, CKA_LABEL).unwrap(), b"notes");
    assert_eq!(token.get_attribute_value(s, h, CKA_VALUE).unwrap(), b"payload");
    assert_eq!(token.get_attribute_value(s, h, CKA_MODIFIABLE).unwrap(), [1]);
    assert_eq!(
        code(token.get_attribute_value(s, h, CKA_APPLICATION)),
        "ATTRIBUTE_TYPE_INVALID"
    );
    assert_eq!(
        code(token.get_attribute_value(s, 77, CKA_LABEL)),
        "OBJECT_HANDLE_INVALID"
    );
    assert_eq!(
        code(token.create_object(42, &blob(&data_template(b"x")))),
        "SESSION_HANDLE_INVALID"
    );
}

#[test]
fn imported_secret_value_is_guarded() {
    let token = token();
    let s = token.open_session(false).unwrap();

    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_AES);
    t.add(CKA_VALUE, &[9; 32]);
    t.add_bool(CKA_SENSITIVE, true);
    t.add_bool(CKA_LOCAL, true);
    let h = token.create_object(s, &blob(&t)).unwrap();

    assert_eq!(
        token.get_attribute_value(s, h, CKA_VALUE).unwrap_err(),
        P11Error::AttributeSensitive(CKA_VALUE)
    );
    assert_eq!(token.get_attribute_value(s, h, CKA_LOCAL).unwrap(), [0]);
    assert_eq!(
        token.get_attribute_value(s, h, CKA_ALWAYS_SENSITIVE).unwrap(),
        [0]
    );
}

#[test]
fn import_rejects_bad_sizes_and_templates() {
    let token = token();
    let s = token.open_session(false).unwrap();

    let mut short = AttributeSet::new();
    short.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    short.add_u32(CKA_KEY_TYPE, CKK_AES);
    short.add(CKA_VALUE, &[9; 8]);
    assert_eq!(code(token.create_object(s, &blob(&short))), "KEY_SIZE_RANGE");

    assert_eq!(code(token.create_object(s, &[0xff; 3])), "BAD_PARAMETERS");

    let huge = vec![0u8; token.config().token.objects.max_template_bytes + 1];
    assert_eq!(code(token.create_object(s, &huge)), "BAD_PARAMETERS");

    assert_eq!(token.object_count().unwrap(), 0);
    let rejected = token
        .metrics()
        .policy_rejections
        .get(&[("stage", "sanitize"), ("code", "BAD_PARAMETERS")]);
    assert_eq!(rejected, 2);
}

#[test]
fn import_accepts_long_hmac_key() {
    let token = token();
    let s = token.open_session(false).unwrap();

    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_SHA256_HMAC);
    t.add_bool(CKA_SIGN, true);
    t.add(CKA_VALUE, &[0x6b; 64]);
    let h = token.create_object(s, &blob(&t)).unwrap();
    assert_eq!(token.get_attribute_value(s, h, CKA_SIGN).unwrap(), [1]);

    t.set(CKA_VALUE, &[0x6b; 200]);
    assert_eq!(code(token.create_object(s, &blob(&t))), "KEY_SIZE_RANGE");
    assert_eq!(token.object_count().unwrap(), 1);
}

#[test]
fn generated_secret_carries_provenance() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let h = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[(CKA_ENCRYPT, true)])))
        .unwrap();

    assert_eq!(token.get_attribute_value(s, h, CKA_LOCAL).unwrap(), [1]);
    assert_eq!(token.get_attribute_value(s, h, CKA_TOKEN).unwrap(), [0]);
    assert_eq!(
        token.get_attribute_value(s, h, CKA_KEY_GEN_MECHANISM).unwrap(),
        CKM_AES_KEY_GEN.to_le_bytes()
    );
    assert_eq!(
        token.get_attribute_value(s, h, CKA_NEVER_EXTRACTABLE).unwrap(),
        [1]
    );
    assert_eq!(token.get_attribute_value(s, h, CKA_ID).unwrap().len(), 16);
    // not extractable, so the generated value stays inside
    assert_eq!(
        code(token.get_attribute_value(s, h, CKA_VALUE)),
        "ATTRIBUTE_SENSITIVE"
    );
}

#[test]
fn generate_refuses_wrong_mechanism_or_size() {
    let token = token();
    let s = token.open_session(false).unwrap();

    assert_eq!(
        code(token.generate_key(s, CKM_AES_CBC, &blob(&aes_template(&[])))),
        "KEY_FUNCTION_NOT_PERMITTED"
    );

    let mut big = aes_template(&[]);
    big.set(CKA_VALUE_LEN, &64u32.to_le_bytes());
    assert_eq!(
        code(token.generate_key(s, CKM_AES_KEY_GEN, &blob(&big))),
        "KEY_SIZE_RANGE"
    );

    let mut hmac = AttributeSet::new();
    hmac.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    hmac.add_u32(CKA_KEY_TYPE, CKK_SHA256_HMAC);
    hmac.add_u32(CKA_VALUE_LEN, 32);
    assert_eq!(
        code(token.generate_key(s, CKM_AES_KEY_GEN, &blob(&hmac))),
        "TEMPLATE_INCONSISTENT"
    );

    let m = token.metrics();
    assert_eq!(
        m.policy_rejections
            .get(&[("stage", "mechanism"), ("code", "KEY_FUNCTION_NOT_PERMITTED")]),
        1
    );
    assert_eq!(
        m.policy_rejections
            .get(&[("stage", "created"), ("code", "KEY_SIZE_RANGE")]),
        1
    );
    assert_eq!(token.object_count().unwrap(), 0);
}

fn ec_pair_templates() -> (AttributeSet, AttributeSet) {
    let mut public = AttributeSet::new();
    public.add_u32(CKA_CLASS, CKO_PUBLIC_KEY);
    public.add_u32(CKA_KEY_TYPE, CKK_EC);
    public.add(CKA_EC_PARAMS, P256);
    public.add_bool(CKA_VERIFY, true);

    let mut private = AttributeSet::new();
    private.add_u32(CKA_CLASS, CKO_PRIVATE_KEY);
    private.add_u32(CKA_KEY_TYPE, CKK_EC);
    private.add_bool(CKA_SIGN, true);
    private.add_bool(CKA_DERIVE, true);
    (public, private)
}

#[test]
fn ec_pair_shares_id_and_curve() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let (public, private) = ec_pair_templates();
    let (hp, hk) = token
        .generate_key_pair(s, CKM_EC_KEY_PAIR_GEN, &blob(&public), &blob(&private))
        .unwrap();

    assert_eq!(token.get_attribute_value(s, hp, CKA_EC_POINT).unwrap(), [4; 65]);
    // private half needs a user
    assert_eq!(
        code(token.get_attribute_value(s, hk, CKA_EC_PARAMS)),
        "KEY_FUNCTION_NOT_PERMITTED"
    );

    token.login(s, UserType::User, USER_PIN).unwrap();
    assert_eq!(token.get_attribute_value(s, hk, CKA_EC_PARAMS).unwrap(), P256);
    assert_eq!(
        token.get_attribute_value(s, hp, CKA_ID).unwrap(),
        token.get_attribute_value(s, hk, CKA_ID).unwrap()
    );
    assert_eq!(token.get_attribute_value(s, hk, CKA_LOCAL).unwrap(), [1]);
}

#[test]
fn rsa_pair_and_mismatched_pair() {
    let token = token();
    let s = token.open_session(false).unwrap();

    let mut public = AttributeSet::new();
    public.add_u32(CKA_CLASS, CKO_PUBLIC_KEY);
    public.add_u32(CKA_KEY_TYPE, CKK_RSA);
    public.add_u32(CKA_MODULUS_BITS, 2048);
    let mut private = AttributeSet::new();
    private.add_u32(CKA_CLASS, CKO_PRIVATE_KEY);
    private.add_u32(CKA_KEY_TYPE, CKK_RSA);

    let (hp, _) = token
        .generate_key_pair(s, CKM_RSA_PKCS_KEY_PAIR_GEN, &blob(&public), &blob(&private))
        .unwrap();
    assert_eq!(
        token.get_attribute_value(s, hp, CKA_MODULUS).unwrap().len(),
        256
    );

    let (_, ec_private) = ec_pair_templates();
    assert_eq!(
        code(token.generate_key_pair(
            s,
            CKM_RSA_PKCS_KEY_PAIR_GEN,
            &blob(&public),
            &blob(&ec_private)
        )),
        "TEMPLATE_INCONSISTENT"
    );
    assert_eq!(token.object_count().unwrap(), 2);
}

#[test]
fn derive_follows_parent_history_and_template() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let parent = token
        .generate_key(
            s,
            CKM_AES_KEY_GEN,
            &blob(&aes_template(&[(CKA_DERIVE, true), (CKA_SENSITIVE, true)])),
        )
        .unwrap();

    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_GENERIC_SECRET);
    t.add_u32(CKA_VALUE_LEN, 32);
    t.add_bool(CKA_SENSITIVE, true);

    let h = token
        .derive_key(s, CKM_AES_ECB_ENCRYPT_DATA, parent, &[0x33; 16], &blob(&t))
        .unwrap();
    assert_eq!(token.get_attribute_value(s, h, CKA_LOCAL).unwrap(), [0]);
    assert_eq!(
        token.get_attribute_value(s, h, CKA_ALWAYS_SENSITIVE).unwrap(),
        [1]
    );
    assert_eq!(
        token.get_attribute_value(s, h, CKA_NEVER_EXTRACTABLE).unwrap(),
        [1]
    );

    // parent cannot derive
    let plain = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[])))
        .unwrap();
    assert_eq!(
        code(token.derive_key(s, CKM_AES_ECB_ENCRYPT_DATA, plain, &[], &blob(&t))),
        "KEY_FUNCTION_NOT_PERMITTED"
    );
    assert_eq!(
        code(token.derive_key(s, CKM_AES_ECB_ENCRYPT_DATA, 500, &[], &blob(&t))),
        "KEY_HANDLE_INVALID"
    );
}

#[test]
fn derive_respects_parent_derive_template() {
    let token = token();
    let s = token.open_session(false).unwrap();

    let mut rule = AttributeSet::new();
    rule.add_bool(CKA_EXTRACTABLE, false);
    let mut parent = aes_template(&[(CKA_DERIVE, true)]);
    parent.add(CKA_DERIVE_TEMPLATE, &rule.to_bytes().unwrap());
    let parent = token.generate_key(s, CKM_AES_KEY_GEN, &blob(&parent)).unwrap();

    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_SECRET_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_AES);
    t.add_u32(CKA_VALUE_LEN, 16);
    t.add_bool(CKA_EXTRACTABLE, true);
    assert_eq!(
        code(token.derive_key(s, CKM_AES_CBC_ENCRYPT_DATA, parent, &[], &blob(&t))),
        "TEMPLATE_INCONSISTENT"
    );

    t.set_bool(CKA_EXTRACTABLE, false);
    token
        .derive_key(s, CKM_AES_CBC_ENCRYPT_DATA, parent, &[], &blob(&t))
        .unwrap();
}

#[test]
fn copy_rules() {
    let token = token();
    let s = token.open_session(true).unwrap();
    let key = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[(CKA_SENSITIVE, true)])))
        .unwrap();

    let mut relabel = AttributeSet::new();
    relabel.add(CKA_LABEL, b"copy");
    let c = token.copy_object(s, key, &blob(&relabel)).unwrap();
    assert_eq!(token.get_attribute_value(s, c, CKA_LABEL).unwrap(), b"copy");
    assert_eq!(token.get_attribute_value(s, c, CKA_LOCAL).unwrap(), [1]);
    assert_eq!(
        token.get_attribute_value(s, c, CKA_KEY_GEN_MECHANISM).unwrap(),
        CKM_AES_KEY_GEN.to_le_bytes()
    );

    let mut weaken = AttributeSet::new();
    weaken.add_bool(CKA_SENSITIVE, false);
    assert_eq!(
        code(token.copy_object(s, key, &blob(&weaken))),
        "ATTRIBUTE_READ_ONLY"
    );

    let locked = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[(CKA_COPYABLE, false)])))
        .unwrap();
    assert_eq!(
        code(token.copy_object(s, locked, &blob(&relabel))),
        "ACTION_PROHIBITED"
    );
}

#[test]
fn destroy_rules() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let h = token.create_object(s, &blob(&data_template(b"a"))).unwrap();
    token.destroy_object(s, h).unwrap();
    assert_eq!(code(token.destroy_object(s, h)), "OBJECT_HANDLE_INVALID");

    let mut pinned = data_template(b"b");
    pinned.add_bool(CKA_DESTROYABLE, false);
    let h = token.create_object(s, &blob(&pinned)).unwrap();
    assert_eq!(code(token.destroy_object(s, h)), "ACTION_PROHIBITED");
    assert_eq!(
        token.metrics().objects_active.get(&[]),
        token.object_count().unwrap() as i64
    );
}

#[test]
fn token_objects_need_rw_session_and_survive_restart() {
    let store = Arc::new(MemoryStore::from_config(&config()));
    let token = token_with(Arc::clone(&store));
    let ro = token.open_session(false).unwrap();
    let rw = token.open_session(true).unwrap();

    let mut persistent = data_template(b"kept");
    persistent.add_bool(CKA_TOKEN, true);
    assert_eq!(
        code(token.create_object(ro, &blob(&persistent))),
        "SESSION_READ_ONLY"
    );

    let mut private = persistent.clone();
    private.set_bool(CKA_PRIVATE, true);
    assert_eq!(
        code(token.create_object(rw, &blob(&private))),
        "USER_NOT_LOGGED_IN"
    );

    let h = token.create_object(rw, &blob(&persistent)).unwrap();
    assert_eq!(code(token.destroy_object(ro, h)), "SESSION_READ_ONLY");
    assert_eq!(store.len(), 1);

    let restarted = token_with(Arc::clone(&store));
    assert_eq!(restarted.object_count().unwrap(), 1);
    let s = restarted.open_session(false).unwrap();
    let found = restarted.find_objects(s, &blob(&AttributeSet::new())).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        restarted.get_attribute_value(s, found[0], CKA_LABEL).unwrap(),
        b"kept"
    );

    token.destroy_object(rw, h).unwrap();
    assert!(store.is_empty());
}

#[test]
fn trusted_objects_need_the_security_officer() {
    let token = token();
    let s = token.open_session(true).unwrap();
    let trusted = aes_template(&[(CKA_TRUSTED, true)]);

    assert_eq!(
        code(token.generate_key(s, CKM_AES_KEY_GEN, &blob(&trusted))),
        "KEY_FUNCTION_NOT_PERMITTED"
    );
    token.login(s, UserType::SecurityOfficer, SO_PIN).unwrap();
    token.generate_key(s, CKM_AES_KEY_GEN, &blob(&trusted)).unwrap();
}

#[test]
fn login_is_token_wide() {
    let token = token();
    let a = token.open_session(false).unwrap();

    assert_eq!(code(token.login(a, UserType::User, b"0000")), "PIN_INCORRECT");
    token.login(a, UserType::User, USER_PIN).unwrap();
    assert_eq!(
        code(token.login(a, UserType::SecurityOfficer, SO_PIN)),
        "USER_ALREADY_LOGGED_IN"
    );

    // a later session sees the login
    let b = token.open_session(false).unwrap();
    let mut secret = data_template(b"secret");
    secret.add_bool(CKA_PRIVATE, true);
    let h = token.create_object(a, &blob(&secret)).unwrap();
    assert_eq!(token.get_attribute_value(b, h, CKA_LABEL).unwrap(), b"secret");

    token.logout(b).unwrap();
    assert_eq!(code(token.logout(a)), "USER_NOT_LOGGED_IN");
    assert_eq!(
        code(token.get_attribute_value(a, h, CKA_LABEL)),
        "KEY_FUNCTION_NOT_PERMITTED"
    );
}

#[test]
fn closing_last_session_resets_login_and_drops_session_objects() {
    let token = token();
    let a = token.open_session(false).unwrap();
    let b = token.open_session(false).unwrap();
    token.login(a, UserType::User, USER_PIN).unwrap();

    token.create_object(a, &blob(&data_template(b"a1"))).unwrap();
    token.create_object(a, &blob(&data_template(b"a2"))).unwrap();
    token.create_object(b, &blob(&data_template(b"b1"))).unwrap();

    token.close_session(a).unwrap();
    assert_eq!(token.object_count().unwrap(), 1);
    token.close_session(b).unwrap();
    assert_eq!(token.object_count().unwrap(), 0);

    let c = token.open_session(false).unwrap();
    assert_eq!(code(token.logout(c)), "USER_NOT_LOGGED_IN");
}

#[test]
fn find_hides_private_objects_from_public_sessions() {
    let token = token();
    let s = token.open_session(false).unwrap();
    token.create_object(s, &blob(&data_template(b"open"))).unwrap();
    let mut hidden = data_template(b"hidden");
    hidden.add_bool(CKA_PRIVATE, true);
    token.create_object(s, &blob(&hidden)).unwrap();

    let all = blob(&AttributeSet::new());
    assert_eq!(token.find_objects(s, &all).unwrap().len(), 1);

    token.login(s, UserType::User, USER_PIN).unwrap();
    assert_eq!(token.find_objects(s, &all).unwrap().len(), 2);

    let mut by_label = AttributeSet::new();
    by_label.add(CKA_LABEL, b"hidden");
    assert_eq!(token.find_objects(s, &blob(&by_label)).unwrap().len(), 1);
}

#[test]
fn multi_part_processing_lifecycle() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let key = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[(CKA_ENCRYPT, true)])))
        .unwrap();

    token.processing_init(s, CKM_AES_CBC, F::Encrypt, Some(key)).unwrap();
    assert_eq!(
        code(token.processing_init(s, CKM_AES_CBC, F::Encrypt, Some(key))),
        "OPERATION_ACTIVE"
    );
    assert_eq!(token.processing_step(s, S::Update, b"abc").unwrap(), b"abc");
    assert_eq!(code(token.processing_step(s, S::Oneshot, b"x")), "OPERATION_ACTIVE");
    assert_eq!(token.processing_step(s, S::Final, &[]).unwrap(), b"done");
    assert_eq!(
        code(token.processing_step(s, S::Final, &[])),
        "OPERATION_NOT_INITIALIZED"
    );
    assert_eq!(code(token.processing_step(s, S::Init, &[])), "BAD_PARAMETERS");

    let m = token.metrics();
    assert_eq!(m.processing.get(&[("function", "encrypt"), ("step", "update")]), 1);
    assert_eq!(m.processing.get(&[("function", "encrypt"), ("step", "final")]), 1);
}

#[test]
fn processing_init_checks_key_and_mechanism() {
    let token = token();
    let s = token.open_session(false).unwrap();
    let key = token
        .generate_key(s, CKM_AES_KEY_GEN, &blob(&aes_template(&[(CKA_ENCRYPT, true)])))
        .unwrap();

    assert_eq!(
        code(token.processing_init(s, CKM_AES_CBC, F::Decrypt, Some(key))),
        "KEY_FUNCTION_NOT_PERMITTED"
    );
    assert_eq!(
        code(token.processing_init(s, CKM_AES_CBC, F::Encrypt, None)),
        "BAD_PARAMETERS"
    );
    assert_eq!(
        code(token.processing_init(s, CKM_AES_CBC, F::Encrypt, Some(321))),
        "KEY_HANDLE_INVALID"
    );

    token.processing_init(s, CKM_SHA256, F::Digest, None).unwrap();
    assert_eq!(token.processing_step(s, S::Oneshot, b"msg").unwrap(), b"done");
}

#[test]
fn backend_failure_ends_processing() {
    let token = token();
    let s = token.open_session(false).unwrap();
    token.processing_init(s, CKM_SHA256, F::Digest, None).unwrap();

    assert_eq!(code(token.processing_step(s, S::Update, b"fail")), "FUNCTION_FAILED");
    assert_eq!(
        code(token.processing_step(s, S::Update, b"more")),
        "OPERATION_NOT_INITIALIZED"
    );
}

#[test]
fn always_authenticate_key_needs_context_login() {
    let token = token();
    let s = token.open_session(false).unwrap();
    token.login(s, UserType::User, USER_PIN).unwrap();

    let mut t = AttributeSet::new();
    t.add_u32(CKA_CLASS, CKO_PRIVATE_KEY);
    t.add_u32(CKA_KEY_TYPE, CKK_RSA);
    t.add(CKA_MODULUS, &[0xc3; 256]);
    t.add(CKA_PRIVATE_EXPONENT, &[0x11; 256]);
    t.add_bool(CKA_SIGN, true);
    t.add_bool(CKA_ALWAYS_AUTHENTICATE, true);
    let key = token.create_object(s, &blob(&t)).unwrap();

    assert_eq!(
        code(token.login(s, UserType::ContextSpecific, USER_PIN)),
        "OPERATION_NOT_INITIALIZED"
    );

    token
        .processing_init(s, CKM_SHA256_RSA_PKCS, F::Sign, Some(key))
        .unwrap();
    assert_eq!(
        code(token.processing_step(s, S::Update, b"data")),
        "USER_NOT_LOGGED_IN"
    );

    // still active, recover with a context specific login
    assert_eq!(
        code(token.login(s, UserType::ContextSpecific, b"bad")),
        "PIN_INCORRECT"
    );
    token.login(s, UserType::ContextSpecific, USER_PIN).unwrap();
    token.processing_step(s, S::Update, b"data").unwrap();
    assert_eq!(token.processing_step(s, S::Final, &[]).unwrap(), b"done");
}

#[test]
fn metrics_render_in_text_format() {
    let token = token();
    let s = token.open_session(false).unwrap();
    token.create_object(s, &blob(&data_template(b"m"))).unwrap();

    let text = token.metrics().render();
    assert!(text.contains("p11token_objects_created_total{class=\"data\",function=\"import\"} 1"));
    assert!(text.contains("p11token_sessions_active 1"));
    assert!(text.contains("p11token_objects_active 1"));
}

/// Memory store whose discard always fails.
struct StickyStore(MemoryStore);

impl ObjectStore for StickyStore {
    fn persist(&self, attrs: &AttributeSet) -> Result<u64> {
        self.0.persist(attrs)
    }

    fn discard(&self, _id: u64) -> Result<()> {
        Err(P11Error::FunctionFailed("sticky store".into()))
    }

    fn load_all(&self) -> Result<Vec<(u64, AttributeSet)>> {
        self.0.load_all()
    }

    fn verify_pin(&self, user: UserType, pin: &[u8]) -> Result<()> {
        self.0.verify_pin(user, pin)
    }
}

fn small_table_config() -> TokenConfig {
    let mut cfg = config();
    cfg.token.handles.max_capacity = Some(4);
    cfg
}

fn fill_object_table(token: &Token, s: u32) {
    for label in [b"a", b"b", b"c"] {
        token.create_object(s, &blob(&data_template(label))).unwrap();
    }
}

#[test]
fn full_object_table_leaves_no_stored_object() {
    let cfg = small_table_config();
    let store = Arc::new(MemoryStore::from_config(&cfg));
    let token = Token::new(cfg, Arc::new(ScriptedBackend), Arc::clone(&store) as Arc<dyn ObjectStore>).unwrap();
    let s = token.open_session(true).unwrap();
    fill_object_table(&token, s);

    let mut persistent = data_template(b"d");
    persistent.add_bool(CKA_TOKEN, true);
    assert_eq!(code(token.create_object(s, &blob(&persistent))), "DEVICE_MEMORY");
    assert!(store.is_empty());
    assert_eq!(token.object_count().unwrap(), 3);
}

#[test]
fn full_object_table_with_failing_discard_still_reports_memory() {
    let cfg = small_table_config();
    let store = Arc::new(StickyStore(MemoryStore::from_config(&cfg)));
    let token = Token::new(cfg, Arc::new(ScriptedBackend), Arc::clone(&store) as Arc<dyn ObjectStore>).unwrap();
    let s = token.open_session(true).unwrap();
    fill_object_table(&token, s);

    let mut persistent = data_template(b"d");
    persistent.add_bool(CKA_TOKEN, true);
    assert_eq!(code(token.create_object(s, &blob(&persistent))), "DEVICE_MEMORY");
    // the orphan stays behind in the store
    assert_eq!(store.0.len(), 1);
}
