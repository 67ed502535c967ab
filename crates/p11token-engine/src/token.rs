//! Token facade: sessions, objects and processing behind one lock.
//!
//! Every entry point runs the same pipeline: sanitize the client template,
//! synthesize attributes through the policy engine, run the compliance
//! checks, let the backend fill key material, then publish a handle. A
//! failure at any stage drops the half-built set; nothing is published.

use std::sync::{Arc, Mutex, MutexGuard};

use p11token_core::abi::ids::*;
use p11token_core::error::{P11Error, Result};
use p11token_core::trace::trace_attributes;
use p11token_core::AttributeSet;

use crate::backend::{CryptoBackend, ObjectStore};
use crate::compliance::{
    add_missing_attribute_id, attribute_is_exportable, check_access_attrs_against_token,
    check_created_attrs, check_created_attrs_against_parent_key,
    check_created_attrs_against_processing, check_created_attrs_against_token, check_mechanism,
    check_parent_attrs,
};
use crate::config::{HandleSection, TokenConfig};
use crate::handle::HandleTable;
use crate::mechanism::{mechanism_name, ProcessingFunction, ProcessingStep};
use crate::obs::TokenMetrics;
use crate::policy::{copy_template, create_from_sanitized};
use crate::sanitize::sanitize;
use crate::session::{LoginState, Processing, Session, UserType};

/// A published object.
#[derive(Debug, Clone)]
pub struct Object {
    pub attrs: AttributeSet,
    /// Storage id of a token object.
    pub store_id: Option<u64>,
    /// Session owning a session object.
    pub session: Option<u32>,
}

struct Inner {
    sessions: HandleTable<Session>,
    objects: HandleTable<Object>,
    login: LoginState,
}

pub struct Token {
    cfg: TokenConfig,
    backend: Arc<dyn CryptoBackend>,
    store: Arc<dyn ObjectStore>,
    metrics: Arc<TokenMetrics>,
    inner: Mutex<Inner>,
}

fn session_mut(inner: &mut Inner, handle: u32) -> Result<&mut Session> {
    inner
        .sessions
        .lookup_mut(handle)
        .ok_or(P11Error::SessionHandleInvalid(handle))
}

fn object_of(inner: &Inner, handle: u32) -> Result<&Object> {
    inner
        .objects
        .lookup(handle)
        .ok_or(P11Error::ObjectHandleInvalid(handle))
}

fn key_of(inner: &Inner, handle: u32) -> Result<&Object> {
    inner
        .objects
        .lookup(handle)
        .ok_or(P11Error::KeyHandleInvalid(handle))
}

/// Login state is token wide; every open session follows it.
fn set_login(inner: &mut Inner, state: LoginState) {
    inner.login = state;
    for (_, s) in inner.sessions.iter_mut() {
        s.login = state;
    }
}

fn handle_table<T>(cfg: &HandleSection) -> HandleTable<T> {
    match cfg.max_capacity {
        Some(max) => HandleTable::with_limit(cfg.initial_capacity, max),
        None => HandleTable::new(cfg.initial_capacity),
    }
}

fn class_label(attrs: &AttributeSet) -> &'static str {
    attrs.class().map(ObjectClass::as_str).unwrap_or("unknown")
}

impl Token {
    /// Build a token and load every object the store already holds.
    pub fn new(
        cfg: TokenConfig,
        backend: Arc<dyn CryptoBackend>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        cfg.validate()?;

        let mut objects = handle_table(&cfg.token.handles);
        for (store_id, attrs) in store.load_all()? {
            let obj = Object {
                attrs,
                store_id: Some(store_id),
                session: None,
            };
            objects.acquire(obj).ok_or(P11Error::DeviceMemory)?;
        }

        let metrics = Arc::new(TokenMetrics::default());
        metrics.objects_active.add(&[], objects.len() as i64);
        tracing::info!(
            label = %cfg.token.label,
            objects = objects.len(),
            "token ready"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                sessions: handle_table(&cfg.token.handles),
                objects,
                login: LoginState::Public,
            }),
            cfg,
            backend,
            store,
            metrics,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> Arc<TokenMetrics> {
        Arc::clone(&self.metrics)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| P11Error::General("token state lock poisoned".into()))
    }

    /// Count a rejection for `stage` and pass the error through.
    fn reject(&self, stage: &'static str) -> impl Fn(P11Error) -> P11Error + '_ {
        move |e| {
            let code = e.rv().as_str();
            self.metrics
                .policy_rejections
                .inc(&[("stage", stage), ("code", code)]);
            tracing::warn!(stage, code, error = %e, "request rejected");
            e
        }
    }

    fn template(&self, raw: &[u8]) -> Result<AttributeSet> {
        if raw.len() > self.cfg.token.objects.max_template_bytes {
            return Err(P11Error::BadParameters(format!(
                "template of {} bytes exceeds {}",
                raw.len(),
                self.cfg.token.objects.max_template_bytes
            )))
            .map_err(self.reject("sanitize"));
        }
        sanitize(raw).map_err(self.reject("sanitize"))
    }

    fn publish(
        &self,
        inner: &mut Inner,
        session: u32,
        attrs: AttributeSet,
        function: ProcessingFunction,
    ) -> Result<u32> {
        let class = class_label(&attrs);
        let store_id = if attrs.get_bool(CKA_TOKEN) {
            Some(self.store.persist(&attrs)?)
        } else {
            None
        };
        trace_attributes("published", &attrs);

        let obj = Object {
            attrs,
            store_id,
            session: store_id.is_none().then_some(session),
        };
        let Some(handle) = inner.objects.acquire(obj) else {
            if let Some(id) = store_id {
                if let Err(e) = self.store.discard(id) {
                    tracing::warn!(store_id = id, error = %e, "orphaned token object in store");
                }
            }
            tracing::warn!(class, "object table full");
            return Err(P11Error::DeviceMemory);
        };

        self.metrics
            .objects_created
            .inc(&[("class", class), ("function", function.as_str())]);
        self.metrics.objects_active.inc(&[]);
        tracing::info!(handle, class, function = function.as_str(), "object created");
        Ok(handle)
    }

    fn unpublish(&self, inner: &mut Inner, handle: u32) -> Option<Object> {
        let obj = inner.objects.release(handle)?;
        if let Some(id) = obj.store_id {
            if let Err(e) = self.store.discard(id) {
                tracing::warn!(handle, error = %e, "store discard failed");
            }
        }
        self.metrics.objects_active.dec(&[]);
        Some(obj)
    }

    pub fn open_session(&self, read_write: bool) -> Result<u32> {
        let mut inner = self.lock()?;
        let login = inner.login;
        let handle = inner
            .sessions
            .acquire(Session::new(read_write, login))
            .ok_or(P11Error::DeviceMemory)?;
        self.metrics.sessions_active.inc(&[]);
        tracing::debug!(session = handle, read_write, "session opened");
        Ok(handle)
    }

    /// Close a session and destroy the session objects it created.
    pub fn close_session(&self, handle: u32) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner
            .sessions
            .release(handle)
            .ok_or(P11Error::SessionHandleInvalid(handle))?;
        self.metrics.sessions_active.dec(&[]);

        let owned: Vec<u32> = inner
            .objects
            .iter()
            .filter(|(_, o)| o.session == Some(handle))
            .map(|(h, _)| h)
            .collect();
        for h in &owned {
            self.unpublish(inner, *h);
        }
        if inner.sessions.is_empty() {
            inner.login = LoginState::Public;
        }
        tracing::debug!(session = handle, dropped = owned.len(), "session closed");
        Ok(())
    }

    pub fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.sessions.len())
    }

    pub fn object_count(&self) -> Result<usize> {
        Ok(self.lock()?.objects.len())
    }

    pub fn login(&self, session: u32, user: UserType, pin: &[u8]) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let login = inner.login;
        let s = session_mut(inner, session)?;

        if user == UserType::ContextSpecific {
            let who = match login {
                LoginState::SecurityOfficer => UserType::SecurityOfficer,
                _ => UserType::User,
            };
            let processing = s
                .processing
                .as_mut()
                .ok_or(P11Error::OperationNotInitialized)?;
            self.store.verify_pin(who, pin)?;
            processing.relogged = true;
            tracing::debug!(session, "context specific login");
            return Ok(());
        }

        if login != LoginState::Public {
            return Err(P11Error::UserAlreadyLoggedIn);
        }
        self.store.verify_pin(user, pin)?;

        let state = match user {
            UserType::SecurityOfficer => LoginState::SecurityOfficer,
            _ => LoginState::User,
        };
        set_login(inner, state);
        tracing::info!(session, login = state.as_str(), "logged in");
        Ok(())
    }

    pub fn logout(&self, session: u32) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        session_mut(inner, session)?;
        if inner.login == LoginState::Public {
            return Err(P11Error::UserNotLoggedIn);
        }
        set_login(inner, LoginState::Public);
        tracing::info!(session, "logged out");
        Ok(())
    }

    /// Import an object from a client template.
    pub fn create_object(&self, session: u32, template: &[u8]) -> Result<u32> {
        let tpl = self.template(template)?;
        let attrs = create_from_sanitized(&tpl, None, ProcessingFunction::Import)
            .map_err(self.reject("policy"))?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let s = session_mut(inner, session)?;

        if attrs.class().is_some_and(ObjectClass::is_key) {
            check_created_attrs_against_processing(PROCESSING_IMPORT, &attrs)
                .and_then(|_| check_created_attrs(&attrs, None))
                .map_err(self.reject("created"))?;
        }
        check_created_attrs_against_token(s, &attrs).map_err(self.reject("token"))?;

        self.publish(inner, session, attrs, ProcessingFunction::Import)
    }

    /// Generate a secret key.
    pub fn generate_key(&self, session: u32, mechanism: u32, template: &[u8]) -> Result<u32> {
        let tpl = self.template(template)?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let s = session_mut(inner, session)?;
        let function = ProcessingFunction::Generate;

        check_mechanism(s, mechanism, function, ProcessingStep::Init)
            .map_err(self.reject("mechanism"))?;
        let mut attrs =
            create_from_sanitized(&tpl, None, function).map_err(self.reject("policy"))?;
        check_created_attrs_against_processing(mechanism, &attrs)
            .and_then(|_| check_created_attrs(&attrs, None))
            .map_err(self.reject("created"))?;
        check_created_attrs_against_token(s, &attrs).map_err(self.reject("token"))?;

        attrs.set(CKA_KEY_GEN_MECHANISM, &mechanism.to_le_bytes());
        add_missing_attribute_id(&mut attrs, None, self.cfg.token.objects.generated_id_len)?;
        self.backend.generate_secret(mechanism, &mut attrs)?;

        tracing::debug!(mech = mechanism_name(mechanism), "secret generated");
        self.publish(inner, session, attrs, function)
    }

    /// Generate a key pair. Returns `(public, private)` handles.
    pub fn generate_key_pair(
        &self,
        session: u32,
        mechanism: u32,
        public_template: &[u8],
        private_template: &[u8],
    ) -> Result<(u32, u32)> {
        let pub_tpl = self.template(public_template)?;
        let mut priv_tpl = self.template(private_template)?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let s = session_mut(inner, session)?;
        let function = ProcessingFunction::GeneratePair;

        check_mechanism(s, mechanism, function, ProcessingStep::Init)
            .map_err(self.reject("mechanism"))?;

        // curve parameters come from the public half
        if priv_tpl.key_type() == Some(KeyType::Ec) && !priv_tpl.contains(CKA_EC_PARAMS) {
            if let Some(params) = pub_tpl.get(CKA_EC_PARAMS) {
                let params = params.to_vec();
                priv_tpl.add(CKA_EC_PARAMS, &params);
            }
        }

        let mut public =
            create_from_sanitized(&pub_tpl, None, function).map_err(self.reject("policy"))?;
        let mut private =
            create_from_sanitized(&priv_tpl, None, function).map_err(self.reject("policy"))?;

        check_created_attrs_against_processing(mechanism, &public)
            .and_then(|_| check_created_attrs_against_processing(mechanism, &private))
            .and_then(|_| check_created_attrs(&public, Some(&private)))
            .map_err(self.reject("created"))?;
        check_created_attrs_against_token(s, &public)
            .and_then(|_| check_created_attrs_against_token(s, &private))
            .map_err(self.reject("token"))?;

        public.set(CKA_KEY_GEN_MECHANISM, &mechanism.to_le_bytes());
        private.set(CKA_KEY_GEN_MECHANISM, &mechanism.to_le_bytes());
        add_missing_attribute_id(
            &mut public,
            Some(&mut private),
            self.cfg.token.objects.generated_id_len,
        )?;
        self.backend
            .generate_key_pair(mechanism, &mut public, &mut private)?;

        let pub_handle = self.publish(inner, session, public, function)?;
        match self.publish(inner, session, private, function) {
            Ok(priv_handle) => Ok((pub_handle, priv_handle)),
            Err(e) => {
                self.unpublish(inner, pub_handle);
                Err(e)
            }
        }
    }

    /// Derive a secret from a parent key.
    pub fn derive_key(
        &self,
        session: u32,
        mechanism: u32,
        parent: u32,
        params: &[u8],
        template: &[u8],
    ) -> Result<u32> {
        let tpl = self.template(template)?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let function = ProcessingFunction::Derive;

        let parent_attrs = key_of(inner, parent)?.attrs.clone();
        let s = session_mut(inner, session)?;

        check_mechanism(s, mechanism, function, ProcessingStep::Init)
            .map_err(self.reject("mechanism"))?;
        check_access_attrs_against_token(s, &parent_attrs).map_err(self.reject("access"))?;
        check_parent_attrs(mechanism, function, &parent_attrs).map_err(self.reject("parent"))?;

        let mut attrs = create_from_sanitized(&tpl, Some(&parent_attrs), function)
            .map_err(self.reject("policy"))?;
        check_created_attrs_against_processing(mechanism, &attrs)
            .and_then(|_| check_created_attrs_against_parent_key(function, &parent_attrs, &attrs))
            .map_err(self.reject("created"))?;
        check_created_attrs_against_token(s, &attrs).map_err(self.reject("token"))?;

        self.backend
            .derive_secret(mechanism, params, &parent_attrs, &mut attrs)?;
        check_created_attrs(&attrs, None).map_err(self.reject("created"))?;

        self.publish(inner, session, attrs, function)
    }

    /// Copy an object, applying the changes the template asks for.
    pub fn copy_object(&self, session: u32, object: u32, template: &[u8]) -> Result<u32> {
        let overrides = self.template(template)?;

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let parent = object_of(inner, object)?.attrs.clone();
        let s = session_mut(inner, session)?;

        check_access_attrs_against_token(s, &parent).map_err(self.reject("access"))?;
        if !parent.get_bool(CKA_COPYABLE) {
            return Err(P11Error::ActionProhibited(format!("object {object} is not copyable")))
                .map_err(self.reject("access"));
        }

        let merged = copy_template(&parent, &overrides).map_err(self.reject("policy"))?;
        let mut attrs = create_from_sanitized(&merged, Some(&parent), ProcessingFunction::Copy)
            .map_err(self.reject("policy"))?;
        if let Some(mech) = parent.get(CKA_KEY_GEN_MECHANISM) {
            let mech = mech.to_vec();
            attrs.set(CKA_KEY_GEN_MECHANISM, &mech);
        }
        check_created_attrs_against_token(s, &attrs).map_err(self.reject("token"))?;

        self.publish(inner, session, attrs, ProcessingFunction::Copy)
    }

    pub fn destroy_object(&self, session: u32, object: u32) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let attrs = &object_of(inner, object)?.attrs;
        let s = inner
            .sessions
            .lookup(session)
            .ok_or(P11Error::SessionHandleInvalid(session))?;

        check_access_attrs_against_token(s, attrs).map_err(self.reject("access"))?;
        if !attrs.get_bool(CKA_DESTROYABLE) {
            return Err(P11Error::ActionProhibited(format!(
                "object {object} is not destroyable"
            )));
        }
        if attrs.get_bool(CKA_TOKEN) && !s.is_read_write() {
            return Err(P11Error::SessionReadOnly);
        }

        self.unpublish(inner, object);
        tracing::info!(handle = object, "object destroyed");
        Ok(())
    }

    /// Read one attribute value of an object.
    pub fn get_attribute_value(&self, session: u32, object: u32, id: u32) -> Result<Vec<u8>> {
        let inner = self.lock()?;
        let obj = object_of(&inner, object)?;
        let s = inner
            .sessions
            .lookup(session)
            .ok_or(P11Error::SessionHandleInvalid(session))?;

        check_access_attrs_against_token(s, &obj.attrs)?;
        if !attribute_is_exportable(id, &obj.attrs) {
            return Err(P11Error::AttributeSensitive(id));
        }
        obj.attrs
            .get(id)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| P11Error::AttributeTypeInvalid(format!("{} not set", attr_name(id))))
    }

    /// Handles of the objects matching a template, visible to the session.
    pub fn find_objects(&self, session: u32, template: &[u8]) -> Result<Vec<u32>> {
        let filter = self.template(template)?;
        let inner = self.lock()?;
        let s = inner
            .sessions
            .lookup(session)
            .ok_or(P11Error::SessionHandleInvalid(session))?;

        Ok(inner
            .objects
            .iter()
            .filter(|(_, o)| check_access_attrs_against_token(s, &o.attrs).is_ok())
            .filter(|(_, o)| o.attrs.matches(&filter))
            .map(|(h, _)| h)
            .collect())
    }

    /// Start a processing. `key` is `None` only for digests.
    pub fn processing_init(
        &self,
        session: u32,
        mechanism: u32,
        function: ProcessingFunction,
        key: Option<u32>,
    ) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let key_attrs = match key {
            Some(h) => Some(key_of(inner, h)?.attrs.clone()),
            None if function == ProcessingFunction::Digest => None,
            None => return Err(P11Error::BadParameters("processing needs a key".into())),
        };
        let s = session_mut(inner, session)?;
        if s.processing.is_some() {
            return Err(P11Error::OperationActive);
        }

        check_mechanism(s, mechanism, function, ProcessingStep::Init)
            .map_err(self.reject("mechanism"))?;

        let mut processing = Processing::new(mechanism, function, key.unwrap_or(0));
        if let Some(k) = &key_attrs {
            check_access_attrs_against_token(s, k).map_err(self.reject("access"))?;
            check_parent_attrs(mechanism, function, k).map_err(self.reject("parent"))?;
            processing.always_authen = k.get_bool(CKA_ALWAYS_AUTHENTICATE);
        }

        self.backend
            .process(&processing, key_attrs.as_ref(), ProcessingStep::Init, &[])?;
        self.metrics.processing.inc(&[
            ("function", function.as_str()),
            ("step", ProcessingStep::Init.as_str()),
        ]);
        tracing::debug!(
            session,
            mech = mechanism_name(mechanism),
            function = function.as_str(),
            "processing started"
        );
        s.processing = Some(processing);
        Ok(())
    }

    /// Run an update, one-shot or final step of the active processing.
    ///
    /// One-shot and final end the processing, as does a backend failure.
    /// A compliance rejection leaves it active so the caller can recover
    /// (for instance by logging in again).
    pub fn processing_step(
        &self,
        session: u32,
        step: ProcessingStep,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        if step == ProcessingStep::Init {
            return Err(P11Error::BadParameters(
                "init goes through processing_init".into(),
            ));
        }

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let s = inner
            .sessions
            .lookup(session)
            .ok_or(P11Error::SessionHandleInvalid(session))?;
        let processing = s
            .processing
            .clone()
            .ok_or(P11Error::OperationNotInitialized)?;

        check_mechanism(s, processing.mechanism, processing.function, step)
            .map_err(self.reject("mechanism"))?;

        let key_attrs = match processing.key_handle {
            0 => None,
            h => inner.objects.lookup(h).map(|o| o.attrs.clone()),
        };
        if processing.key_handle != 0 && key_attrs.is_none() {
            session_mut(inner, session)?.processing = None;
            return Err(P11Error::KeyHandleInvalid(processing.key_handle));
        }

        let result = self
            .backend
            .process(&processing, key_attrs.as_ref(), step, input);
        self.metrics.processing.inc(&[
            ("function", processing.function.as_str()),
            ("step", step.as_str()),
        ]);

        let s = session_mut(inner, session)?;
        match (&result, step) {
            (Ok(_), ProcessingStep::Update) => {
                if let Some(p) = s.processing.as_mut() {
                    p.updated = true;
                }
            }
            _ => s.processing = None,
        }
        result
    }
}
