//! Collaborators behind the policy layer: the crypto backend that runs
//! transforms and the store that keeps token objects.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

use p11token_core::error::{P11Error, Result};
use p11token_core::AttributeSet;

use crate::config::TokenConfig;
use crate::mechanism::ProcessingStep;
use crate::session::{Processing, UserType};

/// Executes transforms once every policy check has passed.
///
/// Generation and derivation fill key material into an attribute set the
/// policy engine already built; the backend must not touch policy
/// attributes.
pub trait CryptoBackend: Send + Sync {
    fn generate_secret(&self, mechanism: u32, key: &mut AttributeSet) -> Result<()>;

    fn generate_key_pair(
        &self,
        mechanism: u32,
        public: &mut AttributeSet,
        private: &mut AttributeSet,
    ) -> Result<()>;

    fn derive_secret(
        &self,
        mechanism: u32,
        params: &[u8],
        parent: &AttributeSet,
        key: &mut AttributeSet,
    ) -> Result<()>;

    /// One step of an active processing. Returns output bytes, possibly
    /// empty. Digests run without a key.
    fn process(
        &self,
        processing: &Processing,
        key: Option<&AttributeSet>,
        step: ProcessingStep,
        input: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Retains token objects across sessions and checks PINs.
pub trait ObjectStore: Send + Sync {
    /// Keep a finished attribute set; returns its storage id.
    fn persist(&self, attrs: &AttributeSet) -> Result<u64>;

    /// Drop a stored object.
    fn discard(&self, id: u64) -> Result<()>;

    /// Every stored object, for loading at token start.
    fn load_all(&self) -> Result<Vec<(u64, AttributeSet)>>;

    fn verify_pin(&self, user: UserType, pin: &[u8]) -> Result<()>;
}

/// Store that keeps objects in memory, serialized in the blob layout.
pub struct MemoryStore {
    objects: DashMap<u64, Bytes>,
    next_id: AtomicU64,
    so_pin: Option<String>,
    user_pin: Option<String>,
}

impl MemoryStore {
    pub fn new(so_pin: Option<String>, user_pin: Option<String>) -> Self {
        Self {
            objects: DashMap::new(),
            next_id: AtomicU64::new(1),
            so_pin,
            user_pin,
        }
    }

    pub fn from_config(cfg: &TokenConfig) -> Self {
        Self::new(cfg.token.pins.so.clone(), cfg.token.pins.user.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn persist(&self, attrs: &AttributeSet) -> Result<u64> {
        let blob = attrs.to_bytes()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.objects.insert(id, blob);
        Ok(id)
    }

    fn discard(&self, id: u64) -> Result<()> {
        self.objects
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| P11Error::General(format!("no stored object {id}")))
    }

    fn load_all(&self) -> Result<Vec<(u64, AttributeSet)>> {
        let mut out = Vec::with_capacity(self.objects.len());
        for r in self.objects.iter() {
            out.push((*r.key(), AttributeSet::from_bytes(r.value())?));
        }
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    fn verify_pin(&self, user: UserType, pin: &[u8]) -> Result<()> {
        let expected = match user {
            UserType::SecurityOfficer => self.so_pin.as_deref(),
            UserType::User | UserType::ContextSpecific => self.user_pin.as_deref(),
        };
        match expected {
            Some(p) if p.as_bytes() == pin => Ok(()),
            _ => Err(P11Error::PinIncorrect),
        }
    }
}
