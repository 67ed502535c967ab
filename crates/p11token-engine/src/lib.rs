//! p11token engine: template policy and processing compliance.
//!
//! Request flow for every object-creating call on [`token::Token`]:
//! sanitizer -> policy engine -> compliance checks -> crypto backend ->
//! handle table. The mechanism table, session model, YAML config and
//! metrics registry support that flow; the backend and the object store
//! are traits so the token can sit on any crypto provider.
//!
//! Panics are denied except for the one internal-contract check in
//! [`compliance`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod backend;
pub mod compliance;
pub mod config;
pub mod handle;
pub mod mechanism;
pub mod obs;
pub mod policy;
pub mod sanitize;
pub mod session;
pub mod token;

pub use backend::{CryptoBackend, MemoryStore, ObjectStore};
pub use config::TokenConfig;
pub use token::{Object, Token};
