//! Top-level facade crate for p11token.
//!
//! Re-exports the ABI/attribute core and the policy engine so users can
//! depend on a single crate.

pub mod core {
    pub use p11token_core::*;
}

pub mod engine {
    pub use p11token_engine::*;
}

pub use p11token_core::{AttributeSet, P11Error, Result, ReturnCode};
pub use p11token_engine::{CryptoBackend, MemoryStore, ObjectStore, Token, TokenConfig};
