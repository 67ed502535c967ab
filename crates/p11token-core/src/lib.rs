//! p11token core: token ABI constants, attribute codec, and error types.
//!
//! This crate defines the binary attribute layout and the return-code
//! surface shared by the policy engine and its callers. It carries no
//! policy and no runtime state, only the data model every later stage
//! builds on.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every template byte comes from an untrusted client, so all fallible
//! paths surface as `P11Error`/`Result` instead of aborting the token.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod abi;
pub mod attrs;
pub mod error;
pub mod trace;

pub use attrs::{Attribute, AttributeSet, BoolProps};
/// Shared result type.
pub use error::{P11Error, Result, ReturnCode};
