//! Object policy engine.
//!
//! Turns a sanitized client template into the full attribute set of a new
//! object: class/type consistency, storage booleans with their defaults,
//! per-class mandatory and optional attributes, then the attributes the
//! token derives itself (`local`, `always_sensitive`, `never_extractable`).

pub mod engine;
pub mod tables;

pub use engine::{
    check_attrs_misc_integrity, check_class_and_type, copy_template, create_from_sanitized,
    create_from_template,
};
