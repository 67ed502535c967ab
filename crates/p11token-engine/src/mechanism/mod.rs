//! Mechanism capability table and processing vocabulary.
//!
//! The table is compile-time constant. Each row carries the functions the
//! mechanism may serve, whether it is single-part only, the subset this
//! token actually implements, and the accepted key size range.

pub mod table;

use p11token_core::abi::ids::*;

pub use table::{
    mechanism_flags_comply, mechanism_info, mechanism_is_one_shot_only, mechanism_is_valid,
    mechanism_name, mechanism_supported_flags, mechanism_supported_key_sizes,
    supported_mechanisms, MechanismInfo,
};

/// What a processing request does with its mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingFunction {
    Digest,
    Generate,
    GeneratePair,
    Derive,
    Wrap,
    Unwrap,
    Encrypt,
    Decrypt,
    Sign,
    Verify,
    SignRecover,
    VerifyRecover,
    Import,
    Copy,
    Modify,
    Destroy,
}

impl ProcessingFunction {
    /// Mechanism flag required for this function, 0 for object management.
    pub fn ckfm(self) -> u32 {
        match self {
            ProcessingFunction::Digest => CKFM_DIGEST,
            ProcessingFunction::Generate => CKFM_GENERATE,
            ProcessingFunction::GeneratePair => CKFM_GENERATE_KEY_PAIR,
            ProcessingFunction::Derive => CKFM_DERIVE,
            ProcessingFunction::Wrap => CKFM_WRAP,
            ProcessingFunction::Unwrap => CKFM_UNWRAP,
            ProcessingFunction::Encrypt => CKFM_ENCRYPT,
            ProcessingFunction::Decrypt => CKFM_DECRYPT,
            ProcessingFunction::Sign => CKFM_SIGN,
            ProcessingFunction::Verify => CKFM_VERIFY,
            ProcessingFunction::SignRecover => CKFM_SIGN_RECOVER,
            ProcessingFunction::VerifyRecover => CKFM_VERIFY_RECOVER,
            ProcessingFunction::Import
            | ProcessingFunction::Copy
            | ProcessingFunction::Modify
            | ProcessingFunction::Destroy => 0,
        }
    }

    /// Boolean attribute a key must carry to be used for this function.
    pub fn key_attribute(self) -> Option<u32> {
        match self {
            ProcessingFunction::Encrypt => Some(CKA_ENCRYPT),
            ProcessingFunction::Decrypt => Some(CKA_DECRYPT),
            ProcessingFunction::Sign => Some(CKA_SIGN),
            ProcessingFunction::Verify => Some(CKA_VERIFY),
            ProcessingFunction::SignRecover => Some(CKA_SIGN_RECOVER),
            ProcessingFunction::VerifyRecover => Some(CKA_VERIFY_RECOVER),
            ProcessingFunction::Wrap => Some(CKA_WRAP),
            ProcessingFunction::Unwrap => Some(CKA_UNWRAP),
            ProcessingFunction::Derive => Some(CKA_DERIVE),
            _ => None,
        }
    }

    /// Object management functions skip mechanism capability checks.
    pub fn is_object_management(self) -> bool {
        matches!(
            self,
            ProcessingFunction::Import
                | ProcessingFunction::Copy
                | ProcessingFunction::Modify
                | ProcessingFunction::Destroy
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingFunction::Digest => "digest",
            ProcessingFunction::Generate => "generate",
            ProcessingFunction::GeneratePair => "generate_pair",
            ProcessingFunction::Derive => "derive",
            ProcessingFunction::Wrap => "wrap",
            ProcessingFunction::Unwrap => "unwrap",
            ProcessingFunction::Encrypt => "encrypt",
            ProcessingFunction::Decrypt => "decrypt",
            ProcessingFunction::Sign => "sign",
            ProcessingFunction::Verify => "verify",
            ProcessingFunction::SignRecover => "sign_recover",
            ProcessingFunction::VerifyRecover => "verify_recover",
            ProcessingFunction::Import => "import",
            ProcessingFunction::Copy => "copy",
            ProcessingFunction::Modify => "modify",
            ProcessingFunction::Destroy => "destroy",
        }
    }
}

/// Lifecycle step of a processing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStep {
    Init,
    Update,
    Oneshot,
    Final,
}

impl ProcessingStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStep::Init => "init",
            ProcessingStep::Update => "update",
            ProcessingStep::Oneshot => "oneshot",
            ProcessingStep::Final => "final",
        }
    }
}
