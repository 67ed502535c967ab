//! Shared error type across p11token crates.

use thiserror::Error;

/// Token return codes (stable ABI values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Malformed input: bad size or truncated buffer.
    BadParameters,
    GeneralError,
    FunctionFailed,
    AttributeReadOnly,
    AttributeSensitive,
    /// Unknown attribute id or wrong value shape for a known id.
    AttributeTypeInvalid,
    AttributeValueInvalid,
    ActionProhibited,
    /// Allocation or capacity exhaustion.
    DeviceMemory,
    KeyHandleInvalid,
    KeySizeRange,
    /// Policy forbids the requested use of the key.
    KeyFunctionNotPermitted,
    MechanismInvalid,
    ObjectHandleInvalid,
    OperationActive,
    OperationNotInitialized,
    PinIncorrect,
    SessionHandleInvalid,
    SessionReadOnly,
    TemplateIncomplete,
    /// Missing or conflicting attributes.
    TemplateInconsistent,
    UserAlreadyLoggedIn,
    UserNotLoggedIn,
    BufferTooSmall,
    /// Internal lookup miss, never returned to a client as-is.
    NotFound,
}

impl ReturnCode {
    /// String representation used in logs, metrics labels and test vectors.
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnCode::BadParameters => "BAD_PARAMETERS",
            ReturnCode::GeneralError => "GENERAL_ERROR",
            ReturnCode::FunctionFailed => "FUNCTION_FAILED",
            ReturnCode::AttributeReadOnly => "ATTRIBUTE_READ_ONLY",
            ReturnCode::AttributeSensitive => "ATTRIBUTE_SENSITIVE",
            ReturnCode::AttributeTypeInvalid => "ATTRIBUTE_TYPE_INVALID",
            ReturnCode::AttributeValueInvalid => "ATTRIBUTE_VALUE_INVALID",
            ReturnCode::ActionProhibited => "ACTION_PROHIBITED",
            ReturnCode::DeviceMemory => "DEVICE_MEMORY",
            ReturnCode::KeyHandleInvalid => "KEY_HANDLE_INVALID",
            ReturnCode::KeySizeRange => "KEY_SIZE_RANGE",
            ReturnCode::KeyFunctionNotPermitted => "KEY_FUNCTION_NOT_PERMITTED",
            ReturnCode::MechanismInvalid => "MECHANISM_INVALID",
            ReturnCode::ObjectHandleInvalid => "OBJECT_HANDLE_INVALID",
            ReturnCode::OperationActive => "OPERATION_ACTIVE",
            ReturnCode::OperationNotInitialized => "OPERATION_NOT_INITIALIZED",
            ReturnCode::PinIncorrect => "PIN_INCORRECT",
            ReturnCode::SessionHandleInvalid => "SESSION_HANDLE_INVALID",
            ReturnCode::SessionReadOnly => "SESSION_READ_ONLY",
            ReturnCode::TemplateIncomplete => "TEMPLATE_INCOMPLETE",
            ReturnCode::TemplateInconsistent => "TEMPLATE_INCONSISTENT",
            ReturnCode::UserAlreadyLoggedIn => "USER_ALREADY_LOGGED_IN",
            ReturnCode::UserNotLoggedIn => "USER_NOT_LOGGED_IN",
            ReturnCode::BufferTooSmall => "BUFFER_TOO_SMALL",
            ReturnCode::NotFound => "NOT_FOUND",
        }
    }

    /// Numeric value on the token ABI.
    pub fn value(self) -> u32 {
        match self {
            ReturnCode::BadParameters => 0x0007,
            ReturnCode::GeneralError => 0x0005,
            ReturnCode::FunctionFailed => 0x0006,
            ReturnCode::AttributeReadOnly => 0x0010,
            ReturnCode::AttributeSensitive => 0x0011,
            ReturnCode::AttributeTypeInvalid => 0x0012,
            ReturnCode::AttributeValueInvalid => 0x0013,
            ReturnCode::ActionProhibited => 0x001b,
            ReturnCode::DeviceMemory => 0x0031,
            ReturnCode::KeyHandleInvalid => 0x0060,
            ReturnCode::KeySizeRange => 0x0062,
            ReturnCode::KeyFunctionNotPermitted => 0x0068,
            ReturnCode::MechanismInvalid => 0x0070,
            ReturnCode::ObjectHandleInvalid => 0x0082,
            ReturnCode::OperationActive => 0x0090,
            ReturnCode::OperationNotInitialized => 0x0091,
            ReturnCode::PinIncorrect => 0x00a0,
            ReturnCode::SessionHandleInvalid => 0x00b3,
            ReturnCode::SessionReadOnly => 0x00b5,
            ReturnCode::TemplateIncomplete => 0x00d0,
            ReturnCode::TemplateInconsistent => 0x00d1,
            ReturnCode::UserAlreadyLoggedIn => 0x0100,
            ReturnCode::UserNotLoggedIn => 0x0101,
            ReturnCode::BufferTooSmall => 0x0150,
            ReturnCode::NotFound => 0x8000_0000,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, P11Error>;

/// Unified error type used by core and engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum P11Error {
    #[error("bad parameters: {0}")]
    BadParameters(String),
    #[error("general error: {0}")]
    General(String),
    #[error("function failed: {0}")]
    FunctionFailed(String),
    #[error("attribute {0:#x} is read-only")]
    AttributeReadOnly(u32),
    #[error("attribute {0:#x} is sensitive")]
    AttributeSensitive(u32),
    #[error("invalid attribute type: {0}")]
    AttributeTypeInvalid(String),
    #[error("invalid attribute value: {0}")]
    AttributeValueInvalid(String),
    #[error("action prohibited: {0}")]
    ActionProhibited(String),
    #[error("out of device memory")]
    DeviceMemory,
    #[error("invalid key handle {0}")]
    KeyHandleInvalid(u32),
    #[error("key size {len} out of range [{min}, {max}]")]
    KeySizeRange { len: u32, min: u32, max: u32 },
    #[error("key function not permitted: {0}")]
    KeyFunctionNotPermitted(String),
    #[error("invalid mechanism {0:#x}")]
    MechanismInvalid(u32),
    #[error("invalid object handle {0}")]
    ObjectHandleInvalid(u32),
    #[error("operation already active")]
    OperationActive,
    #[error("operation not initialized")]
    OperationNotInitialized,
    #[error("incorrect pin")]
    PinIncorrect,
    #[error("invalid session handle {0}")]
    SessionHandleInvalid(u32),
    #[error("session is read-only")]
    SessionReadOnly,
    #[error("template incomplete: {0}")]
    TemplateIncomplete(String),
    #[error("template inconsistent: {0}")]
    TemplateInconsistent(String),
    #[error("user already logged in")]
    UserAlreadyLoggedIn,
    #[error("user not logged in")]
    UserNotLoggedIn,
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },
    #[error("attribute {0:#x} not found")]
    NotFound(u32),
}

impl P11Error {
    /// Map the error to its stable return code.
    pub fn rv(&self) -> ReturnCode {
        match self {
            P11Error::BadParameters(_) => ReturnCode::BadParameters,
            P11Error::General(_) => ReturnCode::GeneralError,
            P11Error::FunctionFailed(_) => ReturnCode::FunctionFailed,
            P11Error::AttributeReadOnly(_) => ReturnCode::AttributeReadOnly,
            P11Error::AttributeSensitive(_) => ReturnCode::AttributeSensitive,
            P11Error::AttributeTypeInvalid(_) => ReturnCode::AttributeTypeInvalid,
            P11Error::AttributeValueInvalid(_) => ReturnCode::AttributeValueInvalid,
            P11Error::ActionProhibited(_) => ReturnCode::ActionProhibited,
            P11Error::DeviceMemory => ReturnCode::DeviceMemory,
            P11Error::KeyHandleInvalid(_) => ReturnCode::KeyHandleInvalid,
            P11Error::KeySizeRange { .. } => ReturnCode::KeySizeRange,
            P11Error::KeyFunctionNotPermitted(_) => ReturnCode::KeyFunctionNotPermitted,
            P11Error::MechanismInvalid(_) => ReturnCode::MechanismInvalid,
            P11Error::ObjectHandleInvalid(_) => ReturnCode::ObjectHandleInvalid,
            P11Error::OperationActive => ReturnCode::OperationActive,
            P11Error::OperationNotInitialized => ReturnCode::OperationNotInitialized,
            P11Error::PinIncorrect => ReturnCode::PinIncorrect,
            P11Error::SessionHandleInvalid(_) => ReturnCode::SessionHandleInvalid,
            P11Error::SessionReadOnly => ReturnCode::SessionReadOnly,
            P11Error::TemplateIncomplete(_) => ReturnCode::TemplateIncomplete,
            P11Error::TemplateInconsistent(_) => ReturnCode::TemplateInconsistent,
            P11Error::UserAlreadyLoggedIn => ReturnCode::UserAlreadyLoggedIn,
            P11Error::UserNotLoggedIn => ReturnCode::UserNotLoggedIn,
            P11Error::BufferTooSmall { .. } => ReturnCode::BufferTooSmall,
            P11Error::NotFound(_) => ReturnCode::NotFound,
        }
    }
}
