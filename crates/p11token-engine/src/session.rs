//! Session state seen by the compliance checks.

use crate::mechanism::ProcessingFunction;

/// Who is logged in on the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    Public,
    User,
    SecurityOfficer,
}

impl LoginState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginState::Public => "public",
            LoginState::User => "user",
            LoginState::SecurityOfficer => "so",
        }
    }
}

/// User kinds accepted by login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    SecurityOfficer,
    User,
    /// Re-authentication for a key flagged always-authenticate.
    ContextSpecific,
}

/// Active processing on a session, between init and final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processing {
    pub mechanism: u32,
    pub function: ProcessingFunction,
    pub key_handle: u32,
    /// The key requires a context-specific login before use.
    pub always_authen: bool,
    pub relogged: bool,
    /// At least one update step went through.
    pub updated: bool,
}

impl Processing {
    pub fn new(mechanism: u32, function: ProcessingFunction, key_handle: u32) -> Self {
        Self {
            mechanism,
            function,
            key_handle,
            always_authen: false,
            relogged: false,
            updated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    read_write: bool,
    pub login: LoginState,
    pub processing: Option<Processing>,
}

impl Session {
    pub fn new(read_write: bool, login: LoginState) -> Self {
        Self {
            read_write,
            login,
            processing: None,
        }
    }

    pub fn is_read_write(&self) -> bool {
        self.read_write
    }

    pub fn is_public(&self) -> bool {
        self.login == LoginState::Public
    }

    pub fn is_user(&self) -> bool {
        self.login == LoginState::User
    }

    pub fn is_so(&self) -> bool {
        self.login == LoginState::SecurityOfficer
    }
}
