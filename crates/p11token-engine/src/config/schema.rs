use p11token_core::error::{P11Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub version: u32,

    #[serde(default)]
    pub token: TokenSection,
}

impl TokenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(P11Error::BadParameters(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.token.validate()?;

        Ok(())
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            version: 1,
            token: TokenSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSection {
    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default)]
    pub handles: HandleSection,

    #[serde(default)]
    pub objects: ObjectSection,

    #[serde(default)]
    pub pins: PinSection,
}

impl Default for TokenSection {
    fn default() -> Self {
        Self {
            label: default_label(),
            handles: HandleSection::default(),
            objects: ObjectSection::default(),
            pins: PinSection::default(),
        }
    }
}

impl TokenSection {
    pub fn validate(&self) -> Result<()> {
        // token label is a fixed 32-byte field on the ABI
        if self.label.is_empty() || self.label.len() > 32 {
            return Err(P11Error::BadParameters(
                "token.label must be 1 to 32 bytes".into(),
            ));
        }
        if !(1..=1024).contains(&self.handles.initial_capacity) {
            return Err(P11Error::BadParameters(
                "token.handles.initial_capacity must be between 1 and 1024".into(),
            ));
        }
        if let Some(max) = self.handles.max_capacity {
            if max <= self.handles.initial_capacity {
                return Err(P11Error::BadParameters(
                    "token.handles.max_capacity must exceed initial_capacity".into(),
                ));
            }
        }
        if self.objects.generated_id_len > 64 {
            return Err(P11Error::BadParameters(
                "token.objects.generated_id_len must be at most 64".into(),
            ));
        }
        if !(64..=1_048_576).contains(&self.objects.max_template_bytes) {
            return Err(P11Error::BadParameters(
                "token.objects.max_template_bytes must be between 64 and 1048576".into(),
            ));
        }
        Ok(())
    }
}

fn default_label() -> String {
    "p11token".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandleSection {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: u32,

    /// Slot ceiling for the session and object tables, slot 0 included.
    /// Unset lets the tables grow until allocation fails.
    #[serde(default)]
    pub max_capacity: Option<u32>,
}

impl Default for HandleSection {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            max_capacity: None,
        }
    }
}

fn default_initial_capacity() -> u32 {
    4
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSection {
    /// Length of the random CKA_ID given to keys created without one. 0 disables.
    #[serde(default = "default_generated_id_len")]
    pub generated_id_len: usize,

    #[serde(default = "default_max_template_bytes")]
    pub max_template_bytes: usize,
}

impl Default for ObjectSection {
    fn default() -> Self {
        Self {
            generated_id_len: default_generated_id_len(),
            max_template_bytes: default_max_template_bytes(),
        }
    }
}

fn default_generated_id_len() -> usize {
    16
}
fn default_max_template_bytes() -> usize {
    16384
}

/// PINs for the in-memory store. Unset means login for that user fails.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PinSection {
    #[serde(default)]
    pub so: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}
