//! Token configuration: YAML file, unknown keys rejected, values checked
//! before a token is built from them.

pub mod schema;

use std::path::{Path, PathBuf};

use p11token_core::error::{P11Error, Result};

pub use schema::{HandleSection, ObjectSection, PinSection, TokenConfig, TokenSection};

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "p11token.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "P11TOKEN_CONFIG";

/// Path to load: explicit argument, then `P11TOKEN_CONFIG`, then the default.
pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<TokenConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        P11Error::General(format!("cannot read token config {}: {e}", path.display()))
    })?;
    let cfg = load_from_str(&text)?;
    tracing::debug!(path = %path.display(), label = %cfg.token.label, "token config loaded");
    Ok(cfg)
}

/// Parse and validate. A config that parses but fails validation is as bad
/// as malformed YAML: both are `BAD_PARAMETERS`.
pub fn load_from_str(text: &str) -> Result<TokenConfig> {
    let cfg = serde_yaml::from_str::<TokenConfig>(text).map_err(|e| {
        let at = e
            .location()
            .map(|l| format!(" at line {}", l.line()))
            .unwrap_or_default();
        P11Error::BadParameters(format!("token config{at}: {e}"))
    })?;
    cfg.validate()?;
    Ok(cfg)
}
