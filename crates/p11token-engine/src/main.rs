//! p11token developer tool.
//!
//! Reads a hex-encoded attribute template from stdin, runs it through the
//! sanitizer and the policy engine as an import, and prints the resulting
//! object as JSON. Config comes from argv[1], `P11TOKEN_CONFIG` or
//! `p11token.yaml`, in that order.

use std::io::Read;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use p11token_core::error::{P11Error, Result};
use p11token_core::trace::dump_json;
use p11token_engine::config;
use p11token_engine::mechanism::ProcessingFunction;
use p11token_engine::policy::create_from_template;

fn run() -> Result<serde_json::Value> {
    let path = config::resolve_path(std::env::args().nth(1).as_deref());
    let cfg = config::load_from_file(&path)?;
    tracing::info!(path = %path.display(), label = %cfg.token.label, "config loaded");

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| P11Error::General(format!("stdin: {e}")))?;
    let compact: String = input.split_whitespace().collect();
    let raw = hex::decode(compact)
        .map_err(|e| P11Error::BadParameters(format!("template is not hex: {e}")))?;
    if raw.len() > cfg.token.objects.max_template_bytes {
        return Err(P11Error::BadParameters(format!(
            "template of {} bytes exceeds {}",
            raw.len(),
            cfg.token.objects.max_template_bytes
        )));
    }

    let attrs = create_from_template(&raw, None, ProcessingFunction::Import)?;
    Ok(dump_json(&attrs))
}

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run() {
        Ok(json) => {
            println!("{json:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let rv = e.rv();
            tracing::error!(code = rv.as_str(), error = %e, "template rejected");
            eprintln!("{} ({:#x}): {e}", rv.as_str(), rv.value());
            ExitCode::FAILURE
        }
    }
}
