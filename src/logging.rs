//! Logging setup.
//!
//! All crate code logs through `tracing`; this module only installs the
//! subscriber. `JUNIFER_LOG` takes precedence over the level argument and
//! accepts any `EnvFilter` directive (`junifer=debug,info`).

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "JUNIFER_LOG";

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

static CONFIGURED: AtomicBool = AtomicBool::new(false);

fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(directives) = std::env::var(LOG_ENV_VAR) {
        if !directives.is_empty() {
            return EnvFilter::try_new(&directives)
                .with_context(|| format!("Invalid {LOG_ENV_VAR} directives: {directives}"));
        }
    }
    let level = level.to_ascii_lowercase();
    if !VALID_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "The parameter `level` ({level}) needs to be one of the following: {VALID_LEVELS:?}"
        );
    }
    EnvFilter::try_new(&level).with_context(|| format!("Invalid log level: {level}"))
}

/// Install the global subscriber writing to stderr, or to `log_file` when given.
///
/// Calling this more than once is a no-op.
pub fn configure_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = build_filter(level)?;
    if CONFIGURED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let installed = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    // Another subscriber (a test harness, an embedding app) may already be set.
    if let Err(e) = installed {
        tracing::debug!("Global subscriber already installed: {}", e);
    }
    CONFIGURED.store(true, Ordering::SeqCst);
    Ok(())
}
