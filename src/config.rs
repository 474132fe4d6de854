use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;

/// Process configuration, read once at startup from `SALONBOOK_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    /// Unset means the management API rejects every request.
    pub admin_token: Option<String>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub engine: EngineSettings,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = EngineSettings::default();
        let txn_timeout_ms = parsed(&lookup, "SALONBOOK_TXN_TIMEOUT_MS", defaults.txn_timeout.as_millis() as u64);
        Self {
            bind: lookup("SALONBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "SALONBOOK_PORT", 8080),
            data_dir: lookup("SALONBOOK_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            catalog_path: lookup("SALONBOOK_CATALOG")
                .unwrap_or_else(|| "./catalog.json".into())
                .into(),
            admin_token: lookup("SALONBOOK_ADMIN_TOKEN").filter(|t| !t.trim().is_empty()),
            metrics_port: lookup("SALONBOOK_METRICS_PORT").and_then(|raw| match raw.parse() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("ignoring SALONBOOK_METRICS_PORT={raw:?}: not a port number");
                    None
                }
            }),
            compact_threshold: parsed(&lookup, "SALONBOOK_COMPACT_THRESHOLD", 1000),
            engine: EngineSettings {
                txn_timeout: Duration::from_millis(txn_timeout_ms.max(1)),
                txn_max_retries: parsed(&lookup, "SALONBOOK_TXN_MAX_RETRIES", defaults.txn_max_retries),
                alternatives_limit: parsed(&lookup, "SALONBOOK_ALTERNATIVES_LIMIT", defaults.alternatives_limit),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Parse `key`, falling back to `default` when unset or malformed.
fn parsed<T: FromStr + std::fmt::Display>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring {key}={raw:?}, using default {default}");
            default
        }),
    }
}
