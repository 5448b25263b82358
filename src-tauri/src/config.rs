//! Ledger configuration.
//!
//! Loaded in layers:
//! 1. Default values in code
//! 2. `config/ledger.toml` (optional)
//! 3. Environment variable overrides with the `LEDGER__` prefix

use std::path::PathBuf;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::ValuationMethod;

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// How long a writer waits for the database lock before giving up.
    pub busy_timeout_ms: u64,

    /// Accept sales where the amount paid is below the net amount.
    pub allow_partial_payment: bool,

    /// Reorder point given to products created without one.
    pub default_reorder_point: i64,

    /// Valuation method given to products created without one.
    pub default_valuation_method: ValuationMethod,

    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl LedgerConfig {
    /// Load configuration from the optional file and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/ledger")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = config::Config::builder()
            .set_default(
                "database_path",
                defaults.database_path.to_string_lossy().into_owned(),
            )?
            .set_default("busy_timeout_ms", defaults.busy_timeout_ms)?
            .set_default("allow_partial_payment", defaults.allow_partial_payment)?
            .set_default("default_reorder_point", defaults.default_reorder_point)?
            .set_default(
                "default_valuation_method",
                defaults.default_valuation_method.as_str(),
            )?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("log_json", defaults.log_json)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("stock_ledger.db"),
            busy_timeout_ms: 5_000,
            allow_partial_payment: false,
            default_reorder_point: 10,
            default_valuation_method: ValuationMethod::Fifo,
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}
