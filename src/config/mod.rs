//! Configuration: the CLI surface, the settings-file schema, and venue credentials.
//! Mission: every knob the system reads is declared once, typed, and rejected at
//! load if misspelled — never a passthrough dictionary (§9 "Dynamic config dicts").
//!
//! Grounded on `src/bin/edge_receiver.rs`'s `clap::Parser` pattern for the CLI and
//! `models::Config::from_env` for `.env` credential loading; the settings-file path
//! convention (`workers/<name>.json`) follows `original_source/trader/utils.py::load_settings_file`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::book::CollectorType;
use crate::types::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

/// Command-line surface, per §6. `--worker` names a settings file under `workers/`;
/// `--simulate` suppresses order placement in favour of [`crate::venue::SimulatedVenueAdapter`].
#[derive(Debug, Parser)]
#[command(name = "spot-arb", about = "Cross-exchange spot arbitrage engine")]
pub struct Cli {
    #[arg(long, env = "SPOT_ARB_WORKER")]
    pub worker: String,

    #[arg(long, env = "SPOT_ARB_SIMULATE", default_value_t = false)]
    pub simulate: bool,

    #[arg(long, env = "SPOT_ARB_LOGLEVEL", value_enum, default_value = "info")]
    pub loglevel: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VenueSettings {
    pub collector_type: CollectorType,
    pub sleep_time: f64,
    #[serde(default)]
    pub min_profit_perc: f64,
    #[serde(default)]
    pub min_profit_amount: f64,
    #[serde(default)]
    pub layered_quote_qty_calc: bool,
    #[serde(default)]
    pub auth_endpoints: bool,
}

/// Root settings-file schema. Closed: any field not listed here fails to deserialize
/// instead of being silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub market: String,
    pub exchanges: Vec<String>,
    pub settings: HashMap<String, VenueSettings>,
    pub min_base_qty: Option<f64>,
    pub min_quote_qty: Option<f64>,
    pub base_precision: Option<u32>,
    pub quote_precision: Option<u32>,
    #[serde(default)]
    pub performance_mode: bool,
    #[serde(default = "default_loop_sleep_time")]
    pub sleep_time: f64,
    #[serde(default)]
    pub log_continuously: bool,
}

fn default_loop_sleep_time() -> f64 {
    0.01
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings must name exactly two exchanges, found {0}")]
    WrongExchangeCount(usize),
    #[error("market string {0:?} is not a valid BASE/QUOTE symbol")]
    InvalidMarket(String),
    #[error("exchange {0:?} has no entry under `settings`")]
    MissingVenueSettings(String),
}

impl Settings {
    pub fn symbol(&self) -> Result<Symbol, SettingsError> {
        Symbol::parse(&self.market).ok_or_else(|| SettingsError::InvalidMarket(self.market.clone()))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.exchanges.len() != 2 {
            return Err(SettingsError::WrongExchangeCount(self.exchanges.len()));
        }
        self.symbol()?;
        for venue in &self.exchanges {
            if !self.settings.contains_key(venue) {
                return Err(SettingsError::MissingVenueSettings(venue.clone()));
            }
        }
        Ok(())
    }
}

/// Loads `workers/<name>.json` relative to `base_dir`, per the original worker-file
/// convention, and validates the closed schema.
pub fn load_settings_file(base_dir: &Path, worker_name: &str) -> Result<Settings, SettingsError> {
    let path = base_dir.join("workers").join(format!("{worker_name}.json"));
    let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Io { path: path.clone(), source })?;
    let settings: Settings = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse { path, source })?;
    settings.validate()?;
    Ok(settings)
}

/// API credentials for one venue, loaded from the process environment after
/// `dotenv::dotenv().ok()` has populated it from `.env`. Variable names follow
/// `<VENUE>_API_KEY` / `<VENUE>_API_SECRET` / `<VENUE>_API_PASSPHRASE`.
#[derive(Debug, Clone)]
pub struct VenueCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, Error)]
#[error("missing environment variable {0}")]
pub struct MissingCredential(pub String);

pub fn load_venue_credentials(venue_id: &str) -> Result<VenueCredentials, MissingCredential> {
    let upper = venue_id.to_uppercase();
    let env_var = |suffix: &str| format!("{upper}_API_{suffix}");

    let api_key = std::env::var(env_var("KEY")).map_err(|_| MissingCredential(env_var("KEY")))?;
    let api_secret = std::env::var(env_var("SECRET")).map_err(|_| MissingCredential(env_var("SECRET")))?;
    let passphrase = std::env::var(env_var("PASSPHRASE")).ok();

    Ok(VenueCredentials { api_key, api_secret, passphrase })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let raw = r#"{
            "market": "ETH/USDT",
            "exchanges": ["binance", "kraken"],
            "settings": {},
            "totally_unknown_field": true
        }"#;
        let result: Result<Settings, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_exchange_count_fails_validation() {
        let settings = Settings {
            market: "ETH/USDT".into(),
            exchanges: vec!["binance".into()],
            settings: HashMap::new(),
            min_base_qty: None,
            min_quote_qty: None,
            base_precision: None,
            quote_precision: None,
            performance_mode: false,
            sleep_time: 0.01,
            log_continuously: false,
        };
        assert!(matches!(settings.validate(), Err(SettingsError::WrongExchangeCount(1))));
    }

    #[test]
    fn load_settings_file_reads_workers_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("workers")).unwrap();
        let mut file = fs::File::create(dir.path().join("workers").join("eth_usdt.json")).unwrap();
        write!(
            file,
            r#"{{
                "market": "ETH/USDT",
                "exchanges": ["binance", "kraken"],
                "settings": {{
                    "binance": {{"collector_type": "request", "sleep_time": 0.5}},
                    "kraken": {{"collector_type": "request", "sleep_time": 0.5}}
                }}
            }}"#
        )
        .unwrap();

        let settings = load_settings_file(dir.path(), "eth_usdt").unwrap();
        assert_eq!(settings.exchanges, vec!["binance", "kraken"]);
    }
}
