use crate::error::AdvisorError;
use crate::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Prefix for environment overrides, e.g. `ADVISOR__STRATEGY__SMA_PERIOD=20`
pub const ENV_PREFIX: &str = "ADVISOR";

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "advisor.toml";

/// Full runtime configuration, passed explicitly into the advisor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub strategy: StrategyConfig,
    pub instruments: Vec<InstrumentConfig>,
}

/// Where the credential document lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub redis_url: String,
    pub collection: String,
    pub document_id: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            collection: "credentials".to_string(),
            document_id: "zerodha".to_string(),
        }
    }
}

impl StoreConfig {
    /// Redis key holding the credential document
    pub fn document_key(&self) -> String {
        format!("{}:{}", self.collection, self.document_id)
    }
}

/// Kite Connect endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kite.trade".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Signal and exit parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub sma_period: usize,
    /// Calendar days of history requested, ending today
    pub lookback_days: i64,
    /// Candle interval as named by the broker
    pub interval: String,
    /// Percentage, 10 means 10%
    pub target_profit_percent: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sma_period: 14,
            lookback_days: 30,
            interval: "day".to_string(),
            target_profit_percent: 10.0,
        }
    }
}

/// One instrument to analyze
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    /// Name printed at the start of the advice line
    pub label: String,
    pub exchange: String,
    pub symbol: String,
}

impl InstrumentConfig {
    pub fn new(label: &str, exchange: &str, symbol: &str) -> Self {
        Self {
            label: label.to_string(),
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

fn default_instruments() -> Vec<InstrumentConfig> {
    vec![
        InstrumentConfig::new("Nifty", "NSE", "NIFTY 50"),
        InstrumentConfig::new("Banknifty", "NSE", "BANKNIFTY"),
    ]
}

impl AppConfig {
    /// Built-in defaults with the two index instruments
    pub fn with_defaults() -> Self {
        Self {
            instruments: default_instruments(),
            ..Self::default()
        }
    }

    /// Load defaults, then an optional TOML file, then `ADVISOR__*` environment variables
    ///
    /// An explicit `path` must exist; without one, `advisor.toml` is used if present.
    /// A file that lists no instruments falls back to the two index defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Self::build(Some(file), None)
    }

    /// Same layering as [`AppConfig::load`] with in-memory sources
    pub fn from_sources(toml: Option<&str>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = toml.map(|s| File::from_str(s, FileFormat::Toml));
        Self::build(file, env)
    }

    fn build<S>(file: Option<S>, env: Option<HashMap<String, String>>) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        if config.instruments.is_empty() {
            config.instruments = default_instruments();
        }
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the advisor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.strategy.sma_period == 0 {
            return Err(AdvisorError::Config("sma_period must be positive".to_string()));
        }
        if self.strategy.lookback_days <= 0 {
            return Err(AdvisorError::Config(
                "lookback_days must be positive".to_string(),
            ));
        }
        if !self.strategy.target_profit_percent.is_finite() {
            return Err(AdvisorError::Config(
                "target_profit_percent must be finite".to_string(),
            ));
        }
        if self.instruments.is_empty() {
            return Err(AdvisorError::Config(
                "at least one instrument is required".to_string(),
            ));
        }
        Ok(())
    }
}
