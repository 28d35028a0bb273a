use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker API credentials as stored in the credential document
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub request_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("request_token", &"<redacted>")
            .finish()
    }
}

/// A tradable symbol resolved to the broker's instrument token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub symbol: String,
    pub exchange: String,
    pub token: u64,
}

/// Daily OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Directional option recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Call,
    Put,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Call => write!(f, "CALL"),
            Signal::Put => write!(f, "PUT"),
        }
    }
}

/// Suggested position for one instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionPlan {
    /// Human-readable name used in the output line (e.g. "Nifty")
    pub label: String,
    pub instrument: Instrument,
    pub entry_price: f64,
    pub position_type: Signal,
    pub target_profit_percent: f64,
    /// Unrounded; rounding happens only in `Display`
    pub exit_price: f64,
}

impl fmt::Display for PositionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Consider a {} option. Entry Price: {}, Exit for {}% profit at: {:.2}",
            self.label,
            self.position_type,
            self.entry_price,
            self.target_profit_percent,
            self.exit_price
        )
    }
}
