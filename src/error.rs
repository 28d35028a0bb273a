use thiserror::Error;

/// Every failure the advisor can hit, from the credential store to the signal math.
///
/// Nothing is retried or downgraded: each variant travels up to `main` unchanged.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Credentials not found in store (key {0})")]
    CredentialsNotFound(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Instrument token for {symbol} not found on {exchange}")]
    InstrumentNotFound { exchange: String, symbol: String },

    #[error("Insufficient data: need {required} candles for SMA, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Broker API error ({error_type}): {message}")]
    Broker { error_type: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl AdvisorError {
    pub(crate) fn decode(what: &'static str, reason: impl ToString) -> Self {
        AdvisorError::Decode {
            what,
            reason: reason.to_string(),
        }
    }
}

impl From<config::ConfigError> for AdvisorError {
    fn from(err: config::ConfigError) -> Self {
        AdvisorError::Config(err.to_string())
    }
}
