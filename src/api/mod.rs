pub mod kite;

use crate::models::{Candle, Credentials, Instrument};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub use kite::{KiteClient, KiteSession};

/// Exchanges a one-time request token for an authenticated session
#[async_trait]
pub trait Broker: Send + Sync {
    type Session: BrokerSession;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Self::Session>;
}

/// Read-only market data queries bound to one access token
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Exact trading-symbol match within the exchange's instrument list
    async fn lookup_instrument(&self, exchange: &str, symbol: &str) -> Result<Instrument>;

    /// Last traded price
    async fn last_price(&self, instrument: &Instrument) -> Result<f64>;

    /// OHLC bars over the inclusive range `from..=to`, oldest first
    async fn historical_candles(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        interval: &str,
    ) -> Result<Vec<Candle>>;
}
