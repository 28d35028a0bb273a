use crate::api::{Broker, BrokerSession};
use crate::config::{AppConfig, InstrumentConfig};
use crate::credentials::CredentialSource;
use crate::models::{Instrument, PositionPlan};
use crate::strategy::{calculate_exit_price, SmaStrategy, Strategy};
use crate::Result;
use chrono::{Duration, Local, NaiveDate};
use std::collections::HashMap;
use std::io::Write;

/// Runs the credentials -> session -> lookup -> signal -> exit sequence
///
/// Strictly sequential and fail-fast: the first error ends the run, and
/// lines already written for earlier instruments stay written.
pub struct Advisor<C, B> {
    config: AppConfig,
    credential_source: C,
    broker: B,
    strategy: SmaStrategy,
}

impl<C, B> Advisor<C, B>
where
    C: CredentialSource,
    B: Broker,
{
    pub fn new(config: AppConfig, credential_source: C, broker: B) -> Self {
        let strategy = SmaStrategy::new(config.strategy.sma_period);
        Self {
            config,
            credential_source,
            broker,
            strategy,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Analyze every configured instrument as of today's local date
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<Vec<PositionPlan>> {
        self.run_on(Local::now().date_naive(), out).await
    }

    /// Analyze every configured instrument, with history ending on `today`
    ///
    /// Each plan is written to `out` as soon as it is computed.
    pub async fn run_on<W: Write>(&self, today: NaiveDate, out: &mut W) -> Result<Vec<PositionPlan>> {
        let credentials = self.credential_source.fetch_credentials().await?;
        let session = self.broker.authenticate(&credentials).await?;

        let instruments = self.resolve_instruments(&session).await?;

        let mut plans = Vec::with_capacity(instruments.len());
        for (entry, instrument) in self.config.instruments.iter().zip(instruments) {
            let plan = self.plan_for(&session, entry, instrument, today).await?;
            writeln!(out, "{}", plan)?;
            plans.push(plan);
        }

        Ok(plans)
    }

    /// Look up every configured symbol before any pricing, once per (exchange, symbol)
    async fn resolve_instruments(&self, session: &B::Session) -> Result<Vec<Instrument>> {
        let mut resolved: HashMap<(String, String), Instrument> = HashMap::new();
        let mut instruments = Vec::with_capacity(self.config.instruments.len());

        for entry in &self.config.instruments {
            let key = (entry.exchange.clone(), entry.symbol.clone());
            let instrument = match resolved.get(&key) {
                Some(instrument) => instrument.clone(),
                None => {
                    let instrument = session
                        .lookup_instrument(&entry.exchange, &entry.symbol)
                        .await?;
                    resolved.insert(key, instrument.clone());
                    instrument
                }
            };
            instruments.push(instrument);
        }

        Ok(instruments)
    }

    async fn plan_for(
        &self,
        session: &B::Session,
        entry: &InstrumentConfig,
        instrument: Instrument,
        today: NaiveDate,
    ) -> Result<PositionPlan> {
        let settings = &self.config.strategy;

        let entry_price = session.last_price(&instrument).await?;

        let from = today - Duration::days(settings.lookback_days);
        let candles = session
            .historical_candles(&instrument, from, today, &settings.interval)
            .await?;

        let position_type = self.strategy.generate_signal(&candles)?;
        let exit_price =
            calculate_exit_price(entry_price, settings.target_profit_percent, position_type)?;

        tracing::info!(
            label = %entry.label,
            symbol = %instrument.symbol,
            strategy = self.strategy.name(),
            candles = candles.len(),
            signal = %position_type,
            entry_price,
            exit_price,
            "Computed position plan"
        );

        Ok(PositionPlan {
            label: entry.label.clone(),
            instrument,
            entry_price,
            position_type,
            target_profit_percent: settings.target_profit_percent,
            exit_price,
        })
    }
}
