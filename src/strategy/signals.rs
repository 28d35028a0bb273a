use crate::error::AdvisorError;
use crate::indicators::calculate_sma;
use crate::models::{Candle, Signal};
use crate::Result;

/// Default SMA lookback in trading sessions
pub const DEFAULT_SMA_PERIOD: usize = 14;

/// Outcome of the SMA comparison, with the values that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReport {
    pub signal: Signal,
    pub last_close: f64,
    pub last_sma: f64,
}

/// Validate that candles are non-empty and strictly ascending by date
///
/// # Returns
/// * `Ok(())` if the sequence can be averaged as-is
/// * `Err(InvalidInput)` on an empty sequence, a repeated date or a date going backwards
pub fn validate_candle_order(candles: &[Candle]) -> Result<()> {
    if candles.is_empty() {
        return Err(AdvisorError::InvalidInput(
            "no candles supplied".to_string(),
        ));
    }

    for window in candles.windows(2) {
        if window[1].date <= window[0].date {
            return Err(AdvisorError::InvalidInput(format!(
                "candles are not sorted by date ({} followed by {})",
                window[0].date, window[1].date
            )));
        }
    }

    Ok(())
}

/// Compare the latest close with its trailing SMA
///
/// CALL only when the close is strictly above the SMA. A close equal to the
/// SMA resolves to PUT.
pub fn evaluate_sma_signal(candles: &[Candle], sma_period: usize) -> Result<SignalReport> {
    if sma_period == 0 {
        return Err(AdvisorError::InvalidInput(
            "SMA period must be positive".to_string(),
        ));
    }

    validate_candle_order(candles)?;

    if candles.len() < sma_period {
        return Err(AdvisorError::InsufficientData {
            required: sma_period,
            available: candles.len(),
        });
    }

    if let Some(bad) = candles.iter().find(|c| !c.close.is_finite()) {
        return Err(AdvisorError::InvalidInput(format!(
            "non-finite close {} on {}",
            bad.close, bad.date
        )));
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = closes[closes.len() - 1];
    let last_sma = calculate_sma(&closes, sma_period).ok_or(AdvisorError::InsufficientData {
        required: sma_period,
        available: candles.len(),
    })?;

    let signal = if last_close > last_sma {
        Signal::Call
    } else {
        Signal::Put
    };

    tracing::debug!(
        "SMA({}) decision: close={:.2}, sma={:.2} -> {}",
        sma_period,
        last_close,
        last_sma,
        signal
    );

    Ok(SignalReport {
        signal,
        last_close,
        last_sma,
    })
}

/// Decide CALL or PUT from chronologically ordered daily candles
pub fn decide_signal(candles: &[Candle], sma_period: usize) -> Result<Signal> {
    evaluate_sma_signal(candles, sma_period).map(|report| report.signal)
}
