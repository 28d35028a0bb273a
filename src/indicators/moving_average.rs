/// Simple Moving Average (SMA) of the trailing `period` prices
///
/// The window is averaged as offsets from its latest price, so a window that
/// averages to that price returns it exactly.
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let anchor = window[period - 1];
    let offset: f64 = window.iter().map(|price| price - anchor).sum();

    Some(anchor + offset / period as f64)
}

/// Rolling SMA series aligned with `prices`
///
/// Position `i` holds `calculate_sma` over `prices[..=i]`. The first
/// `period - 1` positions have no full window and are `None`.
pub fn rolling_sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| calculate_sma(&prices[..=i], period))
        .collect()
}
