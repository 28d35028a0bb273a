use crate::error::AdvisorError;
use crate::models::Signal;
use crate::Result;

/// Target exit price for a position
///
/// `target_profit_percent` is a percentage (10 means 10%). CALL exits above
/// the entry, PUT below it. The result is not rounded.
pub fn calculate_exit_price(
    entry_price: f64,
    target_profit_percent: f64,
    position_type: Signal,
) -> Result<f64> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(AdvisorError::InvalidInput(format!(
            "entry price must be positive, got {}",
            entry_price
        )));
    }

    if !target_profit_percent.is_finite() {
        return Err(AdvisorError::InvalidInput(format!(
            "target profit percent must be finite, got {}",
            target_profit_percent
        )));
    }

    let fraction = target_profit_percent / 100.0;
    let exit = match position_type {
        Signal::Call => entry_price * (1.0 + fraction),
        Signal::Put => entry_price * (1.0 - fraction),
    };

    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rounded(value: f64) -> String {
        format!("{:.2}", value)
    }

    #[test]
    fn test_call_exit_above_entry() {
        let exit = calculate_exit_price(100.0, 10.0, Signal::Call).unwrap();
        assert_eq!(rounded(exit), "110.00");
    }

    #[test]
    fn test_put_exit_below_entry() {
        let exit = calculate_exit_price(100.0, 10.0, Signal::Put).unwrap();
        assert_eq!(rounded(exit), "90.00");
    }

    #[test]
    fn test_zero_target_is_noop() {
        let exit = calculate_exit_price(200.0, 0.0, Signal::Call).unwrap();
        assert_eq!(exit, 200.0);
        assert_eq!(rounded(exit), "200.00");

        let exit = calculate_exit_price(200.0, 0.0, Signal::Put).unwrap();
        assert_eq!(exit, 200.0);
    }

    #[test]
    fn test_negative_target_flips_direction() {
        let exit = calculate_exit_price(100.0, -5.0, Signal::Call).unwrap();
        assert_eq!(rounded(exit), "95.00");
    }

    #[test]
    fn test_result_is_not_rounded_internally() {
        let exit = calculate_exit_price(21000.55, 10.0, Signal::Call).unwrap();
        assert!((exit - 23100.605).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_entry_price() {
        for entry in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = calculate_exit_price(entry, 10.0, Signal::Call);
            assert!(
                matches!(result, Err(AdvisorError::InvalidInput(_))),
                "entry {} should be rejected",
                entry
            );
        }
    }

    #[test]
    fn test_non_finite_target_rejected() {
        let result = calculate_exit_price(100.0, f64::NAN, Signal::Put);
        assert!(matches!(result, Err(AdvisorError::InvalidInput(_))));
    }
}
