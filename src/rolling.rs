// 📈 Rolling-Change Engine
// One annualized percent change from (current, prior, months).
//
// Result contract:
//   Err(InvalidWindow)  - months == 0, the caller's bug
//   Ok(None)            - insufficient or undefined data (absent prior, zero base,
//                         NaN input, sign change between prior and current)
//   Ok(Some(pct))       - ((current / prior)^(12 / months) - 1) * 100

use crate::error::{PpiError, Result};

/// Months in a year; the compounding horizon for every window
pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Annualized percent change of `current` over `prior`, `months` apart
///
/// A negative ratio would need a real power of a negative base with a
/// fractional exponent. That is reported as absent instead of NaN.
pub fn annualized_change(current: f64, prior: Option<f64>, months: u32) -> Result<Option<f64>> {
    if months == 0 {
        return Err(PpiError::InvalidWindow(
            "lookback window must be a positive number of months".to_string(),
        ));
    }

    let prior = match prior {
        Some(p) => p,
        None => return Ok(None),
    };

    if prior == 0.0 || prior.is_nan() || current.is_nan() {
        return Ok(None);
    }

    let ratio = current / prior;
    if ratio < 0.0 {
        return Ok(None);
    }

    let exponent = MONTHS_PER_YEAR / months as f64;
    Ok(Some((ratio.powf(exponent) - 1.0) * 100.0))
}

// ============================================================================
// TESTS
// ============================================================================
