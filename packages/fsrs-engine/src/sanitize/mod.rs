//! Numeric guards shared by the scheduler, optimizer and simulator

use crate::error::{FSRSError, Result};

/// Smallest prediction fed to the log-loss
pub const MIN_PROBABILITY: f64 = 1e-4;
/// Largest prediction fed to the log-loss
pub const MAX_PROBABILITY: f64 = 1.0 - 1e-4;

/// Check whether a slice contains NaN or infinite values
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Desired retention must lie in (0, 1]
pub fn validate_retention(desired_retention: f64) -> Result<()> {
    if desired_retention.is_finite() && desired_retention > 0.0 && desired_retention <= 1.0 {
        Ok(())
    } else {
        Err(FSRSError::InvalidRetentionTarget(desired_retention))
    }
}

/// Non-negative, finite weights with a positive sum.
///
/// Returns a description of the first problem, or `None` when the table can
/// be sampled from.
pub fn check_probability_table(weights: &[f64]) -> Option<String> {
    if has_invalid_values(weights) {
        return Some("weights must be finite".to_string());
    }
    if let Some(w) = weights.iter().find(|w| **w < 0.0) {
        return Some(format!("weights must be non-negative, got {}", w));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Some("weights must have a positive sum".to_string());
    }
    None
}
