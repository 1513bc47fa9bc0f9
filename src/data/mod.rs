//! Sampled curves: validation, file input/output and synthetic generators.
//!
//! A model is built from three parallel arrays sharing one time axis: the
//! sample times, the measured tissue curve and the arterial input function.
//! [`validate`] enforces the invariants every numerical routine relies on
//! (non-empty, equal lengths, strictly increasing finite time, finite values).

mod error;
mod parser;
pub mod synthetic;

pub use error::DataError;
pub use parser::{read_columns, write_columns, Columns};

/// Check that `time`, `curve` and `aif` form a valid set of parallel series
///
/// # Example
/// ```rust
/// use perfusion::data::validate;
///
/// let time = [0.0, 1.0, 2.0];
/// assert!(validate(&time, &[0.0, 0.5, 0.2], &[0.0, 1.0, 0.0]).is_ok());
/// assert!(validate(&time, &[0.0, 0.5], &[0.0, 1.0, 0.0]).is_err());
/// ```
pub fn validate(time: &[f64], curve: &[f64], aif: &[f64]) -> Result<(), DataError> {
    if time.is_empty() {
        return Err(DataError::EmptySeries);
    }
    if curve.len() != time.len() || aif.len() != time.len() {
        return Err(DataError::LengthMismatch {
            description: format!(
                "time has {} samples, curve has {}, aif has {}",
                time.len(),
                curve.len(),
                aif.len()
            ),
        });
    }
    check_time(time)?;
    check_finite("curve", curve)?;
    check_finite("aif", aif)?;
    Ok(())
}

/// Check a time axis on its own
pub(crate) fn check_time(time: &[f64]) -> Result<(), DataError> {
    if time.is_empty() {
        return Err(DataError::EmptySeries);
    }
    check_finite("time", time)?;
    if let Some(index) = time.windows(2).position(|w| w[1] <= w[0]) {
        return Err(DataError::NonIncreasingTime { index: index + 1 });
    }
    Ok(())
}

fn check_finite(series: &'static str, values: &[f64]) -> Result<(), DataError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DataError::NonFinite { series, index }),
        None => Ok(()),
    }
}

/// Remove the pre-contrast baseline, estimated as the mean of the first `n` samples
///
/// `n` is clamped to the length of the series; an empty series is returned unchanged.
pub fn subtract_baseline(values: &[f64], n: usize) -> Vec<f64> {
    let n = n.min(values.len());
    if n == 0 {
        return values.to_vec();
    }
    let baseline = values[..n].iter().sum::<f64>() / n as f64;
    values.iter().map(|v| v - baseline).collect()
}
