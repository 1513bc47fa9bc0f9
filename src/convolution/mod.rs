//! Discrete convolution of a sampled curve with decaying exponentials
//!
//! Every compartment model evaluates its forward curve as a linear combination
//! of `aif ⊗ exp(-λt)` terms, so this is the hot path of fitting and
//! bootstrapping.
//!
//! Two interchangeable strategies are available through [`ConvolutionMethod`]:
//!
//! - [`ConvolutionMethod::Direct`]: an O(n) trapezoidal recurrence that works on
//!   irregular time grids.
//! - [`ConvolutionMethod::Fft`]: a zero-padded FFT product on the mean sample
//!   spacing. It agrees with the direct path to about `1e-9` of the peak value
//!   on uniform grids. On irregular grids it is an approximation and no
//!   tolerance is guaranteed.
//!
//! Whatever the strategy, `λ = 0` is evaluated by [`running_integral`].

mod cache;
mod direct;
mod fft;

pub(crate) use cache::ConvolutionCache;
pub use cache::Convolver;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataError;

/// Errors raised by the convolution routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvolutionError {
    /// The signal and its time axis are unusable
    #[error(transparent)]
    Data(#[from] DataError),

    /// The kernel decay rate is negative or not finite
    #[error("Invalid decay rate: {lambda}")]
    InvalidDecay { lambda: f64 },
}

/// Strategy used to evaluate `signal ⊗ exp(-λt)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvolutionMethod {
    /// Trapezoidal recurrence, exact for the discretization on any grid
    #[default]
    Direct,
    /// FFT-based linear convolution, assumes evenly spaced samples
    Fft,
}

impl ConvolutionMethod {
    /// Convolve `signal` sampled on `time` with `exp(-lambda * t)`
    pub fn convolve(
        &self,
        signal: &[f64],
        time: &[f64],
        lambda: f64,
    ) -> Result<Vec<f64>, ConvolutionError> {
        check_input(signal, time)?;
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(ConvolutionError::InvalidDecay { lambda });
        }
        if lambda == 0.0 {
            return Ok(running_integral(signal, time));
        }
        Ok(match self {
            ConvolutionMethod::Direct => direct::convolve(signal, time, lambda),
            ConvolutionMethod::Fft => fft::convolve(signal, time, lambda),
        })
    }
}

/// Convolve `signal` sampled on `time` with `exp(-lambda * t)` using the direct recurrence
///
/// # Example
/// ```rust
/// use perfusion::convolution::{convolve_with_exponential, running_integral};
///
/// let time = [0.0, 1.0, 2.0, 4.0];
/// let signal = [0.0, 1.0, 1.0, 0.0];
///
/// let decayed = convolve_with_exponential(&signal, &time, 0.5).unwrap();
/// let integral = convolve_with_exponential(&signal, &time, 0.0).unwrap();
/// assert_eq!(integral, running_integral(&signal, &time));
/// assert!(decayed[3] < integral[3]);
/// ```
pub fn convolve_with_exponential(
    signal: &[f64],
    time: &[f64],
    lambda: f64,
) -> Result<Vec<f64>, ConvolutionError> {
    ConvolutionMethod::Direct.convolve(signal, time, lambda)
}

/// Running trapezoidal integral of `signal`, starting at zero
///
/// This is the `λ = 0` limit of the exponential convolution.
///
/// # Panics
/// Panics if `time.len() != signal.len()`.
pub fn running_integral(signal: &[f64], time: &[f64]) -> Vec<f64> {
    assert_eq!(
        signal.len(),
        time.len(),
        "signal and time must have equal length"
    );

    let mut out = vec![0.0; signal.len()];
    for i in 1..signal.len() {
        let dt = time[i] - time[i - 1];
        out[i] = out[i - 1] + (signal[i - 1] + signal[i]) / 2.0 * dt;
    }
    out
}

fn check_input(signal: &[f64], time: &[f64]) -> Result<(), DataError> {
    if signal.len() != time.len() {
        return Err(DataError::LengthMismatch {
            description: format!(
                "signal has {} samples, time has {}",
                signal.len(),
                time.len()
            ),
        });
    }
    crate::data::check_time(time)
}
