//! Synthetic curves for test cases and benchmarks
//!
//! These mirror the fixtures perfusion studies are usually validated against:
//! a boxcar input, a gamma-variate bolus passage and additive Gaussian noise.

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Evenly spaced samples over `[start, stop]`, both ends included
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            values[n - 1] = stop;
            values
        }
    }
}

/// Unit boxcar: `1` where `start < t < end`, `0` elsewhere
pub fn boxcar(time: &[f64], start: f64, end: f64) -> Vec<f64> {
    time.iter()
        .map(|&t| if t > start && t < end { 1.0 } else { 0.0 })
        .collect()
}

/// Gamma-variate bolus `A·(t-t0)^α·exp(-(t-t0)/β)` for `t > t0`, zero before
pub fn gamma_variate(time: &[f64], t0: f64, amplitude: f64, alpha: f64, beta: f64) -> Vec<f64> {
    time.iter()
        .map(|&t| {
            let s = t - t0;
            if s > 0.0 {
                amplitude * s.powf(alpha) * (-s / beta).exp()
            } else {
                0.0
            }
        })
        .collect()
}

/// Add zero-mean Gaussian noise with standard deviation `sd` to every sample
///
/// A non-positive or non-finite `sd` leaves the curve unchanged.
pub fn add_gaussian_noise<R: Rng + ?Sized>(curve: &mut [f64], sd: f64, rng: &mut R) {
    let Ok(normal) = Normal::new(0.0, sd) else {
        return;
    };
    if sd <= 0.0 {
        return;
    }
    for value in curve.iter_mut() {
        *value += normal.sample(rng);
    }
}
