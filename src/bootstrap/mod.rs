//! Residual bootstrap for confidence intervals on physiological parameters.
//!
//! After a successful fit the residuals `curve - fitted` are resampled with
//! replacement and added back onto the fitted curve. Every synthetic curve is
//! refitted from the baseline parameters, and the physiological parameters of
//! each refit form one column of a [`BootstrapResult`].
//!
//! Resample indices are drawn up front from the caller's random source, so a
//! seeded generator gives the same result whether the refits run in parallel
//! or sequentially.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CompartmentError;
use crate::fit::least_squares;
use crate::model::{Compartmental, Model, PhysiologicalParameters};

/// How low/mean/high estimates are derived from the bootstrap samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Linear-interpolated quantiles at `(1-c)/2`, `0.5` and `(1+c)/2`.
    /// The "mean estimate" is the median.
    #[default]
    Percentile,
    /// Sample mean ∓ `multiplier` sample standard deviations. The confidence
    /// level is not used.
    StandardDeviation { multiplier: f64 },
}

impl IntervalMethod {
    /// Mean ∓ 1.96 standard deviations
    pub fn standard_deviation() -> Self {
        IntervalMethod::StandardDeviation { multiplier: 1.96 }
    }
}

/// Options for [`Model::bootstrap_with`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapOptions {
    /// Number of resampled refits
    pub samples: usize,
    /// Run the refits on the rayon thread pool
    pub parallel: bool,
    /// Show a progress bar during computation
    pub show_progress: bool,
    /// Confidence level of the percentile interval, in `(0, 1)`
    pub confidence: f64,
    pub interval: IntervalMethod,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            samples: 100,
            parallel: true,
            show_progress: false,
            confidence: 0.95,
            interval: IntervalMethod::Percentile,
        }
    }
}

impl BootstrapOptions {
    /// Default options with `samples` refits
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Enable progress bar display
    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    /// Disable progress bar display
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_interval(mut self, interval: IntervalMethod) -> Self {
        self.interval = interval;
        self
    }
}

/// Low, mean and high estimates keyed by physiological parameter name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimates {
    pub low: PhysiologicalParameters,
    pub mean: PhysiologicalParameters,
    pub high: PhysiologicalParameters,
}

/// Physiological parameters of every bootstrap refit
///
/// `samples` has one row per tracked parameter (in [`names`](Self::names)
/// order) and one column per refit.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResult {
    names: Vec<String>,
    samples: Array2<f64>,
    failures: usize,
    confidence: f64,
    interval: IntervalMethod,
}

impl BootstrapResult {
    pub(crate) fn new(
        names: Vec<String>,
        samples: Array2<f64>,
        failures: usize,
        confidence: f64,
        interval: IntervalMethod,
    ) -> Self {
        Self {
            names,
            samples,
            failures,
            confidence,
            interval,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Matrix of shape `(tracked parameters, k)`
    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    /// Refits that failed and hold the baseline parameters instead
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Number of columns `k`
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.ncols() == 0
    }

    /// Samples of one tracked parameter
    pub fn row(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(self.samples.row(index))
    }

    /// Estimates with the interval method the bootstrap was run with
    pub fn estimates(&self) -> Result<Estimates, CompartmentError> {
        self.estimates_with(self.interval, self.confidence)
    }

    pub fn estimates_with(
        &self,
        interval: IntervalMethod,
        confidence: f64,
    ) -> Result<Estimates, CompartmentError> {
        if let IntervalMethod::Percentile = interval {
            check_confidence(confidence)?;
        }
        if self.is_empty() {
            return Err(CompartmentError::NoSamples);
        }

        let mut low = PhysiologicalParameters::new();
        let mut mean = PhysiologicalParameters::new();
        let mut high = PhysiologicalParameters::new();
        for (name, row) in self.names.iter().zip(self.samples.axis_iter(Axis(0))) {
            let values = row.to_vec();
            let (lo, mid, hi) = match interval {
                IntervalMethod::Percentile => percentile_interval(&values, confidence),
                IntervalMethod::StandardDeviation { multiplier } => {
                    let (m, sd) = mean_sd(&values);
                    (m - multiplier * sd, m, m + multiplier * sd)
                }
            };
            low.insert(name.as_str(), lo);
            mean.insert(name.as_str(), mid);
            high.insert(name.as_str(), hi);
        }
        Ok(Estimates { low, mean, high })
    }
}

fn check_confidence(confidence: f64) -> Result<(), CompartmentError> {
    if confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(CompartmentError::InvalidConfidence(confidence))
    }
}

/// Quantile of sorted data with linear interpolation between order statistics
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

/// `(low, median, high)` percentile interval at `confidence`
fn percentile_interval(values: &[f64], confidence: f64) -> (f64, f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let alpha = (1.0 - confidence) / 2.0;
    (
        quantile_linear_sorted(&sorted, alpha),
        quantile_linear_sorted(&sorted, 0.5),
        quantile_linear_sorted(&sorted, 1.0 - alpha),
    )
}

/// Sample mean and standard deviation (`n - 1` denominator)
fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("Bootstrap [{bar:40.cyan/blue}] {pos}/{len} ETA: {eta}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

impl<M: Compartmental> Model<M> {
    /// Residual bootstrap with `k` refits and default options
    ///
    /// See [`bootstrap_with`](Self::bootstrap_with).
    pub fn bootstrap<R: Rng + ?Sized>(
        &mut self,
        k: usize,
        rng: &mut R,
    ) -> Result<BootstrapResult, CompartmentError> {
        self.bootstrap_with(&BootstrapOptions::new(k), rng)
    }

    /// Residual bootstrap of the current fit
    ///
    /// Requires a successful [`fit_model`](Self::fit_model). Always produces
    /// exactly `options.samples` columns: a refit that fails contributes the
    /// baseline fit's parameters and is counted in
    /// [`BootstrapResult::failures`]. The model's own parameters are left
    /// untouched.
    pub fn bootstrap_with<R: Rng + ?Sized>(
        &mut self,
        options: &BootstrapOptions,
        rng: &mut R,
    ) -> Result<BootstrapResult, CompartmentError> {
        if !self.is_fitted() {
            return Err(CompartmentError::NotFitted {
                operation: "bootstrap",
            });
        }
        if options.samples == 0 {
            return Err(CompartmentError::NoSamples);
        }
        if let IntervalMethod::Percentile = options.interval {
            check_confidence(options.confidence)?;
        }

        let tracked = self.kind.tracked_parameters();
        let fitted = self.fitted_curve()?;
        let residuals: Vec<f64> = self.curve.iter().zip(&fitted).map(|(c, f)| c - f).collect();
        let baseline = self.physiological_parameters()?.values_of(tracked)?;

        let n = residuals.len();
        let resamples: Vec<Vec<usize>> = (0..options.samples)
            .map(|_| (0..n).map(|_| rng.random_range(0..n)).collect())
            .collect();

        let progress = options.show_progress.then(|| progress_bar(options.samples));
        let convolver = self.convolver();

        let refit = |indices: &Vec<usize>| -> Option<Vec<f64>> {
            let synthetic: Vec<f64> = fitted
                .iter()
                .zip(indices)
                .map(|(f, &i)| f + residuals[i])
                .collect();
            let report = least_squares(
                &self.kind,
                convolver,
                &synthetic,
                &self.bounds,
                &self.parameters,
                &self.options,
            );
            let column = report
                .success
                .then(|| self.kind.to_physiological(&report.parameters))
                .and_then(Result::ok)
                .and_then(|phys| phys.values_of(tracked).ok());
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            column
        };

        let columns: Vec<Option<Vec<f64>>> = if options.parallel {
            resamples.par_iter().map(refit).collect()
        } else {
            resamples.iter().map(refit).collect()
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut samples = Array2::zeros((tracked.len(), options.samples));
        let mut failures = 0;
        for (j, column) in columns.iter().enumerate() {
            let values = match column {
                Some(values) => values,
                None => {
                    tracing::warn!(sample = j, "Bootstrap refit failed, using baseline fit");
                    failures += 1;
                    &baseline
                }
            };
            for (i, value) in values.iter().enumerate() {
                samples[(i, j)] = *value;
            }
        }

        tracing::info!(
            model = self.kind.name(),
            samples = options.samples,
            failures,
            "Bootstrap complete"
        );

        let result = BootstrapResult::new(
            tracked.iter().map(|name| name.to_string()).collect(),
            samples,
            failures,
            options.confidence,
            options.interval,
        );
        self.bootstrap = Some(result.clone());
        Ok(result)
    }
}
