//! Compartment models and their lifecycle.
//!
//! A [`Compartmental`] variant knows how to turn a raw parameter vector into a
//! forward curve and how to translate between raw and physiological
//! parameters. [`Model`] binds a variant to measured data and carries the fit
//! and bootstrap state:
//!
//! ```text
//! Model::new(time, curve, aif, start) -> fit_model() -> bootstrap(k) -> report()
//! ```
//!
//! # Example
//!
//! ```rust
//! use perfusion::data::synthetic::{gamma_variate, linspace};
//! use perfusion::prelude::*;
//!
//! let time = linspace(0.0, 60.0, 61);
//! let aif = gamma_variate(&time, 5.0, 1.0, 3.0, 1.5);
//! let start = PhysiologicalParameters::new().with("F", 51.0).with("v", 11.2);
//!
//! let mut model = Model::new(OneCompartment, time.clone(), vec![0.0; 61], aif, Some(&start))?;
//! let curve = model.fitted_curve()?;
//! model.set_curve(curve)?;
//!
//! assert!(model.fit_model());
//! let report = model.report()?;
//! assert!((report.parameters.get("F").unwrap() - 51.0).abs() < 1e-3);
//! # Ok::<(), perfusion::CompartmentError>(())
//! ```

mod one_compartment;
mod parameters;
mod two_compartment;

pub use one_compartment::OneCompartment;
pub use parameters::{ParameterReport, PhysiologicalParameters};
pub use two_compartment::{TwoCompartmentExchange, TwoCompartmentUptake};

use std::fmt;

use crate::bootstrap::BootstrapResult;
use crate::convolution::{running_integral, ConvolutionCache, Convolver};
use crate::data;
use crate::error::CompartmentError;
use crate::fit::{FitOptions, FitReport};

/// Capabilities shared by every compartment model variant.
///
/// Implementors are stateless descriptions: the forward model is a pure
/// function of the raw parameter vector and the convolver holding the AIF.
pub trait Compartmental: fmt::Debug + Clone + Send + Sync {
    /// Human-readable model name
    fn name(&self) -> &'static str;

    /// Independent physiological parameters accepted in a start dictionary
    fn parameter_names(&self) -> &'static [&'static str];

    /// Start values used for names missing from a start dictionary, aligned
    /// with [`parameter_names`](Self::parameter_names)
    fn defaults(&self) -> &'static [f64];

    /// Physiological quantities reported per bootstrap sample, in row order
    fn tracked_parameters(&self) -> &'static [&'static str];

    /// Length of the raw parameter vector
    fn num_parameters(&self) -> usize;

    /// Which raw entries the optimizer adjusts
    fn free_parameters(&self) -> Vec<bool> {
        vec![true; self.num_parameters()]
    }

    /// Number of fitted parameters, the `k` of the information criterion
    fn degrees_of_freedom(&self) -> usize {
        self.free_parameters().iter().filter(|&&free| free).count()
    }

    /// Box constraints on the raw parameters
    fn default_bounds(&self) -> Bounds;

    /// Physiological parameters to the raw vector
    fn to_raw(&self, physiological: &PhysiologicalParameters) -> Result<Vec<f64>, CompartmentError>;

    /// Raw vector to physiological parameters, including derived quantities
    fn to_physiological(&self, raw: &[f64]) -> Result<PhysiologicalParameters, CompartmentError>;

    /// Model curve for `raw` on the convolver's time axis
    fn forward(&self, raw: &[f64], convolver: &Convolver) -> Result<Vec<f64>, CompartmentError>;

    /// `forward(raw) - curve`
    fn residual(
        &self,
        raw: &[f64],
        convolver: &Convolver,
        curve: &[f64],
    ) -> Result<Vec<f64>, CompartmentError> {
        let model = self.forward(raw, convolver)?;
        Ok(model.iter().zip(curve).map(|(m, c)| m - c).collect())
    }
}

pub(crate) fn check_len(raw: &[f64], expected: usize) -> Result<(), CompartmentError> {
    if raw.len() == expected {
        Ok(())
    } else {
        Err(CompartmentError::ParameterCount {
            expected,
            found: raw.len(),
        })
    }
}

fn check_within(bounds: &Bounds, raw: &[f64]) -> Result<(), CompartmentError> {
    if bounds.contains(raw) {
        Ok(())
    } else {
        Err(CompartmentError::Domain(format!(
            "parameters {:?} lie outside the bounds",
            raw
        )))
    }
}

/// Per-parameter lower and upper limits on the raw vector
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, CompartmentError> {
        if lower.len() != upper.len() {
            return Err(CompartmentError::ParameterCount {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        if let Some((&lo, _)) = lower
            .iter()
            .zip(&upper)
            .find(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi)
        {
            return Err(CompartmentError::InvalidParameter {
                name: "lower bound".to_string(),
                value: lo,
            });
        }
        Ok(Self { lower, upper })
    }

    /// Bounds known to be well formed
    pub(crate) fn unchecked(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, raw: &[f64]) -> bool {
        raw.len() == self.len()
            && raw
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }

    /// Closest point inside the box
    pub fn project(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(v, (lo, hi))| v.max(*lo).min(*hi))
            .collect()
    }

    /// Squared distance from `raw` to the box
    pub fn excess(&self, raw: &[f64]) -> f64 {
        raw.iter()
            .zip(self.project(raw))
            .map(|(v, p)| (v - p).powi(2))
            .sum()
    }
}

/// A compartment model bound to measured data.
///
/// Holds the time axis, the measured tissue curve, the AIF, the current raw
/// parameter vector and the fit/bootstrap state. Replacing the curve, the AIF
/// or the parameters invalidates any previous fit.
#[derive(Debug, Clone)]
pub struct Model<M: Compartmental> {
    pub(crate) kind: M,
    pub(crate) time: Vec<f64>,
    pub(crate) curve: Vec<f64>,
    pub(crate) aif: Vec<f64>,
    pub(crate) parameters: Vec<f64>,
    pub(crate) bounds: Bounds,
    pub(crate) options: FitOptions,
    pub(crate) cache: ConvolutionCache,
    pub(crate) fit: Option<FitReport>,
    pub(crate) bootstrap: Option<BootstrapResult>,
}

impl<M: Compartmental> Model<M> {
    /// Bind `kind` to data, starting from `start` (defaults for missing names)
    pub fn new(
        kind: M,
        time: Vec<f64>,
        curve: Vec<f64>,
        aif: Vec<f64>,
        start: Option<&PhysiologicalParameters>,
    ) -> Result<Self, CompartmentError> {
        data::validate(&time, &curve, &aif)?;
        let start = parameters::resolve_start(
            kind.name(),
            kind.parameter_names(),
            kind.defaults(),
            start,
        )?;
        let parameters = kind.to_raw(&start)?;
        kind.to_physiological(&parameters)?;
        let bounds = kind.default_bounds();
        check_within(&bounds, &parameters)?;

        Ok(Self {
            kind,
            time,
            curve,
            aif,
            parameters,
            bounds,
            options: FitOptions::default(),
            cache: ConvolutionCache::new(),
            fit: None,
            bootstrap: None,
        })
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.set_options(options);
        self
    }

    /// Replace the default bounds; the current parameters must satisfy them
    pub fn with_bounds(mut self, bounds: Bounds) -> Result<Self, CompartmentError> {
        check_len(bounds.lower(), self.kind.num_parameters())?;
        check_within(&bounds, &self.parameters)?;
        self.bounds = bounds;
        self.invalidate();
        Ok(self)
    }

    pub fn kind(&self) -> &M {
        &self.kind
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn curve(&self) -> &[f64] {
        &self.curve
    }

    pub fn aif(&self) -> &[f64] {
        &self.aif
    }

    /// Current raw parameter vector
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Diagnostics of the most recent fit attempt, successful or not
    pub fn fit_report(&self) -> Option<&FitReport> {
        self.fit.as_ref()
    }

    pub fn bootstrap_result(&self) -> Option<&BootstrapResult> {
        self.bootstrap.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.as_ref().is_some_and(|report| report.success)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap.is_some()
    }

    pub fn set_options(&mut self, options: FitOptions) {
        if options.convolution != self.options.convolution {
            self.cache.clear();
        }
        self.options = options;
        self.invalidate();
    }

    /// Replace the measured curve
    pub fn set_curve(&mut self, curve: Vec<f64>) -> Result<(), CompartmentError> {
        data::validate(&self.time, &curve, &self.aif)?;
        self.curve = curve;
        self.invalidate();
        Ok(())
    }

    /// Replace the arterial input function, dropping cached convolutions
    pub fn set_aif(&mut self, aif: Vec<f64>) -> Result<(), CompartmentError> {
        data::validate(&self.time, &self.curve, &aif)?;
        self.aif = aif;
        self.cache.clear();
        self.invalidate();
        Ok(())
    }

    /// Replace all three series at once
    pub fn set_data(
        &mut self,
        time: Vec<f64>,
        curve: Vec<f64>,
        aif: Vec<f64>,
    ) -> Result<(), CompartmentError> {
        data::validate(&time, &curve, &aif)?;
        self.time = time;
        self.curve = curve;
        self.aif = aif;
        self.cache.clear();
        self.invalidate();
        Ok(())
    }

    /// Set the raw parameter vector directly
    pub fn set_parameters(&mut self, raw: Vec<f64>) -> Result<(), CompartmentError> {
        check_len(&raw, self.kind.num_parameters())?;
        self.kind.to_physiological(&raw)?;
        check_within(&self.bounds, &raw)?;
        self.parameters = raw;
        self.invalidate();
        Ok(())
    }

    /// Restart from physiological values (defaults for missing names)
    pub fn set_start(&mut self, start: &PhysiologicalParameters) -> Result<(), CompartmentError> {
        let start = parameters::resolve_start(
            self.kind.name(),
            self.kind.parameter_names(),
            self.kind.defaults(),
            Some(start),
        )?;
        let raw = self.kind.to_raw(&start)?;
        self.set_parameters(raw)
    }

    fn invalidate(&mut self) {
        self.fit = None;
        self.bootstrap = None;
    }

    /// Convolver over this model's AIF, sharing its cache
    pub fn convolver(&self) -> Convolver<'_> {
        Convolver::new(&self.time, &self.aif, self.options.convolution).with_cache(&self.cache)
    }

    /// `aif ⊗ exp(-λt)` with the configured strategy
    pub fn convolve(&self, lambda: f64) -> Result<Vec<f64>, CompartmentError> {
        Ok(self.convolver().exponential(lambda)?.to_vec())
    }

    /// Running trapezoidal integral of the AIF
    pub fn integral(&self) -> Vec<f64> {
        running_integral(&self.aif, &self.time)
    }

    pub fn forward(&self, raw: &[f64]) -> Result<Vec<f64>, CompartmentError> {
        self.kind.forward(raw, &self.convolver())
    }

    pub fn residual(&self, raw: &[f64]) -> Result<Vec<f64>, CompartmentError> {
        self.kind.residual(raw, &self.convolver(), &self.curve)
    }

    /// Model curve at the current parameters
    pub fn fitted_curve(&self) -> Result<Vec<f64>, CompartmentError> {
        self.forward(&self.parameters)
    }

    /// Physiological parameters at the current raw vector
    pub fn physiological_parameters(&self) -> Result<PhysiologicalParameters, CompartmentError> {
        self.kind.to_physiological(&self.parameters)
    }

    /// Point parameters plus bootstrap estimates when available
    pub fn report(&self) -> Result<ParameterReport, CompartmentError> {
        let parameters = self.physiological_parameters()?;
        let (low, mean, high) = match &self.bootstrap {
            Some(result) => {
                let estimates = result.estimates()?;
                (Some(estimates.low), Some(estimates.mean), Some(estimates.high))
            }
            None => (None, None, None),
        };
        Ok(ParameterReport {
            parameters,
            low,
            mean,
            high,
        })
    }
}

impl<M: Compartmental> fmt::Display for Model<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} model, {} samples", self.kind.name(), self.time.len())?;
        match self.physiological_parameters() {
            Ok(parameters) => write!(f, ": {}", parameters)?,
            Err(_) => write!(f, ": raw {:?}", self.parameters)?,
        }
        if self.is_fitted() {
            write!(f, " (fitted)")?;
        }
        if self.is_bootstrapped() {
            write!(f, " (bootstrapped)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{boxcar, linspace};
    use crate::data::DataError;

    fn prepared() -> Model<OneCompartment> {
        let time = linspace(0.0, 50.0, 100);
        let aif = boxcar(&time, 5.0, 10.0);
        let start = PhysiologicalParameters::new().with("F", 51.0).with("v", 11.2);
        Model::new(OneCompartment, time, vec![0.0; 100], aif, Some(&start)).unwrap()
    }

    #[test]
    fn test_display_is_not_empty() {
        let model = prepared();
        let text = model.to_string();
        assert!(text.starts_with("one-compartment model"));
        assert!(text.contains("F = 51.0000"));
    }

    #[test]
    fn test_start_dictionary_is_kept() {
        let phys = prepared().physiological_parameters().unwrap();
        assert!((phys.get("F").unwrap() - 51.0).abs() < 1e-9);
        assert!((phys.get("v").unwrap() - 11.2).abs() < 1e-9);
        assert!(phys.contains("MTT"));
    }

    #[test]
    fn test_defaults_fill_missing_start_values() {
        let time = linspace(0.0, 10.0, 11);
        let aif = boxcar(&time, 1.0, 3.0);
        let model = Model::new(OneCompartment, time, vec![0.0; 11], aif, None).unwrap();
        let phys = model.physiological_parameters().unwrap();
        assert!((phys.get("F").unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let empty = Model::new(OneCompartment, vec![], vec![], vec![], None);
        assert_eq!(
            empty.unwrap_err(),
            CompartmentError::Data(DataError::EmptySeries)
        );

        let mismatched = Model::new(OneCompartment, vec![0.0, 1.0], vec![0.0], vec![0.0, 1.0], None);
        assert!(matches!(
            mismatched,
            Err(CompartmentError::Data(DataError::LengthMismatch { .. }))
        ));

        let start = PhysiologicalParameters::new().with("F", 0.0);
        let zero_flow = Model::new(
            OneCompartment,
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            Some(&start),
        );
        assert!(matches!(
            zero_flow,
            Err(CompartmentError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_zero_convolution_equals_integral() {
        let model = prepared();
        assert_eq!(model.convolve(0.0).unwrap(), model.integral());
    }

    #[test]
    fn test_residual_vanishes_on_own_curve() {
        let mut model = prepared();
        let curve = model.fitted_curve().unwrap();
        model.set_curve(curve).unwrap();
        let residual = model.residual(model.parameters()).unwrap();
        assert!(residual.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_set_aif_clears_cache() {
        let mut model = prepared();
        model.convolve(0.3).unwrap();
        assert_eq!(model.cache.len(), 1);
        let aif = boxcar(model.time(), 2.0, 4.0);
        model.set_aif(aif).unwrap();
        assert!(model.cache.is_empty());
    }

    #[test]
    fn test_set_parameters_validates() {
        let mut model = prepared();
        assert!(matches!(
            model.set_parameters(vec![0.01]),
            Err(CompartmentError::ParameterCount { .. })
        ));
        assert!(matches!(
            model.set_parameters(vec![0.01, 0.0]),
            Err(CompartmentError::Domain(_))
        ));
        model.set_parameters(vec![0.01, 0.1]).unwrap();
        assert_eq!(model.parameters(), &[0.01, 0.1]);
    }

    #[test]
    fn test_start_outside_bounds_is_rejected() {
        let time = linspace(0.0, 10.0, 11);
        let aif = boxcar(&time, 1.0, 3.0);
        // F = 600, v = 0.5 gives an outflow rate of 20 1/s
        let start = PhysiologicalParameters::new().with("F", 600.0).with("v", 0.5);
        let result = Model::new(OneCompartment, time, vec![0.0; 11], aif, Some(&start));
        assert!(matches!(result, Err(CompartmentError::Domain(_))));

        let mut model = prepared();
        let before = model.parameters().to_vec();
        assert!(matches!(
            model.set_parameters(vec![0.1, 20.0]),
            Err(CompartmentError::Domain(_))
        ));
        assert!(matches!(
            model.set_start(&start),
            Err(CompartmentError::Domain(_))
        ));
        assert_eq!(model.parameters(), before.as_slice());
    }

    #[test]
    fn test_bounds_projection() {
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, f64::INFINITY]).unwrap();
        assert_eq!(bounds.project(&[-1.0, 5.0]), vec![0.0, 5.0]);
        assert_eq!(bounds.project(&[2.0, -3.0]), vec![1.0, 0.0]);
        assert_eq!(bounds.excess(&[2.0, -3.0]), 10.0);
        assert!(bounds.contains(&[0.5, 1e9]));
        assert!(!bounds.contains(&[0.5]));
        assert_eq!(bounds.len(), 2);
        assert!(!bounds.is_empty());
        assert!(Bounds::new(vec![], vec![]).unwrap().is_empty());
        assert!(Bounds::new(vec![1.0], vec![0.0]).is_err());
    }
}
