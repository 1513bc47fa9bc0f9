//! Bounded least-squares fitting and model comparison.
//!
//! The residual sum of squares is minimized with argmin's Nelder–Mead solver
//! over the free raw parameters of a [`Compartmental`] variant. Bounds are
//! enforced by projecting every trial point onto the box and adding a
//! quadratic penalty for the distance outside it.

use argmin::{
    core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus},
    solver::neldermead::NelderMead,
};
use serde::{Deserialize, Serialize};

use crate::convolution::{ConvolutionMethod, Convolver};
use crate::error::CompartmentError;
use crate::model::{Bounds, Compartmental, Model};

/// Cost assigned to raw vectors without a valid physiological image
const INVALID_COST: f64 = 1e30;

/// Options controlling the least-squares solver
///
/// # Example
/// ```rust
/// use perfusion::convolution::ConvolutionMethod;
/// use perfusion::fit::FitOptions;
///
/// let options = FitOptions::default()
///     .with_max_iters(2000)
///     .with_convolution(ConvolutionMethod::Fft);
/// assert_eq!(options.max_iters, 2000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Iteration cap; reaching it is a failed fit
    pub max_iters: u64,
    /// Relative tolerance on the standard deviation of the simplex costs
    pub sd_tolerance: f64,
    /// Relative size of the initial simplex around the start point
    pub simplex_scale: f64,
    /// Convolution strategy for the forward model
    pub convolution: ConvolutionMethod,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iters: 5000,
            sd_tolerance: 1e-12,
            simplex_scale: 0.1,
            convolution: ConvolutionMethod::Direct,
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_sd_tolerance(mut self, sd_tolerance: f64) -> Self {
        self.sd_tolerance = sd_tolerance;
        self
    }

    pub fn with_simplex_scale(mut self, simplex_scale: f64) -> Self {
        self.simplex_scale = simplex_scale;
        self
    }

    pub fn with_convolution(mut self, convolution: ConvolutionMethod) -> Self {
        self.convolution = convolution;
        self
    }
}

/// Solver diagnostics of one fit attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Converged to an admissible parameter vector
    pub success: bool,
    /// Best raw parameter vector found, projected onto the bounds
    pub parameters: Vec<f64>,
    pub iterations: u64,
    /// Residual sum of squares at `parameters`
    pub ssr: f64,
    pub residual_norm: f64,
    /// Solver termination reason, or the error that stopped it
    pub termination: String,
}

impl FitReport {
    fn failed(start: &[f64], iterations: u64, termination: String) -> Self {
        Self {
            success: false,
            parameters: start.to_vec(),
            iterations,
            ssr: f64::NAN,
            residual_norm: f64::NAN,
            termination,
        }
    }
}

/// Akaike information criterion `n·ln(SSR/n) + 2k` for a least-squares fit
///
/// A perfect fit (`ssr == 0`) scores negative infinity.
pub fn akaike(ssr: f64, samples: usize, parameters: usize) -> f64 {
    let n = samples as f64;
    n * (ssr / n).ln() + 2.0 * parameters as f64
}

/// Full raw vector with `point` substituted into the free slots of `template`
fn expand(template: &[f64], free: &[bool], point: &[f64]) -> Vec<f64> {
    let mut values = point.iter();
    template
        .iter()
        .zip(free)
        .map(|(&fixed, &free)| match free {
            true => values.next().copied().unwrap_or(fixed),
            false => fixed,
        })
        .collect()
}

fn sum_of_squares<M: Compartmental>(
    kind: &M,
    raw: &[f64],
    convolver: &Convolver,
    curve: &[f64],
) -> Result<f64, CompartmentError> {
    kind.to_physiological(raw)?;
    let residual = kind.residual(raw, convolver, curve)?;
    Ok(residual.iter().map(|r| r * r).sum())
}

/// Residual sum of squares over the free raw parameters
struct LeastSquares<'a, M: Compartmental> {
    kind: &'a M,
    convolver: Convolver<'a>,
    curve: &'a [f64],
    bounds: &'a Bounds,
    template: &'a [f64],
    free: &'a [bool],
}

impl<M: Compartmental> CostFunction for LeastSquares<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, point: &Self::Param) -> Result<Self::Output, Error> {
        let raw = expand(self.template, self.free, point);
        let clamped = self.bounds.project(&raw);
        let excess = self.bounds.excess(&raw);

        match sum_of_squares(self.kind, &clamped, &self.convolver, self.curve) {
            Ok(ssr) if ssr.is_finite() => Ok(ssr + excess * (1.0 + ssr)),
            _ => Ok(INVALID_COST),
        }
    }
}

fn create_initial_simplex(initial_point: &[f64], scale: f64) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_vec());

    for i in 0..initial_point.len() {
        let perturbation = if initial_point[i] == 0.0 {
            0.00025 // Special case for components equal to 0
        } else {
            scale * initial_point[i]
        };

        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }

    vertices
}

/// Minimize the residual sum of squares of `kind` against `curve`, starting at `start`
///
/// Solver errors and non-convergence are reported through
/// [`FitReport::success`] rather than as errors.
pub(crate) fn least_squares<M: Compartmental>(
    kind: &M,
    convolver: Convolver<'_>,
    curve: &[f64],
    bounds: &Bounds,
    start: &[f64],
    options: &FitOptions,
) -> FitReport {
    let free = kind.free_parameters();
    let point: Vec<f64> = start
        .iter()
        .zip(&free)
        .filter(|(_, free)| **free)
        .map(|(&value, _)| value)
        .collect();

    let problem = LeastSquares {
        kind,
        convolver,
        curve,
        bounds,
        template: start,
        free: &free,
    };

    let initial_cost = match problem.cost(&point) {
        Ok(cost) if cost < INVALID_COST => cost,
        _ => return FitReport::failed(start, 0, "inadmissible start point".to_string()),
    };
    let scale: f64 = curve.iter().map(|c| c * c).sum();
    let tolerance = options.sd_tolerance * (initial_cost + scale) + f64::MIN_POSITIVE;

    let simplex = create_initial_simplex(&point, options.simplex_scale);
    let solver: NelderMead<Vec<f64>, f64> =
        match NelderMead::new(simplex).with_sd_tolerance(tolerance) {
            Ok(solver) => solver,
            Err(e) => return FitReport::failed(start, 0, e.to_string()),
        };

    let res = match Executor::new(problem, solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run()
    {
        Ok(res) => res,
        Err(e) => return FitReport::failed(start, 0, e.to_string()),
    };

    let state = &res.state;
    let iterations = state.get_iter();
    let status = state.get_termination_status();
    let termination = format!("{:?}", status);
    let converged = matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let Some(best) = state.get_best_param() else {
        return FitReport::failed(start, iterations, termination);
    };

    let parameters = bounds.project(&expand(start, &free, best));
    match sum_of_squares(kind, &parameters, &convolver, curve) {
        Ok(ssr) if ssr.is_finite() => FitReport {
            success: converged,
            parameters,
            iterations,
            ssr,
            residual_norm: ssr.sqrt(),
            termination,
        },
        _ => FitReport::failed(start, iterations, termination),
    }
}

impl<M: Compartmental> Model<M> {
    /// Fit the raw parameters to the measured curve
    ///
    /// Returns whether the solver converged to admissible parameters. On
    /// failure the previous parameters are kept and the model reports
    /// [`is_fitted`](Model::is_fitted) as `false`; the diagnostics of the
    /// attempt remain available through [`fit_report`](Model::fit_report).
    pub fn fit_model(&mut self) -> bool {
        let report = least_squares(
            &self.kind,
            self.convolver(),
            &self.curve,
            &self.bounds,
            &self.parameters,
            &self.options,
        );

        if report.success {
            tracing::debug!(
                model = self.kind.name(),
                iterations = report.iterations,
                ssr = report.ssr,
                "Fit converged"
            );
            self.parameters = report.parameters.clone();
        } else {
            tracing::warn!(
                model = self.kind.name(),
                iterations = report.iterations,
                termination = %report.termination,
                "Fit did not converge, keeping previous parameters"
            );
        }

        let success = report.success;
        self.fit = Some(report);
        self.bootstrap = None;
        success
    }

    /// Akaike information criterion of the current fit
    ///
    /// `k` is the number of free parameters, so variants with carried
    /// parameters are not penalized for them.
    pub fn aic(&self) -> Result<f64, CompartmentError> {
        match &self.fit {
            Some(report) if report.success => Ok(akaike(
                report.ssr,
                self.curve.len(),
                self.kind.degrees_of_freedom(),
            )),
            _ => Err(CompartmentError::NotFitted { operation: "AIC" }),
        }
    }
}
