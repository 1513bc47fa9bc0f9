use crate::convolution::Convolver;
use crate::error::CompartmentError;
use crate::model::{check_len, Bounds, Compartmental, PhysiologicalParameters};

/// Largest admissible outflow rate constant, in 1/s
const MAX_LAMBDA: f64 = 10.0;

/// One-compartment (Kety) model.
///
/// The tissue curve is `F·(aif ⊗ exp(-λt))` with a single well-mixed volume.
///
/// # Parameters
/// - physiological: `F` (ml/min/100ml), `v` (ml/100ml), derived `MTT = v/F` (min)
/// - raw: `[F/6000, λ]` with `λ = (F/6000)/(v/100)` in 1/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneCompartment;

impl Compartmental for OneCompartment {
    fn name(&self) -> &'static str {
        "one-compartment"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["F", "v"]
    }

    fn defaults(&self) -> &'static [f64] {
        &[50.0, 12.2]
    }

    fn tracked_parameters(&self) -> &'static [&'static str] {
        &["F", "v", "MTT"]
    }

    fn num_parameters(&self) -> usize {
        2
    }

    fn default_bounds(&self) -> Bounds {
        Bounds::unchecked(vec![0.0, 0.0], vec![f64::INFINITY, MAX_LAMBDA])
    }

    fn to_raw(&self, physiological: &PhysiologicalParameters) -> Result<Vec<f64>, CompartmentError> {
        let flow = physiological.require("F")?;
        let volume = physiological.require("v")?;
        positive("F", flow)?;
        positive("v", volume)?;

        let raw_flow = flow / 6000.0;
        let raw_volume = volume / 100.0;
        Ok(vec![raw_flow, raw_flow / raw_volume])
    }

    fn to_physiological(&self, raw: &[f64]) -> Result<PhysiologicalParameters, CompartmentError> {
        check_len(raw, 2)?;
        let (raw_flow, lambda) = (raw[0], raw[1]);
        if !(raw_flow > 0.0 && lambda > 0.0 && raw_flow.is_finite() && lambda.is_finite()) {
            return Err(CompartmentError::Domain(format!(
                "flow {} and outflow rate {} must be positive",
                raw_flow, lambda
            )));
        }

        let flow = raw_flow * 6000.0;
        let volume = raw_flow / lambda * 100.0;
        Ok(PhysiologicalParameters::new()
            .with("F", flow)
            .with("v", volume)
            .with("MTT", volume / flow))
    }

    fn forward(&self, raw: &[f64], convolver: &Convolver) -> Result<Vec<f64>, CompartmentError> {
        check_len(raw, 2)?;
        let conv = convolver.exponential(raw[1])?;
        Ok(conv.iter().map(|c| raw[0] * c).collect())
    }
}

pub(crate) fn positive(name: &str, value: f64) -> Result<(), CompartmentError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CompartmentError::InvalidParameter {
            name: name.to_string(),
            value,
        })
    }
}
