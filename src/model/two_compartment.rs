use crate::convolution::Convolver;
use crate::error::CompartmentError;
use crate::model::one_compartment::positive;
use crate::model::{check_len, Bounds, Compartmental, PhysiologicalParameters};

/// Largest admissible eigen-rate, in 1/s
const MAX_RATE: f64 = 10.0;

const PARAMETER_NAMES: &[&str] = &["Fp", "vp", "PS", "ve"];
const DEFAULTS: &[f64] = &[50.0, 5.0, 10.0, 15.0];
const TRACKED: &[&str] = &["Fp", "vp", "PS", "ve", "E", "MTT"];

/// Physiological inputs converted to per-second flows and volume fractions
struct Rates {
    fp: f64,
    vp: f64,
    ps: f64,
    ve: f64,
}

impl Rates {
    fn from_physiological(physiological: &PhysiologicalParameters) -> Result<Self, CompartmentError> {
        let values = physiological.values_of(PARAMETER_NAMES)?;
        for (name, &value) in PARAMETER_NAMES.iter().zip(&values) {
            positive(name, value)?;
        }
        Ok(Self {
            fp: values[0] / 6000.0,
            vp: values[1] / 100.0,
            ps: values[2] / 6000.0,
            ve: values[3] / 100.0,
        })
    }

    fn into_physiological(self, mtt: f64) -> PhysiologicalParameters {
        let flow = self.fp * 6000.0;
        let permeability = self.ps * 6000.0;
        PhysiologicalParameters::new()
            .with("Fp", flow)
            .with("vp", self.vp * 100.0)
            .with("PS", permeability)
            .with("ve", self.ve * 100.0)
            .with("E", permeability / (flow + permeability))
            .with("MTT", mtt)
    }
}

fn domain_check(rates: &Rates, allow_zero_exchange: bool) -> Result<(), CompartmentError> {
    let values = [rates.fp, rates.vp, rates.ps, rates.ve];
    let exchange_ok = if allow_zero_exchange {
        rates.ps >= 0.0
    } else {
        rates.ps > 0.0
    };
    if values.iter().all(|v| v.is_finite())
        && rates.fp > 0.0
        && rates.vp > 0.0
        && rates.ve > 0.0
        && exchange_ok
    {
        Ok(())
    } else {
        Err(CompartmentError::Domain(format!(
            "Fp = {}, vp = {}, PS = {}, ve = {} is not a valid parameter set",
            rates.fp * 6000.0,
            rates.vp * 100.0,
            rates.ps * 6000.0,
            rates.ve * 100.0
        )))
    }
}

/// Two-compartment exchange model (2CXM).
///
/// Plasma (`vp`) and interstitium (`ve`) exchange tracer through `PS`; the
/// impulse response is bi-exponential, `K1·exp(-αt) + K2·exp(-βt)`.
///
/// # Parameters
/// - physiological: `Fp`, `vp`, `PS`, `ve`, derived `E = PS/(Fp+PS)` and
///   `MTT = (vp+ve)/Fp`
/// - raw: `[K1, α, K2, β]` with `α > β ≥ 0`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoCompartmentExchange;

impl Compartmental for TwoCompartmentExchange {
    fn name(&self) -> &'static str {
        "two-compartment exchange"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETER_NAMES
    }

    fn defaults(&self) -> &'static [f64] {
        DEFAULTS
    }

    fn tracked_parameters(&self) -> &'static [&'static str] {
        TRACKED
    }

    fn num_parameters(&self) -> usize {
        4
    }

    fn default_bounds(&self) -> Bounds {
        Bounds::unchecked(
            vec![0.0, 0.0, 0.0, 0.0],
            vec![f64::INFINITY, MAX_RATE, f64::INFINITY, MAX_RATE],
        )
    }

    fn to_raw(&self, physiological: &PhysiologicalParameters) -> Result<Vec<f64>, CompartmentError> {
        let Rates { fp, vp, ps, ve } = Rates::from_physiological(physiological)?;

        // Eigen-rates of the plasma/interstitium exchange matrix
        let kp = (fp + ps) / vp;
        let kep = ps / ve;
        let sum = kp + kep;
        let product = kep * fp / vp;
        let alpha = (sum + (sum * sum - 4.0 * product).sqrt()) / 2.0;
        let beta = product / alpha;

        // Response starts at Fp with initial slope -Fp²/vp
        let k1 = fp * (fp / vp - beta) / (alpha - beta);
        Ok(vec![k1, alpha, fp - k1, beta])
    }

    fn to_physiological(&self, raw: &[f64]) -> Result<PhysiologicalParameters, CompartmentError> {
        check_len(raw, 4)?;
        let (k1, alpha, k2, beta) = (raw[0], raw[1], raw[2], raw[3]);

        let fp = k1 + k2;
        let vp = fp * fp / (k1 * alpha + k2 * beta);
        let kep = alpha * beta * vp / fp;
        let ps = (alpha + beta - kep) * vp - fp;
        let rates = Rates {
            fp,
            vp,
            ps,
            ve: ps / kep,
        };
        domain_check(&rates, false)?;

        let mtt = (rates.vp + rates.ve) / rates.fp / 60.0;
        Ok(rates.into_physiological(mtt))
    }

    fn forward(&self, raw: &[f64], convolver: &Convolver) -> Result<Vec<f64>, CompartmentError> {
        check_len(raw, 4)?;
        let fast = convolver.exponential(raw[1])?;
        let slow = convolver.exponential(raw[3])?;
        Ok(fast
            .iter()
            .zip(slow.iter())
            .map(|(f, s)| raw[0] * f + raw[2] * s)
            .collect())
    }
}

/// Two-compartment uptake model (2CUM).
///
/// Tracer leaves plasma into the interstitium through `PS` without backflux,
/// giving `K1·exp(-αt) + K2` as impulse response. `ve` has no influence on
/// the curve: it is carried in the raw vector but not fitted.
///
/// # Parameters
/// - physiological: `Fp`, `vp`, `PS`, `ve`, derived `E = PS/(Fp+PS)` and
///   plasma `MTT = vp/(Fp+PS)`
/// - raw: `[K1, α, K2, ve/100]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoCompartmentUptake;

impl Compartmental for TwoCompartmentUptake {
    fn name(&self) -> &'static str {
        "two-compartment uptake"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETER_NAMES
    }

    fn defaults(&self) -> &'static [f64] {
        DEFAULTS
    }

    fn tracked_parameters(&self) -> &'static [&'static str] {
        TRACKED
    }

    fn num_parameters(&self) -> usize {
        4
    }

    fn free_parameters(&self) -> Vec<bool> {
        vec![true, true, true, false]
    }

    fn default_bounds(&self) -> Bounds {
        Bounds::unchecked(
            vec![0.0, 0.0, 0.0, 0.0],
            vec![f64::INFINITY, MAX_RATE, f64::INFINITY, f64::INFINITY],
        )
    }

    fn to_raw(&self, physiological: &PhysiologicalParameters) -> Result<Vec<f64>, CompartmentError> {
        let Rates { fp, vp, ps, ve } = Rates::from_physiological(physiological)?;
        let total = fp + ps;
        Ok(vec![fp * fp / total, total / vp, fp * ps / total, ve])
    }

    fn to_physiological(&self, raw: &[f64]) -> Result<PhysiologicalParameters, CompartmentError> {
        check_len(raw, 4)?;
        let (k1, alpha, k2, ve) = (raw[0], raw[1], raw[2], raw[3]);

        let fp = k1 + k2;
        let ps = fp * k2 / k1;
        let rates = Rates {
            fp,
            vp: (fp + ps) / alpha,
            ps,
            ve,
        };
        domain_check(&rates, true)?;

        let mtt = rates.vp / (rates.fp + rates.ps) / 60.0;
        Ok(rates.into_physiological(mtt))
    }

    fn forward(&self, raw: &[f64], convolver: &Convolver) -> Result<Vec<f64>, CompartmentError> {
        check_len(raw, 4)?;
        let plasma = convolver.exponential(raw[1])?;
        let uptake = convolver.exponential(0.0)?;
        Ok(plasma
            .iter()
            .zip(uptake.iter())
            .map(|(p, u)| raw[0] * p + raw[2] * u)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::ConvolutionMethod;
    use crate::data::synthetic::{gamma_variate, linspace};
    use approx::assert_relative_eq;

    fn start(fp: f64, vp: f64, ps: f64, ve: f64) -> PhysiologicalParameters {
        PhysiologicalParameters::new()
            .with("Fp", fp)
            .with("vp", vp)
            .with("PS", ps)
            .with("ve", ve)
    }

    fn assert_round_trip<M: Compartmental>(model: M, phys: &PhysiologicalParameters) {
        let back = model.to_physiological(&model.to_raw(phys).unwrap()).unwrap();
        for (name, value) in phys.iter() {
            assert_relative_eq!(back.get(name).unwrap(), value, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_exchange_round_trip() {
        for phys in [
            start(31.0, 4.2, 0.001, 11.2),
            start(51.0, 11.2, 12.0, 20.0),
            start(120.0, 3.0, 50.0, 40.0),
        ] {
            assert_round_trip(TwoCompartmentExchange, &phys);
        }
    }

    #[test]
    fn test_uptake_round_trip() {
        for phys in [start(31.0, 4.2, 0.001, 11.2), start(80.0, 6.0, 25.0, 30.0)] {
            assert_round_trip(TwoCompartmentUptake, &phys);
        }
    }

    #[test]
    fn test_exchange_rates_are_ordered() {
        let raw = TwoCompartmentExchange
            .to_raw(&start(51.0, 11.2, 12.0, 20.0))
            .unwrap();
        assert!(raw[1] > raw[3]);
        assert!(raw[3] > 0.0);
        assert!(raw[0] > 0.0 && raw[2] > 0.0);
        // Amplitudes add up to the plasma flow
        assert_relative_eq!(raw[0] + raw[2], 51.0 / 6000.0, max_relative = 1e-12);
    }

    #[test]
    fn test_derived_quantities() {
        let phys = TwoCompartmentExchange
            .to_physiological(
                &TwoCompartmentExchange
                    .to_raw(&start(60.0, 5.0, 20.0, 15.0))
                    .unwrap(),
            )
            .unwrap();
        assert_relative_eq!(phys.get("E").unwrap(), 0.25, max_relative = 1e-9);
        assert_relative_eq!(phys.get("MTT").unwrap(), 20.0 / 60.0, max_relative = 1e-9);
    }

    #[test]
    fn test_uptake_ignores_ve() {
        let time = linspace(0.0, 60.0, 121);
        let aif = gamma_variate(&time, 5.0, 1.0, 3.0, 1.5);
        let convolver = Convolver::new(&time, &aif, ConvolutionMethod::Direct);

        let a = TwoCompartmentUptake
            .to_raw(&start(40.0, 5.0, 10.0, 5.0))
            .unwrap();
        let b = TwoCompartmentUptake
            .to_raw(&start(40.0, 5.0, 10.0, 50.0))
            .unwrap();
        assert_eq!(
            TwoCompartmentUptake.forward(&a, &convolver).unwrap(),
            TwoCompartmentUptake.forward(&b, &convolver).unwrap()
        );
        assert_eq!(TwoCompartmentUptake.degrees_of_freedom(), 3);
    }

    #[test]
    fn test_exchange_without_permeability_reduces_to_one_compartment() {
        use crate::model::OneCompartment;

        let time = linspace(0.0, 60.0, 121);
        let aif = gamma_variate(&time, 5.0, 1.0, 3.0, 1.5);
        let convolver = Convolver::new(&time, &aif, ConvolutionMethod::Direct);

        let two = TwoCompartmentExchange
            .to_raw(&start(40.0, 5.0, 1e-9, 10.0))
            .unwrap();
        let one = OneCompartment
            .to_raw(&PhysiologicalParameters::new().with("F", 40.0).with("v", 5.0))
            .unwrap();

        let c2 = TwoCompartmentExchange.forward(&two, &convolver).unwrap();
        let c1 = OneCompartment.forward(&one, &convolver).unwrap();
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_exchange_rejects_negative_permeability() {
        // A negative slow amplitude pushes the mean rate above α, so PS < 0
        let result = TwoCompartmentExchange.to_physiological(&[0.01, 0.5, -0.002, 0.1]);
        assert!(matches!(result, Err(CompartmentError::Domain(_))));
    }
}
