use approx::assert_relative_eq;
use perfusion::data::synthetic::{gamma_variate, linspace};
use perfusion::parameters;
use perfusion::prelude::*;

const SAMPLES: usize = 120;

fn time_axis() -> Vec<f64> {
    linspace(0.0, (SAMPLES - 1) as f64, SAMPLES)
}

fn bolus(time: &[f64]) -> Vec<f64> {
    gamma_variate(time, 10.0, 1.0, 3.0, 1.5)
}

/// One-compartment curve for `F = 31`, `v = 4.2` plus `±sd` alternating noise
fn one_compartment_data(sd: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let time = time_axis();
    let aif = bolus(&time);
    let truth = parameters! { "F" => 31.0, "v" => 4.2 };
    let model = Model::new(
        OneCompartment,
        time.clone(),
        vec![0.0; SAMPLES],
        aif.clone(),
        Some(&truth),
    )
    .unwrap();
    let curve = model
        .fitted_curve()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, c)| if i % 2 == 0 { c + sd } else { c - sd })
        .collect();
    (time, curve, aif)
}

#[test]
fn one_compartment_start_conversion_is_exact() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let start = parameters! { "F" => 51.0, "v" => 11.2 };
    let model = Model::new(OneCompartment, time, curve, aif, Some(&start)).unwrap();

    let raw_flow = 51.0 / 6000.0;
    assert_eq!(model.parameters()[0], raw_flow);
    assert_eq!(model.parameters()[1], raw_flow / (11.2 / 100.0));
}

#[test]
fn noise_free_fit_reproduces_start() {
    let time = time_axis();
    let aif = bolus(&time);
    let start = parameters! { "F" => 51.0, "v" => 11.2 };
    let mut model = Model::new(
        OneCompartment,
        time,
        vec![0.0; SAMPLES],
        aif,
        Some(&start),
    )
    .unwrap();
    let curve = model.fitted_curve().unwrap();
    model.set_curve(curve).unwrap();

    assert!(model.fit_model());
    let fitted = model.physiological_parameters().unwrap();
    assert_relative_eq!(fitted.get("F").unwrap(), 51.0, max_relative = 1e-5);
    assert_relative_eq!(fitted.get("v").unwrap(), 11.2, max_relative = 1e-5);
}

#[test]
fn fit_recovers_parameters_from_default_start() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let mut model = Model::new(OneCompartment, time, curve, aif, None).unwrap();

    assert!(model.fit_model());
    let fitted = model.physiological_parameters().unwrap();
    assert_relative_eq!(fitted.get("F").unwrap(), 31.0, max_relative = 1e-4);
    assert_relative_eq!(fitted.get("v").unwrap(), 4.2, max_relative = 1e-4);
    assert_relative_eq!(fitted.get("MTT").unwrap(), 4.2 / 31.0, max_relative = 1e-4);
}

#[test]
fn fft_strategy_fits_the_same_curve() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let mut model = Model::new(OneCompartment, time, curve, aif, None)
        .unwrap()
        .with_options(FitOptions::default().with_convolution(ConvolutionMethod::Fft));

    assert!(model.fit_model());
    let fitted = model.physiological_parameters().unwrap();
    assert_relative_eq!(fitted.get("F").unwrap(), 31.0, max_relative = 1e-3);
    assert_relative_eq!(fitted.get("v").unwrap(), 4.2, max_relative = 1e-3);
}

#[test]
fn failed_fit_keeps_previous_parameters() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let mut model = Model::new(OneCompartment, time, curve, aif, None)
        .unwrap()
        .with_options(FitOptions::default().with_max_iters(1));
    let before = model.parameters().to_vec();

    assert!(!model.fit_model());
    assert!(!model.is_fitted());
    assert_eq!(model.parameters(), before.as_slice());
    assert!(!model.fit_report().unwrap().success);
    assert!(matches!(
        model.aic(),
        Err(CompartmentError::NotFitted { .. })
    ));

    // the model stays usable
    model.set_options(FitOptions::default());
    assert!(model.fit_model());
    assert!(model.aic().is_ok());
}

#[test]
fn changing_the_curve_invalidates_the_fit() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let mut model = Model::new(OneCompartment, time, curve.clone(), aif, None).unwrap();
    assert!(model.fit_model());

    model.set_curve(curve).unwrap();
    assert!(!model.is_fitted());
    assert!(model.aic().is_err());
}

#[test]
fn aic_prefers_the_generating_model() {
    let (time, curve, aif) = one_compartment_data(0.002);
    let options = FitOptions::default().with_max_iters(20_000);

    let mut one = Model::new(OneCompartment, time.clone(), curve.clone(), aif.clone(), None)
        .unwrap()
        .with_options(options);
    let start = parameters! { "Fp" => 31.0, "vp" => 4.2, "PS" => 0.001, "ve" => 11.2 };
    let mut uptake = Model::new(
        TwoCompartmentUptake,
        time.clone(),
        curve.clone(),
        aif.clone(),
        Some(&start),
    )
    .unwrap()
    .with_options(options);
    let mut exchange = Model::new(TwoCompartmentExchange, time, curve, aif, Some(&start))
        .unwrap()
        .with_options(options);

    assert!(one.fit_model());
    assert!(uptake.fit_model());
    assert!(exchange.fit_model());

    let (aic_one, aic_uptake, aic_exchange) =
        (one.aic().unwrap(), uptake.aic().unwrap(), exchange.aic().unwrap());
    assert!(aic_one < aic_uptake, "{aic_one} vs {aic_uptake}");
    assert!(aic_uptake < aic_exchange, "{aic_uptake} vs {aic_exchange}");
}

#[test]
fn unknown_start_parameter_is_rejected() {
    let (time, curve, aif) = one_compartment_data(0.0);
    let start = parameters! { "Fp" => 31.0 };
    let result = Model::new(OneCompartment, time, curve, aif, Some(&start));
    assert!(matches!(
        result,
        Err(CompartmentError::UnknownParameter { .. })
    ));
}
