use perfusion::data::synthetic::{add_gaussian_noise, gamma_variate, linspace};
use perfusion::parameters;
use perfusion::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn noisy_model(seed: u64) -> Model<OneCompartment> {
    let time = linspace(0.0, 89.0, 90);
    let aif = gamma_variate(&time, 8.0, 1.0, 3.0, 1.5);
    let truth = parameters! { "F" => 40.0, "v" => 8.0 };
    let mut model = Model::new(
        OneCompartment,
        time,
        vec![0.0; 90],
        aif,
        Some(&truth),
    )
    .unwrap();

    let mut curve = model.fitted_curve().unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    add_gaussian_noise(&mut curve, 0.003, &mut rng);
    model.set_curve(curve).unwrap();
    model
}

#[test]
fn bootstrap_requires_a_fit() {
    let mut model = noisy_model(1);
    let mut rng = StdRng::seed_from_u64(7);
    assert!(matches!(
        model.bootstrap(10, &mut rng),
        Err(CompartmentError::NotFitted { .. })
    ));
    assert!(!model.is_bootstrapped());
}

#[test]
fn bootstrap_needs_samples() {
    let mut model = noisy_model(1);
    assert!(model.fit_model());
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(
        model.bootstrap(0, &mut rng).unwrap_err(),
        CompartmentError::NoSamples
    );
}

#[test]
fn bootstrap_shape_and_interval_ordering() {
    let mut model = noisy_model(42);
    assert!(model.fit_model());

    let mut rng = StdRng::seed_from_u64(2024);
    let result = model.bootstrap(60, &mut rng).unwrap();
    assert_eq!(result.samples().dim(), (3, 60));
    assert_eq!(result.names(), &["F", "v", "MTT"]);
    assert!(model.is_bootstrapped());

    let point = model.physiological_parameters().unwrap();
    let estimates = result.estimates().unwrap();
    for name in ["F", "v", "MTT"] {
        let low = estimates.low.get(name).unwrap();
        let mean = estimates.mean.get(name).unwrap();
        let high = estimates.high.get(name).unwrap();
        let fit = point.get(name).unwrap();
        assert!(low < mean && mean < high, "{name}: {low} {mean} {high}");
        assert!(low <= fit && fit <= high, "{name}: {fit} outside [{low}, {high}]");
    }
}

#[test]
fn bootstrap_is_reproducible_across_execution_modes() {
    let mut parallel = noisy_model(5);
    let mut sequential = noisy_model(5);
    assert!(parallel.fit_model());
    assert!(sequential.fit_model());

    let options = BootstrapOptions::new(20);
    let a = parallel
        .bootstrap_with(&options, &mut StdRng::seed_from_u64(99))
        .unwrap();
    let b = sequential
        .bootstrap_with(&options.sequential(), &mut StdRng::seed_from_u64(99))
        .unwrap();
    assert_eq!(a.samples(), b.samples());
    assert_eq!(a.failures(), b.failures());
}

#[test]
fn bootstrap_leaves_point_fit_untouched() {
    let mut model = noisy_model(3);
    assert!(model.fit_model());
    let before = model.parameters().to_vec();
    model
        .bootstrap(10, &mut StdRng::seed_from_u64(1))
        .unwrap();
    assert_eq!(model.parameters(), before.as_slice());
    assert!(model.is_fitted());
}

#[test]
fn standard_deviation_interval_is_symmetric() {
    let mut model = noisy_model(8);
    assert!(model.fit_model());
    let options = BootstrapOptions::new(30).with_interval(IntervalMethod::standard_deviation());
    let result = model
        .bootstrap_with(&options, &mut StdRng::seed_from_u64(3))
        .unwrap();
    let estimates = result.estimates().unwrap();

    let (low, mean, high) = (
        estimates.low.get("F").unwrap(),
        estimates.mean.get("F").unwrap(),
        estimates.high.get("F").unwrap(),
    );
    assert!(((mean - low) - (high - mean)).abs() < 1e-9 * mean);
    assert!(low < mean);
}

#[test]
fn report_carries_nested_estimates() {
    let mut model = noisy_model(11);
    assert!(model.fit_model());

    let unbootstrapped = model.report().unwrap();
    assert!(unbootstrapped.low.is_none());

    model
        .bootstrap(20, &mut StdRng::seed_from_u64(4))
        .unwrap();
    let json = model.report().unwrap().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    for key in ["F", "v", "MTT"] {
        assert!(value[key].is_number());
        for estimate in ["low estimate", "mean estimate", "high estimate"] {
            assert!(value[estimate][key].is_number(), "{estimate}/{key}");
        }
    }
}

#[test]
fn two_compartment_bootstrap_has_one_row_per_tracked_parameter() {
    let model = noisy_model(13);
    let start = parameters! { "Fp" => 40.0, "vp" => 8.0, "PS" => 0.5, "ve" => 10.0 };
    let mut uptake = Model::new(
        TwoCompartmentUptake,
        model.time().to_vec(),
        model.curve().to_vec(),
        model.aif().to_vec(),
        Some(&start),
    )
    .unwrap()
    .with_options(FitOptions::default().with_max_iters(20_000));
    assert!(uptake.fit_model());

    let result = uptake
        .bootstrap(6, &mut StdRng::seed_from_u64(21))
        .unwrap();
    assert_eq!(result.samples().dim(), (6, 6));
    assert_eq!(result.names(), &["Fp", "vp", "PS", "ve", "E", "MTT"]);
    // ve is carried, not fitted
    let ve = result.row("ve").unwrap();
    assert!(ve.iter().all(|v| (v - 10.0).abs() < 1e-9));
}
