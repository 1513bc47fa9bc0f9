use rustfft::{num_complex::Complex, FftPlanner};

/// Relative spread of sample spacings above which the grid counts as irregular
const UNIFORM_TOLERANCE: f64 = 1e-6;

/// FFT linear convolution of `signal` with `exp(-λ·j·dt)`, `λ > 0`
///
/// The kernel is sampled on the mean spacing `dt`. The rectangle sums produced
/// by the FFT are turned into trapezoid sums by removing half of the two end
/// terms, so on uniform grids the result matches the direct recurrence up to
/// rounding.
pub(super) fn convolve(signal: &[f64], time: &[f64], lambda: f64) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let dt = (time[n - 1] - time[0]) / (n - 1) as f64;
    if !is_uniform(time, dt) {
        tracing::warn!(
            "FFT convolution on an irregular time grid, using mean spacing {}",
            dt
        );
    }

    let kernel: Vec<f64> = (0..n).map(|j| (-lambda * j as f64 * dt).exp()).collect();

    let size = (2 * n - 1).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut a = padded(signal, size);
    let mut b = padded(&kernel, size);
    forward.process(&mut a);
    forward.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    inverse.process(&mut a);

    let scale = size as f64;
    (0..n)
        .map(|i| {
            if i == 0 {
                return 0.0;
            }
            let sum = a[i].re / scale;
            let ends = 0.5 * (signal[0] * kernel[i] + signal[i] * kernel[0]);
            dt * (sum - ends)
        })
        .collect()
}

fn padded(values: &[f64], size: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (slot, &v) in buffer.iter_mut().zip(values) {
        *slot = Complex::new(v, 0.0);
    }
    buffer
}

fn is_uniform(time: &[f64], dt: f64) -> bool {
    time.windows(2)
        .all(|w| ((w[1] - w[0]) - dt).abs() <= UNIFORM_TOLERANCE * dt.abs())
}
