/// Trapezoidal recurrence for `signal ⊗ exp(-λt)`, `λ > 0`
///
/// With `e = exp(-λ·dt)` for the interval ending at sample `i`:
///
/// ```text
/// out[i] = e·out[i-1] + dt/2 · (e·s[i-1] + s[i])
/// ```
///
/// which unrolls to the composite trapezoidal rule of `s(τ)·exp(-λ(t_i - τ))`
/// over `[t_0, t_i]`.
pub(super) fn convolve(signal: &[f64], time: &[f64], lambda: f64) -> Vec<f64> {
    let mut out = vec![0.0; signal.len()];
    for i in 1..signal.len() {
        let dt = time[i] - time[i - 1];
        let decay = (-lambda * dt).exp();
        out[i] = decay * out[i - 1] + dt / 2.0 * (decay * signal[i - 1] + signal[i]);
    }
    out
}
