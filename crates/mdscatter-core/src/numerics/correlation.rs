//! Time correlation functions evaluated by direct summation.
//!
//! `C(τ) = 1/(N-τ) Σ_t x(t) y(t+τ)` for `τ` in `0..n_lags`.

use crate::domain::Vec3;

pub fn correlation(x: &[f64], y: &[f64], n_lags: usize) -> Vec<f64> {
    let length = x.len().min(y.len());
    let n_lags = n_lags.min(length);
    (0..n_lags)
        .map(|lag| {
            let count = length - lag;
            let total: f64 = (0..count).map(|t| x[t] * y[t + lag]).sum();
            total / count as f64
        })
        .collect()
}

pub fn autocorrelation(x: &[f64], n_lags: usize) -> Vec<f64> {
    correlation(x, x, n_lags)
}

/// Autocorrelation of a 3-vector series averaged over its three components.
pub fn vector_autocorrelation(series: &[Vec3], n_lags: usize) -> Vec<f64> {
    let mut total = vec![0.0; n_lags.min(series.len())];
    for axis in 0..3 {
        let component: Vec<f64> = series.iter().map(|v| v[axis]).collect();
        for (slot, value) in total.iter_mut().zip(autocorrelation(&component, n_lags)) {
            *slot += value / 3.0;
        }
    }
    total
}

/// Divides by the zero-lag value; a zero origin leaves the values untouched.
pub fn normalize_to_origin(values: &mut [f64]) {
    let Some(&origin) = values.first() else {
        return;
    };
    if origin == 0.0 {
        return;
    }
    for value in values.iter_mut() {
        *value /= origin;
    }
}

#[cfg(test)]
mod tests {
    use super::{autocorrelation, correlation, normalize_to_origin, vector_autocorrelation};

    #[test]
    fn constant_signal_correlates_to_its_square() {
        let values = vec![2.0; 6];
        let acf = autocorrelation(&values, 4);
        assert_eq!(acf, vec![4.0; 4]);
    }

    #[test]
    fn cross_correlation_uses_lagged_partner() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 3.0, 0.0];
        let values = correlation(&x, &y, 3);
        assert_eq!(values, vec![0.0, 1.5, 0.0]);
    }

    #[test]
    fn vector_correlation_averages_components_and_normalizes() {
        let series = vec![[1.0, 2.0, 2.0], [1.0, 2.0, 2.0]];
        let mut acf = vector_autocorrelation(&series, 2);
        assert!((acf[0] - 3.0).abs() < 1e-12);
        normalize_to_origin(&mut acf);
        assert!((acf[1] - 1.0).abs() < 1e-12);
    }
}
