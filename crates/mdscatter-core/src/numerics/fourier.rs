//! Spectra of even time signals (correlation functions).
//!
//! `S(ω) = dt/2π · [w(0) f(0) + 2 Σ_{t>0} w(t) f(t) cos(ω t)]`, the discrete
//! form of the symmetric Fourier integral of a real even function.

use std::f64::consts::PI;

/// Angular frequencies `2πk / ((2n - 1) dt)` for `k` in `0..n`.
pub fn angular_frequencies(n_frames: usize, time_step: f64) -> Vec<f64> {
    if n_frames == 0 || time_step <= 0.0 {
        return Vec::new();
    }
    let period = (2 * n_frames - 1) as f64 * time_step;
    (0..n_frames)
        .map(|k| 2.0 * PI * k as f64 / period)
        .collect()
}

pub fn spectrum(values: &[f64], time_step: f64, window: &[f64], omegas: &[f64]) -> Vec<f64> {
    let weighted: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(t, value)| value * window.get(t).copied().unwrap_or(0.0))
        .collect();
    omegas
        .iter()
        .map(|&omega| {
            let mut total = weighted.first().copied().unwrap_or(0.0);
            for (t, value) in weighted.iter().enumerate().skip(1) {
                total += 2.0 * value * (omega * t as f64 * time_step).cos();
            }
            total * time_step / (2.0 * PI)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{angular_frequencies, spectrum};
    use std::f64::consts::PI;

    #[test]
    fn delta_correlation_gives_flat_spectrum() {
        let values = [1.0, 0.0, 0.0, 0.0];
        let window = [1.0; 4];
        let omegas = angular_frequencies(4, 0.5);
        let result = spectrum(&values, 0.5, &window, &omegas);
        for value in result {
            assert!((value - 0.5 / (2.0 * PI)).abs() < 1e-12);
        }
    }

    #[test]
    fn frequency_grid_starts_at_zero() {
        let omegas = angular_frequencies(3, 1.0);
        assert_eq!(omegas.len(), 3);
        assert_eq!(omegas[0], 0.0);
        assert!((omegas[1] - 2.0 * PI / 5.0).abs() < 1e-12);
        assert!(angular_frequencies(0, 1.0).is_empty());
    }
}
