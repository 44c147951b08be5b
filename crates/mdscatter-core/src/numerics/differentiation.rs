//! Finite-difference derivatives of uniformly sampled series.
//!
//! An interpolation order `k` in `1..=5` uses a `k + 1` point stencil placed as
//! centrally as the series bounds allow; weights come from Fornberg's
//! recursion.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DifferentiationError {
    #[error("interpolation order must be within 1..=5, got {0}")]
    InvalidOrder(usize),
    #[error("order {order} needs at least {needed} samples, got {actual}")]
    TooFewSamples {
        order: usize,
        needed: usize,
        actual: usize,
    },
    #[error("time step must be positive, got {0}")]
    InvalidTimeStep(f64),
}

/// Weights `c[d][j]` of the `d`-th derivative at `z` over the nodes `x`.
pub fn fornberg_weights(z: f64, x: &[f64], max_derivative: usize) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut c = vec![vec![0.0; n]; max_derivative + 1];
    if n == 0 {
        return c;
    }
    let mut c1 = 1.0;
    let mut c4 = x[0] - z;
    c[0][0] = 1.0;
    for i in 1..n {
        let mn = i.min(max_derivative);
        let mut c2 = 1.0;
        let c5 = c4;
        c4 = x[i] - z;
        for j in 0..i {
            let c3 = x[i] - x[j];
            c2 *= c3;
            if j == i - 1 {
                for k in (1..=mn).rev() {
                    c[k][i] = c1 * (k as f64 * c[k - 1][i - 1] - c5 * c[k][i - 1]) / c2;
                }
                c[0][i] = -c1 * c5 * c[0][i - 1] / c2;
            }
            for k in (1..=mn).rev() {
                c[k][j] = (c4 * c[k][j] - k as f64 * c[k - 1][j]) / c3;
            }
            c[0][j] = c4 * c[0][j] / c3;
        }
        c1 = c2;
    }
    c
}

pub fn differentiate(
    values: &[f64],
    time_step: f64,
    order: usize,
) -> Result<Vec<f64>, DifferentiationError> {
    if !(1..=5).contains(&order) {
        return Err(DifferentiationError::InvalidOrder(order));
    }
    if time_step <= 0.0 {
        return Err(DifferentiationError::InvalidTimeStep(time_step));
    }
    let points = order + 1;
    if values.len() < points {
        return Err(DifferentiationError::TooFewSamples {
            order,
            needed: points,
            actual: values.len(),
        });
    }

    let n = values.len();
    let mut derivative = Vec::with_capacity(n);
    for t in 0..n {
        let start = t.saturating_sub(order / 2).min(n - points);
        let nodes: Vec<f64> = (start..start + points).map(|i| i as f64).collect();
        let weights = fornberg_weights(t as f64, &nodes, 1);
        let total: f64 = weights[1]
            .iter()
            .zip(&values[start..start + points])
            .map(|(w, v)| w * v)
            .sum();
        derivative.push(total / time_step);
    }
    Ok(derivative)
}

#[cfg(test)]
mod tests {
    use super::{DifferentiationError, differentiate, fornberg_weights};

    #[test]
    fn central_three_point_weights() {
        let weights = fornberg_weights(0.0, &[-1.0, 0.0, 1.0], 1);
        assert!((weights[1][0] + 0.5).abs() < 1e-12);
        assert!(weights[1][1].abs() < 1e-12);
        assert!((weights[1][2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn every_order_differentiates_a_line_exactly() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 * i as f64 * 0.5 + 1.0).collect();
        for order in 1..=5 {
            let derivative = differentiate(&values, 0.5, order).expect("derivative");
            for value in derivative {
                assert!((value - 3.0).abs() < 1e-9, "order {order} gave {value}");
            }
        }
    }

    #[test]
    fn higher_orders_capture_curvature() {
        let dt = 0.1;
        let values: Vec<f64> = (0..12).map(|i| (i as f64 * dt).powi(3)).collect();
        let derivative = differentiate(&values, dt, 4).expect("derivative");
        for (i, value) in derivative.iter().enumerate() {
            let t = i as f64 * dt;
            assert!((value - 3.0 * t * t).abs() < 1e-9);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(
            differentiate(&[1.0, 2.0], 1.0, 6),
            Err(DifferentiationError::InvalidOrder(6))
        );
        assert_eq!(
            differentiate(&[1.0, 2.0], 1.0, 3),
            Err(DifferentiationError::TooFewSamples {
                order: 3,
                needed: 4,
                actual: 2
            })
        );
    }
}
