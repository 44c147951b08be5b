pub mod correlation;
pub mod differentiation;
pub mod fourier;
pub mod histogram;
pub mod linalg;
pub mod qvectors;
pub mod resolution;
pub mod voronoi;

pub use correlation::{autocorrelation, correlation, normalize_to_origin, vector_autocorrelation};
pub use differentiation::{DifferentiationError, differentiate, fornberg_weights};
pub use fourier::{angular_frequencies, spectrum};
pub use histogram::{Histogram, RadialBins};
pub use linalg::{DenseMatrix, EigenError, Matrix3, SymmetricEigen, symmetric_eigen};
pub use qvectors::{QShell, QVectorError, QVectorGenerator, QVectorShells};
pub use resolution::{ResolutionKernel, ResolutionWindow};
pub use voronoi::{VoronoiCell, voronoi_cell, voronoi_cells};

use serde::{Deserialize, Serialize};

/// Element-wise comparison policy (`|a - b| <= atol + rtol * |a|`).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NumericTolerance {
    pub rtol: f64,
    pub atol: f64,
}

/// Tolerance used when single-core and multicore runs are compared.
pub const PARALLEL_CHECK_TOLERANCE: NumericTolerance = NumericTolerance {
    rtol: 1.0e-5,
    atol: 1.0e-4,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceComparison {
    pub abs_diff: f64,
    pub rel_diff: f64,
    pub passes: bool,
}

pub fn compare_with_tolerance(
    baseline: f64,
    actual: f64,
    tolerance: NumericTolerance,
) -> ToleranceComparison {
    if baseline == actual || (baseline.is_nan() && actual.is_nan()) {
        return ToleranceComparison {
            abs_diff: 0.0,
            rel_diff: 0.0,
            passes: true,
        };
    }
    let abs_diff = (actual - baseline).abs();
    let rel_diff = abs_diff / baseline.abs().max(f64::MIN_POSITIVE);
    let passes = abs_diff <= tolerance.atol + tolerance.rtol * baseline.abs();

    ToleranceComparison {
        abs_diff,
        rel_diff,
        passes,
    }
}

/// First element where `actual` departs from `baseline`, if any.
pub fn first_mismatch(
    baseline: &[f64],
    actual: &[f64],
    tolerance: NumericTolerance,
) -> Option<(usize, ToleranceComparison)> {
    if baseline.len() != actual.len() {
        return Some((
            baseline.len().min(actual.len()),
            ToleranceComparison {
                abs_diff: f64::INFINITY,
                rel_diff: f64::INFINITY,
                passes: false,
            },
        ));
    }
    baseline
        .iter()
        .zip(actual)
        .enumerate()
        .map(|(index, (&b, &a))| (index, compare_with_tolerance(b, a, tolerance)))
        .find(|(_, comparison)| !comparison.passes)
}

pub fn format_numeric(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    format!("{value:.15e}")
}

#[cfg(test)]
mod tests {
    use super::{
        NumericTolerance, PARALLEL_CHECK_TOLERANCE, compare_with_tolerance, first_mismatch,
        format_numeric,
    };

    #[test]
    fn tolerance_mixes_absolute_and_relative_terms() {
        let tolerance = NumericTolerance {
            rtol: 1.0e-3,
            atol: 1.0e-6,
        };
        assert!(compare_with_tolerance(1000.0, 1000.5, tolerance).passes);
        assert!(!compare_with_tolerance(1.0, 1.01, tolerance).passes);
        assert!(compare_with_tolerance(0.0, 5.0e-7, tolerance).passes);
        assert!(compare_with_tolerance(f64::NAN, f64::NAN, tolerance).passes);
    }

    #[test]
    fn mismatch_reports_the_first_offending_index() {
        let baseline = [1.0, 2.0, 3.0];
        let actual = [1.0, 2.0 + 1.0e-6, 3.5];
        let (index, comparison) =
            first_mismatch(&baseline, &actual, PARALLEL_CHECK_TOLERANCE).expect("mismatch");
        assert_eq!(index, 2);
        assert!((comparison.abs_diff - 0.5).abs() < 1e-12);
        assert!(first_mismatch(&baseline, &baseline, PARALLEL_CHECK_TOLERANCE).is_none());
        assert!(first_mismatch(&baseline, &baseline[..2], PARALLEL_CHECK_TOLERANCE).is_some());
    }

    #[test]
    fn numeric_formatting_is_stable() {
        assert_eq!(format_numeric(f64::NAN), "NaN");
        assert_eq!(format_numeric(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_numeric(1.5), "1.500000000000000e0");
    }
}
