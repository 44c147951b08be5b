use crate::domain::Vec3;
use faer::Mat;

pub type DenseMatrix = Mat<f64>;
pub type Matrix3 = [[f64; 3]; 3];

const MAX_JACOBI_SWEEPS: usize = 100;
const OFF_DIAGONAL_EPSILON: f64 = 1.0e-30;
const SYMMETRY_EPSILON: f64 = 1.0e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EigenError {
    #[error("eigen decomposition requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("eigen decomposition requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is not symmetric at ({row}, {col})")]
    NotSymmetric { row: usize, col: usize },
    #[error("Jacobi rotations did not converge after {sweeps} sweeps")]
    NoConvergence { sweeps: usize },
}

/// Eigenvalues in ascending order with matching eigenvectors as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    values: Vec<f64>,
    vectors: DenseMatrix,
}

impl SymmetricEigen {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn vectors(&self) -> &DenseMatrix {
        &self.vectors
    }

    pub fn vector(&self, index: usize) -> Vec<f64> {
        (0..self.vectors.nrows())
            .map(|row| self.vectors[(row, index)])
            .collect()
    }
}

/// Cyclic Jacobi diagonalization of a real symmetric matrix.
pub fn symmetric_eigen(matrix: &DenseMatrix) -> Result<SymmetricEigen, EigenError> {
    let dimension = validate_symmetric(matrix)?;
    let mut a = matrix.clone();
    let mut v = DenseMatrix::identity(dimension, dimension);
    let scale = frobenius_norm_sq(matrix).max(f64::MIN_POSITIVE);

    let mut converged = false;
    for _ in 0..MAX_JACOBI_SWEEPS {
        if off_diagonal_norm_sq(&a) <= OFF_DIAGONAL_EPSILON * scale {
            converged = true;
            break;
        }
        for p in 0..dimension {
            for q in (p + 1)..dimension {
                rotate(&mut a, &mut v, p, q);
            }
        }
    }
    if !converged && off_diagonal_norm_sq(&a) > OFF_DIAGONAL_EPSILON * scale {
        return Err(EigenError::NoConvergence {
            sweeps: MAX_JACOBI_SWEEPS,
        });
    }

    let mut order: Vec<usize> = (0..dimension).collect();
    order.sort_by(|&i, &j| a[(i, i)].total_cmp(&a[(j, j)]));
    let values = order.iter().map(|&i| a[(i, i)]).collect();
    let mut vectors = DenseMatrix::zeros(dimension, dimension);
    for (column, &source) in order.iter().enumerate() {
        for row in 0..dimension {
            vectors[(row, column)] = v[(row, source)];
        }
    }
    Ok(SymmetricEigen { values, vectors })
}

fn rotate(a: &mut DenseMatrix, v: &mut DenseMatrix, p: usize, q: usize) {
    let apq = a[(p, q)];
    if apq == 0.0 {
        return;
    }
    let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;
    let n = a.nrows();
    for k in 0..n {
        let akp = a[(k, p)];
        let akq = a[(k, q)];
        a[(k, p)] = c * akp - s * akq;
        a[(k, q)] = s * akp + c * akq;
    }
    for k in 0..n {
        let apk = a[(p, k)];
        let aqk = a[(q, k)];
        a[(p, k)] = c * apk - s * aqk;
        a[(q, k)] = s * apk + c * aqk;
    }
    for k in 0..n {
        let vkp = v[(k, p)];
        let vkq = v[(k, q)];
        v[(k, p)] = c * vkp - s * vkq;
        v[(k, q)] = s * vkp + c * vkq;
    }
}

fn validate_symmetric(matrix: &DenseMatrix) -> Result<usize, EigenError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(EigenError::EmptyMatrix);
    }
    if rows != cols {
        return Err(EigenError::NonSquareMatrix { rows, cols });
    }
    let scale = frobenius_norm_sq(matrix).sqrt().max(1.0);
    for row in 0..rows {
        for col in (row + 1)..cols {
            if (matrix[(row, col)] - matrix[(col, row)]).abs() > SYMMETRY_EPSILON * scale {
                return Err(EigenError::NotSymmetric { row, col });
            }
        }
    }
    Ok(rows)
}

fn frobenius_norm_sq(matrix: &DenseMatrix) -> f64 {
    let mut total = 0.0;
    for row in 0..matrix.nrows() {
        for col in 0..matrix.ncols() {
            total += matrix[(row, col)] * matrix[(row, col)];
        }
    }
    total
}

fn off_diagonal_norm_sq(matrix: &DenseMatrix) -> f64 {
    let mut total = 0.0;
    for row in 0..matrix.nrows() {
        for col in 0..matrix.ncols() {
            if row != col {
                total += matrix[(row, col)] * matrix[(row, col)];
            }
        }
    }
    total
}

pub fn dense_from_rows<const N: usize>(rows: &[[f64; N]; N]) -> DenseMatrix {
    let mut matrix = DenseMatrix::zeros(N, N);
    for (row, values) in rows.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            matrix[(row, col)] = *value;
        }
    }
    matrix
}

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: Vec3, factor: f64) -> Vec3 {
    [a[0] * factor, a[1] * factor, a[2] * factor]
}

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

pub fn determinant3(m: &Matrix3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

pub fn transpose3(m: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (row, values) in m.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            out[col][row] = *value;
        }
    }
    out
}

pub fn inverse3(m: &Matrix3) -> Option<Matrix3> {
    let det = determinant3(m);
    if det.abs() < f64::EPSILON * 1.0e-3 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Row vector times matrix (`v · M`), the convention used for cell rows.
pub fn vec_mat3(v: Vec3, m: &Matrix3) -> Vec3 {
    [
        v[0] * m[0][0] + v[1] * m[1][0] + v[2] * m[2][0],
        v[0] * m[0][1] + v[1] * m[1][1] + v[2] * m[2][1],
        v[0] * m[0][2] + v[1] * m[1][2] + v[2] * m[2][2],
    ]
}

pub fn mat_vec3(m: &Matrix3, v: Vec3) -> Vec3 {
    [dot(m[0], v), dot(m[1], v), dot(m[2], v)]
}

pub fn mat_mul3(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for row in 0..3 {
        for col in 0..3 {
            out[row][col] = (0..3).map(|k| a[row][k] * b[k][col]).sum();
        }
    }
    out
}

/// Rotation matrix of the unit quaternion `(w, x, y, z)`.
pub fn quaternion_to_rotation(q: [f64; 4]) -> Matrix3 {
    let [w, x, y, z] = q;
    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::{
        DenseMatrix, EigenError, dense_from_rows, determinant3, inverse3, mat_mul3, mat_vec3,
        quaternion_to_rotation, symmetric_eigen,
    };

    #[test]
    fn jacobi_recovers_known_spectrum() {
        let matrix = dense_from_rows(&[[4.0, 1.0, 0.0], [1.0, 3.0, 0.0], [0.0, 0.0, 1.0]]);
        let eigen = symmetric_eigen(&matrix).expect("eigen");
        let expected_high = (7.0 + 5.0_f64.sqrt()) / 2.0;
        let expected_mid = (7.0 - 5.0_f64.sqrt()) / 2.0;
        assert!((eigen.values()[0] - 1.0).abs() < 1e-12);
        assert!((eigen.values()[1] - expected_mid).abs() < 1e-12);
        assert!((eigen.values()[2] - expected_high).abs() < 1e-12);

        for index in 0..3 {
            let vector = eigen.vector(index);
            for row in 0..3 {
                let product: f64 = (0..3).map(|col| matrix[(row, col)] * vector[col]).sum();
                assert!((product - eigen.values()[index] * vector[row]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn jacobi_rejects_bad_shapes() {
        let error = symmetric_eigen(&DenseMatrix::zeros(2, 3)).expect_err("non-square");
        assert_eq!(error, EigenError::NonSquareMatrix { rows: 2, cols: 3 });
        let error = symmetric_eigen(&dense_from_rows(&[[1.0, 2.0], [0.0, 1.0]]))
            .expect_err("asymmetric");
        assert_eq!(error, EigenError::NotSymmetric { row: 0, col: 1 });
    }

    #[test]
    fn small_matrix_helpers_agree() {
        let m = [[2.0, 0.0, 1.0], [0.0, 3.0, 0.0], [1.0, 0.0, 2.0]];
        assert!((determinant3(&m) - 9.0).abs() < 1e-12);
        let inverse = inverse3(&m).expect("invertible");
        let identity = mat_mul3(&m, &inverse);
        for row in 0..3 {
            for col in 0..3 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!((identity[row][col] - expected).abs() < 1e-12);
            }
        }
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let rotation = quaternion_to_rotation([half, 0.0, 0.0, half]);
        let rotated = mat_vec3(&rotation, [1.0, 0.0, 0.0]);
        assert!((rotated[0]).abs() < 1e-12 && (rotated[1] - 1.0).abs() < 1e-12);
    }
}
