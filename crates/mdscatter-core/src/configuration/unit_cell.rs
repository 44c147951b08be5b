use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use crate::numerics::linalg::{Matrix3, add, determinant3, inverse3, norm, vec_mat3};

/// Absolute tolerance (nm) under which two cells compare equal.
pub const UNIT_CELL_TOLERANCE: f64 = 1.0e-9;

/// Rows of the direct matrix are the cell vectors `a`, `b`, `c`; a real
/// position is `r = s · direct` for fractional `s`.
#[derive(Debug, Clone, Copy)]
pub struct UnitCell {
    direct: Matrix3,
    inverse: Matrix3,
}

fn invalid_cell(message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(ErrorKind::InconsistentChemicalSystem, "INPUT.UNIT_CELL", message)
}

impl UnitCell {
    pub fn new(direct: Matrix3) -> AnalysisResult<Self> {
        if direct.iter().flatten().any(|value| !value.is_finite()) {
            return Err(invalid_cell("unit cell contains non-finite values"));
        }
        let inverse = inverse3(&direct)
            .ok_or_else(|| invalid_cell("unit cell vectors are linearly dependent"))?;
        Ok(Self { direct, inverse })
    }

    /// Builds a cell from nested rows, rejecting anything but 3x3.
    pub fn from_rows(rows: &[Vec<f64>]) -> AnalysisResult<Self> {
        if rows.len() != 3 || rows.iter().any(|row| row.len() != 3) {
            let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
            return Err(invalid_cell(format!(
                "unit cell must have shape (3, 3), got {} rows of lengths {shape:?}",
                rows.len()
            )));
        }
        let mut direct = [[0.0; 3]; 3];
        for (target, row) in direct.iter_mut().zip(rows) {
            target.copy_from_slice(row);
        }
        Self::new(direct)
    }

    pub fn cubic(side: f64) -> AnalysisResult<Self> {
        Self::new([[side, 0.0, 0.0], [0.0, side, 0.0], [0.0, 0.0, side]])
    }

    pub fn direct(&self) -> &Matrix3 {
        &self.direct
    }

    pub fn inverse(&self) -> &Matrix3 {
        &self.inverse
    }

    pub fn volume(&self) -> f64 {
        determinant3(&self.direct).abs()
    }

    pub fn a_vector(&self) -> Vec3 {
        self.direct[0]
    }

    pub fn b_vector(&self) -> Vec3 {
        self.direct[1]
    }

    pub fn c_vector(&self) -> Vec3 {
        self.direct[2]
    }

    pub fn to_fractional(&self, position: Vec3) -> Vec3 {
        vec_mat3(position, &self.inverse)
    }

    pub fn to_real(&self, fractional: Vec3) -> Vec3 {
        vec_mat3(fractional, &self.direct)
    }

    /// Distance between opposite faces along each cell axis.
    pub fn plane_spacings(&self) -> Vec3 {
        let mut spacings = [0.0; 3];
        for (axis, spacing) in spacings.iter_mut().enumerate() {
            let column = [
                self.inverse[0][axis],
                self.inverse[1][axis],
                self.inverse[2][axis],
            ];
            *spacing = 1.0 / norm(column);
        }
        spacings
    }

    /// Half of the smallest plane spacing.
    pub fn minimum_half_width(&self) -> f64 {
        self.plane_spacings().into_iter().fold(f64::INFINITY, f64::min) / 2.0
    }

    pub fn half_diagonal(&self) -> f64 {
        norm(add(add(self.direct[0], self.direct[1]), self.direct[2])) / 2.0
    }

    /// Cell images needed along each axis to circumscribe a sphere of `radius`.
    pub fn replication_counts(&self, radius: f64) -> [usize; 3] {
        self.plane_spacings()
            .map(|spacing| (radius.max(0.0) / spacing).ceil() as usize)
    }

    /// Shortest periodic representative of a displacement.
    pub fn min_image(&self, displacement: Vec3) -> Vec3 {
        let fractional = self.to_fractional(displacement).map(|s| s - s.round());
        self.to_real(fractional)
    }

    /// Position folded into the primary image `[0, 1)` in fractional space.
    pub fn fold(&self, position: Vec3) -> Vec3 {
        let fractional = self.to_fractional(position).map(|s| s - s.floor());
        self.to_real(fractional)
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.direct.iter().map(|row| row.to_vec()).collect()
    }
}

impl PartialEq for UnitCell {
    fn eq(&self, other: &Self) -> bool {
        self.direct
            .iter()
            .flatten()
            .zip(other.direct.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= UNIT_CELL_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::UnitCell;
    use crate::domain::ErrorKind;

    #[test]
    fn cell_shape_is_checked() {
        let error = UnitCell::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).expect_err("2x2");
        assert_eq!(error.kind(), ErrorKind::InconsistentChemicalSystem);
        let error = UnitCell::from_rows(&[vec![1.0, 0.0, 0.0], vec![2.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]])
            .expect_err("singular");
        assert_eq!(error.placeholder(), "INPUT.UNIT_CELL");
    }

    #[test]
    fn triclinic_cell_geometry() {
        let cell = UnitCell::new([[2.0, 0.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 3.0]]).expect("cell");
        assert!((cell.volume() - 12.0).abs() < 1e-12);
        assert_eq!(cell.b_vector(), [1.0, 2.0, 0.0]);
        let fractional = cell.to_fractional([1.5, 1.0, 1.5]);
        let back = cell.to_real(fractional);
        for axis in 0..3 {
            assert!((back[axis] - [1.5, 1.0, 1.5][axis]).abs() < 1e-12);
        }
        let spacings = cell.plane_spacings();
        assert!((spacings[1] - 2.0).abs() < 1e-12);
        assert!((spacings[2] - 3.0).abs() < 1e-12);
        assert_eq!(cell.replication_counts(2.5), [2, 2, 1]);
    }

    #[test]
    fn min_image_and_fold_follow_the_cell() {
        let cell = UnitCell::cubic(10.0).expect("cell");
        let image = cell.min_image([8.0, -6.0, 4.0]);
        assert!((image[0] + 2.0).abs() < 1e-12);
        assert!((image[1] - 4.0).abs() < 1e-12);
        assert!((image[2] - 4.0).abs() < 1e-12);
        let folded = cell.fold([-1.0, 12.0, 5.0]);
        assert!((folded[0] - 9.0).abs() < 1e-12);
        assert!((folded[1] - 2.0).abs() < 1e-12);
        assert!((cell.half_diagonal() - 75.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn equality_uses_a_tolerance() {
        let a = UnitCell::cubic(1.0).expect("a");
        let b = UnitCell::new([[1.0 + 1e-12, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]).expect("b");
        let c = UnitCell::cubic(1.001).expect("c");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
