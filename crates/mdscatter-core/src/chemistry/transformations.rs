//! Rigid-body superposition of two configurations of one system.
//!
//! The optimal rotation comes from the quaternion formulation: for weighted
//! centred positions `a` (reference) and `b` (current), with `m = a - b` and
//! `p = a + b`, the eigenvector of the smallest eigenvalue of the 4x4 matrix
//! `K = Σ w K(m, p)` is the unit quaternion `q` minimising `Σ w |R(q) a - b|²`,
//! and that eigenvalue is the weighted residual.

use super::system::{AtomId, ChemicalSystem};
use crate::configuration::Configuration;
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use crate::numerics::linalg::{
    DenseMatrix, EigenError, Matrix3, add, mat_vec3, quaternion_to_rotation, scale, sub,
    symmetric_eigen, transpose3,
};

/// Principal-axes orientations accepted by [`normalizing_transformation`].
pub const REPRESENTATIONS: [&str; 6] = ["Ir", "IIr", "IIIr", "Il", "IIl", "IIIl"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionFit {
    /// `(w, x, y, z)` with `w >= 0`.
    pub quaternion: [f64; 4],
    pub reference_center: Vec3,
    pub center: Vec3,
    /// Weighted root-mean-square residual.
    pub fit: f64,
}

/// Affine map `x -> rotation · x + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransformation {
    pub rotation: Matrix3,
    pub translation: Vec3,
}

impl RigidTransformation {
    pub fn apply(&self, position: Vec3) -> Vec3 {
        add(mat_vec3(&self.rotation, position), self.translation)
    }
}

/// Weighted centre; weights need not be normalised.
pub fn weighted_center(positions: &[Vec3], weights: &[f64]) -> Vec3 {
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return [0.0; 3];
    }
    let mut center = [0.0; 3];
    for (position, weight) in positions.iter().zip(weights) {
        center = add(center, scale(*position, *weight));
    }
    scale(center, 1.0 / total)
}

/// Best-fit rotation taking `reference` onto `current` after removing both
/// weighted centres.
pub fn fit_quaternion(
    reference: &[Vec3],
    current: &[Vec3],
    weights: &[f64],
) -> Result<QuaternionFit, EigenError> {
    let total: f64 = weights.iter().sum();
    let reference_center = weighted_center(reference, weights);
    let center = weighted_center(current, weights);
    let mut k = [[0.0; 4]; 4];
    for ((a, b), weight) in reference.iter().zip(current).zip(weights) {
        let w = if total > 0.0 { weight / total } else { 0.0 };
        let a = sub(*a, reference_center);
        let b = sub(*b, center);
        let [mx, my, mz] = sub(a, b);
        let [px, py, pz] = add(a, b);
        k[0][0] += w * (mx * mx + my * my + mz * mz);
        k[0][1] += w * (py * mz - my * pz);
        k[0][2] += w * (mx * pz - px * mz);
        k[0][3] += w * (px * my - mx * py);
        k[1][1] += w * (mx * mx + py * py + pz * pz);
        k[1][2] += w * (mx * my - px * py);
        k[1][3] += w * (mx * mz - px * pz);
        k[2][2] += w * (my * my + px * px + pz * pz);
        k[2][3] += w * (my * mz - py * pz);
        k[3][3] += w * (mz * mz + px * px + py * py);
    }
    for row in 1..4 {
        for col in 0..row {
            k[row][col] = k[col][row];
        }
    }

    let mut matrix = DenseMatrix::zeros(4, 4);
    for (row, values) in k.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            matrix[(row, col)] = *value;
        }
    }
    let eigen = symmetric_eigen(&matrix)?;
    let smallest = eigen.values()[0];
    let vector = eigen.vector(0);
    let length = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    let sign = if vector[0] < 0.0 { -1.0 } else { 1.0 };
    let quaternion = [0, 1, 2, 3].map(|i| sign * vector[i] / length);
    Ok(QuaternionFit {
        quaternion,
        reference_center,
        center,
        fit: smallest.max(0.0).sqrt(),
    })
}

fn periodic_error() -> AnalysisError {
    AnalysisError::new(
        ErrorKind::InconsistentChemicalSystem,
        "INPUT.PERIODIC_TRANSFORMATION",
        "rigid transformations require a non-periodic configuration",
    )
}

fn selected(
    system: &ChemicalSystem,
    atoms: &[AtomId],
    configuration: &Configuration,
) -> AnalysisResult<Vec<Vec3>> {
    if configuration.is_periodic() {
        return Err(periodic_error());
    }
    configuration.check_system(system)?;
    let coordinates = configuration.coordinates();
    atoms
        .iter()
        .map(|id| {
            system.atom(*id)?;
            Ok(coordinates[id.0])
        })
        .collect()
}

fn eigen_error(error: EigenError) -> AnalysisError {
    AnalysisError::new(ErrorKind::Internal, "INTERNAL.EIGEN", error.to_string())
}

/// Mass-weighted quaternion fit of `atoms` in `configuration` against
/// `reference`; the quaternion rotates the reference onto the configuration.
pub fn find_transformation_as_quaternion(
    system: &ChemicalSystem,
    atoms: &[AtomId],
    configuration: &Configuration,
    reference: &Configuration,
    database: &AtomDatabase,
) -> AnalysisResult<QuaternionFit> {
    let current = selected(system, atoms, configuration)?;
    let reference = selected(system, atoms, reference)?;
    let masses = system.masses(atoms, database)?;
    fit_quaternion(&reference, &current, &masses).map_err(eigen_error)
}

/// Transformation that superposes `configuration` onto `reference`, and the
/// residual of the fit.
pub fn find_transformation(
    system: &ChemicalSystem,
    atoms: &[AtomId],
    configuration: &Configuration,
    reference: &Configuration,
    database: &AtomDatabase,
) -> AnalysisResult<(RigidTransformation, f64)> {
    let fit = find_transformation_as_quaternion(system, atoms, configuration, reference, database)?;
    let rotation = transpose3(&quaternion_to_rotation(fit.quaternion));
    let translation = sub(fit.reference_center, mat_vec3(&rotation, fit.center));
    Ok((
        RigidTransformation {
            rotation,
            translation,
        },
        fit.fit,
    ))
}

/// Moves the centre of mass to the origin and aligns the principal axes of
/// inertia with x, y, z according to `representation` (default `IIIr`).
pub fn normalizing_transformation(
    system: &ChemicalSystem,
    atoms: &[AtomId],
    configuration: &Configuration,
    representation: Option<&str>,
    database: &AtomDatabase,
) -> AnalysisResult<RigidTransformation> {
    let representation = representation.unwrap_or("IIIr");
    if !REPRESENTATIONS.contains(&representation) {
        return Err(AnalysisError::new(
            ErrorKind::InvalidChemicalEntity,
            "INPUT.REPRESENTATION",
            format!(
                "unknown representation '{representation}', expected one of {}",
                REPRESENTATIONS.join(", ")
            ),
        ));
    }
    let positions = selected(system, atoms, configuration)?;
    let masses = system.masses(atoms, database)?;
    let center = weighted_center(&positions, &masses);

    let mut inertia = DenseMatrix::zeros(3, 3);
    for (position, mass) in positions.iter().zip(&masses) {
        let r = sub(*position, center);
        let r2 = r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
        for row in 0..3 {
            for col in 0..3 {
                let delta = if row == col { r2 } else { 0.0 };
                inertia[(row, col)] += mass * (delta - r[row] * r[col]);
            }
        }
    }
    let eigen = symmetric_eigen(&inertia).map_err(eigen_error)?;
    let axis = |index: usize| -> Vec3 {
        let v = eigen.vector(index);
        [v[0], v[1], v[2]]
    };
    let (a, b, c) = (axis(0), axis(1), axis(2));
    let (x, y) = match representation.trim_end_matches(['r', 'l']) {
        "I" => (b, c),
        "II" => (c, a),
        _ => (a, b),
    };
    let mut z = crate::numerics::linalg::cross(x, y);
    if representation.ends_with('l') {
        z = scale(z, -1.0);
    }
    let rotation = [x, y, z];
    Ok(RigidTransformation {
        rotation,
        translation: scale(mat_vec3(&rotation, center), -1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::{fit_quaternion, find_transformation, normalizing_transformation};
    use crate::chemistry::{AtomId, AtomSpec, ChemicalEntity, ChemicalSystem};
    use crate::configuration::{Configuration, UnitCell};
    use crate::database::Databases;
    use crate::domain::ErrorKind;
    use crate::numerics::linalg::{determinant3, mat_vec3, quaternion_to_rotation};

    fn normalized(q: [f64; 4]) -> [f64; 4] {
        let n = q.iter().map(|v| v * v).sum::<f64>().sqrt();
        q.map(|v| v / n)
    }

    #[test]
    fn recovers_a_known_rotation() {
        let reference = vec![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0], [1.0, 1.0, 1.0]];
        let q = normalized([0.9, 0.1, -0.3, 0.2]);
        let rotation = quaternion_to_rotation(q);
        let shift = [5.0, -2.0, 1.0];
        let current: Vec<_> = reference
            .iter()
            .map(|&r| {
                let rotated = mat_vec3(&rotation, r);
                [rotated[0] + shift[0], rotated[1] + shift[1], rotated[2] + shift[2]]
            })
            .collect();
        let fit = fit_quaternion(&reference, &current, &[1.0, 2.0, 1.0, 1.0]).expect("fit");
        for i in 0..4 {
            assert!((fit.quaternion[i] - q[i]).abs() < 1e-9, "{:?}", fit.quaternion);
        }
        assert!(fit.fit < 1e-7);
    }

    fn triangle() -> (ChemicalSystem, Databases) {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("triangle");
        system
            .add_chemical_entity(
                ChemicalEntity::AtomCluster {
                    name: "tri".to_string(),
                    atoms: vec![
                        AtomSpec::new("C", "C1"),
                        AtomSpec::new("O", "O1"),
                        AtomSpec::new("N", "N1"),
                    ],
                },
                &databases,
            )
            .expect("cluster");
        (system, databases)
    }

    #[test]
    fn transformation_superposes_configurations() {
        let (system, databases) = triangle();
        let atoms = [AtomId(0), AtomId(1), AtomId(2)];
        let reference = Configuration::real(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        let moved = Configuration::real(vec![[1.0, 1.0, 1.0], [1.0, 2.0, 1.0], [-1.0, 1.0, 1.0]]);
        let (transformation, rms) =
            find_transformation(&system, &atoms, &moved, &reference, &databases.atoms)
                .expect("transformation");
        assert!(rms < 1e-7);
        for (moved, target) in moved.coordinates().iter().zip(reference.coordinates()) {
            let mapped = transformation.apply(*moved);
            for axis in 0..3 {
                assert!((mapped[axis] - target[axis]).abs() < 1e-9);
            }
        }

        let periodic = Configuration::periodic_real(
            reference.coordinates().to_vec(),
            UnitCell::cubic(5.0).expect("cell"),
        );
        let error = find_transformation(&system, &atoms, &periodic, &reference, &databases.atoms)
            .expect_err("periodic");
        assert_eq!(error.kind(), ErrorKind::InconsistentChemicalSystem);
    }

    #[test]
    fn normalizing_transformation_honours_representation() {
        let (system, databases) = triangle();
        let atoms = [AtomId(0), AtomId(1), AtomId(2)];
        let configuration =
            Configuration::real(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        let right = normalizing_transformation(&system, &atoms, &configuration, None, &databases.atoms)
            .expect("IIIr");
        assert!((determinant3(&right.rotation) - 1.0).abs() < 1e-9);
        let left =
            normalizing_transformation(&system, &atoms, &configuration, Some("Il"), &databases.atoms)
                .expect("Il");
        assert!((determinant3(&left.rotation) + 1.0).abs() < 1e-9);

        let masses = system.masses(&atoms, &databases.atoms).expect("masses");
        let mut center = [0.0; 3];
        for (position, mass) in configuration.coordinates().iter().zip(&masses) {
            let mapped = right.apply(*position);
            for axis in 0..3 {
                center[axis] += mass * mapped[axis];
            }
        }
        assert!(center.iter().all(|value| value.abs() < 1e-9));

        let error =
            normalizing_transformation(&system, &atoms, &configuration, Some("IV"), &databases.atoms)
                .expect_err("invalid");
        assert_eq!(error.placeholder(), "INPUT.REPRESENTATION");
    }
}
