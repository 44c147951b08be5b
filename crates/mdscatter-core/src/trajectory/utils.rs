//! Trajectory post-processing: periodic unfolding and rigid-body fits.

use super::{Trajectory, frame_indices};
use crate::chemistry::{AtomId, fit_quaternion};
use crate::configuration::{COORDINATES, UnitCell, contiguous_coordinates};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::numerics::linalg::{Matrix3, add, quaternion_to_rotation, sub};

fn wrap(delta: f64) -> f64 {
    delta - delta.round()
}

/// Removes jumps across periodic boundaries from a fractional series:
/// `u[t + 1] = u[t] + wrap(s[t + 1] - u[t])`.
pub fn unfold_fractional(series: &[Vec3]) -> Vec<Vec3> {
    let mut unfolded: Vec<Vec3> = Vec::with_capacity(series.len());
    for &value in series {
        let next = match unfolded.last() {
            Some(previous) => {
                let delta = sub(value, *previous);
                add(*previous, delta.map(wrap))
            }
            None => value,
        };
        unfolded.push(next);
    }
    unfolded
}

/// Unfolds real positions with per-frame cells. Without a cell for every
/// frame the positions are returned as stored.
pub fn unfold_positions(positions: &[Vec3], cells: &[Option<UnitCell>], box_coordinates: bool) -> Vec<Vec3> {
    let cells: Option<Vec<&UnitCell>> = cells.iter().map(Option::as_ref).collect();
    let Some(cells) = cells else {
        return positions.to_vec();
    };
    let fractional: Vec<Vec3> = positions
        .iter()
        .zip(&cells)
        .map(|(position, cell)| cell.to_fractional(*position))
        .collect();
    let unfolded = unfold_fractional(&fractional);
    if box_coordinates {
        return unfolded;
    }
    unfolded
        .iter()
        .zip(&cells)
        .map(|(value, cell)| cell.to_real(*value))
        .collect()
}

/// Per-frame rigid-body motion of an atom set relative to a reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyTrajectory {
    pub frames: Vec<usize>,
    /// Unfolded centre of mass.
    pub centers: Vec<Vec3>,
    /// `(w, x, y, z)` rotations taking the reference onto each frame.
    pub quaternions: Vec<[f64; 4]>,
    pub rotations: Vec<Matrix3>,
    /// Weighted RMS residual of each fit.
    pub fits: Vec<f64>,
}

#[derive(Debug)]
pub struct RigidBodyTrajectoryGenerator<'a> {
    trajectory: &'a Trajectory,
    atoms: Vec<AtomId>,
    reference: usize,
    database: &'a AtomDatabase,
}

impl<'a> RigidBodyTrajectoryGenerator<'a> {
    pub fn new(
        trajectory: &'a Trajectory,
        atoms: Vec<AtomId>,
        reference: usize,
        database: &'a AtomDatabase,
    ) -> AnalysisResult<Self> {
        trajectory.check_frame(reference)?;
        if atoms.is_empty() {
            return Err(AnalysisError::job(
                "JOB.RIGID_BODY",
                "rigid-body fit of an empty atom set",
            ));
        }
        Ok(Self {
            trajectory,
            atoms,
            reference,
            database,
        })
    }

    fn positions(&self, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        let reader = self.trajectory.reader();
        let coordinates = reader.read_variable(COORDINATES, frame)?;
        let coordinates = match reader.read_unit_cell(frame)? {
            Some(cell) => contiguous_coordinates(reader.chemical_system(), &coordinates, &cell),
            None => coordinates,
        };
        Ok(self.atoms.iter().map(|id| coordinates[id.0]).collect())
    }

    pub fn generate(&self, first: usize, last: usize, step: usize) -> AnalysisResult<RigidBodyTrajectory> {
        let frames = frame_indices(first, last, step, self.trajectory.len())?;
        let system = self.trajectory.chemical_system();
        let masses = system.masses(&self.atoms, self.database)?;
        let reference = self.positions(self.reference)?;

        let mut result = RigidBodyTrajectory {
            frames: frames.clone(),
            centers: Vec::with_capacity(frames.len()),
            quaternions: Vec::with_capacity(frames.len()),
            rotations: Vec::with_capacity(frames.len()),
            fits: Vec::with_capacity(frames.len()),
        };
        let mut cells = Vec::with_capacity(frames.len());
        for &frame in &frames {
            let current = self.positions(frame)?;
            let fit = fit_quaternion(&reference, &current, &masses)
                .map_err(|error| AnalysisError::job("JOB.RIGID_BODY", error.to_string()))?;
            result.centers.push(fit.center);
            result.quaternions.push(fit.quaternion);
            result.rotations.push(quaternion_to_rotation(fit.quaternion));
            result.fits.push(fit.fit);
            cells.push(self.trajectory.reader().read_unit_cell(frame)?);
        }
        result.centers = unfold_positions(&result.centers, &cells, false);
        tracing::debug!(
            atoms = self.atoms.len(),
            frames = frames.len(),
            "rigid-body trajectory generated"
        );
        Ok(result)
    }
}
