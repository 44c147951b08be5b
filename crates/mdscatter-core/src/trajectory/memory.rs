use super::{TrajectoryReader, atom_error};
use crate::chemistry::ChemicalSystem;
use crate::configuration::{COORDINATES, UnitCell};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use std::collections::BTreeMap;

/// Fully loaded trajectory, used for small imports and in tests.
#[derive(Debug, Clone)]
pub struct MemoryTrajectory {
    system: ChemicalSystem,
    times: Vec<f64>,
    cells: Option<Vec<UnitCell>>,
    variables: BTreeMap<String, Vec<Vec<Vec3>>>,
    source: String,
}

fn shape_error(message: impl Into<String>) -> AnalysisError {
    AnalysisError::trajectory("TRAJECTORY.SHAPE", message)
}

impl MemoryTrajectory {
    pub fn new(
        system: ChemicalSystem,
        times: Vec<f64>,
        coordinates: Vec<Vec<Vec3>>,
        cells: Option<Vec<UnitCell>>,
    ) -> AnalysisResult<Self> {
        if let Some(cells) = &cells {
            if cells.len() != times.len() {
                return Err(shape_error(format!(
                    "{} unit cells for {} frames",
                    cells.len(),
                    times.len()
                )));
            }
        }
        let trajectory = Self {
            system,
            times,
            cells,
            variables: BTreeMap::new(),
            source: "memory".to_string(),
        };
        trajectory.with_variable(COORDINATES, coordinates)
    }

    pub fn with_variable(mut self, name: &str, frames: Vec<Vec<Vec3>>) -> AnalysisResult<Self> {
        if frames.len() != self.times.len() {
            return Err(shape_error(format!(
                "variable '{name}' has {} frames, expected {}",
                frames.len(),
                self.times.len()
            )));
        }
        let n_atoms = self.system.total_number_of_atoms();
        if let Some(frame) = frames.iter().position(|values| values.len() != n_atoms) {
            return Err(shape_error(format!(
                "frame {frame} of '{name}' has {} atoms, expected {n_atoms}",
                frames[frame].len()
            )));
        }
        self.variables.insert(name.to_string(), frames);
        Ok(self)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    fn frames(&self, name: &str) -> AnalysisResult<&[Vec<Vec3>]> {
        self.variables.get(name).map(Vec::as_slice).ok_or_else(|| {
            AnalysisError::trajectory(
                "TRAJECTORY.MISSING_VARIABLE",
                format!("trajectory has no variable '{name}'"),
            )
        })
    }
}

impl TrajectoryReader for MemoryTrajectory {
    fn chemical_system(&self) -> &ChemicalSystem {
        &self.system
    }

    fn len(&self) -> usize {
        self.times.len()
    }

    fn times(&self) -> &[f64] {
        &self.times
    }

    fn is_periodic(&self) -> bool {
        self.cells.is_some()
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn read_variable(&self, name: &str, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        Ok(self.frames(name)?[frame].clone())
    }

    fn read_unit_cell(&self, frame: usize) -> AnalysisResult<Option<UnitCell>> {
        Ok(self.cells.as_ref().map(|cells| cells[frame]))
    }

    fn read_atom_series(&self, name: &str, atom: usize, frames: &[usize]) -> AnalysisResult<Vec<Vec3>> {
        let stored = self.frames(name)?;
        frames
            .iter()
            .map(|&frame| {
                stored[frame]
                    .get(atom)
                    .copied()
                    .ok_or_else(|| atom_error(atom, stored[frame].len()))
            })
            .collect()
    }

    fn source(&self) -> String {
        self.source.clone()
    }
}
