//! Per-frame coordinate containers bound to a chemical system.

pub mod unit_cell;

pub use unit_cell::{UNIT_CELL_TOLERANCE, UnitCell};

use crate::chemistry::{AtomId, ChemicalSystem};
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use crate::numerics::linalg::{add, sub};
use std::collections::{BTreeMap, VecDeque};

pub const COORDINATES: &str = "coordinates";
pub const VELOCITIES: &str = "velocities";
pub const GRADIENTS: &str = "gradients";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationKind {
    Real,
    PeriodicReal,
    /// Fractional coordinates in a periodic cell.
    PeriodicBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    kind: ConfigurationKind,
    unit_cell: Option<UnitCell>,
    variables: BTreeMap<String, Vec<Vec3>>,
}

fn configuration_error(message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(
        ErrorKind::InconsistentChemicalSystem,
        "INPUT.CONFIGURATION",
        message,
    )
}

impl Configuration {
    pub fn real(coordinates: Vec<Vec3>) -> Self {
        Self::with_kind(ConfigurationKind::Real, None, coordinates)
    }

    pub fn periodic_real(coordinates: Vec<Vec3>, unit_cell: UnitCell) -> Self {
        Self::with_kind(ConfigurationKind::PeriodicReal, Some(unit_cell), coordinates)
    }

    pub fn periodic_box(fractional: Vec<Vec3>, unit_cell: UnitCell) -> Self {
        Self::with_kind(ConfigurationKind::PeriodicBox, Some(unit_cell), fractional)
    }

    /// Real configuration, periodic when a cell is given.
    pub fn from_coordinates(coordinates: Vec<Vec3>, unit_cell: Option<UnitCell>) -> Self {
        match unit_cell {
            Some(cell) => Self::periodic_real(coordinates, cell),
            None => Self::real(coordinates),
        }
    }

    fn with_kind(kind: ConfigurationKind, unit_cell: Option<UnitCell>, coordinates: Vec<Vec3>) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert(COORDINATES.to_string(), coordinates);
        Self {
            kind,
            unit_cell,
            variables,
        }
    }

    pub fn kind(&self) -> ConfigurationKind {
        self.kind
    }

    pub fn is_periodic(&self) -> bool {
        self.unit_cell.is_some()
    }

    pub fn unit_cell(&self) -> Option<&UnitCell> {
        self.unit_cell.as_ref()
    }

    pub fn number_of_atoms(&self) -> usize {
        self.coordinates().len()
    }

    pub fn coordinates(&self) -> &[Vec3] {
        self.variables
            .get(COORDINATES)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn variable(&self, name: &str) -> AnalysisResult<&[Vec3]> {
        self.variables.get(name).map(Vec::as_slice).ok_or_else(|| {
            AnalysisError::trajectory(
                "TRAJECTORY.MISSING_VARIABLE",
                format!("configuration has no variable '{name}'"),
            )
        })
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn set_variable(&mut self, name: &str, values: Vec<Vec3>) -> AnalysisResult<()> {
        if values.len() != self.number_of_atoms() {
            return Err(configuration_error(format!(
                "variable '{name}' has {} rows for {} atoms",
                values.len(),
                self.number_of_atoms()
            )));
        }
        self.variables.insert(name.to_string(), values);
        Ok(())
    }

    /// Cartesian coordinates regardless of the storage convention.
    pub fn real_coordinates(&self) -> Vec<Vec3> {
        match (self.kind, &self.unit_cell) {
            (ConfigurationKind::PeriodicBox, Some(cell)) => self
                .coordinates()
                .iter()
                .map(|&s| cell.to_real(s))
                .collect(),
            _ => self.coordinates().to_vec(),
        }
    }

    /// Wraps every atom into the primary image; no-op without a cell.
    pub fn fold_coordinates(&mut self) {
        let Some(cell) = self.unit_cell else {
            return;
        };
        let kind = self.kind;
        if let Some(coordinates) = self.variables.get_mut(COORDINATES) {
            for position in coordinates.iter_mut() {
                *position = match kind {
                    ConfigurationKind::PeriodicBox => position.map(|s| s - s.floor()),
                    _ => cell.fold(*position),
                };
            }
        }
    }

    pub fn to_real_configuration(&self) -> Self {
        if self.kind != ConfigurationKind::PeriodicBox {
            return self.clone();
        }
        let mut real = self.clone();
        real.kind = ConfigurationKind::PeriodicReal;
        real.variables
            .insert(COORDINATES.to_string(), self.real_coordinates());
        real
    }

    /// Fractional counterpart of a periodic real configuration.
    pub fn to_box_configuration(&self) -> AnalysisResult<Self> {
        let cell = self
            .unit_cell
            .ok_or_else(|| configuration_error("a non-periodic configuration has no box coordinates"))?;
        if self.kind == ConfigurationKind::PeriodicBox {
            return Ok(self.clone());
        }
        let mut boxed = self.clone();
        boxed.kind = ConfigurationKind::PeriodicBox;
        let fractional = self
            .coordinates()
            .iter()
            .map(|&r| cell.to_fractional(r))
            .collect();
        boxed.variables.insert(COORDINATES.to_string(), fractional);
        Ok(boxed)
    }

    /// Real configuration whose bonded fragments do not straddle cell
    /// boundaries.
    pub fn continuous_configuration(&self, system: &ChemicalSystem) -> AnalysisResult<Self> {
        self.check_system(system)?;
        let mut continuous = self.to_real_configuration();
        if let Some(cell) = &self.unit_cell {
            let coordinates = contiguous_coordinates(system, &continuous.real_coordinates(), cell);
            continuous
                .variables
                .insert(COORDINATES.to_string(), coordinates);
        }
        Ok(continuous)
    }

    /// Copy bound to another system with the same number of atoms.
    pub fn clone_for(&self, system: &ChemicalSystem) -> AnalysisResult<Self> {
        self.check_system(system)?;
        Ok(self.clone())
    }

    pub fn check_system(&self, system: &ChemicalSystem) -> AnalysisResult<()> {
        if system.total_number_of_atoms() != self.number_of_atoms() {
            return Err(configuration_error(format!(
                "configuration holds {} atoms but '{}' has {}",
                self.number_of_atoms(),
                system.name(),
                system.total_number_of_atoms()
            )));
        }
        Ok(())
    }
}

/// Breadth-first walk over bonds from the lowest index of every fragment,
/// moving each neighbour to the image nearest its parent.
pub fn contiguous_coordinates(system: &ChemicalSystem, coordinates: &[Vec3], cell: &UnitCell) -> Vec<Vec3> {
    let mut result = coordinates.to_vec();
    let mut visited = vec![false; coordinates.len()];
    let mut queue = VecDeque::new();
    for start in 0..coordinates.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for neighbor in system.bonded_neighbors(AtomId(current)) {
                let index = neighbor.0;
                if index >= coordinates.len() || visited[index] {
                    continue;
                }
                visited[index] = true;
                let shift = cell.min_image(sub(coordinates[index], result[current]));
                result[index] = add(result[current], shift);
                queue.push_back(index);
            }
        }
    }
    result
}
