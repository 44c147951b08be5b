//! Procedural trajectory: a lattice modulated by a plane wave.
//!
//! Atom `i` sits at `r0_i + A e cos(k · r0_i - ω t)` and moves with the
//! matching analytic velocity, so analyses can be checked against closed
//! forms without any file on disk.

use super::TrajectoryReader;
use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem};
use crate::configuration::{COORDINATES, UnitCell, VELOCITIES};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::numerics::linalg::{add, dot, scale};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_name() -> String {
    "mock".to_string()
}

fn default_basis() -> Vec<Vec3> {
    vec![[0.0; 3]]
}

fn default_polarization() -> Vec3 {
    [1.0, 0.0, 0.0]
}

fn default_periodic() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockTrajectorySpec {
    #[serde(default = "default_name")]
    pub name: String,
    pub element: String,
    /// Cubic lattice constant in nm.
    pub lattice_constant: f64,
    pub repeats: [usize; 3],
    /// Fractional positions inside one lattice cell.
    #[serde(default = "default_basis")]
    pub basis: Vec<Vec3>,
    pub n_frames: usize,
    /// ps
    pub time_step: f64,
    /// nm
    #[serde(default)]
    pub amplitude: f64,
    /// 1/nm
    #[serde(default)]
    pub wave_vector: Vec3,
    /// rad/ps
    #[serde(default)]
    pub frequency: f64,
    #[serde(default = "default_polarization")]
    pub polarization: Vec3,
    #[serde(default = "default_periodic")]
    pub periodic: bool,
}

#[derive(Debug, Clone)]
pub struct MockTrajectory {
    spec: MockTrajectorySpec,
    system: ChemicalSystem,
    lattice: Vec<Vec3>,
    times: Vec<f64>,
    cell: UnitCell,
    source: String,
}

fn mock_error(message: impl Into<String>) -> AnalysisError {
    AnalysisError::job("JOB.MOCK_TRAJECTORY", message)
}

impl MockTrajectory {
    pub fn new(spec: MockTrajectorySpec, databases: &Databases) -> AnalysisResult<Self> {
        if spec.n_frames == 0 {
            return Err(mock_error("a mock trajectory needs at least one frame"));
        }
        if spec.repeats.contains(&0) || spec.basis.is_empty() {
            return Err(mock_error("a mock lattice needs at least one atom"));
        }
        if spec.lattice_constant <= 0.0 || spec.time_step <= 0.0 {
            return Err(mock_error("lattice constant and time step must be positive"));
        }
        let [nx, ny, nz] = spec.repeats;
        let cell = UnitCell::new([
            [spec.lattice_constant * nx as f64, 0.0, 0.0],
            [0.0, spec.lattice_constant * ny as f64, 0.0],
            [0.0, 0.0, spec.lattice_constant * nz as f64],
        ])?;
        let mut lattice = Vec::with_capacity(nx * ny * nz * spec.basis.len());
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    for site in &spec.basis {
                        let offset = [i as f64 + site[0], j as f64 + site[1], k as f64 + site[2]];
                        lattice.push(scale(offset, spec.lattice_constant));
                    }
                }
            }
        }
        let mut system = ChemicalSystem::new(spec.name.clone());
        for index in 0..lattice.len() {
            let name = format!("{}{}", spec.element, index + 1);
            system.add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new(&spec.element, &name)), databases)?;
        }
        let times = (0..spec.n_frames).map(|f| f as f64 * spec.time_step).collect();
        Ok(Self {
            source: format!("mock:{}", spec.name),
            spec,
            system,
            lattice,
            times,
            cell,
        })
    }

    pub fn from_file(path: &Path, databases: &Databases) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            AnalysisError::io("IO.READ", format!("{}: {error}", path.display()))
        })?;
        let spec: MockTrajectorySpec = serde_json::from_str(&text).map_err(|error| {
            AnalysisError::corrupted("IO.MOCK_TRAJECTORY", format!("{}: {error}", path.display()))
        })?;
        let mut trajectory = Self::new(spec, databases)?;
        trajectory.source = path.display().to_string();
        Ok(trajectory)
    }

    pub fn spec(&self) -> &MockTrajectorySpec {
        &self.spec
    }

    /// Equilibrium lattice positions.
    pub fn lattice(&self) -> &[Vec3] {
        &self.lattice
    }

    fn phase(&self, site: Vec3, frame: usize) -> f64 {
        dot(self.spec.wave_vector, site) - self.spec.frequency * self.times[frame]
    }

    fn position(&self, atom: usize, frame: usize) -> Vec3 {
        let site = self.lattice[atom];
        let displacement = self.spec.amplitude * self.phase(site, frame).cos();
        add(site, scale(self.spec.polarization, displacement))
    }

    fn velocity(&self, atom: usize, frame: usize) -> Vec3 {
        let site = self.lattice[atom];
        let speed = self.spec.amplitude * self.spec.frequency * self.phase(site, frame).sin();
        scale(self.spec.polarization, speed)
    }

    fn value(&self, name: &str, atom: usize, frame: usize) -> AnalysisResult<Vec3> {
        match name {
            COORDINATES => Ok(self.position(atom, frame)),
            VELOCITIES => Ok(self.velocity(atom, frame)),
            other => Err(AnalysisError::trajectory(
                "TRAJECTORY.MISSING_VARIABLE",
                format!("mock trajectory has no variable '{other}'"),
            )),
        }
    }
}

impl TrajectoryReader for MockTrajectory {
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
        self.spec.periodic
    }

    fn variable_names(&self) -> Vec<String> {
        vec![COORDINATES.to_string(), VELOCITIES.to_string()]
    }

    fn read_variable(&self, name: &str, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        (0..self.lattice.len())
            .map(|atom| self.value(name, atom, frame))
            .collect()
    }

    fn read_unit_cell(&self, _frame: usize) -> AnalysisResult<Option<UnitCell>> {
        Ok(self.spec.periodic.then_some(self.cell))
    }

    fn read_atom_series(&self, name: &str, atom: usize, frames: &[usize]) -> AnalysisResult<Vec<Vec3>> {
        if atom >= self.lattice.len() {
            return Err(super::atom_error(atom, self.lattice.len()));
        }
        frames.iter().map(|&frame| self.value(name, atom, frame)).collect()
    }

    fn source(&self) -> String {
        self.source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{MockTrajectory, MockTrajectorySpec};
    use crate::database::Databases;
    use crate::trajectory::{Trajectory, TrajectoryReader};
    use std::sync::Arc;

    fn spec() -> MockTrajectorySpec {
        serde_json::from_value(serde_json::json!({
            "element": "Ar",
            "lattice_constant": 0.5,
            "repeats": [2, 2, 2],
            "n_frames": 8,
            "time_step": 0.1,
            "amplitude": 0.02,
            "wave_vector": [6.283185307179586, 0.0, 0.0],
            "frequency": 3.0
        }))
        .expect("spec")
    }

    #[test]
    fn lattice_is_built_in_order_with_a_cubic_cell() {
        let databases = Databases::builtin().expect("databases");
        let mock = MockTrajectory::new(spec(), &databases).expect("mock");
        assert_eq!(mock.chemical_system().total_number_of_atoms(), 8);
        assert_eq!(mock.lattice()[1], [0.0, 0.0, 0.5]);
        let cell = mock.read_unit_cell(3).expect("cell").expect("periodic");
        assert!((cell.volume() - 1.0).abs() < 1e-12);
        assert_eq!(mock.chemical_system().atoms()[7].name, "Ar8");
    }

    #[test]
    fn velocities_match_the_derivative_of_positions() {
        let databases = Databases::builtin().expect("databases");
        let trajectory = Trajectory::new(Arc::new(MockTrajectory::new(spec(), &databases).expect("mock")));
        let x = trajectory.read_configuration_trajectory(5, 0, 8, 1, "coordinates").expect("x");
        let v = trajectory.read_configuration_trajectory(5, 0, 8, 1, "velocities").expect("v");
        let dt = trajectory.md_time_step();
        for t in 1..7 {
            let derivative = (x[t + 1][0] - x[t - 1][0]) / (2.0 * dt);
            assert!((derivative - v[t][0]).abs() < 2e-3);
        }
        assert!(trajectory.variable("gradients", 0).is_err());
    }

    #[test]
    fn zero_frames_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        let mut spec = spec();
        spec.n_frames = 0;
        assert!(MockTrajectory::new(spec, &databases).is_err());
    }
}
