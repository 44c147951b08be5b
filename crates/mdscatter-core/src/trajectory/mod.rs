//! Random-access trajectories.
//!
//! Every storage backend implements [`TrajectoryReader`]; [`Trajectory`] is
//! the shared handle jobs hold, adding frame validation, configurations and
//! the unfolded atomic and centre-of-mass series.

pub mod container;
pub mod converter;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;
pub mod mock;
pub mod native;
pub mod utils;
pub mod writer;

pub use container::{Compression, ContainerError, ContainerReader, ContainerWriter, Dtype};
pub use converter::{ConversionSummary, Converter, ConverterOptions, XyzConverter};
pub use memory::MemoryTrajectory;
pub use mock::{MockTrajectory, MockTrajectorySpec};
pub use native::NativeTrajectory;
pub use utils::{RigidBodyTrajectory, RigidBodyTrajectoryGenerator, unfold_fractional, unfold_positions};
pub use writer::{ChunkingAxis, TrajectoryWriter, WriterOptions};

use crate::chemistry::{AtomId, ChemicalSystem};
use crate::configuration::{COORDINATES, Configuration, UnitCell, contiguous_coordinates};
use crate::database::{AtomDatabase, Databases};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Storage backend of a trajectory. Frame indices passed in are already
/// validated against [`TrajectoryReader::len`].
pub trait TrajectoryReader: Send + Sync + Debug {
    fn chemical_system(&self) -> &ChemicalSystem;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame times in ps.
    fn times(&self) -> &[f64];

    fn is_periodic(&self) -> bool;

    /// Per-atom variables stored for every frame, `coordinates` included.
    fn variable_names(&self) -> Vec<String>;

    fn read_variable(&self, name: &str, frame: usize) -> AnalysisResult<Vec<Vec3>>;

    fn read_unit_cell(&self, frame: usize) -> AnalysisResult<Option<UnitCell>>;

    /// One atom's values over `frames`.
    fn read_atom_series(&self, name: &str, atom: usize, frames: &[usize]) -> AnalysisResult<Vec<Vec3>> {
        frames
            .iter()
            .map(|&frame| {
                let values = self.read_variable(name, frame)?;
                values.get(atom).copied().ok_or_else(|| atom_error(atom, values.len()))
            })
            .collect()
    }

    /// Human-readable origin (path or generator).
    fn source(&self) -> String;
}

pub(crate) fn frame_error(frame: usize, len: usize) -> AnalysisError {
    AnalysisError::trajectory(
        "TRAJECTORY.FRAME_INDEX",
        format!("frame {frame} is outside [0, {len})"),
    )
}

pub(crate) fn atom_error(atom: usize, len: usize) -> AnalysisError {
    AnalysisError::trajectory(
        "TRAJECTORY.ATOM_INDEX",
        format!("atom {atom} is outside [0, {len})"),
    )
}

/// Indices `first..last` by `step`; `last` is excluded and must not exceed
/// `len`.
pub fn frame_indices(first: usize, last: usize, step: usize, len: usize) -> AnalysisResult<Vec<usize>> {
    if step == 0 || first >= last || last > len {
        return Err(AnalysisError::trajectory(
            "TRAJECTORY.FRAME_RANGE",
            format!("invalid frame range ({first}, {last}, {step}) for {len} frames"),
        ));
    }
    Ok((first..last).step_by(step).collect())
}

#[derive(Debug, Clone)]
pub struct Trajectory {
    reader: Arc<dyn TrajectoryReader>,
}

impl Trajectory {
    pub fn new(reader: Arc<dyn TrajectoryReader>) -> Self {
        Self { reader }
    }

    /// Opens a trajectory by extension: `.json` mock descriptions, `.h5`,
    /// `.hdf`, `.hdf5` and `.h5md` through HDF5, anything else as a native
    /// container.
    pub fn open(path: &Path, databases: &Databases) -> AnalysisResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let reader: Arc<dyn TrajectoryReader> = match extension.as_str() {
            "json" => Arc::new(MockTrajectory::from_file(path, databases)?),
            "h5" | "hdf" | "hdf5" | "h5md" => open_hdf5(path, databases)?,
            _ => Arc::new(NativeTrajectory::open(path, databases)?),
        };
        tracing::info!(
            source = %reader.source(),
            frames = reader.len(),
            atoms = reader.chemical_system().total_number_of_atoms(),
            "opened trajectory"
        );
        Ok(Self { reader })
    }

    pub fn reader(&self) -> &Arc<dyn TrajectoryReader> {
        &self.reader
    }

    pub fn chemical_system(&self) -> &ChemicalSystem {
        self.reader.chemical_system()
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        self.reader.times()
    }

    pub fn time(&self, frame: usize) -> AnalysisResult<f64> {
        self.check_frame(frame)?;
        Ok(self.reader.times()[frame])
    }

    /// Spacing of the first two frames, 1 ps for single-frame trajectories.
    pub fn md_time_step(&self) -> f64 {
        match self.reader.times() {
            [first, second, ..] if second > first => second - first,
            _ => 1.0,
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.reader.is_periodic()
    }

    pub fn check_frame(&self, frame: usize) -> AnalysisResult<()> {
        if frame >= self.len() {
            return Err(frame_error(frame, self.len()));
        }
        Ok(())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.reader.variable_names().iter().any(|v| v == name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.reader.variable_names()
    }

    pub fn coordinates(&self, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        self.variable(COORDINATES, frame)
    }

    pub fn variable(&self, name: &str, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        self.check_frame(frame)?;
        if !self.has_variable(name) {
            return Err(AnalysisError::trajectory(
                "TRAJECTORY.MISSING_VARIABLE",
                format!("trajectory has no variable '{name}'"),
            ));
        }
        self.reader.read_variable(name, frame)
    }

    pub fn unit_cell(&self, frame: usize) -> AnalysisResult<Option<UnitCell>> {
        self.check_frame(frame)?;
        self.reader.read_unit_cell(frame)
    }

    /// Configuration of `frame` carrying every stored variable.
    pub fn configuration(&self, frame: usize) -> AnalysisResult<Configuration> {
        let mut configuration =
            Configuration::from_coordinates(self.coordinates(frame)?, self.unit_cell(frame)?);
        for name in self.reader.variable_names() {
            if name != COORDINATES {
                configuration.set_variable(&name, self.reader.read_variable(&name, frame)?)?;
            }
        }
        Ok(configuration)
    }

    fn cells(&self, frames: &[usize]) -> AnalysisResult<Vec<Option<UnitCell>>> {
        frames.iter().map(|&f| self.reader.read_unit_cell(f)).collect()
    }

    /// Raw stored values of one atom over a frame range.
    pub fn read_configuration_trajectory(
        &self,
        index: usize,
        first: usize,
        last: usize,
        step: usize,
        variable: &str,
    ) -> AnalysisResult<Vec<Vec3>> {
        let frames = frame_indices(first, last, step, self.len())?;
        let n_atoms = self.chemical_system().total_number_of_atoms();
        if index >= n_atoms {
            return Err(atom_error(index, n_atoms));
        }
        self.reader.read_atom_series(variable, index, &frames)
    }

    /// Positions of one atom, unfolded across periodic images.
    pub fn read_atomic_trajectory(
        &self,
        index: usize,
        first: usize,
        last: usize,
        step: usize,
        box_coordinates: bool,
    ) -> AnalysisResult<Vec<Vec3>> {
        let raw = self.read_configuration_trajectory(index, first, last, step, COORDINATES)?;
        let frames = frame_indices(first, last, step, self.len())?;
        let cells = self.cells(&frames)?;
        Ok(unfold_positions(&raw, &cells, box_coordinates))
    }

    /// Mass-weighted centre of `atoms` per frame, each top-level entity made
    /// contiguous first, then unfolded across periodic images.
    pub fn read_com_trajectory(
        &self,
        atoms: &[AtomId],
        first: usize,
        last: usize,
        step: usize,
        box_coordinates: bool,
        database: &AtomDatabase,
    ) -> AnalysisResult<Vec<Vec3>> {
        let frames = frame_indices(first, last, step, self.len())?;
        let system = self.chemical_system();
        let mut centers = Vec::with_capacity(frames.len());
        let mut cells = Vec::with_capacity(frames.len());
        for &frame in &frames {
            let coordinates = self.reader.read_variable(COORDINATES, frame)?;
            let cell = self.reader.read_unit_cell(frame)?;
            let coordinates = match &cell {
                Some(cell) => contiguous_coordinates(system, &coordinates, cell),
                None => coordinates,
            };
            centers.push(system.center_of_mass(atoms, &coordinates, database)?);
            cells.push(cell);
        }
        Ok(unfold_positions(&centers, &cells, box_coordinates))
    }
}

#[cfg(feature = "hdf5")]
fn open_hdf5(path: &Path, databases: &Databases) -> AnalysisResult<Arc<dyn TrajectoryReader>> {
    Ok(Arc::new(hdf5::open(path, databases)?))
}

#[cfg(not(feature = "hdf5"))]
fn open_hdf5(path: &Path, _databases: &Databases) -> AnalysisResult<Arc<dyn TrajectoryReader>> {
    Err(AnalysisError::io(
        "IO.HDF5_DISABLED",
        format!(
            "{}: HDF5 trajectories need the 'hdf5' feature of mdscatter-core",
            path.display()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::{MemoryTrajectory, Trajectory, frame_indices};
    use crate::chemistry::{AtomId, AtomSpec, ChemicalEntity, ChemicalSystem};
    use crate::configuration::{UnitCell, VELOCITIES};
    use crate::database::Databases;
    use crate::domain::ErrorKind;
    use std::sync::Arc;

    fn hydrogens(n: usize, databases: &Databases) -> ChemicalSystem {
        let mut system = ChemicalSystem::new("hydrogens");
        for i in 0..n {
            system
                .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new("H", &format!("H{i}"))), databases)
                .expect("atom");
        }
        system
    }

    #[test]
    fn com_trajectory_of_free_atoms_is_their_mean() {
        let databases = Databases::builtin().expect("databases");
        let system = hydrogens(4, &databases);
        let cell = UnitCell::cubic(10.0).expect("cell");
        let frames = vec![vec![[0.0, 0.0, 0.0], [8.0, 0.0, 0.0], [4.0, 4.0, 4.0], [2.0, 2.0, 2.0]]];
        let memory = MemoryTrajectory::new(system, vec![0.0], frames, Some(vec![cell])).expect("memory");
        let trajectory = Trajectory::new(Arc::new(memory));
        let atoms: Vec<AtomId> = (0..4).map(AtomId).collect();
        let com = trajectory
            .read_com_trajectory(&atoms, 0, 1, 1, false, &databases.atoms)
            .expect("com");
        assert_eq!(com.len(), 1);
        for (value, expected) in com[0].into_iter().zip([3.5, 1.5, 1.5]) {
            assert!((value - expected).abs() < 1e-6, "{value} against {expected}");
        }
    }

    #[test]
    fn atomic_trajectory_is_unfolded() {
        let databases = Databases::builtin().expect("databases");
        let system = hydrogens(2, &databases);
        let cell = UnitCell::cubic(10.0).expect("cell");
        let frames = vec![
            vec![[-4.0, 0.0, 0.0], [4.0, 0.0, 0.0]],
            vec![[4.5, 0.0, 0.0], [4.9, 0.0, 0.0]],
            vec![[3.5, 0.0, 0.0], [-4.8, 0.0, 0.0]],
        ];
        let memory = MemoryTrajectory::new(system, vec![0.0, 0.1, 0.2], frames, Some(vec![cell; 3]))
            .expect("memory");
        let trajectory = Trajectory::new(Arc::new(memory));
        let first = trajectory.read_atomic_trajectory(0, 0, 3, 1, false).expect("atom 0");
        assert!((first[0][0] + 4.0).abs() < 1e-12);
        assert!((first[1][0] + 5.5).abs() < 1e-12);
        assert!((first[2][0] + 6.5).abs() < 1e-12);
        let second = trajectory.read_atomic_trajectory(1, 0, 3, 1, false).expect("atom 1");
        assert!((second[0][0] - 4.0).abs() < 1e-12);
        assert!((second[2][0] - 5.2).abs() < 1e-12);
        for pair in second.windows(2) {
            assert!((pair[1][0] - pair[0][0]).abs() <= 5.0);
        }
    }

    #[test]
    fn frame_and_variable_errors() {
        let databases = Databases::builtin().expect("databases");
        let system = hydrogens(1, &databases);
        let memory = MemoryTrajectory::new(system, vec![0.0, 2.0], vec![vec![[0.0; 3]]; 2], None)
            .expect("memory")
            .with_variable(VELOCITIES, vec![vec![[1.0, 0.0, 0.0]]; 2])
            .expect("velocities");
        let trajectory = Trajectory::new(Arc::new(memory));
        assert!(trajectory.has_variable(VELOCITIES));
        assert!(!trajectory.has_variable("gradients"));
        assert_eq!(trajectory.md_time_step(), 2.0);
        assert_eq!(
            trajectory.coordinates(2).expect_err("frame").kind(),
            ErrorKind::Trajectory
        );
        assert!(trajectory.variable("gradients", 0).is_err());
        let configuration = trajectory.configuration(1).expect("configuration");
        assert!(configuration.has_variable(VELOCITIES));
        assert!(!configuration.is_periodic());
        assert!(frame_indices(0, 3, 1, 2).is_err());
        assert_eq!(frame_indices(1, 7, 2, 10).expect("range"), vec![1, 3, 5]);
    }
}
