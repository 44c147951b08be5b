//! Reader for native trajectory containers.

use super::container::ContainerReader;
use super::writer::{
    CHEMICAL_SYSTEM_GROUP, TIME_DATASET, UNIT_CELL_DATASET, configuration_dataset, default_unit,
};
use super::{TrajectoryReader, atom_error};
use crate::chemistry::{ChemicalSystem, ChemicalSystemTables};
use crate::configuration::{COORDINATES, UnitCell};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::units::conversion_factor;
use std::collections::BTreeMap;
use std::path::Path;

const CONFIGURATION_PREFIX: &str = "/configuration/";

#[derive(Debug)]
pub struct NativeTrajectory {
    container: ContainerReader,
    system: ChemicalSystem,
    times: Vec<f64>,
    n_atoms: usize,
    periodic: bool,
    /// Factor turning stored values into nm / ps based units.
    factors: BTreeMap<String, f64>,
}

fn corrupted(path: &Path, message: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::corrupted(
        "IO.CORRUPTED_TRAJECTORY",
        format!("{}: {message}", path.display()),
    )
}

fn unit_factor(stored: Option<&str>, target: &str) -> f64 {
    match stored {
        Some(unit) if unit != target => conversion_factor(unit, target).unwrap_or_else(|error| {
            tracing::warn!(unit, target, %error, "unit left unconverted");
            1.0
        }),
        _ => 1.0,
    }
}

impl NativeTrajectory {
    pub fn open(path: &Path, databases: &Databases) -> AnalysisResult<Self> {
        let container = ContainerReader::open(path).map_err(|e| e.into_analysis(path))?;
        let tables = container
            .group_attributes(CHEMICAL_SYSTEM_GROUP)
            .and_then(|attributes| attributes.get("tables"))
            .ok_or_else(|| corrupted(path, "no chemical system stored"))?;
        let tables: ChemicalSystemTables =
            serde_json::from_value(tables.clone()).map_err(|error| corrupted(path, error))?;
        let system = ChemicalSystem::build(&tables, databases)?;
        let n_atoms = system.total_number_of_atoms();

        let coordinates = container
            .dataset(&configuration_dataset(COORDINATES))
            .map_err(|e| e.into_analysis(path))?;
        if coordinates.shape.len() != 3 || coordinates.shape[1] != n_atoms || coordinates.shape[2] != 3 {
            return Err(corrupted(
                path,
                format!("coordinates shape {:?} does not fit {n_atoms} atoms", coordinates.shape),
            ));
        }
        let n_frames = coordinates.shape[0];

        let time = container.dataset(TIME_DATASET).map_err(|e| e.into_analysis(path))?;
        let time_factor = unit_factor(time.string_attribute("units"), "ps");
        let times: Vec<f64> = container
            .read_all(TIME_DATASET)
            .map_err(|e| e.into_analysis(path))?
            .into_iter()
            .map(|t| t * time_factor)
            .collect();
        if times.len() != n_frames {
            return Err(corrupted(path, format!("{} times for {n_frames} frames", times.len())));
        }

        let mut factors = BTreeMap::new();
        for name in container.dataset_names() {
            let Some(variable) = name.strip_prefix(CONFIGURATION_PREFIX) else {
                continue;
            };
            let info = container.dataset(name).map_err(|e| e.into_analysis(path))?;
            if info.shape != coordinates.shape {
                return Err(corrupted(path, format!("variable '{variable}' has shape {:?}", info.shape)));
            }
            let factor = unit_factor(info.string_attribute("units"), default_unit(variable));
            factors.insert(variable.to_string(), factor);
        }

        let periodic = container.has_dataset(UNIT_CELL_DATASET);
        if periodic {
            let info = container.dataset(UNIT_CELL_DATASET).map_err(|e| e.into_analysis(path))?;
            if info.shape != [n_frames, 3, 3] {
                return Err(corrupted(path, format!("unit cell shape {:?}", info.shape)));
            }
            let factor = unit_factor(info.string_attribute("units"), "nm");
            factors.insert(UNIT_CELL_DATASET.to_string(), factor);
        }

        Ok(Self {
            container,
            system,
            times,
            n_atoms,
            periodic,
            factors,
        })
    }

    fn factor(&self, key: &str) -> f64 {
        self.factors.get(key).copied().unwrap_or(1.0)
    }

    fn to_vectors(&self, flat: Vec<f64>, factor: f64) -> Vec<Vec3> {
        flat.chunks_exact(3)
            .map(|v| [v[0] * factor, v[1] * factor, v[2] * factor])
            .collect()
    }

    fn check_variable(&self, name: &str) -> AnalysisResult<()> {
        if !self.factors.contains_key(name) || name == UNIT_CELL_DATASET {
            return Err(AnalysisError::trajectory(
                "TRAJECTORY.MISSING_VARIABLE",
                format!("trajectory has no variable '{name}'"),
            ));
        }
        Ok(())
    }
}

impl TrajectoryReader for NativeTrajectory {
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
        self.periodic
    }

    fn variable_names(&self) -> Vec<String> {
        self.factors
            .keys()
            .filter(|name| name.as_str() != UNIT_CELL_DATASET)
            .cloned()
            .collect()
    }

    fn read_variable(&self, name: &str, frame: usize) -> AnalysisResult<Vec<Vec3>> {
        self.check_variable(name)?;
        let flat = self
            .container
            .read_slice(&configuration_dataset(name), &[frame, 0, 0], &[1, self.n_atoms, 3])
            .map_err(|e| e.into_analysis(self.container.path()))?;
        Ok(self.to_vectors(flat, self.factor(name)))
    }

    fn read_unit_cell(&self, frame: usize) -> AnalysisResult<Option<UnitCell>> {
        if !self.periodic {
            return Ok(None);
        }
        let flat = self
            .container
            .read_slice(UNIT_CELL_DATASET, &[frame, 0, 0], &[1, 3, 3])
            .map_err(|e| e.into_analysis(self.container.path()))?;
        let rows = self.to_vectors(flat, self.factor(UNIT_CELL_DATASET));
        UnitCell::new([rows[0], rows[1], rows[2]]).map(Some)
    }

    /// Reads one atom column per contiguous run of frames, which touches a
    /// single chunk per run when atoms are chunked individually.
    fn read_atom_series(&self, name: &str, atom: usize, frames: &[usize]) -> AnalysisResult<Vec<Vec3>> {
        self.check_variable(name)?;
        if atom >= self.n_atoms {
            return Err(atom_error(atom, self.n_atoms));
        }
        let (Some(&first), Some(&last)) = (frames.first(), frames.last()) else {
            return Ok(Vec::new());
        };
        let span = last + 1 - first;
        let flat = self
            .container
            .read_slice(&configuration_dataset(name), &[first, atom, 0], &[span, 1, 3])
            .map_err(|e| e.into_analysis(self.container.path()))?;
        let values = self.to_vectors(flat, self.factor(name));
        Ok(frames.iter().map(|&frame| values[frame - first]).collect())
    }

    fn source(&self) -> String {
        self.container.path().display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::NativeTrajectory;
    use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem, FragmentSpec};
    use crate::configuration::{Configuration, UnitCell, VELOCITIES};
    use crate::database::Databases;
    use crate::trajectory::writer::{ChunkingAxis, WriterOptions};
    use crate::trajectory::{Compression, Trajectory, TrajectoryReader, TrajectoryWriter};
    use std::sync::Arc;

    fn system(databases: &Databases) -> ChemicalSystem {
        let mut system = ChemicalSystem::new("mixture");
        system
            .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new("WAT")), databases)
            .expect("water");
        system
            .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new("Ar", "Ar1")), databases)
            .expect("argon");
        system
    }

    fn frame(t: usize) -> Configuration {
        let shift = 0.1 * t as f64;
        let coordinates = vec![
            [shift, 0.0, 0.0],
            [shift + 0.1, 0.0, 0.0],
            [shift, 0.1, 0.0],
            [1.0, 1.0, 1.0 + shift],
        ];
        let mut configuration =
            Configuration::periodic_real(coordinates, UnitCell::cubic(3.0).expect("cell"));
        configuration
            .set_variable(VELOCITIES, vec![[0.1, 0.0, 0.0]; 4])
            .expect("velocities");
        configuration
    }

    fn write(path: &std::path::Path, options: WriterOptions, databases: &Databases) {
        let system = system(databases);
        let mut writer = TrajectoryWriter::create(path, &system, 5, Some(&[0, 1, 2, 3]), options)
            .expect("writer");
        for t in 0..5 {
            writer.dump_configuration(&frame(t), 0.5 * t as f64).expect("frame");
        }
        assert!(writer.dump_configuration(&frame(5), 2.5).is_err());
        writer.close().expect("close");
    }

    #[test]
    fn written_trajectories_read_back_under_both_chunkings() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        for (name, axis) in [("frames.mdt", ChunkingAxis::Frame), ("atoms.mdt", ChunkingAxis::Atom)] {
            let path = directory.path().join(name);
            let options = WriterOptions {
                chunking_axis: axis,
                compression: Compression::Gzip,
                ..WriterOptions::default()
            };
            write(&path, options, &databases);
            let native = NativeTrajectory::open(&path, &databases).expect("open");
            assert_eq!(native.len(), 5);
            assert_eq!(native.times(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
            assert_eq!(native.chemical_system().total_number_of_atoms(), 4);
            assert_eq!(native.variable_names(), vec!["coordinates", "velocities"]);
            let trajectory = Trajectory::new(Arc::new(native));
            assert_eq!(trajectory.md_time_step(), 0.5);
            let series = trajectory
                .read_configuration_trajectory(3, 1, 5, 2, "coordinates")
                .expect("series");
            assert!((series[0][2] - 1.1).abs() < 1e-12);
            assert!((series[1][2] - 1.3).abs() < 1e-12);
            let configuration = trajectory.configuration(4).expect("configuration");
            assert!(configuration.is_periodic());
            assert_eq!(configuration.variable(VELOCITIES).expect("velocities")[2], [0.1, 0.0, 0.0]);
        }
    }

    #[test]
    fn unselected_atoms_are_zeroed() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("selected.mdt");
        let system = system(&databases);
        let mut writer =
            TrajectoryWriter::create(&path, &system, 3, Some(&[3]), WriterOptions::default()).expect("writer");
        writer.dump_configuration(&frame(1), 0.0).expect("frame");
        writer.close().expect("close");
        let native = NativeTrajectory::open(&path, &databases).expect("open");
        assert_eq!(native.len(), 1);
        let coordinates = native.read_variable("coordinates", 0).expect("coordinates");
        assert_eq!(coordinates[0], [0.0; 3]);
        assert!((coordinates[3][2] - 1.1).abs() < 1e-12);
    }
}
