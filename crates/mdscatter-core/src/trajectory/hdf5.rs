//! HDF5 trajectories: the native layout and the H5MD community layout.
//!
//! Both are loaded fully into a [`MemoryTrajectory`]; lengths end up in nm,
//! times in ps and velocities in nm/ps whatever the stored unit attributes
//! say.

use super::MemoryTrajectory;
use super::writer::{CHEMICAL_SYSTEM_GROUP, TIME_DATASET, UNIT_CELL_DATASET, configuration_dataset, default_unit};
use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem, ChemicalSystemTables};
use crate::configuration::{COORDINATES, UnitCell, VELOCITIES};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use crate::units::conversion_factor;
use hdf5::types::{VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Location};
use std::path::Path;

const H5MD_POSITION: &str = "/particles/all/position/value";
const H5MD_POSITION_TIME: &str = "/particles/all/position/time";
const H5MD_VELOCITY: &str = "/particles/all/velocity/value";
const H5MD_SPECIES: &str = "/particles/all/species";
const H5MD_BOX_VALUE: &str = "/particles/all/box/edges/value";
const H5MD_BOX_STATIC: &str = "/particles/all/box/edges";

fn hdf5_error(path: &Path, error: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::corrupted("IO.CORRUPTED_HDF5", format!("{}: {error}", path.display()))
}

fn string_attribute(location: &Location, name: &str) -> Option<String> {
    let attribute = location.attr(name).ok()?;
    if let Ok(value) = attribute.read_scalar::<VarLenUnicode>() {
        return Some(value.as_str().to_string());
    }
    attribute
        .read_scalar::<VarLenAscii>()
        .ok()
        .map(|value| value.as_str().to_string())
}

/// Factor from the stored unit attribute to `target`; a missing attribute
/// means the data is already in `target`.
fn factor(path: &Path, dataset: &Dataset, attribute: &str, target: &str) -> AnalysisResult<f64> {
    match string_attribute(dataset, attribute) {
        Some(unit) if unit != target => conversion_factor(&unit, target).map_err(|error| {
            AnalysisError::new(
                ErrorKind::Units,
                "INPUT.HDF5_UNITS",
                format!(
                    "{}: dataset '{}' is stored in '{unit}', which cannot be read as '{target}': {error}",
                    path.display(),
                    dataset.name()
                ),
            )
        }),
        _ => Ok(1.0),
    }
}

fn read_scaled(path: &Path, dataset: &Dataset, unit_attribute: &str, target: &str) -> AnalysisResult<Vec<f64>> {
    let scale = factor(path, dataset, unit_attribute, target)?;
    let values: Vec<f64> = dataset.read_raw::<f64>().map_err(|e| hdf5_error(path, e))?;
    Ok(values.into_iter().map(|v| v * scale).collect())
}

fn frames_of(path: &Path, flat: &[f64], n_frames: usize, n_atoms: usize) -> AnalysisResult<Vec<Vec<Vec3>>> {
    if flat.len() != n_frames * n_atoms * 3 {
        return Err(hdf5_error(path, format!("{} values for {n_frames}x{n_atoms}x3", flat.len())));
    }
    Ok(flat
        .chunks_exact(n_atoms * 3)
        .map(|frame| frame.chunks_exact(3).map(|v| [v[0], v[1], v[2]]).collect())
        .collect())
}

fn cells_of(flat: &[f64], n_frames: usize) -> AnalysisResult<Vec<UnitCell>> {
    match flat.len() {
        3 => Ok(vec![UnitCell::new(diagonal(flat))?; n_frames]),
        9 => Ok(vec![UnitCell::new(full(flat))?; n_frames]),
        n if n == n_frames * 3 => flat.chunks_exact(3).map(|v| UnitCell::new(diagonal(v))).collect(),
        n if n == n_frames * 9 => flat.chunks_exact(9).map(|v| UnitCell::new(full(v))).collect(),
        n => Err(AnalysisError::corrupted(
            "IO.CORRUPTED_HDF5",
            format!("{n} box values for {n_frames} frames"),
        )),
    }
}

fn diagonal(v: &[f64]) -> [[f64; 3]; 3] {
    [[v[0], 0.0, 0.0], [0.0, v[1], 0.0], [0.0, 0.0, v[2]]]
}

fn full(v: &[f64]) -> [[f64; 3]; 3] {
    [[v[0], v[1], v[2]], [v[3], v[4], v[5]], [v[6], v[7], v[8]]]
}

fn stored_system(path: &Path, file: &File, databases: &Databases) -> AnalysisResult<Option<ChemicalSystem>> {
    let Ok(group) = file.group(CHEMICAL_SYSTEM_GROUP) else {
        return Ok(None);
    };
    let Some(text) = string_attribute(&group, "tables") else {
        return Ok(None);
    };
    let tables: ChemicalSystemTables = serde_json::from_str(&text).map_err(|e| hdf5_error(path, e))?;
    ChemicalSystem::build(&tables, databases).map(Some)
}

/// Free atoms named after their element, from H5MD atomic numbers.
fn species_system(path: &Path, file: &File, n_atoms: usize, databases: &Databases) -> AnalysisResult<ChemicalSystem> {
    let species: Vec<i64> = match file.dataset(H5MD_SPECIES) {
        Ok(dataset) => dataset.read_raw::<i64>().map_err(|e| hdf5_error(path, e))?,
        Err(_) => vec![1; n_atoms],
    };
    if species.len() != n_atoms {
        return Err(hdf5_error(path, format!("{} species for {n_atoms} atoms", species.len())));
    }
    let mut system = ChemicalSystem::new(path.file_stem().and_then(|s| s.to_str()).unwrap_or("h5md"));
    for (index, number) in species.iter().enumerate() {
        let symbol = databases
            .atoms
            .symbols()
            .find(|symbol| {
                symbol.chars().all(|c| c.is_ascii_alphabetic())
                    && databases
                        .atoms
                        .get(symbol)
                        .is_ok_and(|entry| i64::from(entry.atomic_number) == *number)
            })
            .ok_or_else(|| hdf5_error(path, format!("no element with atomic number {number}")))?
            .to_string();
        let name = format!("{symbol}{}", index + 1);
        system.add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new(&symbol, &name)), databases)?;
    }
    Ok(system)
}

fn open_h5md(path: &Path, file: &File, databases: &Databases) -> AnalysisResult<MemoryTrajectory> {
    let position = file.dataset(H5MD_POSITION).map_err(|e| hdf5_error(path, e))?;
    let shape = position.shape();
    if shape.len() != 3 || shape[2] != 3 {
        return Err(hdf5_error(path, format!("position shape {shape:?}")));
    }
    let (n_frames, n_atoms) = (shape[0], shape[1]);
    let system = match stored_system(path, file, databases)? {
        Some(system) => system,
        None => species_system(path, file, n_atoms, databases)?,
    };
    let coordinates = frames_of(path, &read_scaled(path, &position, "unit", "nm")?, n_frames, n_atoms)?;
    let times = match file.dataset(H5MD_POSITION_TIME) {
        Ok(dataset) => read_scaled(path, &dataset, "unit", "ps")?,
        Err(_) => (0..n_frames).map(|f| f as f64).collect(),
    };
    let cells = match file.dataset(H5MD_BOX_VALUE).or_else(|_| file.dataset(H5MD_BOX_STATIC)) {
        Ok(dataset) => Some(cells_of(&read_scaled(path, &dataset, "unit", "nm")?, n_frames)?),
        Err(_) => None,
    };
    let mut trajectory = MemoryTrajectory::new(system, times, coordinates, cells)?;
    if let Ok(dataset) = file.dataset(H5MD_VELOCITY) {
        let velocities = frames_of(path, &read_scaled(path, &dataset, "unit", "nm/ps")?, n_frames, n_atoms)?;
        trajectory = trajectory.with_variable(VELOCITIES, velocities)?;
    }
    Ok(trajectory)
}

fn open_native(path: &Path, file: &File, databases: &Databases) -> AnalysisResult<MemoryTrajectory> {
    let system = stored_system(path, file, databases)?
        .ok_or_else(|| hdf5_error(path, "no chemical system stored"))?;
    let n_atoms = system.total_number_of_atoms();
    let coordinates = file
        .dataset(&configuration_dataset(COORDINATES))
        .map_err(|e| hdf5_error(path, e))?;
    let n_frames = coordinates.shape().first().copied().unwrap_or(0);
    let frames = frames_of(path, &read_scaled(path, &coordinates, "units", "nm")?, n_frames, n_atoms)?;
    let time = file.dataset(TIME_DATASET).map_err(|e| hdf5_error(path, e))?;
    let times = read_scaled(path, &time, "units", "ps")?;
    let cells = match file.dataset(UNIT_CELL_DATASET) {
        Ok(dataset) => Some(cells_of(&read_scaled(path, &dataset, "units", "nm")?, n_frames)?),
        Err(_) => None,
    };
    let mut trajectory = MemoryTrajectory::new(system, times, frames, cells)?;
    if let Ok(group) = file.group("/configuration") {
        let names = group.member_names().map_err(|e| hdf5_error(path, e))?;
        for name in names.into_iter().filter(|name| name != COORDINATES) {
            let dataset = group.dataset(&name).map_err(|e| hdf5_error(path, e))?;
            let values = read_scaled(path, &dataset, "units", default_unit(&name))?;
            trajectory = trajectory.with_variable(&name, frames_of(path, &values, n_frames, n_atoms)?)?;
        }
    }
    Ok(trajectory)
}

pub fn open(path: &Path, databases: &Databases) -> AnalysisResult<MemoryTrajectory> {
    let file = File::open(path).map_err(|e| {
        AnalysisError::io("IO.HDF5", format!("{}: {e}", path.display()))
    })?;
    let trajectory = if file.link_exists(H5MD_POSITION) {
        open_h5md(path, &file, databases)?
    } else {
        open_native(path, &file, databases)?
    };
    Ok(trajectory.with_source(path.display().to_string()))
}

#[cfg(all(test, feature = "hdf5"))]
mod tests {
    use super::*;
    use crate::trajectory::Trajectory;
    use hdf5::Group;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn unit(text: &str) -> VarLenUnicode {
        text.parse().expect("unit string")
    }

    fn dataset(group: &Group, name: &str, shape: &[usize], values: &[f64], unit_attribute: Option<(&str, &str)>) {
        let dataset = group
            .new_dataset::<f64>()
            .shape(shape.to_vec())
            .create(name)
            .expect("dataset");
        dataset.write_raw(values).expect("values");
        if let Some((attribute, value)) = unit_attribute {
            dataset
                .new_attr::<VarLenUnicode>()
                .shape(())
                .create(attribute)
                .expect("attribute")
                .write_scalar(&unit(value))
                .expect("unit");
        }
    }

    /// Two argon atoms over two frames, positions in Angstrom and times in fs.
    fn write_h5md(path: &Path, position_unit: &str) {
        let file = File::create(path).expect("file");
        let all = file
            .create_group("particles")
            .and_then(|particles| particles.create_group("all"))
            .expect("particles");
        let position = all.create_group("position").expect("position");
        let positions = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 1.0, 2.0, 3.0, 11.0, 0.0, 0.0];
        dataset(&position, "value", &[2, 2, 3], &positions, Some(("unit", position_unit)));
        dataset(&position, "time", &[2], &[0.0, 500.0], Some(("unit", "fs")));
        let velocity = all.create_group("velocity").expect("velocity");
        dataset(&velocity, "value", &[2, 2, 3], &[1.0; 12], Some(("unit", "ang/ps")));
        let edges = all.create_group("box").expect("box");
        dataset(&edges, "edges", &[3], &[20.0, 20.0, 20.0], Some(("unit", "ang")));
        let species = all
            .new_dataset::<i64>()
            .shape(vec![2])
            .create("species")
            .expect("species");
        species.write_raw(&[18i64, 18][..]).expect("species values");
    }

    #[test]
    fn h5md_layouts_are_converted_to_nm_and_ps() {
        let databases = Databases::builtin().expect("databases");
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("argon.h5md");
        write_h5md(&path, "ang");

        let trajectory = Trajectory::new(Arc::new(open(&path, &databases).expect("h5md")));
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.chemical_system().atoms()[0].symbol, "Ar");
        assert!((trajectory.times()[1] - 0.5).abs() < 1e-12);
        let second = trajectory.coordinates(1).expect("frame 1");
        assert!((second[0][2] - 0.3).abs() < 1e-12);
        assert!((second[1][0] - 1.1).abs() < 1e-12);
        let cell = trajectory.unit_cell(0).expect("cell").expect("periodic");
        assert!((cell.volume() - 8.0).abs() < 1e-9);
        assert!(trajectory.has_variable(VELOCITIES));
    }

    #[test]
    fn unconvertible_unit_attributes_are_errors() {
        let databases = Databases::builtin().expect("databases");
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("bad.h5md");
        write_h5md(&path, "furlong");

        let error = open(&path, &databases).expect_err("unknown unit");
        assert_eq!(error.placeholder(), "INPUT.HDF5_UNITS");
        assert!(error.message().contains("furlong"), "{error}");
        assert!(error.message().contains("/particles/all/position/value"), "{error}");

        let path = temp.path().join("seconds.h5md");
        write_h5md(&path, "ps");
        let error = open(&path, &databases).expect_err("time is not a length");
        assert_eq!(error.placeholder(), "INPUT.HDF5_UNITS");
    }

    #[test]
    fn native_layout_reads_the_stored_system() {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("argon pair");
        for name in ["Ar1", "Ar2"] {
            system
                .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new("Ar", name)), &databases)
                .expect("atom");
        }
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("native.h5");
        {
            let file = File::create(&path).expect("file");
            let tables = serde_json::to_string(&system.serialize()).expect("tables");
            file.create_group(CHEMICAL_SYSTEM_GROUP.trim_start_matches('/'))
                .expect("system group")
                .new_attr::<VarLenUnicode>()
                .shape(())
                .create("tables")
                .expect("tables attribute")
                .write_scalar(&unit(&tables))
                .expect("tables value");
            let configuration = file.create_group("configuration").expect("configuration");
            let positions = [0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.1, 0.0, 0.0, 0.6, 0.0, 0.0];
            dataset(&configuration, COORDINATES, &[2, 2, 3], &positions, Some(("units", "nm")));
            dataset(&file, "time", &[2], &[0.0, 1.0], Some(("units", "ps")));
            let cell = [2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
            dataset(&file, "unit_cell", &[2, 9], &[cell, cell].concat(), None);
        }

        let trajectory = Trajectory::new(Arc::new(open(&path, &databases).expect("native")));
        assert_eq!(trajectory.chemical_system().to_string(), system.to_string());
        assert_eq!(trajectory.coordinates(1).expect("frame 1")[1], [0.6, 0.0, 0.0]);
        assert!(trajectory.is_periodic());
        assert!(!trajectory.has_variable(VELOCITIES));
    }
}
