use mdscatter_core::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem, FragmentSpec};
use mdscatter_core::configuration::{Configuration, UnitCell};
use mdscatter_core::database::Databases;
use mdscatter_core::trajectory::{
    ChunkingAxis, Compression, Dtype, Trajectory, TrajectoryWriter, WriterOptions,
};
use std::path::Path;
use tempfile::TempDir;

fn water_and_argon(databases: &Databases) -> ChemicalSystem {
    let mut system = ChemicalSystem::new("water + argon");
    for _ in 0..2 {
        system
            .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new("WAT")), databases)
            .expect("water should be built");
    }
    system
        .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new("Ar", "Ar1")), databases)
        .expect("argon should be built");
    system
}

fn frames(n_frames: usize, n_atoms: usize) -> Vec<Vec<[f64; 3]>> {
    (0..n_frames)
        .map(|frame| {
            (0..n_atoms)
                .map(|atom| [0.1 * atom as f64, 0.05 * frame as f64, 0.3 + 0.01 * (atom * frame) as f64])
                .collect()
        })
        .collect()
}

fn write(path: &Path, system: &ChemicalSystem, frames: &[Vec<[f64; 3]>], options: WriterOptions) {
    let cell = UnitCell::cubic(2.0).expect("cell should be valid");
    let mut writer = TrajectoryWriter::create(path, system, frames.len(), None, options)
        .expect("writer should open");
    for (index, coordinates) in frames.iter().enumerate() {
        writer
            .dump_configuration(&Configuration::from_coordinates(coordinates.clone(), Some(cell)), 0.5 * index as f64)
            .expect("frame should be written");
    }
    writer.close().expect("writer should close");
}

#[test]
fn every_layout_reads_back_the_written_frames() {
    let databases = Databases::builtin().expect("databases should load");
    let system = water_and_argon(&databases);
    let expected = frames(5, 7);
    let temp = TempDir::new().expect("tempdir should be created");

    let layouts = [
        (ChunkingAxis::Frame, Compression::None),
        (ChunkingAxis::Frame, Compression::Gzip),
        (ChunkingAxis::Atom, Compression::Gzip),
        (ChunkingAxis::Atom, Compression::Lzf),
    ];
    for (index, (chunking_axis, compression)) in layouts.into_iter().enumerate() {
        let path = temp.path().join(format!("layout_{index}.mdt"));
        let options = WriterOptions {
            dtype: Dtype::F64,
            chunking_axis,
            compression,
        };
        write(&path, &system, &expected, options);

        let trajectory = Trajectory::open(&path, &databases).expect("trajectory should open");
        assert_eq!(trajectory.len(), 5, "{chunking_axis:?} {compression:?}");
        assert!(trajectory.is_periodic());
        assert!(trajectory.has_variable("coordinates"));
        assert!(!trajectory.has_variable("velocities"));
        assert_eq!(trajectory.times(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        for (frame, coordinates) in expected.iter().enumerate() {
            let read = trajectory.coordinates(frame).expect("frame should be readable");
            assert_eq!(&read, coordinates, "{chunking_axis:?} {compression:?} frame {frame}");
            let cell = trajectory.unit_cell(frame).expect("cell").expect("periodic frame");
            assert!((cell.volume() - 8.0).abs() < 1e-12);
        }
        assert_eq!(trajectory.chemical_system().to_string(), system.to_string());
    }
}

#[test]
fn out_of_range_frames_are_trajectory_errors() {
    let databases = Databases::builtin().expect("databases should load");
    let system = water_and_argon(&databases);
    let temp = TempDir::new().expect("tempdir should be created");
    let path = temp.path().join("short.mdt");
    write(&path, &system, &frames(2, 7), WriterOptions::default());

    let trajectory = Trajectory::open(&path, &databases).expect("trajectory should open");
    let error = trajectory.coordinates(2).expect_err("frame 2 does not exist");
    assert_eq!(error.placeholder(), "TRAJECTORY.FRAME_INDEX");
    assert_eq!(error.exit_code(), 4);
}

#[test]
fn writing_past_the_reserved_frames_fails() {
    let databases = Databases::builtin().expect("databases should load");
    let system = water_and_argon(&databases);
    let temp = TempDir::new().expect("tempdir should be created");
    let mut writer = TrajectoryWriter::create(&temp.path().join("one.mdt"), &system, 1, None, WriterOptions::default())
        .expect("writer should open");
    let configuration = Configuration::from_coordinates(vec![[0.0; 3]; 7], None);
    writer.dump_configuration(&configuration, 0.0).expect("first frame");
    let error = writer.dump_configuration(&configuration, 1.0).expect_err("second frame");
    assert_eq!(error.placeholder(), "JOB.TRAJECTORY_WRITER");
}

#[test]
fn serialized_systems_rebuild_identically() {
    let databases = Databases::builtin().expect("databases should load");
    let system = water_and_argon(&databases);
    let rebuilt = ChemicalSystem::build(&system.serialize(), &databases).expect("system should rebuild");
    assert_eq!(rebuilt.to_string(), system.to_string());
    assert_eq!(rebuilt.total_number_of_atoms(), 7);
    let indices: Vec<usize> = rebuilt.atom_ids().map(|id| id.0).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
}

#[test]
fn missing_files_are_reported_with_their_path() {
    let databases = Databases::builtin().expect("databases should load");
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("missing.mdt");
    let error = Trajectory::open(&missing, &databases).expect_err("file does not exist");
    assert!(error.message().contains("missing.mdt"), "{error}");
}
