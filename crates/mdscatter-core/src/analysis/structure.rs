//! Frame-by-frame structural descriptors: radius of gyration, density
//! profile along a cell axis, and the trajectory of group centres of mass.

use super::common;
use crate::chemistry::{AtomId, AtomSpec, ChemicalEntity, ChemicalSystem};
use crate::configuration::{Configuration, contiguous_coordinates};
use crate::configurators::{SettingKind, SettingSpec};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{dot, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;
use std::collections::BTreeMap;

pub fn radius_of_gyration_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "RadiusOfGyration",
        label: "Radius Of Gyration",
        category: &["Analysis", "Structure"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || {
            vec![
                common::trajectory(),
                common::frames(),
                common::atom_selection(),
                common::atom_transmutation(),
                common::weights("atomic_weight"),
                common::output_files(),
                common::running_mode(),
            ]
        },
        factory: || Box::new(RadiusOfGyration::default()),
    }
}

pub fn density_profile_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "DensityProfile",
        label: "Density Profile",
        category: &["Analysis", "Structure"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || {
            vec![
                common::trajectory(),
                common::frames(),
                common::atom_selection(),
                common::atom_transmutation(),
                common::weights("equal"),
                SettingSpec::new("axis", SettingKind::SingleChoice(vec!["a", "b", "c"]), json!("c")),
                SettingSpec::new("dr", SettingKind::Float { minimum: Some(1.0e-6), maximum: None }, json!(0.01))
                    .with_label("bin width (nm)"),
                common::output_files(),
                common::running_mode(),
            ]
        },
        factory: || Box::new(DensityProfile::default()),
    }
}

pub fn center_of_masses_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "CenterOfMassesTrajectory",
        label: "Center Of Masses Trajectory",
        category: &["Analysis", "Trajectory"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || {
            vec![
                common::trajectory(),
                common::frames(),
                common::atom_selection(),
                SettingSpec::new("grouping_level", SettingKind::GroupingLevel, json!("molecule")),
                common::output_files(),
                common::running_mode(),
            ]
        },
        factory: || Box::new(CenterOfMasses::default()),
    }
}

fn axis_index(axis: &str) -> usize {
    match axis {
        "a" => 0,
        "b" => 1,
        _ => 2,
    }
}

/// Coordinates of a frame with bonded fragments made whole.
fn whole_coordinates(trajectory: &Trajectory, frame: usize) -> AnalysisResult<Vec<Vec3>> {
    let coordinates = trajectory.coordinates(frame)?;
    Ok(match trajectory.unit_cell(frame)? {
        Some(cell) => contiguous_coordinates(trajectory.chemical_system(), &coordinates, &cell),
        None => coordinates,
    })
}

fn weighted_mean(positions: &[Vec3], weights: &[f64]) -> Vec3 {
    let total: f64 = weights.iter().sum();
    let mut center = [0.0; 3];
    for (position, weight) in positions.iter().zip(weights) {
        for axis in 0..3 {
            center[axis] += weight * position[axis];
        }
    }
    center.map(|value| value / total)
}

struct GyrationKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    atoms: Vec<usize>,
    weights: Vec<f64>,
}

impl StepKernel for GyrationKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let coordinates = whole_coordinates(&self.trajectory, self.frames[index])?;
        let positions: Vec<Vec3> = self.atoms.iter().map(|&atom| coordinates[atom]).collect();
        let center = weighted_mean(&positions, &self.weights);
        let spread: f64 = positions
            .iter()
            .zip(&self.weights)
            .map(|(&position, weight)| {
                let delta = sub(position, center);
                weight * dot(delta, delta)
            })
            .sum();
        let total: f64 = self.weights.iter().sum();
        Ok(StepPayload::new().with_scalar("rog", (spread / total).sqrt()))
    }
}

#[derive(Default)]
struct RadiusOfGyration {
    values: Vec<f64>,
    times: Vec<f64>,
}

impl Analysis for RadiusOfGyration {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let selection = context.config.atom_selection("atom_selection")?;
        let weights = context.config.weights("weights")?;
        let names = selection.name_map();
        let atoms: Vec<usize> = names.keys().copied().collect();
        let atom_weights: Vec<f64> = names.values().map(|name| weights.property_of(name)).collect();
        if atoms.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        if atom_weights.iter().sum::<f64>() <= 0.0 {
            return Err(AnalysisError::job(
                "JOB.WEIGHTS",
                format!("setting 'weights': '{}' sums to zero over the selection", weights.property),
            ));
        }
        self.values = vec![0.0; frames.number];
        self.times = frames.time.clone();
        Ok(JobPlan::new(
            frames.number,
            GyrationKernel {
                trajectory,
                frames: frames.value.clone(),
                atoms,
                weights: atom_weights,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        self.values[index] = payload.scalar("rog")?;
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.times.len();
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        output
            .add_data("rog", VariableKind::Line, &[n], self.values.clone(), "time", "nm")?
            .main_result = true;
        Ok(output)
    }
}

struct ProfileKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    axis: usize,
    n_bins: usize,
    /// (name, atoms) per element.
    elements: Vec<(String, Vec<usize>)>,
}

impl StepKernel for ProfileKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let cell = self.trajectory.unit_cell(frame)?.ok_or_else(|| {
            AnalysisError::job("JOB.NON_PERIODIC", format!("frame {frame} has no unit cell"))
        })?;
        let coordinates = self.trajectory.coordinates(frame)?;
        let mut payload = StepPayload::new().with_scalar("length", cell.plane_spacings()[self.axis]);
        for (name, atoms) in &self.elements {
            let mut histogram = vec![0.0; self.n_bins];
            for &atom in atoms {
                let fraction = cell.to_fractional(coordinates[atom])[self.axis].rem_euclid(1.0);
                let bin = ((fraction * self.n_bins as f64) as usize).min(self.n_bins - 1);
                histogram[bin] += 1.0;
            }
            payload.insert(name, histogram);
        }
        Ok(payload)
    }
}

#[derive(Default)]
struct DensityProfile {
    profiles: BTreeMap<String, Vec<f64>>,
    weights: BTreeMap<String, f64>,
    length: f64,
    n_frames: usize,
    n_bins: usize,
}

impl Analysis for DensityProfile {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        common::require_periodic(&trajectory, "DensityProfile")?;
        let frames = context.config.frames("frames")?;
        let selection = context.config.atom_selection("atom_selection")?;
        if selection.selection_length == 0 {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let axis = axis_index(context.config.text("axis")?);
        let reference = common::frame_cell(&trajectory, frames.first, None)?;
        let n_bins = ((reference.plane_spacings()[axis] / context.config.float("dr")?).round() as usize).max(1);

        let elements: Vec<(String, Vec<usize>)> = selection.indices_by_name().into_iter().collect();
        self.profiles = elements
            .iter()
            .map(|(name, _)| (name.clone(), vec![0.0; n_bins]))
            .collect();
        self.weights = context.config.weights("weights")?.atom_weights(&selection.get_natoms());
        self.length = 0.0;
        self.n_frames = frames.number;
        self.n_bins = n_bins;
        Ok(JobPlan::new(
            frames.number,
            ProfileKernel {
                trajectory,
                frames: frames.value.clone(),
                axis,
                n_bins,
                elements,
            },
        ))
    }

    fn combine(&mut self, _index: usize, payload: StepPayload) -> AnalysisResult<()> {
        self.length += payload.scalar("length")?;
        for (name, profile) in self.profiles.iter_mut() {
            for (total, value) in profile.iter_mut().zip(payload.get(name)?) {
                *total += value;
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.n_bins;
        let frames = self.n_frames.max(1) as f64;
        let width = self.length / frames / n as f64;
        let mut output = OutputData::new();
        output.add_data(
            "r",
            VariableKind::Line,
            &[n],
            (0..n).map(|bin| (bin as f64 + 0.5) * width).collect(),
            "",
            "nm",
        )?;
        let mut total = vec![0.0; n];
        for (name, profile) in &self.profiles {
            let mean: Vec<f64> = profile.iter().map(|count| count / frames).collect();
            let weight = self.weights.get(name).copied().unwrap_or(0.0);
            for (slot, value) in total.iter_mut().zip(&mean) {
                *slot += weight * value;
            }
            output
                .add_data(&format!("dp_{name}"), VariableKind::Line, &[n], mean, "r", "au")?
                .partial_result = true;
        }
        output
            .add_data("dp_total", VariableKind::Line, &[n], total, "r", "au")?
            .main_result = true;
        Ok(output)
    }
}

/// Symbol of the most massive atom of a group, standing in for the group.
fn representative_symbol(system: &ChemicalSystem, group: &[usize], database: &AtomDatabase) -> AnalysisResult<String> {
    let ids: Vec<AtomId> = group.iter().map(|&i| AtomId(i)).collect();
    let masses = system.masses(&ids, database)?;
    let heaviest = masses
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(position, _)| group[position])
        .ok_or_else(|| AnalysisError::job("JOB.EMPTY_SELECTION", "empty group"))?;
    Ok(system.atoms()[heaviest].symbol.clone())
}

struct CenterKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    groups: Vec<Vec<AtomId>>,
    database: AtomDatabase,
}

impl StepKernel for CenterKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let coordinates = whole_coordinates(&self.trajectory, self.frames[index])?;
        let system = self.trajectory.chemical_system();
        let mut centers = Vec::with_capacity(3 * self.groups.len());
        for group in &self.groups {
            centers.extend(system.center_of_mass(group, &coordinates, &self.database)?);
        }
        Ok(StepPayload::new().with("centers", centers))
    }
}

#[derive(Default)]
struct CenterOfMasses {
    trajectory: Option<Trajectory>,
    frames: Vec<usize>,
    times: Vec<f64>,
    writer: Option<common::OrderedFrameWriter>,
}

impl Analysis for CenterOfMasses {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let grouping = context.config.grouping("grouping_level")?;
        if grouping.groups.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let source = trajectory.chemical_system();
        let mut centers = ChemicalSystem::new(format!("{} centres of mass", source.name()));
        for (group, name) in grouping.groups.iter().zip(&grouping.names) {
            let symbol = representative_symbol(source, group, &context.databases.atoms)?;
            centers.add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new(&symbol, name)), context.databases)?;
        }
        let path = common::trajectory_output_path(context.config.output_files("output_files")?);
        self.writer = Some(common::OrderedFrameWriter::create(&path, &centers, frames.number)?);
        self.frames = frames.value.clone();
        self.times = frames.time.clone();
        self.trajectory = Some(trajectory.clone());
        Ok(JobPlan::new(
            frames.number,
            CenterKernel {
                trajectory,
                frames: frames.value.clone(),
                groups: (0..grouping.groups.len()).map(|group| grouping.atom_ids(group)).collect(),
                database: context.databases.atoms.clone(),
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        let (Some(trajectory), Some(writer)) = (self.trajectory.as_ref(), self.writer.as_mut()) else {
            return Err(AnalysisError::internal("JOB.STATE", "combine before initialize"));
        };
        let centers = payload
            .get("centers")?
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let configuration = Configuration::from_coordinates(centers, trajectory.unit_cell(self.frames[index])?);
        writer.push(index, configuration, self.times[index])
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        if let Some(mut writer) = self.writer.take() {
            let path = writer.close()?;
            context.log.info(format!("centre-of-mass trajectory written to {}", path.display()));
        }
        Ok(OutputData::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{atoms, parameters, run, run_err, write_trajectory};
    use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem};
    use crate::configuration::UnitCell;
    use crate::database::Databases;
    use crate::trajectory::Trajectory;
    use serde_json::json;

    #[test]
    fn radius_of_gyration_of_a_pair() {
        let databases = Databases::builtin().expect("databases");
        let frames = vec![vec![[0.0, 0.0, 0.0], [0.2, 0.0, 0.0]], vec![[0.0, 0.0, 0.0], [0.0, 0.4, 0.0]]];
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(&directory.path().join("pair.mdt"), &atoms("C", 2, &databases), &frames, None, 1.0);
        let output = run("RadiusOfGyration", &parameters(&path, json!({})));
        let rog = &output.get("rog").expect("rog").data;
        assert!((rog[0] - 0.1).abs() < 1e-12);
        assert!((rog[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(
            &directory.path().join("pair.mdt"),
            &atoms("C", 2, &databases),
            &[vec![[0.0; 3], [0.1, 0.0, 0.0]]],
            None,
            1.0,
        );
        let error = run_err("RadiusOfGyration", &parameters(&path, json!({"weights": "b_incoherent"})));
        assert_eq!(error.placeholder(), "JOB.WEIGHTS");
    }

    #[test]
    fn profile_counts_atoms_per_slab() {
        let databases = Databases::builtin().expect("databases");
        let frame = vec![[0.1, 0.1, 0.05], [0.5, 0.5, 0.05], [0.2, 0.3, 0.55], [0.7, 0.1, 0.95]];
        let directory = tempfile::tempdir().expect("tempdir");
        let cell = UnitCell::cubic(1.0).expect("cell");
        let path = write_trajectory(
            &directory.path().join("slab.mdt"),
            &atoms("Ar", 4, &databases),
            &vec![frame; 2],
            Some(cell),
            1.0,
        );
        let output = run("DensityProfile", &parameters(&path, json!({"dr": 0.1})));
        let profile = &output.get("dp_total").expect("profile").data;
        assert_eq!(profile.len(), 10);
        let expected = [2.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        for (value, expected) in profile.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-12);
        }
        let r = &output.get("r").expect("r").data;
        assert!((r[0] - 0.05).abs() < 1e-12);
        assert_eq!(output.get("dp_Ar").expect("partial").data, *profile);
    }

    #[test]
    fn molecules_collapse_to_their_centres() {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("dimers");
        for _ in 0..2 {
            system
                .add_chemical_entity(
                    ChemicalEntity::AtomCluster {
                        name: "dimer".to_string(),
                        atoms: vec![AtomSpec::new("C", "C1"), AtomSpec::new("C", "C2").bonded_to(&["C1"])],
                    },
                    &databases,
                )
                .expect("dimer");
        }
        let frame = vec![[0.0, 0.0, 0.0], [0.2, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 1.2, 1.0]];
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(&directory.path().join("dimers.mdt"), &system, &[frame], None, 1.0);
        let root = directory.path().join("com");
        run(
            "CenterOfMassesTrajectory",
            &parameters(&path, json!({"output_files": [root.display().to_string(), ["container"]]})),
        );
        let centers = Trajectory::open(&root.with_extension("mdt"), &databases).expect("centres");
        assert_eq!(centers.chemical_system().atoms().len(), 2);
        let coordinates = centers.coordinates(0).expect("coordinates");
        let expected = [[0.1, 0.0, 0.0], [1.0, 1.1, 1.0]];
        for (value, expected) in coordinates.iter().zip(expected) {
            for axis in 0..3 {
                assert!((value[axis] - expected[axis]).abs() < 1e-12);
            }
        }
    }
}
