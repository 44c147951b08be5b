//! Rigid-body trajectory: each group's motion reduced to the translation of
//! its centre of mass and a rotation fitted against a reference frame.
//!
//! The job writes a trajectory in which every grouped atom sits where the
//! rigid body puts it, alongside the quaternions, centres and fit residuals.

use super::common;
use crate::chemistry::AtomId;
use crate::configuration::{Configuration, contiguous_coordinates};
use crate::configurators::{SettingKind, SettingSpec};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{add, mat_vec3, quaternion_to_rotation, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::{RigidBodyTrajectoryGenerator, Trajectory};
use serde_json::json;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "RigidBodyTrajectory",
        label: "Rigid Body Trajectory",
        category: &["Analysis", "Trajectory"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(RigidBody::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        common::atom_selection(),
        SettingSpec::new("grouping_level", SettingKind::GroupingLevel, json!("molecule")),
        SettingSpec::new(
            "reference",
            SettingKind::Integer { minimum: Some(0), maximum: None },
            json!(0),
        )
        .with_label("reference frame"),
        SettingSpec::new("remove_translation", SettingKind::Boolean, json!(false)),
        common::output_files(),
        common::running_mode(),
    ]
}

struct RigidBodyKernel {
    trajectory: Trajectory,
    groups: Vec<Vec<usize>>,
    range: (usize, usize, usize),
    reference: usize,
    database: AtomDatabase,
}

impl RigidBodyKernel {
    /// Offsets of the group atoms from their centre of mass in the reference frame.
    fn reference_offsets(&self, atoms: &[AtomId]) -> AnalysisResult<(Vec3, Vec<Vec3>)> {
        let coordinates = self.trajectory.coordinates(self.reference)?;
        let system = self.trajectory.chemical_system();
        let coordinates = match self.trajectory.unit_cell(self.reference)? {
            Some(cell) => contiguous_coordinates(system, &coordinates, &cell),
            None => coordinates,
        };
        let center = system.center_of_mass(atoms, &coordinates, &self.database)?;
        Ok((center, atoms.iter().map(|id| sub(coordinates[id.0], center)).collect()))
    }
}

impl StepKernel for RigidBodyKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let atoms: Vec<AtomId> = self.groups[index].iter().map(|&i| AtomId(i)).collect();
        let (first, last, step) = self.range;
        let rigid = RigidBodyTrajectoryGenerator::new(&self.trajectory, atoms.clone(), self.reference, &self.database)?
            .generate(first, last, step)?;
        let (center, offsets) = self.reference_offsets(&atoms)?;
        Ok(StepPayload::new()
            .with("quaternions", rigid.quaternions.concat())
            .with("centers", rigid.centers.concat())
            .with("fits", rigid.fits)
            .with("reference_center", center.to_vec())
            .with("offsets", offsets.concat()))
    }
}

#[derive(Debug, Clone, Default)]
struct GroupMotion {
    quaternions: Vec<[f64; 4]>,
    centers: Vec<Vec3>,
    fits: Vec<f64>,
    reference_center: Vec3,
    offsets: Vec<Vec3>,
}

fn triples(values: &[f64]) -> Vec<Vec3> {
    values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

#[derive(Default)]
struct RigidBody {
    groups: Vec<Vec<usize>>,
    motions: Vec<GroupMotion>,
}

impl Analysis for RigidBody {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let grouping = context.config.grouping("grouping_level")?;
        if grouping.groups.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let reference = context.config.integer("reference")? as usize;
        trajectory.check_frame(reference)?;
        self.groups = grouping.groups.clone();
        self.motions = vec![GroupMotion::default(); self.groups.len()];
        Ok(JobPlan::new(
            self.groups.len(),
            RigidBodyKernel {
                trajectory,
                groups: self.groups.clone(),
                range: (frames.first, frames.last, frames.step),
                reference,
                database: context.databases.atoms.clone(),
            },
        ))
    }

    fn combine(&mut self, index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        let quaternions = payload.take("quaternions")?;
        self.motions[index] = GroupMotion {
            quaternions: quaternions.chunks_exact(4).map(|q| [q[0], q[1], q[2], q[3]]).collect(),
            centers: triples(&payload.take("centers")?),
            fits: payload.take("fits")?,
            reference_center: triples(payload.get("reference_center")?).first().copied().unwrap_or_default(),
            offsets: triples(&payload.take("offsets")?),
        };
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let trajectory = context.config.trajectory("trajectory")?.instance();
        let frames = context.config.frames("frames")?;
        let remove_translation = context.config.boolean("remove_translation")?;
        let path = common::trajectory_output_path(context.config.output_files("output_files")?);
        let mut writer = common::OrderedFrameWriter::create(&path, trajectory.chemical_system(), frames.number)?;
        for (position, &frame) in frames.value.iter().enumerate() {
            let mut coordinates = trajectory.coordinates(frame)?;
            for (group, motion) in self.groups.iter().zip(&self.motions) {
                let rotation = quaternion_to_rotation(motion.quaternions[position]);
                let center = if remove_translation { motion.reference_center } else { motion.centers[position] };
                for (&atom, &offset) in group.iter().zip(&motion.offsets) {
                    coordinates[atom] = add(center, mat_vec3(&rotation, offset));
                }
            }
            let configuration = Configuration::from_coordinates(coordinates, trajectory.unit_cell(frame)?);
            writer.push(position, configuration, frames.time[position])?;
        }
        let written = writer.close()?;
        context.log.info(format!("rigid-body trajectory written to {}", written.display()));

        let (n_groups, n_frames) = (self.groups.len(), frames.number);
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n_frames], frames.time.clone(), "", "ps")?;
        let quaternions = self.motions.iter().flat_map(|m| m.quaternions.concat()).collect();
        output.add_data("quaternions", VariableKind::Volume, &[n_groups, n_frames, 4], quaternions, "group|time|q", "au")?;
        let centers = self.motions.iter().flat_map(|m| m.centers.concat()).collect();
        output.add_data("com", VariableKind::Volume, &[n_groups, n_frames, 3], centers, "group|time|xyz", "nm")?;
        let fits = self.motions.iter().flat_map(|m| m.fits.clone()).collect();
        output
            .add_data("fit", VariableKind::Surface, &[n_groups, n_frames], fits, "group|time", "nm")?
            .main_result = true;
        Ok(output)
    }
}
