//! Refolds a bilayer split by the periodic boundary so each leaflet is whole
//! and the lower leaflet sits below the upper one along the membrane axis.

use super::common;
use crate::chemistry::{ChemicalSystem, EntityKind};
use crate::configuration::{Configuration, UnitCell, contiguous_coordinates};
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{add, scale};
use crate::output::OutputData;
use crate::trajectory::Trajectory;
use serde_json::json;
use std::f64::consts::TAU;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "RefoldedMembraneTrajectory",
        label: "Refolded Membrane Trajectory",
        category: &["Analysis", "Trajectory"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(RefoldedMembrane::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new("axis", SettingKind::SingleChoice(vec!["a", "b", "c"]), json!("c"))
            .with_label("membrane normal"),
        SettingSpec::new("upper_leaflet", SettingKind::Text, json!("DMPC")),
        SettingSpec::new("lower_leaflet", SettingKind::Text, json!("DMPC")),
        common::output_files(),
        common::running_mode(),
    ]
}

/// Atoms of every top-level entity named `name`.
fn lipids(system: &ChemicalSystem, name: &str) -> AnalysisResult<Vec<Vec<usize>>> {
    let mut lipids = Vec::new();
    for &id in system.top_level_entities() {
        let entity = system.entity(id)?;
        if entity.kind != EntityKind::Atom && entity.name == name {
            lipids.push(system.atom_list(id)?.into_iter().map(|atom| atom.0).collect());
        }
    }
    Ok(lipids)
}

/// Mean of fractional positions taken on the circle, in `[0, 1)`.
fn circular_mean(fractions: &[f64]) -> f64 {
    let (sin, cos) = fractions
        .iter()
        .fold((0.0, 0.0), |(s, c), f| (s + (TAU * f).sin(), c + (TAU * f).cos()));
    (sin.atan2(cos) / TAU).rem_euclid(1.0)
}

struct MembraneKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    axis: usize,
    upper: Vec<Vec<usize>>,
    lower: Vec<Vec<usize>>,
}

impl MembraneKernel {
    fn fractional_center(&self, cell: &UnitCell, coordinates: &[Vec3], lipid: &[usize]) -> f64 {
        let sum: f64 = lipid
            .iter()
            .map(|&atom| cell.to_fractional(coordinates[atom])[self.axis])
            .sum();
        sum / lipid.len().max(1) as f64
    }

    /// Moves whole lipids by cell vectors so their centres lie within half a
    /// cell of `target`; returns the leaflet's centre after the move.
    fn gather(&self, cell: &UnitCell, coordinates: &mut [Vec3], leaflet: &[Vec<usize>], target: f64) -> f64 {
        let vector = cell.direct()[self.axis];
        let mut total = 0.0;
        for lipid in leaflet {
            let center = self.fractional_center(cell, coordinates, lipid);
            let shift = (target - center).round();
            if shift != 0.0 {
                for &atom in lipid {
                    coordinates[atom] = add(coordinates[atom], scale(vector, shift));
                }
            }
            total += center + shift;
        }
        total / leaflet.len().max(1) as f64
    }
}

impl StepKernel for MembraneKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let cell = self.trajectory.unit_cell(frame)?.ok_or_else(|| {
            AnalysisError::job("JOB.NON_PERIODIC", format!("frame {frame} has no unit cell"))
        })?;
        let coordinates = self.trajectory.coordinates(frame)?;
        let mut coordinates = contiguous_coordinates(self.trajectory.chemical_system(), &coordinates, &cell);

        let centers = |leaflet: &[Vec<usize>], coordinates: &[Vec3]| -> Vec<f64> {
            leaflet
                .iter()
                .map(|lipid| self.fractional_center(&cell, coordinates, lipid))
                .collect()
        };
        let upper_target = circular_mean(&centers(&self.upper, &coordinates));
        let upper = self.gather(&cell, &mut coordinates, &self.upper, upper_target);
        // the lower leaflet goes to the image just below the upper one
        let lower_mean = circular_mean(&centers(&self.lower, &coordinates));
        let lower_target = lower_mean - (lower_mean - upper).ceil();
        self.gather(&cell, &mut coordinates, &self.lower, lower_target);

        Ok(StepPayload::new().with("coordinates", coordinates.concat()))
    }
}

#[derive(Default)]
struct RefoldedMembrane {
    trajectory: Option<Trajectory>,
    frames: Vec<usize>,
    times: Vec<f64>,
    writer: Option<common::OrderedFrameWriter>,
}

impl Analysis for RefoldedMembrane {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        common::require_periodic(&trajectory, "RefoldedMembraneTrajectory")?;
        let frames = context.config.frames("frames")?;
        let axis = match context.config.text("axis")?.as_str() {
            "a" => 0,
            "b" => 1,
            _ => 2,
        };
        let system = trajectory.chemical_system();
        let upper = lipids(system, context.config.text("upper_leaflet")?)?;
        let lower = lipids(system, context.config.text("lower_leaflet")?)?;
        if upper.is_empty() || lower.is_empty() {
            return Err(AnalysisError::job(
                "JOB.EMPTY_SELECTION",
                "no molecule matches the upper or lower leaflet name",
            ));
        }
        tracing::debug!(upper = upper.len(), lower = lower.len(), axis, "membrane leaflets");

        let path = common::trajectory_output_path(context.config.output_files("output_files")?);
        self.writer = Some(common::OrderedFrameWriter::create(&path, system, frames.number)?);
        self.frames = frames.value.clone();
        self.times = frames.time.clone();
        self.trajectory = Some(trajectory.clone());
        Ok(JobPlan::new(
            frames.number,
            MembraneKernel {
                trajectory,
                frames: frames.value.clone(),
                axis,
                upper,
                lower,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        let (Some(trajectory), Some(writer)) = (self.trajectory.as_ref(), self.writer.as_mut()) else {
            return Err(AnalysisError::internal("JOB.STATE", "combine before initialize"));
        };
        let coordinates = payload
            .get("coordinates")?
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let configuration = Configuration::from_coordinates(coordinates, trajectory.unit_cell(self.frames[index])?);
        writer.push(index, configuration, self.times[index])
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        if let Some(mut writer) = self.writer.take() {
            let path = writer.close()?;
            context.log.info(format!("refolded trajectory written to {}", path.display()));
        }
        Ok(OutputData::new())
    }
}
