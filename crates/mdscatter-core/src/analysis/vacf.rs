//! Velocity autocorrelation function `⟨v(0)·v(τ)⟩` of groups.
//!
//! Velocities come from the trajectory when the interpolation order is 0,
//! otherwise from finite differences of the unfolded positions.

use super::common;
use crate::chemistry::AtomId;
use crate::configuration::VELOCITIES;
use crate::configurators::{Projector, SettingKind, SettingSpec};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{add, scale};
use crate::numerics::{normalize_to_origin, vector_autocorrelation};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "VelocityAutoCorrelationFunction",
        label: "Velocity AutoCorrelation Function",
        category: &["Analysis", "Dynamics"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(Vacf::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::correlation_frames(),
        SettingSpec::new("interpolation_order", SettingKind::InterpolationOrder, json!(0))
            .with_label("velocities (0 reads stored velocities)"),
        SettingSpec::new("projection", SettingKind::Projection, json!(null)),
        SettingSpec::new("normalize", SettingKind::Boolean, json!(false)),
        common::atom_selection(),
        common::atom_transmutation(),
        common::grouping_level(),
        common::weights("equal"),
        common::output_files(),
        common::running_mode(),
    ]
}

struct VacfKernel {
    trajectory: Trajectory,
    groups: Vec<Vec<usize>>,
    range: (usize, usize, usize),
    order: usize,
    time_step: f64,
    projector: Projector,
    n_frames: usize,
    database: AtomDatabase,
}

impl VacfKernel {
    /// Mass-weighted velocity of a group read from the stored velocities.
    fn stored_velocities(&self, group: &[usize]) -> AnalysisResult<Vec<Vec3>> {
        let (first, last, step) = self.range;
        let ids: Vec<AtomId> = group.iter().map(|&i| AtomId(i)).collect();
        let masses = self.trajectory.chemical_system().masses(&ids, &self.database)?;
        let total_mass: f64 = masses.iter().sum();
        let mut velocities: Option<Vec<Vec3>> = None;
        for (&atom, &mass) in group.iter().zip(&masses) {
            let series = self
                .trajectory
                .read_configuration_trajectory(atom, first, last, step, VELOCITIES)?;
            let weight = if group.len() == 1 || total_mass <= 0.0 { 1.0 } else { mass / total_mass };
            velocities = Some(match velocities {
                None => series.iter().map(|&v| scale(v, weight)).collect(),
                Some(sum) => sum.iter().zip(&series).map(|(&s, &v)| add(s, scale(v, weight))).collect(),
            });
        }
        Ok(velocities.unwrap_or_default())
    }
}

impl StepKernel for VacfKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let group = &self.groups[index];
        let velocities = if self.order == 0 {
            self.stored_velocities(group)?
        } else {
            let positions = common::group_series(&self.trajectory, group, self.range, &self.database)?;
            common::vector_derivative(&positions, self.time_step, self.order)?
        };
        let velocities = self.projector.project_all(&velocities);
        // dot product: three times the component average
        let vacf = vector_autocorrelation(&velocities, self.n_frames)
            .into_iter()
            .map(|value| 3.0 * value)
            .collect();
        Ok(StepPayload::new().with("vacf", vacf))
    }
}

#[derive(Default)]
struct Vacf {
    names: Vec<String>,
    weights: Vec<f64>,
    values: Vec<Vec<f64>>,
    times: Vec<f64>,
}

impl Analysis for Vacf {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let grouping = context.config.grouping("grouping_level")?;
        if grouping.groups.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let order = *context.config.interpolation_order("interpolation_order")?;
        if order > 0 && frames.number <= order {
            return Err(AnalysisError::job(
                "JOB.SETTING",
                format!(
                    "setting 'interpolation_order': order {order} needs more than {} frames",
                    frames.number
                ),
            ));
        }
        self.times = frames.duration[..frames.n_frames].to_vec();
        self.weights = common::group_weights(
            grouping,
            context.config.atom_selection("atom_selection")?,
            context.config.weights("weights")?,
        );
        self.names = grouping.names.clone();
        self.values = vec![Vec::new(); grouping.groups.len()];
        Ok(JobPlan::new(
            grouping.groups.len(),
            VacfKernel {
                trajectory,
                groups: grouping.groups.clone(),
                range: (frames.first, frames.last, frames.step),
                order,
                time_step: frames.time_step(),
                projector: *context.config.projection("projection")?,
                n_frames: frames.n_frames,
                database: context.databases.atoms.clone(),
            },
        ))
    }

    fn combine(&mut self, index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        self.values[index] = payload.take("vacf")?;
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.times.len();
        let normalize = context.config.boolean("normalize")?;
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        let units = if normalize { "au" } else { "nm2/ps2" };
        let reduced = common::GroupPartials::new(&self.names, &self.values, &self.weights, n);
        for (name, mut values) in reduced.partials {
            if normalize {
                normalize_to_origin(&mut values);
            }
            output
                .add_data(&format!("vacf_{name}"), VariableKind::Line, &[n], values, "time", units)?
                .partial_result = true;
        }
        let mut total = reduced.total;
        if normalize {
            normalize_to_origin(&mut total);
        }
        output
            .add_data("vacf_total", VariableKind::Line, &[n], total, "time", units)?
            .main_result = true;
        Ok(output)
    }
}
