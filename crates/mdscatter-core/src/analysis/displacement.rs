//! Mean-square displacement and root-mean-square deviation of groups.
//!
//! Both follow the unfolded trajectory of each group (its centre of mass
//! when it holds more than one atom). The MSD averages over every origin of
//! the correlation window; the RMSD measures each frame against one
//! reference frame of the selection.

use super::common;
use crate::configurators::{Projector, SettingKind, SettingSpec};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{dot, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;

pub fn msd_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "MeanSquareDisplacement",
        label: "Mean Square Displacement",
        category: &["Analysis", "Dynamics"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: msd_settings,
        factory: || Box::new(Displacement::new(Mode::MeanSquare)),
    }
}

pub fn rmsd_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "RootMeanSquareDeviation",
        label: "Root Mean Square Deviation",
        category: &["Analysis", "Structure"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: rmsd_settings,
        factory: || Box::new(Displacement::new(Mode::RootMean)),
    }
}

fn msd_settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::correlation_frames(),
        SettingSpec::new("projection", SettingKind::Projection, json!(null)),
        common::atom_selection(),
        common::atom_transmutation(),
        common::grouping_level(),
        common::weights("equal"),
        common::output_files(),
        common::running_mode(),
    ]
}

fn rmsd_settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new(
            "reference_frame",
            SettingKind::Integer { minimum: Some(0), maximum: None },
            json!(0),
        )
        .with_label("reference frame (position in the frame selection)"),
        common::atom_selection(),
        common::atom_transmutation(),
        common::grouping_level(),
        common::weights("atomic_weight"),
        common::output_files(),
        common::running_mode(),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    MeanSquare,
    RootMean,
}

fn squared_distance(a: Vec3, b: Vec3) -> f64 {
    let delta = sub(a, b);
    dot(delta, delta)
}

/// `⟨|r(t0 + τ) - r(t0)|²⟩` over the `n_configs` origins.
fn mean_square_displacement(series: &[Vec3], n_lags: usize, n_configs: usize) -> Vec<f64> {
    (0..n_lags)
        .map(|lag| {
            let origins = (0..n_configs).filter(|&t| t + lag < series.len());
            let (total, count) = origins.fold((0.0, 0usize), |(total, count), t| {
                (total + squared_distance(series[t + lag], series[t]), count + 1)
            });
            if count == 0 { 0.0 } else { total / count as f64 }
        })
        .collect()
}

struct DisplacementKernel {
    mode: Mode,
    trajectory: Trajectory,
    groups: Vec<Vec<usize>>,
    range: (usize, usize, usize),
    projector: Projector,
    n_frames: usize,
    n_configs: usize,
    reference: usize,
    database: AtomDatabase,
}

impl StepKernel for DisplacementKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let series = common::group_series(&self.trajectory, &self.groups[index], self.range, &self.database)?;
        let series = self.projector.project_all(&series);
        let values = match self.mode {
            Mode::MeanSquare => mean_square_displacement(&series, self.n_frames, self.n_configs),
            Mode::RootMean => {
                let reference = series.get(self.reference).copied().unwrap_or_default();
                series.iter().map(|&r| squared_distance(r, reference)).collect()
            }
        };
        Ok(StepPayload::new().with("values", values))
    }
}

struct Displacement {
    mode: Mode,
    names: Vec<String>,
    weights: Vec<f64>,
    values: Vec<Vec<f64>>,
    times: Vec<f64>,
}

impl Displacement {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            names: Vec::new(),
            weights: Vec::new(),
            values: Vec::new(),
            times: Vec::new(),
        }
    }
}

impl Analysis for Displacement {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let grouping = context.config.grouping("grouping_level")?;
        if grouping.groups.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let (projector, reference) = match self.mode {
            Mode::MeanSquare => (*context.config.projection("projection")?, 0),
            Mode::RootMean => {
                let reference = context.config.integer("reference_frame")? as usize;
                if reference >= frames.number {
                    return Err(AnalysisError::job(
                        "JOB.SETTING",
                        format!(
                            "setting 'reference_frame': {reference} is outside the {} selected frames",
                            frames.number
                        ),
                    ));
                }
                (Projector::None, reference)
            }
        };
        self.times = match self.mode {
            Mode::MeanSquare => frames.duration[..frames.n_frames].to_vec(),
            Mode::RootMean => frames.time.clone(),
        };
        self.weights = common::group_weights(
            grouping,
            context.config.atom_selection("atom_selection")?,
            context.config.weights("weights")?,
        );
        self.names = grouping.names.clone();
        self.values = vec![Vec::new(); grouping.groups.len()];
        Ok(JobPlan::new(
            grouping.groups.len(),
            DisplacementKernel {
                mode: self.mode,
                trajectory,
                groups: grouping.groups.clone(),
                range: (frames.first, frames.last, frames.step),
                projector,
                n_frames: frames.n_frames,
                n_configs: frames.n_configs,
                reference,
                database: context.databases.atoms.clone(),
            },
        ))
    }

    fn combine(&mut self, index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        self.values[index] = payload.take("values")?;
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.times.len();
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        let reduced = common::GroupPartials::new(&self.names, &self.values, &self.weights, n);
        let (prefix, units, finish): (&str, &str, fn(f64) -> f64) = match self.mode {
            Mode::MeanSquare => ("msd", "nm2", |value| value),
            Mode::RootMean => ("rmsd", "nm", f64::sqrt),
        };
        for (name, mean) in reduced.partials {
            output
                .add_data(
                    &format!("{prefix}_{name}"),
                    VariableKind::Line,
                    &[n],
                    mean.into_iter().map(finish).collect(),
                    "time",
                    units,
                )?
                .partial_result = true;
        }
        output
            .add_data(
                &format!("{prefix}_total"),
                VariableKind::Line,
                &[n],
                reduced.total.into_iter().map(finish).collect(),
                "time",
                units,
            )?
            .main_result = true;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{atoms, parameters, run, run_err, write_trajectory};
    use crate::configuration::UnitCell;
    use crate::database::Databases;
    use serde_json::json;

    fn drifting_atom(directory: &std::path::Path, velocity: [f64; 3], cell: Option<UnitCell>) -> std::path::PathBuf {
        let databases = Databases::builtin().expect("databases");
        let frames: Vec<_> = (0..6)
            .map(|t| {
                let position = velocity.map(|v| v * t as f64);
                let position = match &cell {
                    Some(cell) => cell.fold(position),
                    None => position,
                };
                vec![position]
            })
            .collect();
        write_trajectory(&directory.join("drift.mdt"), &atoms("Ar", 1, &databases), &frames, cell, 1.0)
    }

    #[test]
    fn ballistic_motion_grows_quadratically() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = drifting_atom(directory.path(), [0.3, 0.0, 0.0], None);
        let output = run("MeanSquareDisplacement", &parameters(&path, json!({"frames": [0, 6, 1, 4]})));
        let msd = &output.get("msd_total").expect("msd").data;
        assert_eq!(msd.len(), 4);
        for (lag, value) in msd.iter().enumerate() {
            assert!((value - 0.09 * (lag * lag) as f64).abs() < 1e-9);
        }
        assert_eq!(output.get("msd_Ar").expect("partial").data, *msd);
    }

    #[test]
    fn displacements_are_unfolded_across_the_cell() {
        let directory = tempfile::tempdir().expect("tempdir");
        let cell = UnitCell::cubic(1.0).expect("cell");
        let path = drifting_atom(directory.path(), [0.3, 0.0, 0.0], Some(cell));
        let output = run("MeanSquareDisplacement", &parameters(&path, json!({})));
        let msd = &output.get("msd_total").expect("msd").data;
        assert!((msd[5] - 0.09 * 25.0).abs() < 1e-9);
    }

    #[test]
    fn projection_keeps_one_axis() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = drifting_atom(directory.path(), [0.3, 0.4, 0.0], None);
        let output = run("MeanSquareDisplacement", &parameters(&path, json!({"projection": "x"})));
        let msd = &output.get("msd_total").expect("msd").data;
        assert!((msd[2] - 0.36).abs() < 1e-9);
    }

    #[test]
    fn deviation_is_measured_from_the_reference_frame() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = drifting_atom(directory.path(), [0.3, 0.4, 0.0], None);
        let output = run("RootMeanSquareDeviation", &parameters(&path, json!({"reference_frame": 2})));
        let rmsd = &output.get("rmsd_total").expect("rmsd").data;
        let expected = [1.0, 0.5, 0.0, 0.5, 1.0, 1.5];
        for (value, expected) in rmsd.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn reference_outside_the_selection_is_rejected() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = drifting_atom(directory.path(), [0.3, 0.0, 0.0], None);
        let error = run_err(
            "RootMeanSquareDeviation",
            &parameters(&path, json!({"frames": [0, 3, 1], "reference_frame": 3})),
        );
        assert_eq!(error.placeholder(), "JOB.SETTING");
    }
}
