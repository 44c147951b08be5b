//! Elastic incoherent structure factor.
//!
//! For every group and |Q| shell the step computes
//! `|⟨exp(i Q·r(t))⟩_t|²` averaged over the shell's Q directions; groups of
//! more than one atom follow their centre of mass.

use super::common;
use crate::configurators::{SettingKind, SettingSpec};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::QShell;
use crate::numerics::linalg::dot;
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use num_complex::Complex64;
use serde_json::json;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "ElasticIncoherentStructureFactor",
        label: "Elastic Incoherent Structure Factor",
        category: &["Analysis", "Scattering"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(Eisf::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new(
            "q_vectors",
            SettingKind::QVectors,
            json!({
                "generator": "spherical_lattice",
                "shells": {"first": 1.0, "last": 10.0, "step": 1.0},
                "n_vectors": 50,
                "width": 1.0
            }),
        ),
        common::atom_selection(),
        common::atom_transmutation(),
        common::grouping_level(),
        common::weights("b_incoherent2"),
        common::output_files(),
        common::running_mode(),
    ]
}

/// `|⟨exp(i q·r(t))⟩_t|²` averaged over the vectors of one shell.
fn shell_eisf(shell: &QShell, series: &[Vec3]) -> f64 {
    if shell.vectors.is_empty() || series.is_empty() {
        return 0.0;
    }
    let n_frames = series.len() as f64;
    let total: f64 = shell
        .vectors
        .iter()
        .map(|&q| {
            let mean: Complex64 = series.iter().map(|&r| Complex64::cis(dot(q, r))).sum::<Complex64>() / n_frames;
            mean.norm_sqr()
        })
        .sum();
    total / shell.vectors.len() as f64
}

struct EisfKernel {
    trajectory: Trajectory,
    groups: Vec<Vec<usize>>,
    range: (usize, usize, usize),
    shells: Vec<QShell>,
    database: AtomDatabase,
}

impl StepKernel for EisfKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let series = common::group_series(&self.trajectory, &self.groups[index], self.range, &self.database)?;
        let values = self.shells.iter().map(|shell| shell_eisf(shell, &series)).collect();
        Ok(StepPayload::new().with("eisf", values))
    }
}

#[derive(Default)]
struct Eisf {
    q_values: Vec<f64>,
    names: Vec<String>,
    /// Summed scattering weight of each group.
    weights: Vec<f64>,
    values: Vec<Vec<f64>>,
}

impl Analysis for Eisf {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let q_vectors = context.config.q_vectors("q_vectors")?;
        let grouping = context.config.grouping("grouping_level")?;
        if grouping.groups.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        self.weights = common::group_weights(
            grouping,
            context.config.atom_selection("atom_selection")?,
            context.config.weights("weights")?,
        );
        self.q_values = q_vectors.q_values();
        self.names = grouping.names.clone();
        self.values = vec![Vec::new(); grouping.groups.len()];
        Ok(JobPlan::new(
            grouping.groups.len(),
            EisfKernel {
                trajectory,
                groups: grouping.groups.clone(),
                range: (frames.first, frames.last, frames.step),
                shells: q_vectors.shells.shells.clone(),
                database: context.databases.atoms.clone(),
            },
        ))
    }

    fn combine(&mut self, index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        self.values[index] = payload.take("eisf")?;
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n_shells = self.q_values.len();
        let mut output = OutputData::new();
        output.add_data("q", VariableKind::Line, &[n_shells], self.q_values.clone(), "", "1/nm")?;
        let reduced = common::GroupPartials::new(&self.names, &self.values, &self.weights, n_shells);
        for (name, mean) in reduced.partials {
            output
                .add_data(&format!("eisf_{name}"), VariableKind::Line, &[n_shells], mean, "q", "au")?
                .partial_result = true;
        }
        output
            .add_data("eisf_total", VariableKind::Line, &[n_shells], reduced.total, "q", "au")?
            .main_result = true;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{atoms, parameters, run, run_err, write_mock, write_trajectory};
    use crate::database::Databases;
    use serde_json::json;

    fn linear_q(first: f64) -> serde_json::Value {
        json!({
            "generator": "linear",
            "shells": {"first": first, "last": first + 1.0, "step": 1.0},
            "n_vectors": 3,
            "width": 1.0e-9,
            "axis": [1.0, 0.0, 0.0]
        })
    }

    #[test]
    fn static_atoms_scatter_fully_elastically() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_mock(
            &directory.path().join("lattice.json"),
            json!({"element": "Ar", "lattice_constant": 0.5, "repeats": [2, 2, 2], "n_frames": 5, "time_step": 1.0}),
        );
        let output = run(
            "ElasticIncoherentStructureFactor",
            &parameters(&path, json!({"q_vectors": linear_q(7.0), "weights": "equal"})),
        );
        let total = &output.get("eisf_total").expect("eisf").data;
        assert_eq!(total.len(), 1);
        assert!((total[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn species_without_incoherent_scattering_need_other_weights() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_mock(
            &directory.path().join("lattice.json"),
            json!({"element": "Ar", "lattice_constant": 0.5, "repeats": [2, 2, 2], "n_frames": 3, "time_step": 1.0}),
        );
        let error = run_err(
            "ElasticIncoherentStructureFactor",
            &parameters(&path, json!({"q_vectors": linear_q(7.0)})),
        );
        assert_eq!(error.placeholder(), "JOB.WEIGHTS");
    }

    #[test]
    fn two_site_jump_follows_the_closed_form() {
        let databases = Databases::builtin().expect("databases");
        let frames: Vec<_> = (0..4)
            .map(|frame| vec![[if frame % 2 == 0 { 0.0 } else { 0.2 }, 0.0, 0.0]])
            .collect();
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(
            &directory.path().join("jump.mdt"),
            &atoms("H", 1, &databases),
            &frames,
            None,
            1.0,
        );
        let output = run(
            "ElasticIncoherentStructureFactor",
            &parameters(&path, json!({"q_vectors": linear_q(5.0)})),
        );
        let expected = 0.5f64.cos().powi(2);
        assert!((output.get("eisf_H").expect("eisf H").data[0] - expected).abs() < 1e-6);
        assert!((output.get("eisf_total").expect("eisf").data[0] - expected).abs() < 1e-6);
    }
}
