//! Job framework: analyses declare settings and a step kernel; the runner
//! resolves settings, dispatches steps to a back-end and folds results in.

pub mod dispatch;
pub mod document;
pub mod kernel;
pub mod registry;
pub mod remote;
pub mod runner;
pub mod status;

pub use dispatch::{DispatchOutcome, Dispatcher, MulticoreDispatcher, SingleCoreDispatcher, dispatcher_for};
pub use document::{DocumentOutcome, JOB_DOCUMENT_FORMAT, JobDocument, save};
pub use kernel::{Analysis, JobContext, JobPlan, StepKernel, StepPayload};
pub use registry::{JobDescriptor, JobRegistry};
pub use remote::{RemoteDispatcher, WorkerRequest, WorkerResponse, serve};
pub use runner::{JobReport, JobRunner, ParallelCheck, compare_outputs, generate_job_id};
pub use status::{CancellationToken, JobState, JobStatus, StatusEvent};

#[cfg(test)]
pub(crate) mod testing {
    use super::kernel::{Analysis, JobContext, JobPlan, StepKernel, StepPayload};
    use super::registry::JobDescriptor;
    use crate::configurators::{SettingKind, SettingSpec};
    use crate::domain::AnalysisResult;
    use crate::output::{OutputData, VariableKind};
    use serde_json::json;

    pub(crate) struct SquareKernel;

    impl StepKernel for SquareKernel {
        fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
            Ok(StepPayload::new().with_scalar("square", (index * index) as f64))
        }
    }

    #[derive(Default)]
    struct SquareSum {
        squares: Vec<f64>,
    }

    impl Analysis for SquareSum {
        fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
            let n_steps = context.config.integer("n_steps")? as usize;
            self.squares = vec![0.0; n_steps];
            Ok(JobPlan::new(n_steps, SquareKernel))
        }

        fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
            self.squares[index] = payload.scalar("square")?;
            Ok(())
        }

        fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
            let mut output = OutputData::new();
            let n = self.squares.len();
            output.add_data("squares", VariableKind::Line, &[n], self.squares.clone(), "index", "au")?;
            let total = self.squares.iter().sum();
            output.add_data("total", VariableKind::Line, &[1], vec![total], "", "au")?;
            Ok(output)
        }
    }

    fn settings() -> Vec<SettingSpec> {
        vec![
            SettingSpec::new(
                "n_steps",
                SettingKind::Integer { minimum: Some(0), maximum: None },
                json!(8),
            ),
            SettingSpec::new("running_mode", SettingKind::RunningMode, json!(["single-core"])),
            SettingSpec::new("output_files", SettingKind::OutputFiles, json!(["result", ["container"]])),
        ]
    }

    pub(crate) fn square_sum_descriptor() -> JobDescriptor {
        JobDescriptor {
            name: "SquareSum",
            label: "Sum of squares",
            category: &["Testing"],
            ancestor: &[],
            declare: settings,
            factory: || Box::new(SquareSum::default()),
        }
    }
}
