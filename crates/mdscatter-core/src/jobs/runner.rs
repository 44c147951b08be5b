use super::dispatch::{DispatchOutcome, dispatcher_for};
use super::kernel::JobContext;
use super::registry::JobDescriptor;
use super::status::{JobState, JobStatus};
use crate::configurators::{ResolvedConfig, RunningMode, resolve};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, JobParameters};
use crate::numerics::{PARALLEL_CHECK_TOLERANCE, first_mismatch};
use crate::output::{JobLog, OutputData};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::PathBuf;

pub const DEFAULT_PROGRESS_RATE: f64 = 0.1;

/// `<pid>_<4 random characters>`, not yet used as a name in the temp
/// directory.
pub fn generate_job_id() -> String {
    let temp = std::env::temp_dir();
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(4)
            .map(char::from)
            .collect();
        let id = format!("{}_{suffix}", std::process::id());
        if !temp.join(&id).exists() {
            return id;
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub job: String,
    pub state: JobState,
    pub n_steps: usize,
    pub output: OutputData,
    pub files: Vec<PathBuf>,
    pub log: JobLog,
}

/// Outcome of a single-core against multicore comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelCheck {
    pub variables: usize,
    pub values: usize,
}

/// Runs one registered job: resolve, initialize, dispatch, finalize, write.
#[derive(Debug, Clone)]
pub struct JobRunner<'a> {
    descriptor: &'a JobDescriptor,
    databases: &'a Databases,
    write_outputs: bool,
    progress_rate: f64,
}

impl<'a> JobRunner<'a> {
    pub fn new(descriptor: &'a JobDescriptor, databases: &'a Databases) -> Self {
        Self {
            descriptor,
            databases,
            write_outputs: true,
            progress_rate: DEFAULT_PROGRESS_RATE,
        }
    }

    /// Keeps results in memory only.
    pub fn without_outputs(mut self) -> Self {
        self.write_outputs = false;
        self
    }

    pub fn with_progress_rate(mut self, rate: f64) -> Self {
        self.progress_rate = rate;
        self
    }

    /// Resolves every setting without running any step.
    pub fn check(&self, parameters: &JobParameters) -> AnalysisResult<ResolvedConfig> {
        resolve(&self.descriptor.settings(), parameters, self.databases)
            .map_err(|error| error.with_context(self.descriptor.name))
    }

    pub fn run(&self, parameters: &JobParameters, status: &mut JobStatus) -> AnalysisResult<JobReport> {
        let job_id = generate_job_id();
        let log = JobLog::new(job_id.clone());
        match self.execute(&job_id, parameters, status, &log) {
            Ok(report) => Ok(report),
            Err(error) => {
                log.error(error.to_string());
                status.fail(error.message());
                Err(error)
            }
        }
    }

    fn execute(
        &self,
        job_id: &str,
        parameters: &JobParameters,
        status: &mut JobStatus,
        log: &JobLog,
    ) -> AnalysisResult<JobReport> {
        let name = self.descriptor.name;
        let config = self.check(parameters)?;
        log.info(format!("job {name} configured\n{}", config.information()));
        let mode = if config.is_configured("running_mode") {
            config.running_mode("running_mode")?.clone()
        } else {
            RunningMode::SingleCore
        };

        let mut analysis = self.descriptor.create();
        let context = JobContext {
            config: &config,
            databases: self.databases,
            log,
        };
        let plan = analysis.initialize(&context)?;
        if plan.n_steps == 0 {
            return Err(AnalysisError::job(
                "JOB.NUMBER_OF_STEPS",
                format!("{name} planned no step to run"),
            ));
        }

        let dispatcher = dispatcher_for(&mode, name, config.raw());
        log.info(format!("running {} steps ({})", plan.n_steps, mode.information()));
        status.start(plan.n_steps, self.progress_rate);
        let outcome = dispatcher.dispatch(
            &plan,
            &mut |index, payload| analysis.combine(index, payload),
            status,
        )?;
        let mut report = JobReport {
            job_id: job_id.to_string(),
            job: name.to_string(),
            state: JobState::Aborted,
            n_steps: plan.n_steps,
            output: OutputData::new(),
            files: Vec::new(),
            log: log.clone(),
        };
        if outcome == DispatchOutcome::Cancelled {
            log.warn(format!("cancelled after {} of {} steps", status.completed(), plan.n_steps));
            status.abort();
            return Ok(report);
        }

        report.output = analysis.finalize(&context)?;
        if self.write_outputs && config.is_configured("output_files") {
            let files = config.output_files("output_files")?;
            log.info(format!("writing {} output variables", report.output.len()));
            report.files = report.output.write(files, name, Some(log))?;
        }
        status.finish();
        report.state = JobState::Finished;
        Ok(report)
    }

    /// Runs the job single-core then multicore on `workers` threads and
    /// compares every output variable element-wise.
    pub fn check_parallel(&self, parameters: &JobParameters, workers: usize) -> AnalysisResult<ParallelCheck> {
        let runner = self.clone().without_outputs();
        let mut serial = parameters.clone();
        serial.insert("running_mode".to_string(), RunningMode::SingleCore.to_raw());
        let mut parallel = parameters.clone();
        parallel.insert(
            "running_mode".to_string(),
            RunningMode::Multicore { workers: workers.max(1) }.to_raw(),
        );
        let baseline = runner.run(&serial, &mut JobStatus::default())?.output;
        let actual = runner.run(&parallel, &mut JobStatus::default())?.output;
        compare_outputs(&baseline, &actual)
    }
}

/// Element-wise comparison of two runs' outputs.
pub fn compare_outputs(baseline: &OutputData, actual: &OutputData) -> AnalysisResult<ParallelCheck> {
    let mismatch = |message: String| AnalysisError::new(ErrorKind::Job, "JOB.PARALLEL_MISMATCH", message);
    if baseline.names() != actual.names() {
        return Err(mismatch(format!(
            "variables differ: {:?} against {:?}",
            baseline.names(),
            actual.names()
        )));
    }
    let mut values = 0;
    for expected in baseline.iter() {
        let found = actual.get(&expected.name)?;
        if expected.shape != found.shape {
            return Err(mismatch(format!(
                "'{}' has shape {:?} against {:?}",
                expected.name, expected.shape, found.shape
            )));
        }
        if let Some((index, comparison)) = first_mismatch(&expected.data, &found.data, PARALLEL_CHECK_TOLERANCE) {
            return Err(mismatch(format!(
                "'{}' differs at element {index} (abs {:.3e}, rel {:.3e})",
                expected.name, comparison.abs_diff, comparison.rel_diff
            )));
        }
        values += expected.data.len();
    }
    Ok(ParallelCheck {
        variables: baseline.len(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::{JobRunner, compare_outputs, generate_job_id};
    use crate::database::Databases;
    use crate::jobs::status::{CancellationToken, JobState, JobStatus};
    use crate::jobs::testing::square_sum_descriptor;
    use crate::output::{OutputData, VariableKind, read_output};
    use serde_json::json;

    fn parameters(value: serde_json::Value) -> crate::JobParameters {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn job_ids_carry_the_process_id() {
        let id = generate_job_id();
        let (pid, suffix) = id.split_once('_').expect("separator");
        assert_eq!(pid, std::process::id().to_string());
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn runs_combine_every_step_and_write_outputs() {
        let databases = Databases::builtin().expect("databases");
        let descriptor = square_sum_descriptor();
        let directory = tempfile::tempdir().expect("tempdir");
        let root = directory.path().join("squares");
        let parameters = parameters(json!({
            "n_steps": 5,
            "running_mode": ["multicore", 2],
            "output_files": [root.to_string_lossy(), ["container"], true]
        }));
        let mut status = JobStatus::default();
        let report = JobRunner::new(&descriptor, &databases)
            .run(&parameters, &mut status)
            .expect("run");
        assert_eq!(report.state, JobState::Finished);
        assert_eq!(report.output.get("total").expect("total").data, vec![30.0]);
        assert_eq!(report.files.len(), 2);
        let (written, header) = read_output(&directory.path().join("squares.mdo")).expect("read");
        assert_eq!(header, "SquareSum");
        assert_eq!(written.get("squares").expect("squares").data, vec![0.0, 1.0, 4.0, 9.0, 16.0]);
        assert!(std::fs::read_to_string(directory.path().join("squares.log"))
            .expect("log")
            .contains("running 5 steps"));
        assert_eq!(status.state(), JobState::Finished);
    }

    #[test]
    fn setup_errors_fail_before_any_step() {
        let databases = Databases::builtin().expect("databases");
        let descriptor = square_sum_descriptor();
        let mut status = JobStatus::default();
        let error = JobRunner::new(&descriptor, &databases)
            .run(&parameters(json!({"n_steps": -1})), &mut status)
            .expect_err("bounds");
        assert_eq!(error.placeholder(), "JOB.SETTING");
        assert_eq!(status.state(), JobState::Failed);
        assert_eq!(status.completed(), 0);
    }

    #[test]
    fn zero_steps_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        let descriptor = square_sum_descriptor();
        let error = JobRunner::new(&descriptor, &databases)
            .without_outputs()
            .run(&parameters(json!({"n_steps": 0})), &mut JobStatus::default())
            .expect_err("no steps");
        assert_eq!(error.placeholder(), "JOB.NUMBER_OF_STEPS");
    }

    #[test]
    fn cancelled_runs_end_aborted_without_outputs() {
        let databases = Databases::builtin().expect("databases");
        let descriptor = square_sum_descriptor();
        let token = CancellationToken::new();
        token.cancel();
        let mut status = JobStatus::new(token);
        let report = JobRunner::new(&descriptor, &databases)
            .without_outputs()
            .run(&parameters(json!({"n_steps": 3})), &mut status)
            .expect("run");
        assert_eq!(report.state, JobState::Aborted);
        assert!(report.output.is_empty());
        assert_eq!(status.state(), JobState::Aborted);
    }

    #[test]
    fn parallel_checks_compare_every_variable() {
        let databases = Databases::builtin().expect("databases");
        let descriptor = square_sum_descriptor();
        let check = JobRunner::new(&descriptor, &databases)
            .check_parallel(&parameters(json!({"n_steps": 12})), 3)
            .expect("check");
        assert_eq!(check.variables, 2);
        assert_eq!(check.values, 13);

        let mut baseline = OutputData::new();
        baseline
            .add_data("x", VariableKind::Line, &[2], vec![1.0, 2.0], "", "au")
            .expect("x");
        let mut drifted = baseline.clone();
        drifted.get_mut("x").expect("x").data[1] = 2.1;
        let error = compare_outputs(&baseline, &drifted).expect_err("mismatch");
        assert_eq!(error.placeholder(), "JOB.PARALLEL_MISMATCH");
        assert!(error.message().contains("element 1"));
    }
}
