use crate::configurators::ResolvedConfig;
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult};
use crate::output::{JobLog, OutputData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named numeric arrays produced by one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPayload {
    values: BTreeMap<String, Vec<f64>>,
}

impl StepPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        self.values.insert(name.to_string(), values);
    }

    pub fn with(mut self, name: &str, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn with_scalar(self, name: &str, value: f64) -> Self {
        self.with(name, vec![value])
    }

    pub fn get(&self, name: &str) -> AnalysisResult<&[f64]> {
        self.values
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| missing(name))
    }

    pub fn take(&mut self, name: &str) -> AnalysisResult<Vec<f64>> {
        self.values.remove(name).ok_or_else(|| missing(name))
    }

    pub fn scalar(&self, name: &str) -> AnalysisResult<f64> {
        self.get(name)?
            .first()
            .copied()
            .ok_or_else(|| AnalysisError::internal("JOB.PAYLOAD", format!("step value '{name}' is empty")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn missing(name: &str) -> AnalysisError {
    AnalysisError::internal("JOB.PAYLOAD", format!("step result has no '{name}'"))
}

/// The per-index computation of a job. Must be deterministic in its index
/// and may run on any worker thread or remote process.
pub trait StepKernel: Send + Sync {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload>;
}

/// What `initialize` hands to the dispatcher.
#[derive(Clone)]
pub struct JobPlan {
    pub n_steps: usize,
    pub kernel: Arc<dyn StepKernel>,
}

impl JobPlan {
    pub fn new(n_steps: usize, kernel: impl StepKernel + 'static) -> Self {
        Self {
            n_steps,
            kernel: Arc::new(kernel),
        }
    }
}

impl std::fmt::Debug for JobPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPlan").field("n_steps", &self.n_steps).finish_non_exhaustive()
    }
}

/// Read-only state shared by the lifecycle calls of one run.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub config: &'a ResolvedConfig,
    pub databases: &'a Databases,
    pub log: &'a JobLog,
}

/// An analysis: sizes its accumulators and builds a kernel, folds step
/// results in by index, then reduces them into output variables.
pub trait Analysis: Send {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan>;

    /// Called on the coordinator in arrival order; `index` identifies the step.
    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()>;

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData>;
}
