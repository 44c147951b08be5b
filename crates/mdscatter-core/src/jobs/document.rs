use super::registry::{JobDescriptor, JobRegistry};
use super::runner::{JobReport, JobRunner, ParallelCheck};
use super::status::JobStatus;
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, JobParameters};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const JOB_DOCUMENT_FORMAT: &str = "mdscatter-job";

fn default_format() -> String {
    JOB_DOCUMENT_FORMAT.to_string()
}

fn is_false(value: &bool) -> bool {
    !value
}

/// A self-contained, runnable description of one job invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default = "default_format")]
    pub format: String,
    pub job: String,
    pub parameters: JobParameters,
    /// Run single-core and multicore and compare outputs instead of a
    /// plain run.
    #[serde(default, skip_serializing_if = "is_false")]
    pub check_parallel: bool,
}

/// What running a document produced.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Run(JobReport),
    ParallelCheck(ParallelCheck),
}

impl JobDocument {
    pub fn new(job: &str, parameters: JobParameters) -> Self {
        Self {
            format: default_format(),
            job: job.to_string(),
            parameters,
            check_parallel: false,
        }
    }

    /// Every setting of `descriptor` at its default value.
    pub fn template(descriptor: &JobDescriptor) -> Self {
        Self::new(descriptor.name, descriptor.default_parameters())
    }

    pub fn parallel_check(mut self) -> Self {
        self.check_parallel = true;
        self
    }

    pub fn save(&self, path: &Path) -> AnalysisResult<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| {
                AnalysisError::io("IO.JOB_DOCUMENT", format!("{}: {error}", parent.display()))
            })?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|error| AnalysisError::internal("IO.JOB_DOCUMENT", error.to_string()))?;
        fs::write(path, format!("{content}\n"))
            .map_err(|error| AnalysisError::io("IO.JOB_DOCUMENT", format!("{}: {error}", path.display())))
    }

    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|error| AnalysisError::io("IO.JOB_DOCUMENT", format!("{}: {error}", path.display())))?;
        let document: Self = serde_json::from_str(&content).map_err(|error| {
            AnalysisError::corrupted("IO.JOB_DOCUMENT", format!("{}: {error}", path.display()))
        })?;
        if document.format != JOB_DOCUMENT_FORMAT {
            return Err(AnalysisError::corrupted(
                "IO.JOB_DOCUMENT",
                format!("{}: unsupported document format '{}'", path.display(), document.format),
            ));
        }
        Ok(document)
    }

    /// Instantiates the job from `registry` and runs it.
    pub fn run(
        &self,
        registry: &JobRegistry,
        databases: &Databases,
        status: &mut JobStatus,
    ) -> AnalysisResult<DocumentOutcome> {
        let descriptor = registry.get(&self.job)?;
        let runner = JobRunner::new(descriptor, databases);
        if self.check_parallel {
            let workers = std::thread::available_parallelism().map(usize::from).unwrap_or(2).max(2);
            return runner
                .check_parallel(&self.parameters, workers)
                .map(DocumentOutcome::ParallelCheck);
        }
        runner.run(&self.parameters, status).map(DocumentOutcome::Run)
    }
}

/// Writes the runnable document of `job` with `parameters`.
pub fn save(path: &Path, job: &str, parameters: &JobParameters) -> AnalysisResult<()> {
    JobDocument::new(job, parameters.clone()).save(path)
}

#[cfg(test)]
mod tests {
    use super::{DocumentOutcome, JobDocument, save};
    use crate::database::Databases;
    use crate::jobs::registry::JobRegistry;
    use crate::jobs::status::JobStatus;
    use crate::jobs::testing::square_sum_descriptor;
    use serde_json::json;

    fn registry() -> JobRegistry {
        let mut registry = JobRegistry::new();
        registry.register(square_sum_descriptor()).expect("register");
        registry
    }

    #[test]
    fn saved_documents_run_from_the_registry() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("jobs").join("squares.json");
        let parameters = json!({"n_steps": 4}).as_object().cloned().expect("object");
        save(&path, "SquareSum", &parameters).expect("save");

        let document = JobDocument::load(&path).expect("load");
        assert_eq!(document.parameters["n_steps"], 4);
        assert!(!std::fs::read_to_string(&path).expect("read").contains("check_parallel"));
        let mut runner_parameters = document.clone();
        runner_parameters.parameters.insert(
            "output_files".to_string(),
            json!([directory.path().join("out").to_string_lossy(), ["text"]]),
        );
        match runner_parameters
            .run(&registry(), &databases, &mut JobStatus::default())
            .expect("run")
        {
            DocumentOutcome::Run(report) => {
                assert_eq!(report.output.get("total").expect("total").data, vec![14.0]);
                assert!(directory.path().join("out_text").is_dir());
            }
            DocumentOutcome::ParallelCheck(_) => panic!("expected a plain run"),
        }
    }

    #[test]
    fn parallel_documents_compare_runs() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("check.json");
        let template = JobDocument::template(&square_sum_descriptor()).parallel_check();
        template.save(&path).expect("save");
        let document = JobDocument::load(&path).expect("load");
        assert!(document.check_parallel);
        match document.run(&registry(), &databases, &mut JobStatus::default()).expect("run") {
            DocumentOutcome::ParallelCheck(check) => assert_eq!(check.values, 9),
            DocumentOutcome::Run(_) => panic!("expected a parallel check"),
        }
    }

    #[test]
    fn foreign_documents_are_rejected() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("other.json");
        std::fs::write(&path, r#"{"format": "other", "job": "x", "parameters": {}}"#).expect("write");
        assert_eq!(JobDocument::load(&path).expect_err("format").placeholder(), "IO.JOB_DOCUMENT");
    }
}
