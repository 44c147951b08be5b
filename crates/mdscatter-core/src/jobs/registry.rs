use super::kernel::Analysis;
use crate::configurators::{SettingSpec, default_parameters};
use crate::domain::{AnalysisError, AnalysisResult, JobParameters};
use std::collections::BTreeMap;

/// Static description of a job: metadata, its settings contract and a
/// factory for fresh instances.
#[derive(Debug, Clone, Copy)]
pub struct JobDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    /// Breadcrumb path shown in job listings.
    pub category: &'static [&'static str],
    /// Input kinds the job accepts.
    pub ancestor: &'static [&'static str],
    pub declare: fn() -> Vec<SettingSpec>,
    pub factory: fn() -> Box<dyn Analysis>,
}

impl JobDescriptor {
    pub fn settings(&self) -> Vec<SettingSpec> {
        (self.declare)()
    }

    pub fn create(&self) -> Box<dyn Analysis> {
        (self.factory)()
    }

    pub fn default_parameters(&self) -> JobParameters {
        default_parameters(&self.settings())
    }

    /// One line per setting: name, configurator and default.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("{} ({})", self.name, self.label)];
        lines.push(format!("  category: {}", self.category.join(" > ")));
        for spec in self.settings() {
            lines.push(format!(
                "  {:<22} {:<34} default {}",
                spec.name,
                spec.kind.name(),
                spec.default
            ));
        }
        lines.join("\n")
    }
}

/// Jobs addressable by name.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<&'static str, JobDescriptor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: JobDescriptor) -> AnalysisResult<()> {
        if self.jobs.contains_key(descriptor.name) {
            return Err(AnalysisError::internal(
                "JOB.DUPLICATE",
                format!("job '{}' is registered twice", descriptor.name),
            ));
        }
        self.jobs.insert(descriptor.name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> AnalysisResult<&JobDescriptor> {
        self.jobs.get(name).ok_or_else(|| {
            AnalysisError::job("JOB.UNKNOWN_JOB", format!("no job named '{name}'"))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.jobs.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
