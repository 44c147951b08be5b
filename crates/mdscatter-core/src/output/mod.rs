//! Analysis results: named n-dimensional variables with axes and units,
//! accumulated in place by jobs and written once at finalize.

pub mod container;
pub mod log;
pub mod text;

pub use container::{OUTPUT_FORMAT, read_output, write_container};
pub use log::{JobLog, LogEntry, LogLevel};
pub use text::{MANIFEST_FILE, write_text};

use crate::configurators::{OutputFilesValue, OutputFormat};
use crate::domain::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Line,
    Surface,
    Volume,
}

impl VariableKind {
    pub fn rank(self) -> usize {
        match self {
            Self::Line => 1,
            Self::Surface => 2,
            Self::Volume => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Surface => "surface",
            Self::Volume => "volume",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Line, Self::Surface, Self::Volume]
            .into_iter()
            .find(|kind| kind.as_str() == value)
    }
}

/// One output array, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputVariable {
    pub name: String,
    pub kind: VariableKind,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    /// Names of the variables spanning each dimension, joined by `|`.
    pub axis: String,
    pub units: String,
    pub main_result: bool,
    pub partial_result: bool,
}

fn output_error(message: impl Into<String>) -> AnalysisError {
    AnalysisError::internal("OUTPUT.VARIABLE", message)
}

impl OutputVariable {
    fn offset(&self, index: &[usize]) -> AnalysisResult<usize> {
        if index.len() != self.shape.len() {
            return Err(output_error(format!(
                "'{}' has rank {} but was indexed with {} indices",
                self.name,
                self.shape.len(),
                index.len()
            )));
        }
        let mut offset = 0;
        for (&i, &extent) in index.iter().zip(&self.shape) {
            if i >= extent {
                return Err(output_error(format!(
                    "index {index:?} is outside '{}' of shape {:?}",
                    self.name, self.shape
                )));
            }
            offset = offset * extent + i;
        }
        Ok(offset)
    }

    pub fn get(&self, index: &[usize]) -> AnalysisResult<f64> {
        Ok(self.data[self.offset(index)?])
    }

    pub fn set(&mut self, index: &[usize], value: f64) -> AnalysisResult<()> {
        let offset = self.offset(index)?;
        self.data[offset] = value;
        Ok(())
    }

    pub fn add_at(&mut self, index: &[usize], value: f64) -> AnalysisResult<()> {
        let offset = self.offset(index)?;
        self.data[offset] += value;
        Ok(())
    }

    /// Row `row` of a surface variable.
    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.shape.get(1).copied().unwrap_or(1);
        let start = (row * width).min(self.data.len());
        &self.data[start..(start + width).min(self.data.len())]
    }

    /// Adds `values` element-wise; lengths must agree.
    pub fn accumulate(&mut self, values: &[f64]) -> AnalysisResult<()> {
        if values.len() != self.data.len() {
            return Err(output_error(format!(
                "'{}' holds {} values, {} were added",
                self.name,
                self.data.len(),
                values.len()
            )));
        }
        for (target, value) in self.data.iter_mut().zip(values) {
            *target += value;
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        for value in &mut self.data {
            *value *= factor;
        }
    }

}

/// Ordered collection of output variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputData {
    variables: BTreeMap<String, OutputVariable>,
    order: Vec<String>,
}

impl OutputData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zero-filled variable of `shape`.
    pub fn add(
        &mut self,
        name: &str,
        kind: VariableKind,
        shape: &[usize],
        axis: &str,
        units: &str,
    ) -> AnalysisResult<&mut OutputVariable> {
        let size = shape.iter().product();
        self.add_data(name, kind, shape, vec![0.0; size], axis, units)
    }

    /// Wraps existing data of `shape`.
    pub fn add_data(
        &mut self,
        name: &str,
        kind: VariableKind,
        shape: &[usize],
        data: Vec<f64>,
        axis: &str,
        units: &str,
    ) -> AnalysisResult<&mut OutputVariable> {
        if shape.len() != kind.rank() {
            return Err(output_error(format!(
                "{} variable '{name}' needs rank {}, got shape {shape:?}",
                kind.as_str(),
                kind.rank()
            )));
        }
        if data.len() != shape.iter().product::<usize>() {
            return Err(output_error(format!(
                "'{name}' has {} values for shape {shape:?}",
                data.len()
            )));
        }
        if self.variables.contains_key(name) {
            return Err(output_error(format!("output variable '{name}' already exists")));
        }
        self.order.push(name.to_string());
        Ok(self.variables.entry(name.to_string()).or_insert(OutputVariable {
            name: name.to_string(),
            kind,
            shape: shape.to_vec(),
            data,
            axis: axis.to_string(),
            units: units.to_string(),
            main_result: false,
            partial_result: false,
        }))
    }

    pub fn get(&self, name: &str) -> AnalysisResult<&OutputVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| output_error(format!("no output variable '{name}'")))
    }

    pub fn get_mut(&mut self, name: &str) -> AnalysisResult<&mut OutputVariable> {
        self.variables
            .get_mut(name)
            .ok_or_else(|| output_error(format!("no output variable '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputVariable> {
        self.order.iter().filter_map(|name| self.variables.get(name))
    }

    /// Writes every requested format plus the log sidecar when asked.
    pub fn write(
        &self,
        files: &OutputFilesValue,
        header: &str,
        log: Option<&JobLog>,
    ) -> AnalysisResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for format in &files.formats {
            let path = files.path(*format);
            match format {
                OutputFormat::Container => write_container(self, &path, header)?,
                OutputFormat::Text => write_text(self, &path, header)?,
            }
            tracing::info!(path = %path.display(), format = ?format, "output written");
            written.push(path);
        }
        if files.write_logs {
            if let Some(log) = log {
                let path = files.log_path();
                log.write(&path)?;
                written.push(path);
            }
        }
        Ok(written)
    }
}
