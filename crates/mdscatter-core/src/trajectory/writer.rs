//! Writes native trajectory containers frame by frame.

use super::container::{Compression, ContainerWriter, Dtype};
use crate::chemistry::ChemicalSystem;
use crate::configuration::{COORDINATES, Configuration, ConfigurationKind, GRADIENTS, VELOCITIES};
use crate::domain::{AnalysisError, AnalysisResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const TRAJECTORY_FORMAT: &str = "mdscatter-trajectory";
pub const TRAJECTORY_VERSION: u64 = 1;
pub const CHEMICAL_SYSTEM_GROUP: &str = "/chemical_system";
pub const UNIT_CELL_DATASET: &str = "/unit_cell";
pub const TIME_DATASET: &str = "/time";

pub fn configuration_dataset(variable: &str) -> String {
    format!("/configuration/{variable}")
}

pub fn default_unit(variable: &str) -> &'static str {
    match variable {
        COORDINATES => "nm",
        VELOCITIES => "nm/ps",
        GRADIENTS => "amu*nm/ps^2",
        _ => "au",
    }
}

/// Chunk layout of the per-atom datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkingAxis {
    /// One chunk per atom holding every frame; frames are buffered until
    /// the writer closes.
    Atom,
    /// One chunk per frame, written as frames arrive.
    #[default]
    Frame,
}

impl ChunkingAxis {
    pub fn from_axis(axis: usize) -> AnalysisResult<Self> {
        match axis {
            0 => Ok(Self::Atom),
            1 => Ok(Self::Frame),
            other => Err(AnalysisError::job(
                "JOB.CHUNKING_AXIS",
                format!("chunking axis must be 0 or 1, got {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub dtype: Dtype,
    pub chunking_axis: ChunkingAxis,
    pub compression: Compression,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            dtype: Dtype::F64,
            chunking_axis: ChunkingAxis::Frame,
            compression: Compression::None,
        }
    }
}

pub struct TrajectoryWriter {
    container: ContainerWriter,
    n_atoms: usize,
    n_steps: usize,
    selected: Option<Vec<bool>>,
    options: WriterOptions,
    current: usize,
    variables: Vec<String>,
    periodic: bool,
    times: Vec<f64>,
    buffers: BTreeMap<String, Vec<f64>>,
    units: BTreeMap<String, String>,
}

fn writer_error(message: impl Into<String>) -> AnalysisError {
    AnalysisError::job("JOB.TRAJECTORY_WRITER", message)
}

impl TrajectoryWriter {
    /// Opens `path` for `n_steps` frames of `system`. Atoms outside
    /// `selected_atoms` are written as zeros.
    pub fn create(
        path: &Path,
        system: &ChemicalSystem,
        n_steps: usize,
        selected_atoms: Option<&[usize]>,
        options: WriterOptions,
    ) -> AnalysisResult<Self> {
        let n_atoms = system.total_number_of_atoms();
        let selected = match selected_atoms {
            Some(indices) => {
                let mut mask = vec![false; n_atoms];
                for &index in indices {
                    if index >= n_atoms {
                        return Err(writer_error(format!(
                            "selected atom {index} is outside the {n_atoms}-atom system"
                        )));
                    }
                    mask[index] = true;
                }
                Some(mask)
            }
            None => None,
        };
        let mut container = ContainerWriter::create(path).map_err(|e| e.into_analysis(path))?;
        let tables = serde_json::to_value(system.serialize()).map_err(|error| {
            AnalysisError::internal("INTERNAL.SERIALIZATION", error.to_string())
        })?;
        container.set_group_attribute(CHEMICAL_SYSTEM_GROUP, "tables", tables);
        container.set_group_attribute(CHEMICAL_SYSTEM_GROUP, "name", system.name());
        container.set_group_attribute("/", "format", TRAJECTORY_FORMAT);
        container.set_group_attribute("/", "version", TRAJECTORY_VERSION);
        tracing::debug!(path = %path.display(), n_steps, n_atoms, "trajectory writer opened");
        Ok(Self {
            container,
            n_atoms,
            n_steps,
            selected,
            options,
            current: 0,
            variables: Vec::new(),
            periodic: false,
            times: Vec::with_capacity(n_steps),
            buffers: BTreeMap::new(),
            units: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.container.path()
    }

    pub fn frames_written(&self) -> usize {
        self.current
    }

    /// Overrides the `units` attribute written for a variable.
    pub fn set_unit(&mut self, variable: &str, unit: &str) {
        self.units.insert(variable.to_string(), unit.to_string());
    }

    fn unit_of(&self, variable: &str) -> String {
        self.units
            .get(variable)
            .cloned()
            .unwrap_or_else(|| default_unit(variable).to_string())
    }

    fn reserve(&mut self, configuration: &Configuration) -> AnalysisResult<()> {
        self.variables = configuration.variable_names().map(str::to_string).collect();
        self.periodic = configuration.is_periodic();
        let shape = [self.n_steps, self.n_atoms, 3];
        let path = self.container.path().to_path_buf();
        if self.options.chunking_axis == ChunkingAxis::Frame {
            for variable in self.variables.clone() {
                let name = configuration_dataset(&variable);
                self.container
                    .create_dataset(&name, self.options.dtype, &shape, self.options.compression)
                    .map_err(|e| e.into_analysis(&path))?;
                let unit = self.unit_of(&variable);
                self.container
                    .set_attribute(&name, "units", unit)
                    .map_err(|e| e.into_analysis(&path))?;
            }
        }
        if self.periodic {
            self.container
                .create_dataset(UNIT_CELL_DATASET, Dtype::F64, &[self.n_steps, 3, 3], self.options.compression)
                .map_err(|e| e.into_analysis(&path))?;
            self.container
                .set_attribute(UNIT_CELL_DATASET, "units", "nm")
                .map_err(|e| e.into_analysis(&path))?;
        }
        Ok(())
    }

    fn masked(&self, values: &[[f64; 3]]) -> Vec<f64> {
        let mut flat = Vec::with_capacity(values.len() * 3);
        for (index, value) in values.iter().enumerate() {
            let keep = self.selected.as_ref().is_none_or(|mask| mask[index]);
            if keep {
                flat.extend_from_slice(value);
            } else {
                flat.extend_from_slice(&[0.0; 3]);
            }
        }
        flat
    }

    /// Appends one frame at `time` (ps).
    pub fn dump_configuration(&mut self, configuration: &Configuration, time: f64) -> AnalysisResult<()> {
        if self.current >= self.n_steps {
            return Err(writer_error(format!(
                "all {} reserved frames have been written",
                self.n_steps
            )));
        }
        if configuration.number_of_atoms() != self.n_atoms {
            return Err(writer_error(format!(
                "configuration has {} atoms, the system has {}",
                configuration.number_of_atoms(),
                self.n_atoms
            )));
        }
        let real;
        let configuration = if configuration.kind() == ConfigurationKind::PeriodicBox {
            real = configuration.to_real_configuration();
            &real
        } else {
            configuration
        };
        if self.current == 0 {
            self.reserve(configuration)?;
        } else if configuration.is_periodic() != self.periodic {
            return Err(writer_error("periodicity changed between frames"));
        }
        let path = self.container.path().to_path_buf();
        for variable in self.variables.clone() {
            let values = configuration.variable(&variable).map_err(|_| {
                writer_error(format!("frame {} lacks variable '{variable}'", self.current))
            })?;
            let flat = self.masked(values);
            match self.options.chunking_axis {
                ChunkingAxis::Frame => self
                    .container
                    .write_chunk(
                        &configuration_dataset(&variable),
                        &[self.current, 0, 0],
                        &[1, self.n_atoms, 3],
                        &flat,
                    )
                    .map_err(|e| e.into_analysis(&path))?,
                ChunkingAxis::Atom => self.buffers.entry(variable).or_default().extend(flat),
            }
        }
        if let Some(cell) = configuration.unit_cell() {
            let flat: Vec<f64> = cell.direct().iter().flatten().copied().collect();
            self.container
                .write_chunk(UNIT_CELL_DATASET, &[self.current, 0, 0], &[1, 3, 3], &flat)
                .map_err(|e| e.into_analysis(&path))?;
        }
        self.times.push(time);
        self.current += 1;
        Ok(())
    }

    /// Flushes buffered data and the index. Datasets shrink to the number
    /// of frames actually written.
    pub fn close(mut self) -> AnalysisResult<PathBuf> {
        let path = self.container.path().to_path_buf();
        let frames = self.current;
        if frames < self.n_steps {
            tracing::warn!(written = frames, reserved = self.n_steps, "trajectory closed early");
        }
        match self.options.chunking_axis {
            ChunkingAxis::Frame => {
                for variable in &self.variables {
                    self.container
                        .truncate_dataset(&configuration_dataset(variable), frames)
                        .map_err(|e| e.into_analysis(&path))?;
                }
            }
            ChunkingAxis::Atom => {
                let buffers = std::mem::take(&mut self.buffers);
                for (variable, values) in buffers {
                    let name = configuration_dataset(&variable);
                    self.container
                        .create_dataset(&name, self.options.dtype, &[frames, self.n_atoms, 3], self.options.compression)
                        .map_err(|e| e.into_analysis(&path))?;
                    let unit = self.unit_of(&variable);
                    self.container
                        .set_attribute(&name, "units", unit)
                        .map_err(|e| e.into_analysis(&path))?;
                    for atom in 0..self.n_atoms {
                        let column: Vec<f64> = (0..frames)
                            .flat_map(|frame| {
                                let offset = (frame * self.n_atoms + atom) * 3;
                                values[offset..offset + 3].iter().copied()
                            })
                            .collect();
                        self.container
                            .write_chunk(&name, &[0, atom, 0], &[frames, 1, 3], &column)
                            .map_err(|e| e.into_analysis(&path))?;
                    }
                }
            }
        }
        if self.periodic {
            self.container
                .truncate_dataset(UNIT_CELL_DATASET, frames)
                .map_err(|e| e.into_analysis(&path))?;
        }
        self.container
            .write_dataset(TIME_DATASET, &[frames], &self.times, Compression::None)
            .map_err(|e| e.into_analysis(&path))?;
        self.container
            .set_attribute(TIME_DATASET, "units", "ps")
            .map_err(|e| e.into_analysis(&path))?;
        let path = self.container.finish().map_err(|e| e.into_analysis(&path))?;
        tracing::info!(path = %path.display(), frames, "trajectory written");
        Ok(path)
    }
}
