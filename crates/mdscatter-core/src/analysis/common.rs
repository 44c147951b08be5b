//! Settings and helpers shared by the analyses.

use crate::chemistry::AtomId;
use crate::configuration::{Configuration, UnitCell};
use crate::configurators::{
    AtomSelectionValue, GroupingValue, OutputFilesValue, RangeValue, SettingKind, SettingSpec, WeightsValue,
};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::numerics::{RadialBins, differentiate};
use crate::trajectory::{Trajectory, TrajectoryWriter, WriterOptions};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub(crate) const TRAJECTORY_EXTENSION: &str = "mdt";

pub(crate) fn trajectory() -> SettingSpec {
    SettingSpec::new("trajectory", SettingKind::HdfTrajectory, json!(""))
}

pub(crate) fn frames() -> SettingSpec {
    SettingSpec::new("frames", SettingKind::Frames, json!("all"))
}

/// Frames with an optional correlation window as fourth element.
pub(crate) fn correlation_frames() -> SettingSpec {
    SettingSpec::new("frames", SettingKind::CorrelationFrames, json!("all"))
}

pub(crate) fn atom_selection() -> SettingSpec {
    SettingSpec::new("atom_selection", SettingKind::AtomSelection, json!("all"))
}

pub(crate) fn atom_transmutation() -> SettingSpec {
    SettingSpec::new("atom_transmutation", SettingKind::AtomTransmutation, json!(null))
}

pub(crate) fn grouping_level() -> SettingSpec {
    SettingSpec::new("grouping_level", SettingKind::GroupingLevel, json!("atom"))
}

pub(crate) fn weights(default: &str) -> SettingSpec {
    SettingSpec::new("weights", SettingKind::Weights, json!(default))
}

pub(crate) fn running_mode() -> SettingSpec {
    SettingSpec::new("running_mode", SettingKind::RunningMode, json!(["single-core"]))
}

pub(crate) fn output_files() -> SettingSpec {
    SettingSpec::new("output_files", SettingKind::OutputFiles, json!(["output", ["container"]]))
}

pub(crate) fn unit_cell() -> SettingSpec {
    SettingSpec::new("unit_cell", SettingKind::UnitCell, json!(null))
}

pub(crate) fn require_periodic(trajectory: &Trajectory, job: &str) -> AnalysisResult<()> {
    if trajectory.is_periodic() {
        Ok(())
    } else {
        Err(AnalysisError::job(
            "JOB.NON_PERIODIC",
            format!("{job} needs a periodic trajectory"),
        ))
    }
}

/// Cell of `frame`: the configured override when there is one, otherwise the
/// stored one.
pub(crate) fn frame_cell(
    trajectory: &Trajectory,
    frame: usize,
    cell_override: Option<&UnitCell>,
) -> AnalysisResult<UnitCell> {
    if let Some(cell) = cell_override {
        return Ok(*cell);
    }
    trajectory.unit_cell(frame)?.ok_or_else(|| {
        AnalysisError::trajectory(
            "TRAJECTORY.UNIT_CELL",
            format!("frame {frame} has no unit cell"),
        )
    })
}

/// Bins between consecutive values of a configured range.
pub(crate) fn range_bins(name: &str, range: &RangeValue) -> AnalysisResult<RadialBins> {
    range
        .values
        .last()
        .and_then(|&last| RadialBins::new(range.first, last, range.step))
        .filter(|bins| bins.len() == range.midpoints.len())
        .ok_or_else(|| {
            AnalysisError::job(
                "JOB.SETTING",
                format!("setting '{name}': {} does not define histogram bins", range.information()),
            )
        })
}

/// Time derivative of a vector series, component by component.
pub(crate) fn vector_derivative(series: &[Vec3], time_step: f64, order: usize) -> AnalysisResult<Vec<Vec3>> {
    let mut derivative = vec![[0.0; 3]; series.len()];
    for axis in 0..3 {
        let component: Vec<f64> = series.iter().map(|value| value[axis]).collect();
        let values = differentiate(&component, time_step, order)
            .map_err(|error| AnalysisError::job("JOB.DIFFERENTIATION", error.to_string()))?;
        for (slot, value) in derivative.iter_mut().zip(values) {
            slot[axis] = value;
        }
    }
    Ok(derivative)
}

/// Unfolded trajectory of one group: the atom itself or the centre of mass.
pub(crate) fn group_series(
    trajectory: &Trajectory,
    group: &[usize],
    (first, last, step): (usize, usize, usize),
    database: &AtomDatabase,
) -> AnalysisResult<Vec<Vec3>> {
    match group {
        [atom] => trajectory.read_atomic_trajectory(*atom, first, last, step, false),
        atoms => {
            let ids: Vec<AtomId> = atoms.iter().map(|&i| AtomId(i)).collect();
            trajectory.read_com_trajectory(&ids, first, last, step, false, database)
        }
    }
}

/// Summed weight property of the atoms of each group.
pub(crate) fn group_weights(grouping: &GroupingValue, selection: &AtomSelectionValue, weights: &WeightsValue) -> Vec<f64> {
    let names = selection.name_map();
    grouping
        .groups
        .iter()
        .map(|atoms| {
            atoms
                .iter()
                .map(|atom| names.get(atom).map_or(0.0, |name| weights.property_of(name)))
                .sum()
        })
        .collect()
}

/// Per-name means of per-group series and their weighted total.
pub(crate) struct GroupPartials {
    pub(crate) partials: BTreeMap<String, Vec<f64>>,
    pub(crate) total: Vec<f64>,
}

impl GroupPartials {
    pub(crate) fn new(names: &[String], values: &[Vec<f64>], weights: &[f64], len: usize) -> Self {
        // name -> (summed series, group count, summed weight)
        let mut sums: BTreeMap<String, (Vec<f64>, usize, f64)> = BTreeMap::new();
        for ((name, series), weight) in names.iter().zip(values).zip(weights) {
            let entry = sums
                .entry(name.clone())
                .or_insert_with(|| (vec![0.0; len], 0, 0.0));
            for (sum, value) in entry.0.iter_mut().zip(series) {
                *sum += value;
            }
            entry.1 += 1;
            entry.2 += weight;
        }
        let total_weight: f64 = sums.values().map(|(_, _, weight)| weight).sum();
        let mut total = vec![0.0; len];
        let mut partials = BTreeMap::new();
        for (name, (series, count, weight)) in sums {
            let mean: Vec<f64> = series.iter().map(|sum| sum / count as f64).collect();
            if total_weight > 0.0 {
                for (slot, value) in total.iter_mut().zip(&mean) {
                    *slot += weight / total_weight * value;
                }
            }
            partials.insert(name, mean);
        }
        Self { partials, total }
    }
}

/// Element pair in canonical order, the key used by pair weights.
pub(crate) fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub(crate) fn pair_label(pair: &(String, String)) -> String {
    format!("{}_{}", pair.0, pair.1)
}

/// Path of a trajectory produced by a job, next to its other outputs.
pub(crate) fn trajectory_output_path(files: &OutputFilesValue) -> PathBuf {
    files.root.with_extension(TRAJECTORY_EXTENSION)
}

/// Writes frames in index order whatever order the steps complete in.
pub(crate) struct OrderedFrameWriter {
    writer: Option<TrajectoryWriter>,
    pending: BTreeMap<usize, (Configuration, f64)>,
    next: usize,
}

impl OrderedFrameWriter {
    pub(crate) fn new(writer: TrajectoryWriter) -> Self {
        Self {
            writer: Some(writer),
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn create(
        path: &std::path::Path,
        system: &crate::chemistry::ChemicalSystem,
        n_steps: usize,
    ) -> AnalysisResult<Self> {
        Ok(Self::new(TrajectoryWriter::create(
            path,
            system,
            n_steps,
            None,
            WriterOptions::default(),
        )?))
    }

    pub(crate) fn push(&mut self, index: usize, configuration: Configuration, time: f64) -> AnalysisResult<()> {
        self.pending.insert(index, (configuration, time));
        let Some(writer) = self.writer.as_mut() else {
            return Err(AnalysisError::internal(
                "JOB.TRAJECTORY_WRITER",
                "frame pushed after the trajectory was closed",
            ));
        };
        while let Some((configuration, time)) = self.pending.remove(&self.next) {
            writer.dump_configuration(&configuration, time)?;
            self.next += 1;
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) -> AnalysisResult<PathBuf> {
        if !self.pending.is_empty() {
            return Err(AnalysisError::internal(
                "JOB.TRAJECTORY_WRITER",
                format!("{} frames were never written", self.pending.len()),
            ));
        }
        match self.writer.take() {
            Some(writer) => writer.close(),
            None => Err(AnalysisError::internal(
                "JOB.TRAJECTORY_WRITER",
                "trajectory closed twice",
            )),
        }
    }
}
