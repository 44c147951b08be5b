use super::{ConfigureContext, Configured};
use crate::chemistry::ChemicalSystem;
use crate::configuration::{UnitCell, VELOCITIES};
use crate::domain::AnalysisResult;
use crate::trajectory::{Trajectory, frame_indices};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// An opened input trajectory.
#[derive(Debug, Clone)]
pub struct TrajectoryValue {
    path: PathBuf,
    instance: Trajectory,
}

impl TrajectoryValue {
    pub fn new(path: PathBuf, instance: Trajectory) -> Self {
        Self { path, instance }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used as the user-definitions target.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn instance(&self) -> &Trajectory {
        &self.instance
    }

    pub fn length(&self) -> usize {
        self.instance.len()
    }

    pub fn md_time_step(&self) -> f64 {
        self.instance.md_time_step()
    }

    pub fn chemical_system(&self) -> &ChemicalSystem {
        self.instance.chemical_system()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.instance.has_variable(name)
    }

    pub fn information(&self) -> String {
        format!(
            "{}: {} frames of {} atoms, time step {} ps",
            self.path.display(),
            self.length(),
            self.chemical_system().total_number_of_atoms(),
            self.md_time_step()
        )
    }
}

pub(super) fn configure_trajectory(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let path = raw
        .as_str()
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| context.error("expects a trajectory path"))?;
    let path = PathBuf::from(path);
    let instance = Trajectory::open(&path, context.databases)
        .map_err(|error| error.with_context(format!("setting '{}'", context.spec.name)))?;
    if instance.is_empty() {
        return Err(context.error(format!("{} holds no frames", path.display())));
    }
    Ok(Configured::Trajectory(TrajectoryValue::new(path, instance)))
}

/// Ordered frame indices with their times.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSelection {
    pub first: usize,
    /// Exclusive.
    pub last: usize,
    pub step: usize,
    pub value: Vec<usize>,
    pub number: usize,
    /// Absolute times of the selected frames (ps).
    pub time: Vec<f64>,
    /// Times relative to the first selected frame.
    pub duration: Vec<f64>,
    /// Length of the correlation window.
    pub n_frames: usize,
    /// Number of window origins, `number - n_frames + 1`.
    pub n_configs: usize,
}

impl FrameSelection {
    /// Spacing of selected frames in ps.
    pub fn time_step(&self) -> f64 {
        match self.time.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    pub fn information(&self) -> String {
        format!(
            "frames {}..{} step {} ({} frames, window {})",
            self.first, self.last, self.step, self.number, self.n_frames
        )
    }
}

fn as_index(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

pub(super) fn configure_frames(
    raw: &Value,
    context: &ConfigureContext<'_>,
    correlation: bool,
) -> AnalysisResult<Configured> {
    let trajectory = context.trajectory()?;
    let length = trajectory.length();
    let (first, last, step, window) = match raw {
        Value::Null => (0, length as i64, 1, None),
        Value::String(text) if text == "all" => (0, length as i64, 1, None),
        Value::Array(items) if items.len() == 3 || (correlation && items.len() == 4) => {
            let numbers: Option<Vec<i64>> = items.iter().map(as_index).collect();
            let numbers = numbers.ok_or_else(|| context.error("frame bounds must be integers"))?;
            (numbers[0], numbers[1], numbers[2], numbers.get(3).copied())
        }
        _ => {
            return Err(context.error(if correlation {
                "expects [first, last, step] or [first, last, step, n_correlation]"
            } else {
                "expects [first, last, step]"
            }));
        }
    };
    let last = if last < 0 { length as i64 + 1 + last } else { last };
    if first < 0 || last < 0 || step <= 0 {
        return Err(context.error(format!("invalid frame range ({first}, {last}, {step})")));
    }
    let (first, last, step) = (first as usize, last as usize, step as usize);
    let value = frame_indices(first, last, step, length).map_err(|error| context.error(error.message()))?;
    let times = trajectory.instance().times();
    let time: Vec<f64> = value.iter().map(|&frame| times[frame]).collect();
    let duration: Vec<f64> = time.iter().map(|t| t - time[0]).collect();
    let number = value.len();
    let n_frames = match window {
        Some(window) if window < 1 || window as usize > number => {
            return Err(context.error(format!(
                "correlation window {window} must lie in [1, {number}]"
            )));
        }
        Some(window) => window as usize,
        None => number,
    };
    Ok(Configured::Frames(FrameSelection {
        first,
        last,
        step,
        value,
        number,
        time,
        duration,
        n_frames,
        n_configs: number - n_frames + 1,
    }))
}

pub(super) fn configure_unit_cell(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    context.trajectory()?;
    let (rows, apply) = match raw {
        Value::Null => return Ok(Configured::UnitCell(None)),
        Value::Object(map) => (
            map.get("cell").cloned().unwrap_or(Value::Null),
            map.get("apply").and_then(Value::as_bool).unwrap_or(false),
        ),
        Value::Array(items) if items.len() == 2 && items[1].is_boolean() => {
            (items[0].clone(), items[1].as_bool().unwrap_or(false))
        }
        _ => return Err(context.error("expects {\"cell\": [[..]], \"apply\": bool}")),
    };
    if !apply {
        return Ok(Configured::UnitCell(None));
    }
    let rows: Vec<Vec<f64>> =
        serde_json::from_value(rows).map_err(|error| context.error(format!("invalid cell: {error}")))?;
    let cell = UnitCell::from_rows(&rows).map_err(|error| context.error(error.message()))?;
    Ok(Configured::UnitCell(Some(cell)))
}

pub(super) fn configure_interpolation_order(
    raw: &Value,
    context: &ConfigureContext<'_>,
) -> AnalysisResult<Configured> {
    let order = raw
        .as_u64()
        .filter(|order| *order <= 5)
        .ok_or_else(|| context.error("expects an integer in 0..=5"))? as usize;
    if order == 0 && !context.trajectory()?.has_variable(VELOCITIES) {
        return Err(context.error(
            "the trajectory stores no velocities; choose an interpolation order between 1 and 5",
        ));
    }
    Ok(Configured::InterpolationOrder(order))
}

#[cfg(test)]
mod tests {
    use crate::configurators::{SettingKind, SettingSpec, resolve};
    use crate::database::Databases;
    use crate::domain::ErrorKind;
    use serde_json::json;

    fn mock_file(directory: &std::path::Path) -> std::path::PathBuf {
        let path = directory.join("mock.json");
        let spec = json!({
            "element": "Ar",
            "lattice_constant": 0.5,
            "repeats": [2, 1, 1],
            "n_frames": 10,
            "time_step": 0.25
        });
        std::fs::write(&path, spec.to_string()).expect("write mock");
        path
    }

    fn specs() -> Vec<SettingSpec> {
        vec![
            SettingSpec::new("trajectory", SettingKind::HdfTrajectory, json!("")),
            SettingSpec::new("frames", SettingKind::CorrelationFrames, json!([0, -1, 1])),
            SettingSpec::new("interpolation_order", SettingKind::InterpolationOrder, json!(0)),
            SettingSpec::new("unit_cell", SettingKind::UnitCell, json!(null)),
        ]
    }

    #[test]
    fn frames_expose_times_and_correlation_windows() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let parameters = json!({
            "trajectory": path.display().to_string(),
            "frames": [2, 9, 2, 2],
            "unit_cell": {"cell": [[1, 0, 0], [0, 1, 0], [0, 0, 2]], "apply": true}
        });
        let resolved = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect("resolve");
        let trajectory = resolved.trajectory("trajectory").expect("trajectory");
        assert_eq!(trajectory.length(), 10);
        assert_eq!(trajectory.md_time_step(), 0.25);
        let frames = resolved.frames("frames").expect("frames");
        assert_eq!(frames.value, vec![2, 4, 6, 8]);
        assert_eq!(frames.time, vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(frames.duration, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!((frames.n_frames, frames.n_configs), (2, 3));
        let cell = resolved.unit_cell("unit_cell").expect("cell").expect("applied");
        assert!((cell.volume() - 2.0).abs() < 1e-12);
        assert_eq!(resolved.interpolation_order("interpolation_order").expect("order"), &0);
    }

    #[test]
    fn default_frames_cover_the_whole_trajectory() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let parameters = json!({"trajectory": path.display().to_string()});
        let resolved = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect("resolve");
        let frames = resolved.frames("frames").expect("frames");
        assert_eq!(frames.number, 10);
        assert_eq!(frames.last, 10);
    }

    #[test]
    fn invalid_frames_and_paths_fail_setup() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let parameters = json!({"trajectory": path.display().to_string(), "frames": [5, 20, 1]});
        let error = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect_err("range");
        assert_eq!(error.kind(), ErrorKind::Job);
        let parameters = json!({"trajectory": directory.path().join("absent.mdt").display().to_string()});
        assert!(resolve(&specs(), parameters.as_object().expect("object"), &databases).is_err());
    }
}
