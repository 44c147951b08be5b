use super::{ConfigureContext, Configured};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::numerics::linalg::{dot, norm, scale, sub};
use crate::numerics::{QVectorGenerator, QVectorShells, ResolutionKernel, ResolutionWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Q-vector shells generated once at setup.
#[derive(Debug, Clone, PartialEq)]
pub struct QVectorsValue {
    pub generator: QVectorGenerator,
    pub shells: QVectorShells,
}

impl QVectorsValue {
    pub fn n_shells(&self) -> usize {
        self.shells.n_shells()
    }

    /// |Q| of every shell in 1/nm.
    pub fn q_values(&self) -> Vec<f64> {
        self.shells.q_values()
    }

    pub fn information(&self) -> String {
        let vectors: usize = self.shells.shells.iter().map(|shell| shell.vectors.len()).sum();
        format!(
            "{} generator: {} shells, {vectors} vectors",
            self.generator.name(),
            self.n_shells()
        )
    }
}

pub(super) fn configure_q_vectors(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let generator: QVectorGenerator = serde_json::from_value(raw.clone())
        .map_err(|error| context.error(format!("invalid q-vector generator: {error}")))?;
    let cell = context.trajectory()?.instance().unit_cell(0)?;
    if generator.requires_cell() && cell.is_none() {
        return Err(context.error(format!(
            "the {} generator needs a periodic trajectory",
            generator.name()
        )));
    }
    let shells = generator
        .generate(cell.as_ref().map(|cell| (cell.direct(), cell.inverse())))
        .map_err(|error| context.error(error))?;
    Ok(Configured::QVectors(QVectorsValue { generator, shells }))
}

/// Projection applied to per-atom vectors before an analysis uses them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Projector {
    #[default]
    None,
    /// Keeps the component along the unit axis.
    Axial(Vec3),
    /// Removes the component along the unit normal.
    Planar(Vec3),
}

impl Projector {
    pub fn project(&self, vector: Vec3) -> Vec3 {
        match self {
            Self::None => vector,
            Self::Axial(axis) => scale(*axis, dot(vector, *axis)),
            Self::Planar(normal) => sub(vector, scale(*normal, dot(vector, *normal))),
        }
    }

    pub fn project_all(&self, vectors: &[Vec3]) -> Vec<Vec3> {
        vectors.iter().map(|&vector| self.project(vector)).collect()
    }
}

fn axis_from(raw: &Value) -> Option<Vec3> {
    let axis = match raw.as_str() {
        Some("x") => [1.0, 0.0, 0.0],
        Some("y") => [0.0, 1.0, 0.0],
        Some("z") => [0.0, 0.0, 1.0],
        Some(_) => return None,
        None => parse_vector(raw)?,
    };
    let length = norm(axis);
    (length > 1.0e-12).then(|| scale(axis, 1.0 / length))
}

pub(super) fn configure_projection(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let projector = match raw {
        Value::Null => Projector::None,
        Value::String(text) if text == "none" => Projector::None,
        Value::Object(map) => {
            let axis = map
                .get("axis")
                .and_then(axis_from)
                .ok_or_else(|| context.error("projection needs a non-zero 'axis'"))?;
            match map.get("kind").and_then(Value::as_str).unwrap_or("axial") {
                "axial" => Projector::Axial(axis),
                "planar" => Projector::Planar(axis),
                other => return Err(context.error(format!("unknown projection '{other}'"))),
            }
        }
        other => Projector::Axial(
            axis_from(other).ok_or_else(|| context.error("expects none, x, y, z or an axis vector"))?,
        ),
    };
    Ok(Configured::Projection(projector))
}

/// How job steps are dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RunningMode {
    SingleCore,
    Multicore { workers: usize },
    Remote { addresses: Vec<String> },
}

impl RunningMode {
    pub fn workers(&self) -> usize {
        match self {
            Self::SingleCore => 1,
            Self::Multicore { workers } => *workers,
            Self::Remote { addresses } => addresses.len(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleCore => "single-core",
            Self::Multicore { .. } => "multicore",
            Self::Remote { .. } => "remote",
        }
    }

    /// The raw parameter form of this mode.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::SingleCore => serde_json::json!(["single-core"]),
            Self::Multicore { workers } => serde_json::json!(["multicore", workers]),
            Self::Remote { addresses } => serde_json::json!(["remote", addresses]),
        }
    }

    pub fn information(&self) -> String {
        match self {
            Self::SingleCore => "single-core".to_string(),
            Self::Multicore { workers } => format!("multicore with {workers} workers"),
            Self::Remote { addresses } => format!("remote on {}", addresses.join(", ")),
        }
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism().map(usize::from).unwrap_or(1)
}

/// Addresses listed one per line; blank lines and `#` comments are skipped.
pub fn read_worker_registry(path: &Path) -> AnalysisResult<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .map_err(|error| AnalysisError::io("IO.READ", format!("{}: {error}", path.display())))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub(super) fn configure_running_mode(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let items: Vec<Value> = match raw {
        Value::Null => vec![Value::from("single-core")],
        Value::String(_) => vec![raw.clone()],
        Value::Array(items) if !items.is_empty() => items.clone(),
        _ => return Err(context.error("expects [mode, ...]")),
    };
    let mode = match (items[0].as_str(), items.get(1)) {
        (Some("single-core" | "monoprocessor"), _) => RunningMode::SingleCore,
        (Some("multicore" | "threadpool"), argument) => {
            let requested = match argument {
                None | Some(Value::Null) => -1,
                Some(value) => value
                    .as_i64()
                    .ok_or_else(|| context.error("multicore expects a worker count"))?,
            };
            let workers = if requested <= 0 {
                available_workers()
            } else {
                requested as usize
            };
            RunningMode::Multicore { workers }
        }
        (Some("remote"), Some(Value::Array(addresses))) => RunningMode::Remote {
            addresses: addresses
                .iter()
                .map(|address| address.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| context.error("remote addresses must be strings"))?,
        },
        (Some("remote"), Some(Value::String(registry))) => RunningMode::Remote {
            addresses: read_worker_registry(Path::new(registry))
                .map_err(|error| context.error(error.message()))?,
        },
        _ => return Err(context.error(format!("invalid running mode {raw}"))),
    };
    if mode.workers() == 0 {
        return Err(context.error("the running mode has no worker"));
    }
    Ok(Configured::RunningMode(mode))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One binary container holding every variable.
    Container,
    /// A directory of text files and a manifest.
    Text,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "container" | "mdo" | "hdf" | "binary" => Some(Self::Container),
            "text" | "ascii" | "dat" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Container => "mdo",
            Self::Text => "txt",
        }
    }
}

/// Where and how results are written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFilesValue {
    pub root: PathBuf,
    pub formats: Vec<OutputFormat>,
    pub write_logs: bool,
}

impl OutputFilesValue {
    /// Output path of one format: `<root>.<extension>` for containers, the
    /// `<root>_text` directory for text output.
    pub fn path(&self, format: OutputFormat) -> PathBuf {
        match format {
            OutputFormat::Container => self.root.with_extension(format.extension()),
            OutputFormat::Text => {
                let mut name = self.root.as_os_str().to_os_string();
                name.push("_text");
                PathBuf::from(name)
            }
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.with_extension("log")
    }

    pub fn information(&self) -> String {
        let formats: Vec<String> = self
            .formats
            .iter()
            .map(|format| self.path(*format).display().to_string())
            .collect();
        format!(
            "{}{}",
            formats.join(", "),
            if self.write_logs { " with log" } else { "" }
        )
    }
}

pub(super) fn configure_output_files(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let (root, formats, write_logs) = match raw {
        Value::Array(items) if (2..=3).contains(&items.len()) => {
            (items[0].clone(), items[1].clone(), items.get(2).cloned())
        }
        Value::Object(map) => (
            map.get("root").cloned().unwrap_or(Value::Null),
            map.get("formats").cloned().unwrap_or(Value::Null),
            map.get("write_logs").cloned(),
        ),
        _ => return Err(context.error("expects [root, formats, write_logs]")),
    };
    let root = root
        .as_str()
        .filter(|root| !root.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| context.error("output root must be a non-empty path"))?;
    let formats: Vec<OutputFormat> = match formats {
        Value::String(format) => vec![format],
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<_>>()
            .ok_or_else(|| context.error("formats must be strings"))?,
        _ => return Err(context.error("expects a list of output formats")),
    }
    .iter()
    .map(|format| OutputFormat::parse(format).ok_or_else(|| context.error(format!("unknown output format '{format}'"))))
    .collect::<AnalysisResult<_>>()?;
    if formats.is_empty() {
        return Err(context.error("at least one output format is required"));
    }
    let mut formats = formats;
    formats.sort();
    formats.dedup();
    let write_logs = match write_logs {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => return Err(context.error("write_logs must be a boolean")),
    };
    if let Some(parent) = root.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|error| {
            AnalysisError::io(
                "IO.OUTPUT_DIRECTORY",
                format!("setting '{}': {}: {error}", context.spec.name, parent.display()),
            )
        })?;
        let metadata = std::fs::metadata(parent).map_err(|error| {
            AnalysisError::io("IO.OUTPUT_DIRECTORY", format!("{}: {error}", parent.display()))
        })?;
        if metadata.permissions().readonly() {
            return Err(AnalysisError::io(
                "IO.PERMISSION",
                format!("setting '{}': {} is not writable", context.spec.name, parent.display()),
            ));
        }
    }
    Ok(Configured::OutputFiles(OutputFilesValue {
        root,
        formats,
        write_logs,
    }))
}

/// Instrument resolution sampled on the correlation window of the frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionValue {
    pub kernel: ResolutionKernel,
    pub window: ResolutionWindow,
}

pub(super) fn configure_resolution(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let raw = if raw.is_null() { serde_json::json!({"kernel": "ideal"}) } else { raw.clone() };
    let kernel: ResolutionKernel = serde_json::from_value(raw)
        .map_err(|error| context.error(format!("invalid resolution kernel: {error}")))?;
    kernel.validate().map_err(|error| context.error(error))?;
    let frames = match context.dependency("frames")? {
        Configured::Frames(frames) => frames,
        _ => return Err(context.error("'frames' dependency is not a frame selection")),
    };
    let time_step = match frames.time_step() {
        step if step > 0.0 => step,
        _ => 1.0,
    };
    let window = ResolutionWindow::sample(kernel, frames.n_frames, time_step);
    Ok(Configured::Resolution(ResolutionValue { kernel, window }))
}

/// `first..last` by `step`, last excluded, with bin midpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    pub first: f64,
    pub last: f64,
    pub step: f64,
    pub values: Vec<f64>,
    pub midpoints: Vec<f64>,
    pub number: usize,
}

impl RangeValue {
    pub fn new(first: f64, last: f64, step: f64) -> Option<Self> {
        if !(step > 0.0 && last > first) {
            return None;
        }
        let count = ((last - first) / step - 1.0e-9).ceil() as usize;
        let values: Vec<f64> = (0..count).map(|i| first + i as f64 * step).collect();
        let midpoints = values.windows(2).map(|pair| 0.5 * (pair[0] + pair[1])).collect();
        Some(Self {
            first,
            last,
            step,
            number: values.len(),
            values,
            midpoints,
        })
    }

    pub fn information(&self) -> String {
        format!(
            "{} values from {} to {} by {}",
            self.number, self.first, self.last, self.step
        )
    }
}

pub(super) fn configure_range(raw: &Value, context: &ConfigureContext<'_>, cutoff: bool) -> AnalysisResult<Configured> {
    let bounds: Vec<f64> = match raw.as_array() {
        Some(items) if items.len() == 3 => items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<_>>()
            .ok_or_else(|| context.error("range bounds must be numbers"))?,
        _ => return Err(context.error("expects [first, last, step]")),
    };
    let range = RangeValue::new(bounds[0], bounds[1], bounds[2])
        .filter(|range| range.number >= 2)
        .ok_or_else(|| context.error(format!("invalid range {raw}")))?;
    if cutoff {
        if let Some(cell) = context.trajectory()?.instance().unit_cell(0)? {
            let limit = cell.half_diagonal();
            if range.last > limit + 1.0e-9 {
                return Err(context.error(format!(
                    "cutoff {} exceeds the unit cell half-diagonal {limit:.6} nm",
                    range.last
                )));
            }
        }
    }
    Ok(Configured::Range(range))
}

pub(super) fn configure_float(
    raw: &Value,
    context: &ConfigureContext<'_>,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> AnalysisResult<Configured> {
    let value = raw.as_f64().ok_or_else(|| context.error("expects a number"))?;
    if minimum.is_some_and(|minimum| value < minimum) || maximum.is_some_and(|maximum| value > maximum) {
        return Err(context.error(format!(
            "{value} lies outside [{}, {}]",
            minimum.map_or("-inf".to_string(), |v| v.to_string()),
            maximum.map_or("inf".to_string(), |v| v.to_string())
        )));
    }
    Ok(Configured::Float(value))
}

pub(super) fn configure_integer(
    raw: &Value,
    context: &ConfigureContext<'_>,
    minimum: Option<i64>,
    maximum: Option<i64>,
) -> AnalysisResult<Configured> {
    let value = raw.as_i64().ok_or_else(|| context.error("expects an integer"))?;
    if minimum.is_some_and(|minimum| value < minimum) || maximum.is_some_and(|maximum| value > maximum) {
        return Err(context.error(format!(
            "{value} lies outside [{}, {}]",
            minimum.map_or("-inf".to_string(), |v| v.to_string()),
            maximum.map_or("inf".to_string(), |v| v.to_string())
        )));
    }
    Ok(Configured::Integer(value))
}

pub fn parse_vector(raw: &Value) -> Option<Vec3> {
    match raw.as_array()?.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputFormat, Projector, RangeValue, RunningMode, parse_vector};
    use crate::configurators::{SettingKind, SettingSpec, resolve};
    use crate::database::Databases;
    use serde_json::json;

    fn mock_file(directory: &std::path::Path) -> std::path::PathBuf {
        let path = directory.join("lattice.json");
        let spec = json!({
            "element": "Ar",
            "lattice_constant": 0.5,
            "repeats": [4, 4, 4],
            "n_frames": 6,
            "time_step": 0.5
        });
        std::fs::write(&path, spec.to_string()).expect("write mock");
        path
    }

    fn specs() -> Vec<SettingSpec> {
        vec![
            SettingSpec::new("trajectory", SettingKind::HdfTrajectory, json!("")),
            SettingSpec::new("frames", SettingKind::CorrelationFrames, json!([0, -1, 1])),
            SettingSpec::new(
                "q_vectors",
                SettingKind::QVectors,
                json!({"generator": "spherical_lattice", "shells": {"first": 5.0, "last": 20.0, "step": 5.0}, "n_vectors": 20, "width": 2.0}),
            ),
            SettingSpec::new("r_values", SettingKind::DistHistCutoff, json!([0.0, 1.0, 0.1])),
            SettingSpec::new("projection", SettingKind::Projection, json!(null)),
            SettingSpec::new("resolution", SettingKind::InstrumentResolution, json!({"kernel": "gaussian", "mu": 0.0, "sigma": 1.0})),
            SettingSpec::new("running_mode", SettingKind::RunningMode, json!(["single-core"])),
            SettingSpec::new("output_files", SettingKind::OutputFiles, json!(["result", ["container"]])),
        ]
    }

    #[test]
    fn values_resolve_against_a_periodic_trajectory() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let root = directory.path().join("nested").join("result");
        let parameters = json!({
            "trajectory": path.display().to_string(),
            "frames": [0, 6, 1, 4],
            "projection": {"kind": "planar", "axis": [0, 0, 2]},
            "running_mode": ["multicore", 3],
            "output_files": [root.display().to_string(), ["text", "container", "text"], true]
        });
        let resolved = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect("resolve");
        let q = resolved.q_vectors("q_vectors").expect("q");
        assert_eq!(q.q_values().len(), q.n_shells());
        assert!(q.n_shells() > 0);
        let range = resolved.range("r_values").expect("range");
        assert_eq!(range.number, 10);
        assert_eq!(range.midpoints.len(), 9);
        assert!((range.midpoints[0] - 0.05).abs() < 1e-12);
        let projected = resolved.projection("projection").expect("projection").project([1.0, 2.0, 3.0]);
        assert_eq!(projected, [1.0, 2.0, 0.0]);
        let resolution = resolved.resolution("resolution").expect("resolution");
        assert_eq!(resolution.window.times.len(), 4);
        assert_eq!(resolved.running_mode("running_mode").expect("mode"), &RunningMode::Multicore { workers: 3 });
        let output = resolved.output_files("output_files").expect("output");
        assert_eq!(output.formats, vec![OutputFormat::Container, OutputFormat::Text]);
        assert!(output.write_logs);
        assert!(root.parent().expect("parent").is_dir());
        assert_eq!(output.path(OutputFormat::Container), root.with_extension("mdo"));
    }

    #[test]
    fn cutoffs_beyond_the_half_diagonal_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let parameters = json!({"trajectory": path.display().to_string(), "r_values": [0.0, 5.0, 0.1]});
        let error = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect_err("cutoff");
        assert!(error.message().contains("half-diagonal"));
    }

    #[test]
    fn running_modes_and_projectors_parse() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mock_file(directory.path());
        let registry = directory.path().join("workers.txt");
        std::fs::write(&registry, "# workers\n127.0.0.1:7001\n\n127.0.0.1:7002\n").expect("registry");
        let parameters = json!({
            "trajectory": path.display().to_string(),
            "running_mode": ["remote", registry.display().to_string()],
            "projection": "y"
        });
        let resolved = resolve(&specs(), parameters.as_object().expect("object"), &databases).expect("resolve");
        let mode = resolved.running_mode("running_mode").expect("mode");
        assert_eq!(mode.workers(), 2);
        assert_eq!(resolved.projection("projection").expect("projection"), &Projector::Axial([0.0, 1.0, 0.0]));

        let parameters = json!({"trajectory": path.display().to_string(), "running_mode": ["cluster", 2]});
        assert!(resolve(&specs(), parameters.as_object().expect("object"), &databases).is_err());
        assert_eq!(parse_vector(&json!([1, 2.5, -1])), Some([1.0, 2.5, -1.0]));
        assert!(parse_vector(&json!([1, 2])).is_none());
        assert!(RangeValue::new(1.0, 0.0, 0.1).is_none());
    }
}
