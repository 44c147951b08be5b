//! Typed job settings resolved in dependency order.
//!
//! A job declares its settings as [`SettingSpec`]s. [`resolve`] sorts them
//! topologically over their dependencies, configures each raw JSON value
//! against the settings already resolved, and returns an immutable
//! [`ResolvedConfig`].

pub mod atoms;
pub mod mapping;
pub mod trajectory;
pub mod values;

pub use atoms::{AtomSelectionValue, GroupingLevel, GroupingValue, WeightsValue};
pub use mapping::{
    AtomLabel, AtomMapping, check_mapping_valid, fill_remaining_labels, guess_element_mapping,
    mapped_symbol,
};
pub use trajectory::{FrameSelection, TrajectoryValue};
pub use values::{
    OutputFilesValue, OutputFormat, Projector, QVectorsValue, RangeValue, ResolutionValue,
    RunningMode,
};

use crate::configuration::UnitCell;
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, JobParameters, Vec3};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    HdfTrajectory,
    Frames,
    CorrelationFrames,
    AtomSelection,
    AtomTransmutation,
    GroupingLevel,
    Weights,
    QVectors,
    Projection,
    RunningMode,
    OutputFiles,
    PartialCharges,
    InstrumentResolution,
    Range,
    DistHistCutoff,
    UnitCell,
    InterpolationOrder,
    Float { minimum: Option<f64>, maximum: Option<f64> },
    Integer { minimum: Option<i64>, maximum: Option<i64> },
    Boolean,
    Text,
    Vector,
    SingleChoice(Vec<&'static str>),
}

impl SettingKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HdfTrajectory => "HDFTrajectoryConfigurator",
            Self::Frames => "FramesConfigurator",
            Self::CorrelationFrames => "CorrelationFramesConfigurator",
            Self::AtomSelection => "AtomSelectionConfigurator",
            Self::AtomTransmutation => "AtomTransmutationConfigurator",
            Self::GroupingLevel => "GroupingLevelConfigurator",
            Self::Weights => "WeightsConfigurator",
            Self::QVectors => "QVectorsConfigurator",
            Self::Projection => "ProjectionConfigurator",
            Self::RunningMode => "RunningModeConfigurator",
            Self::OutputFiles => "OutputFilesConfigurator",
            Self::PartialCharges => "PartialChargesConfigurator",
            Self::InstrumentResolution => "InstrumentResolutionConfigurator",
            Self::Range => "RangeConfigurator",
            Self::DistHistCutoff => "DistHistCutoffConfigurator",
            Self::UnitCell => "UnitCellConfigurator",
            Self::InterpolationOrder => "InterpolationOrderConfigurator",
            Self::Float { .. } => "FloatConfigurator",
            Self::Integer { .. } => "IntegerConfigurator",
            Self::Boolean => "BooleanConfigurator",
            Self::Text => "StringConfigurator",
            Self::Vector => "VectorConfigurator",
            Self::SingleChoice(_) => "SingleChoiceConfigurator",
        }
    }

    /// Roles this kind reads from other settings; each role defaults to the
    /// setting of the same name.
    pub fn dependency_roles(&self) -> &'static [&'static str] {
        match self {
            Self::Frames
            | Self::CorrelationFrames
            | Self::AtomSelection
            | Self::QVectors
            | Self::PartialCharges
            | Self::DistHistCutoff
            | Self::UnitCell
            | Self::InterpolationOrder => &["trajectory"],
            Self::AtomTransmutation => &["trajectory", "atom_selection"],
            Self::GroupingLevel => &["trajectory", "atom_selection", "atom_transmutation"],
            Self::Weights => &["trajectory", "atom_selection", "atom_transmutation"],
            Self::InstrumentResolution => &["frames"],
            _ => &[],
        }
    }

    fn optional_role(role: &str) -> bool {
        role == "atom_transmutation"
    }
}

/// One declared job setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingSpec {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: Value,
    /// Role to setting name.
    pub dependencies: BTreeMap<&'static str, &'static str>,
    pub label: &'static str,
}

impl SettingSpec {
    pub fn new(name: &'static str, kind: SettingKind, default: Value) -> Self {
        let dependencies = kind.dependency_roles().iter().map(|role| (*role, *role)).collect();
        Self {
            name,
            kind,
            default,
            dependencies,
            label: name,
        }
    }

    pub fn depends_on(mut self, role: &'static str, setting: &'static str) -> Self {
        self.dependencies.insert(role, setting);
        self
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Configured {
    Trajectory(TrajectoryValue),
    Frames(FrameSelection),
    AtomSelection(AtomSelectionValue),
    /// Atom index to replacement symbol.
    Transmutation(BTreeMap<usize, String>),
    Grouping(GroupingValue),
    Weights(WeightsValue),
    QVectors(QVectorsValue),
    Projection(Projector),
    RunningMode(RunningMode),
    OutputFiles(OutputFilesValue),
    PartialCharges(BTreeMap<usize, f64>),
    Resolution(ResolutionValue),
    Range(RangeValue),
    UnitCell(Option<UnitCell>),
    InterpolationOrder(usize),
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    Vector(Vec3),
}

impl Configured {
    /// Human-readable summary of the configured value.
    pub fn information(&self) -> String {
        match self {
            Self::Trajectory(value) => value.information(),
            Self::Frames(value) => value.information(),
            Self::AtomSelection(value) => value.information(),
            Self::Transmutation(map) => format!("{} atoms transmuted", map.len()),
            Self::Grouping(value) => format!("{} groups at level {}", value.groups.len(), value.level.as_str()),
            Self::Weights(value) => format!("weights from '{}'", value.property),
            Self::QVectors(value) => value.information(),
            Self::Projection(value) => format!("{value:?}"),
            Self::RunningMode(value) => value.information(),
            Self::OutputFiles(value) => value.information(),
            Self::PartialCharges(map) => format!("{} partial charges", map.len()),
            Self::Resolution(value) => format!("resolution kernel {}", value.window.kernel.name()),
            Self::Range(value) => value.information(),
            Self::UnitCell(Some(cell)) => format!("unit cell override, volume {:.6} nm3", cell.volume()),
            Self::UnitCell(None) => "trajectory unit cell".to_string(),
            Self::InterpolationOrder(0) => "stored velocities".to_string(),
            Self::InterpolationOrder(order) => format!("finite differences of order {order}"),
            Self::Float(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::Vector(value) => format!("{value:?}"),
        }
    }
}

pub(crate) fn setting_error(setting: &str, message: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::job("JOB.SETTING", format!("setting '{setting}': {message}"))
}

/// Settings of one job after resolution; immutable while the job runs.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    values: BTreeMap<String, Configured>,
    order: Vec<String>,
    raw: JobParameters,
}

macro_rules! typed_accessor {
    ($method:ident, $variant:ident, $output:ty) => {
        pub fn $method(&self, name: &str) -> AnalysisResult<&$output> {
            match self.get(name)? {
                Configured::$variant(value) => Ok(value),
                _ => Err(setting_error(name, concat!("is not a ", stringify!($variant), " setting"))),
            }
        }
    };
}

impl ResolvedConfig {
    pub fn get(&self, name: &str) -> AnalysisResult<&Configured> {
        self.values
            .get(name)
            .ok_or_else(|| setting_error(name, "is not configured"))
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Setting names in resolution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Raw parameters after defaults were filled in.
    pub fn raw(&self) -> &JobParameters {
        &self.raw
    }

    pub fn information(&self) -> String {
        self.order
            .iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| format!("{name}: {}", value.information()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    typed_accessor!(trajectory, Trajectory, TrajectoryValue);
    typed_accessor!(frames, Frames, FrameSelection);
    typed_accessor!(atom_selection, AtomSelection, AtomSelectionValue);
    typed_accessor!(grouping, Grouping, GroupingValue);
    typed_accessor!(weights, Weights, WeightsValue);
    typed_accessor!(q_vectors, QVectors, QVectorsValue);
    typed_accessor!(projection, Projection, Projector);
    typed_accessor!(running_mode, RunningMode, RunningMode);
    typed_accessor!(output_files, OutputFiles, OutputFilesValue);
    typed_accessor!(partial_charges, PartialCharges, BTreeMap<usize, f64>);
    typed_accessor!(resolution, Resolution, ResolutionValue);
    typed_accessor!(range, Range, RangeValue);
    typed_accessor!(unit_cell, UnitCell, Option<UnitCell>);
    typed_accessor!(interpolation_order, InterpolationOrder, usize);
    typed_accessor!(text, Text, String);
    typed_accessor!(vector, Vector, Vec3);

    pub fn float(&self, name: &str) -> AnalysisResult<f64> {
        match self.get(name)? {
            Configured::Float(value) => Ok(*value),
            Configured::Integer(value) => Ok(*value as f64),
            _ => Err(setting_error(name, "is not a number")),
        }
    }

    pub fn integer(&self, name: &str) -> AnalysisResult<i64> {
        match self.get(name)? {
            Configured::Integer(value) => Ok(*value),
            _ => Err(setting_error(name, "is not an integer")),
        }
    }

    pub fn boolean(&self, name: &str) -> AnalysisResult<bool> {
        match self.get(name)? {
            Configured::Boolean(value) => Ok(*value),
            _ => Err(setting_error(name, "is not a boolean")),
        }
    }

    /// Replaces a resolved value; only the resolver and the running-mode
    /// override of parallel checks use this.
    pub fn replace(&mut self, name: &str, value: Configured) -> AnalysisResult<()> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| setting_error(name, "is not configured"))?;
        *slot = value;
        Ok(())
    }
}

/// What a configurator sees while it runs.
pub struct ConfigureContext<'a> {
    pub spec: &'a SettingSpec,
    pub resolved: &'a ResolvedConfig,
    pub databases: &'a Databases,
}

impl ConfigureContext<'_> {
    /// The resolved setting bound to `role`.
    pub fn dependency(&self, role: &str) -> AnalysisResult<&Configured> {
        let name = self
            .spec
            .dependencies
            .get(role)
            .ok_or_else(|| setting_error(self.spec.name, format!("has no '{role}' dependency")))?;
        self.resolved.get(name)
    }

    pub fn trajectory(&self) -> AnalysisResult<&TrajectoryValue> {
        match self.dependency("trajectory")? {
            Configured::Trajectory(value) => Ok(value),
            _ => Err(setting_error(self.spec.name, "'trajectory' dependency is not a trajectory")),
        }
    }

    pub fn error(&self, message: impl std::fmt::Display) -> AnalysisError {
        setting_error(self.spec.name, message)
    }
}

fn configure(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    match &context.spec.kind {
        SettingKind::HdfTrajectory => trajectory::configure_trajectory(raw, context),
        SettingKind::Frames => trajectory::configure_frames(raw, context, false),
        SettingKind::CorrelationFrames => trajectory::configure_frames(raw, context, true),
        SettingKind::UnitCell => trajectory::configure_unit_cell(raw, context),
        SettingKind::InterpolationOrder => trajectory::configure_interpolation_order(raw, context),
        SettingKind::AtomSelection => atoms::configure_selection(raw, context),
        SettingKind::AtomTransmutation => atoms::configure_transmutation(raw, context),
        SettingKind::GroupingLevel => atoms::configure_grouping(raw, context),
        SettingKind::Weights => atoms::configure_weights(raw, context),
        SettingKind::PartialCharges => atoms::configure_partial_charges(raw, context),
        SettingKind::QVectors => values::configure_q_vectors(raw, context),
        SettingKind::Projection => values::configure_projection(raw, context),
        SettingKind::RunningMode => values::configure_running_mode(raw, context),
        SettingKind::OutputFiles => values::configure_output_files(raw, context),
        SettingKind::InstrumentResolution => values::configure_resolution(raw, context),
        SettingKind::Range => values::configure_range(raw, context, false),
        SettingKind::DistHistCutoff => values::configure_range(raw, context, true),
        SettingKind::Float { minimum, maximum } => values::configure_float(raw, context, *minimum, *maximum),
        SettingKind::Integer { minimum, maximum } => {
            values::configure_integer(raw, context, *minimum, *maximum)
        }
        SettingKind::Boolean => raw
            .as_bool()
            .map(Configured::Boolean)
            .ok_or_else(|| context.error("expects true or false")),
        SettingKind::Text => raw
            .as_str()
            .map(|text| Configured::Text(text.to_string()))
            .ok_or_else(|| context.error("expects a string")),
        SettingKind::Vector => values::parse_vector(raw)
            .map(Configured::Vector)
            .ok_or_else(|| context.error("expects three numbers")),
        SettingKind::SingleChoice(choices) => match raw.as_str() {
            Some(choice) if choices.contains(&choice) => Ok(Configured::Text(choice.to_string())),
            _ => Err(context.error(format!("expects one of {}", choices.join(", ")))),
        },
    }
}

/// Kahn's algorithm, ties broken by declaration order.
fn resolution_order(specs: &[SettingSpec]) -> AnalysisResult<Vec<usize>> {
    let positions: BTreeMap<&str, usize> = specs.iter().enumerate().map(|(i, s)| (s.name, i)).collect();
    let mut prerequisites: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); specs.len()];
    for (index, spec) in specs.iter().enumerate() {
        for (role, target) in &spec.dependencies {
            match positions.get(target) {
                Some(&position) => {
                    prerequisites[index].insert(position);
                }
                None if SettingKind::optional_role(role) => {}
                None => {
                    return Err(AnalysisError::job(
                        "JOB.MISSING_DEPENDENCY",
                        format!("setting '{}' depends on undeclared setting '{target}'", spec.name),
                    ));
                }
            }
        }
    }
    let mut order = Vec::with_capacity(specs.len());
    let mut done = vec![false; specs.len()];
    while order.len() < specs.len() {
        let next = (0..specs.len()).find(|&i| !done[i] && prerequisites[i].iter().all(|&p| done[p]));
        let Some(next) = next else {
            let cycle: Vec<&str> = (0..specs.len()).filter(|&i| !done[i]).map(|i| specs[i].name).collect();
            return Err(AnalysisError::job(
                "JOB.DEPENDENCY_CYCLE",
                format!("settings depend on each other: {}", cycle.join(", ")),
            ));
        };
        done[next] = true;
        order.push(next);
    }
    Ok(order)
}

/// Configures every setting of `specs` from `parameters`, filling defaults.
pub fn resolve(
    specs: &[SettingSpec],
    parameters: &JobParameters,
    databases: &Databases,
) -> AnalysisResult<ResolvedConfig> {
    if let Some(unknown) = parameters.keys().find(|key| specs.iter().all(|s| s.name != key.as_str())) {
        return Err(AnalysisError::job(
            "JOB.UNKNOWN_SETTING",
            format!("unknown setting '{unknown}'"),
        ));
    }
    let order = resolution_order(specs)?;
    let mut resolved = ResolvedConfig::default();
    for index in order {
        let spec = &specs[index];
        let raw = parameters.get(spec.name).cloned().unwrap_or_else(|| spec.default.clone());
        let configured = {
            let context = ConfigureContext {
                spec,
                resolved: &resolved,
                databases,
            };
            configure(&raw, &context)?
        };
        tracing::debug!(setting = spec.name, kind = spec.kind.name(), "setting configured");
        if let Configured::Transmutation(map) = &configured {
            if let Some(target) = spec.dependencies.get("atom_selection") {
                let selection = resolved.atom_selection(target)?.transmuted(map);
                resolved.replace(target, Configured::AtomSelection(selection))?;
            }
        }
        resolved.raw.insert(spec.name.to_string(), raw);
        resolved.values.insert(spec.name.to_string(), configured);
        resolved.order.push(spec.name.to_string());
    }
    Ok(resolved)
}

/// Defaults of every setting, as a parameter mapping.
pub fn default_parameters(specs: &[SettingSpec]) -> JobParameters {
    specs
        .iter()
        .map(|spec| (spec.name.to_string(), spec.default.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SettingKind, SettingSpec, default_parameters, resolve};
    use crate::database::Databases;
    use crate::domain::JobParameters;
    use serde_json::json;

    fn parameters(value: serde_json::Value) -> JobParameters {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn primitives_resolve_with_defaults_and_bounds() {
        let databases = Databases::builtin().expect("databases");
        let specs = vec![
            SettingSpec::new(
                "alpha",
                SettingKind::Float { minimum: Some(0.0), maximum: Some(1.0) },
                json!(0.5),
            ),
            SettingSpec::new("flag", SettingKind::Boolean, json!(false)),
            SettingSpec::new("mode", SettingKind::SingleChoice(vec!["a", "b"]), json!("a")),
        ];
        let resolved = resolve(&specs, &parameters(json!({"flag": true})), &databases).expect("resolve");
        assert_eq!(resolved.float("alpha").expect("alpha"), 0.5);
        assert!(resolved.boolean("flag").expect("flag"));
        assert_eq!(resolved.text("mode").expect("mode"), "a");
        assert!(resolved.information().contains("flag: true"));
        assert_eq!(default_parameters(&specs)["mode"], json!("a"));

        let error = resolve(&specs, &parameters(json!({"alpha": 2.0})), &databases).expect_err("bounds");
        assert_eq!(error.placeholder(), "JOB.SETTING");
        let error = resolve(&specs, &parameters(json!({"beta": 1})), &databases).expect_err("unknown");
        assert_eq!(error.placeholder(), "JOB.UNKNOWN_SETTING");
    }

    #[test]
    fn dependency_cycles_and_missing_targets_abort() {
        let databases = Databases::builtin().expect("databases");
        let missing = vec![SettingSpec::new("frames", SettingKind::Frames, json!([0, 1, 1]))];
        let error = resolve(&missing, &JobParameters::new(), &databases).expect_err("missing");
        assert_eq!(error.placeholder(), "JOB.MISSING_DEPENDENCY");

        let cyclic = vec![
            SettingSpec::new("trajectory", SettingKind::Frames, json!([0, 1, 1])).depends_on("trajectory", "frames"),
            SettingSpec::new("frames", SettingKind::Frames, json!([0, 1, 1])),
        ];
        let error = resolve(&cyclic, &JobParameters::new(), &databases).expect_err("cycle");
        assert_eq!(error.placeholder(), "JOB.DEPENDENCY_CYCLE");
    }
}
