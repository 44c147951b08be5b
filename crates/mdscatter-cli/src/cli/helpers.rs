use super::CliError;
use anyhow::Context;
use mdscatter_core::analysis;
use mdscatter_core::database::{AtomEntry, Databases};
use mdscatter_core::domain::{AnalysisError, JobParameters};
use mdscatter_core::jobs::{JobReport, JobRegistry};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber once; later calls keep the first one.
pub(super) fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn load_databases() -> Result<Databases, CliError> {
    Ok(Databases::from_environment()?)
}

pub(super) fn load_registry() -> Result<JobRegistry, CliError> {
    Ok(analysis::registry()?)
}

/// Parameters from an inline JSON object, a JSON file, or none.
pub(super) fn load_parameters(inline: Option<&str>, file: Option<&Path>) -> Result<JobParameters, CliError> {
    let value = match (inline, file) {
        (Some(text), _) => serde_json::from_str::<Value>(text)
            .map_err(|error| AnalysisError::job("INPUT.CLI_PARAMETERS", format!("invalid parameters: {error}")))?,
        (None, Some(path)) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read parameters from '{}'", path.display()))?;
            serde_json::from_str::<Value>(&content).map_err(|error| {
                AnalysisError::job("INPUT.CLI_PARAMETERS", format!("{}: {error}", path.display()))
            })?
        }
        (None, None) => Value::Object(JobParameters::new()),
    };
    match value {
        Value::Object(parameters) => Ok(parameters),
        other => Err(AnalysisError::job(
            "INPUT.CLI_PARAMETERS",
            format!("parameters must be a JSON object, got {other}"),
        )
        .into()),
    }
}

pub(super) fn render_atom_entry(entry: &AtomEntry) -> String {
    let mut lines = vec![
        format!("{} ({})", entry.symbol, entry.name),
        format!("  {:<16} {}", "atomic_number", entry.atomic_number),
        format!("  {:<16} {} g/mol", "atomic_weight", entry.atomic_weight),
        format!("  {:<16} {} fm", "b_coherent", entry.b_coherent),
        format!("  {:<16} {} fm", "b_incoherent", entry.b_incoherent),
        format!("  {:<16} {} barn", "xs_coherent", entry.xs_coherent),
        format!("  {:<16} {} barn", "xs_incoherent", entry.xs_incoherent),
        format!("  {:<16} {} barn", "xs_absorption", entry.xs_absorption),
        format!("  {:<16} {}", "abundance", entry.abundance),
        format!("  {:<16} {} nm", "covalent_radius", entry.covalent_radius),
        format!("  {:<16} {} nm", "vdw_radius", entry.vdw_radius),
    ];
    for (name, value) in &entry.extra {
        lines.push(format!("  {name:<16} {value}"));
    }
    if !entry.alternatives.is_empty() {
        lines.push(format!("  {:<16} {}", "alternatives", entry.alternatives.join(", ")));
    }
    lines.join("\n")
}

pub(super) fn render_report(report: &JobReport) -> String {
    let mut lines = vec![format!(
        "job {} ({}): {} after {} steps",
        report.job,
        report.job_id,
        report.state.as_str(),
        report.n_steps
    )];
    if report.log.warnings() > 0 {
        lines.push(format!("warnings: {}", report.log.warnings()));
    }
    for path in &report.files {
        lines.push(format!("wrote {}", path.display()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::load_parameters;
    use std::fs;

    #[test]
    fn parameters_come_from_inline_json_or_a_file() {
        let inline = load_parameters(Some(r#"{"frames": [0, 4, 1]}"#), None).expect("inline");
        assert_eq!(inline["frames"], serde_json::json!([0, 4, 1]));

        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("parameters.json");
        fs::write(&path, r#"{"dr": 0.02}"#).expect("write parameters");
        let from_file = load_parameters(None, Some(&path)).expect("file");
        assert_eq!(from_file["dr"], 0.02);

        assert!(load_parameters(None, None).expect("empty").is_empty());
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        let error = load_parameters(Some("[1, 2]"), None).expect_err("array");
        assert!(error.to_string().contains("JSON object"));
    }
}
