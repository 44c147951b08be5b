use super::{OutputData, OutputVariable, VariableKind};
use crate::domain::{AnalysisError, AnalysisResult};
use crate::numerics::format_numeric;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.txt";

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

fn write_text_artifact(path: &Path, content: &str) -> AnalysisResult<()> {
    fs::write(path, normalize_text_artifact(content))
        .map_err(|error| AnalysisError::io("IO.OUTPUT_WRITE", format!("{}: {error}", path.display())))
}

/// File name of a variable; characters outside `[A-Za-z0-9._-]` become `_`.
fn file_name(variable: &str) -> String {
    let stem: String = variable
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    format!("{stem}.dat")
}

fn render(variable: &OutputVariable) -> String {
    let mut lines = vec![
        format!("# variable: {}", variable.name),
        format!("# units: {}", variable.units),
        format!("# axis: {}", variable.axis),
        format!("# shape: {:?}", variable.shape),
    ];
    match variable.kind {
        VariableKind::Line => {
            lines.extend(variable.data.iter().map(|&value| format_numeric(value)));
        }
        VariableKind::Surface => {
            let width = variable.shape[1].max(1);
            for row in variable.data.chunks(width) {
                lines.push(row.iter().map(|&v| format_numeric(v)).collect::<Vec<_>>().join(" "));
            }
        }
        VariableKind::Volume => {
            let (rows, width) = (variable.shape[1], variable.shape[2].max(1));
            for (slice, block) in variable.data.chunks((rows * width).max(1)).enumerate() {
                lines.push(format!("# slice {slice}"));
                for row in block.chunks(width) {
                    lines.push(row.iter().map(|&v| format_numeric(v)).collect::<Vec<_>>().join(" "));
                }
            }
        }
    }
    lines.join("\n")
}

/// A directory with one `.dat` file per variable and a manifest listing
/// name, kind, shape, axis and units.
pub fn write_text(output: &OutputData, directory: &Path, header: &str) -> AnalysisResult<()> {
    fs::create_dir_all(directory).map_err(|error| {
        AnalysisError::io("IO.OUTPUT_DIRECTORY", format!("{}: {error}", directory.display()))
    })?;
    let mut manifest = vec![format!("# {header}"), "# name | kind | shape | axis | units | file".to_string()];
    for variable in output.iter() {
        let file = file_name(&variable.name);
        write_text_artifact(&directory.join(&file), &render(variable))?;
        let shape: Vec<String> = variable.shape.iter().map(usize::to_string).collect();
        manifest.push(format!(
            "{} | {} | {} | {} | {} | {file}",
            variable.name,
            variable.kind.as_str(),
            shape.join("x"),
            variable.axis,
            variable.units
        ));
    }
    write_text_artifact(&directory.join(MANIFEST_FILE), &manifest.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::{MANIFEST_FILE, normalize_text_artifact, write_text};
    use crate::output::{OutputData, VariableKind};
    use std::fs;

    #[test]
    fn normalize_text_artifact_uses_canonical_line_endings() {
        assert_eq!(normalize_text_artifact("alpha\r\nbeta\rgamma"), "alpha\nbeta\ngamma\n");
    }

    #[test]
    fn text_output_lists_every_variable_in_the_manifest() {
        let directory = tempfile::tempdir().expect("tempdir");
        let target = directory.path().join("result_text");
        let mut output = OutputData::new();
        output
            .add_data("time", VariableKind::Line, &[2], vec![0.0, 0.5], "index", "ps")
            .expect("time");
        output
            .add_data("g(r,t)", VariableKind::Surface, &[2, 2], vec![1.0, 2.0, 3.0, 4.0], "r|time", "au")
            .expect("surface");
        write_text(&output, &target, "VanHoveFunctionSelf").expect("write");

        let manifest = fs::read_to_string(target.join(MANIFEST_FILE)).expect("manifest");
        assert!(manifest.starts_with("# VanHoveFunctionSelf\n"));
        assert!(manifest.contains("g(r,t) | surface | 2x2 | r|time | au | g_r_t_.dat"));
        let surface = fs::read_to_string(target.join("g_r_t_.dat")).expect("surface");
        let rows: Vec<&str> = surface.lines().filter(|line| !line.starts_with('#')).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], "3.000000000000000e0 4.000000000000000e0");
    }
}
