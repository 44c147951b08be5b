use super::{OutputData, VariableKind};
use crate::domain::{AnalysisError, AnalysisResult};
use crate::trajectory::{Compression, ContainerReader, ContainerWriter};
use serde_json::Value;
use std::path::Path;

pub const OUTPUT_FORMAT: &str = "mdscatter-output";

fn dataset_name(variable: &str) -> String {
    format!("/{variable}")
}

/// One dataset per variable under `/`, carrying `name`, `units`, `axis`
/// and `kind` attributes; the header goes on the root group.
pub fn write_container(output: &OutputData, path: &Path, header: &str) -> AnalysisResult<()> {
    let to_analysis = |error: crate::trajectory::ContainerError| error.into_analysis(path);
    let mut writer = ContainerWriter::create(path).map_err(to_analysis)?;
    writer.set_group_attribute("/", "format", OUTPUT_FORMAT);
    writer.set_group_attribute("/", "header", header);
    let names: Vec<Value> = output.names().iter().map(|name| Value::from(name.as_str())).collect();
    writer.set_group_attribute("/", "variables", Value::Array(names));
    for variable in output.iter() {
        let dataset = dataset_name(&variable.name);
        writer
            .write_dataset(&dataset, &variable.shape, &variable.data, Compression::None)
            .map_err(to_analysis)?;
        writer.set_attribute(&dataset, "name", variable.name.as_str()).map_err(to_analysis)?;
        writer.set_attribute(&dataset, "units", variable.units.as_str()).map_err(to_analysis)?;
        writer.set_attribute(&dataset, "axis", variable.axis.as_str()).map_err(to_analysis)?;
        writer.set_attribute(&dataset, "kind", variable.kind.as_str()).map_err(to_analysis)?;
        writer.set_attribute(&dataset, "main_result", variable.main_result).map_err(to_analysis)?;
        writer.set_attribute(&dataset, "partial_result", variable.partial_result).map_err(to_analysis)?;
    }
    writer.finish().map_err(to_analysis)?;
    Ok(())
}

/// Reads a container written by [`write_container`], with its header.
pub fn read_output(path: &Path) -> AnalysisResult<(OutputData, String)> {
    let to_analysis = |error: crate::trajectory::ContainerError| error.into_analysis(path);
    let reader = ContainerReader::open(path).map_err(to_analysis)?;
    let root = reader.group_attributes("/").cloned().unwrap_or_default();
    if root.get("format").and_then(Value::as_str) != Some(OUTPUT_FORMAT) {
        return Err(AnalysisError::corrupted(
            "IO.OUTPUT_FORMAT",
            format!("{} is not an analysis output container", path.display()),
        ));
    }
    let header = root.get("header").and_then(Value::as_str).unwrap_or_default().to_string();
    let names: Vec<String> = root
        .get("variables")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(|name| name.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let mut output = OutputData::new();
    for name in names {
        let dataset = dataset_name(&name);
        let info = reader.dataset(&dataset).map_err(to_analysis)?.clone();
        let kind = info
            .string_attribute("kind")
            .and_then(VariableKind::parse)
            .ok_or_else(|| AnalysisError::corrupted("IO.OUTPUT_FORMAT", format!("'{name}' has no kind")))?;
        let data = reader.read_all(&dataset).map_err(to_analysis)?;
        let variable = output.add_data(
            &name,
            kind,
            &info.shape,
            data,
            info.string_attribute("axis").unwrap_or_default(),
            info.string_attribute("units").unwrap_or_default(),
        )?;
        variable.main_result = info.attributes.get("main_result").and_then(Value::as_bool).unwrap_or(false);
        variable.partial_result = info
            .attributes
            .get("partial_result")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }
    Ok((output, header))
}

#[cfg(test)]
mod tests {
    use super::{read_output, write_container};
    use crate::output::{OutputData, VariableKind};

    #[test]
    fn containers_keep_variables_axes_and_units() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("result.mdo");
        let mut output = OutputData::new();
        output
            .add_data("r", VariableKind::Line, &[3], vec![0.05, 0.15, 0.25], "index", "nm")
            .expect("r");
        let pdf = output
            .add_data("pdf_total", VariableKind::Line, &[3], vec![0.0, 1.2, 0.9], "r", "au")
            .expect("pdf");
        pdf.main_result = true;
        write_container(&output, &path, "PairDistributionFunction").expect("write");

        let (read, header) = read_output(&path).expect("read");
        assert_eq!(header, "PairDistributionFunction");
        assert_eq!(read, output);
        assert_eq!(read.get("pdf_total").expect("pdf").axis, "r");
    }

    #[test]
    fn trajectory_containers_are_not_outputs() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("other.mdo");
        let writer = crate::trajectory::ContainerWriter::create(&path).expect("create");
        writer.finish().expect("finish");
        assert_eq!(read_output(&path).expect_err("format").placeholder(), "IO.OUTPUT_FORMAT");
    }
}
