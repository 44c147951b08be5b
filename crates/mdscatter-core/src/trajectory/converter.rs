//! Importers turning foreign trajectory formats into native containers.

use super::container::{Compression, Dtype};
use super::writer::{ChunkingAxis, TrajectoryWriter, WriterOptions};
use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem};
use crate::configuration::{Configuration, UnitCell, VELOCITIES};
use crate::configurators::mapping::{
    AtomLabel, AtomMapping, check_mapping_valid, fill_remaining_labels, mapped_symbol,
};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use crate::units::conversion_factor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterOptions {
    /// ps between frames when the file carries no times.
    pub time_step: f64,
    /// Length unit of the input positions and cell.
    pub length_unit: String,
    pub compression: Compression,
    pub chunking_axis: usize,
    pub dtype: Dtype,
    /// Explicit label-to-element entries; other labels are guessed.
    pub atom_aliases: AtomMapping,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            length_unit: "ang".to_string(),
            compression: Compression::None,
            chunking_axis: 1,
            dtype: Dtype::F64,
            atom_aliases: AtomMapping::new(),
        }
    }
}

impl ConverterOptions {
    fn writer_options(&self) -> AnalysisResult<WriterOptions> {
        Ok(WriterOptions {
            dtype: self.dtype,
            chunking_axis: ChunkingAxis::from_axis(self.chunking_axis)?,
            compression: self.compression,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub output: PathBuf,
    pub n_frames: usize,
    pub n_atoms: usize,
    pub periodic: bool,
}

pub trait Converter {
    fn name(&self) -> &'static str;

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConverterOptions,
        databases: &Databases,
    ) -> AnalysisResult<ConversionSummary>;
}

/// Extended XYZ: an atom count line, a comment line optionally carrying
/// `Lattice="ax ay az bx by bz cx cy cz"` and `Time=<ps>`, then one
/// `label x y z [vx vy vz]` line per atom.
#[derive(Debug, Clone, Copy, Default)]
pub struct XyzConverter;

#[derive(Debug, Clone, PartialEq)]
struct XyzFrame {
    labels: Vec<String>,
    positions: Vec<Vec3>,
    velocities: Option<Vec<Vec3>>,
    lattice: Option<[f64; 9]>,
    time: Option<f64>,
}

fn xyz_error(path: &Path, line: usize, message: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::corrupted(
        "IO.CORRUPTED_XYZ",
        format!("{}:{line}: {message}", path.display()),
    )
}

fn comment_value<'a>(comment: &'a str, key: &str) -> Option<&'a str> {
    let start = comment.find(&format!("{key}="))? + key.len() + 1;
    let rest = &comment[start..];
    if let Some(quoted) = rest.strip_prefix('"') {
        return quoted.split('"').next();
    }
    rest.split_whitespace().next()
}

fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|v| v.parse().ok()).collect()
}

fn parse_xyz(path: &Path, text: &str) -> AnalysisResult<Vec<XyzFrame>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut frames = Vec::new();
    let mut cursor = 0;
    while cursor < lines.len() {
        if lines[cursor].trim().is_empty() {
            cursor += 1;
            continue;
        }
        let n_atoms: usize = lines[cursor]
            .trim()
            .parse()
            .map_err(|_| xyz_error(path, cursor + 1, "expected an atom count"))?;
        let comment = lines
            .get(cursor + 1)
            .ok_or_else(|| xyz_error(path, cursor + 2, "missing comment line"))?;
        let lattice = match comment_value(comment, "Lattice") {
            Some(value) => {
                let numbers = parse_numbers(value)
                    .filter(|n| n.len() == 9)
                    .ok_or_else(|| xyz_error(path, cursor + 2, "Lattice needs nine numbers"))?;
                let mut lattice = [0.0; 9];
                lattice.copy_from_slice(&numbers);
                Some(lattice)
            }
            None => None,
        };
        let time = match comment_value(comment, "Time") {
            Some(value) => Some(
                value
                    .parse::<f64>()
                    .map_err(|_| xyz_error(path, cursor + 2, "invalid Time"))?,
            ),
            None => None,
        };
        let mut frame = XyzFrame {
            labels: Vec::with_capacity(n_atoms),
            positions: Vec::with_capacity(n_atoms),
            velocities: None,
            lattice,
            time,
        };
        let mut velocities = Vec::with_capacity(n_atoms);
        for offset in 0..n_atoms {
            let number = cursor + 2 + offset;
            let line = lines
                .get(number)
                .ok_or_else(|| xyz_error(path, number + 1, "truncated frame"))?;
            let mut fields = line.split_whitespace();
            let label = fields
                .next()
                .ok_or_else(|| xyz_error(path, number + 1, "empty atom line"))?;
            let values: Vec<f64> = fields
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|e| xyz_error(path, number + 1, e))?;
            if values.len() < 3 {
                return Err(xyz_error(path, number + 1, "expected x y z"));
            }
            frame.labels.push(label.to_string());
            frame.positions.push([values[0], values[1], values[2]]);
            if values.len() >= 6 {
                velocities.push([values[3], values[4], values[5]]);
            }
        }
        if velocities.len() == n_atoms && n_atoms > 0 {
            frame.velocities = Some(velocities);
        }
        frames.push(frame);
        cursor += 2 + n_atoms;
    }
    if frames.is_empty() {
        return Err(xyz_error(path, 1, "no frames"));
    }
    Ok(frames)
}

fn build_system(
    path: &Path,
    labels: &[String],
    aliases: &AtomMapping,
    databases: &Databases,
) -> AnalysisResult<ChemicalSystem> {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("xyz");
    let labels: Vec<AtomLabel> = labels.iter().map(|label| AtomLabel::new("", label, None)).collect();
    let mut mapping = aliases.clone();
    fill_remaining_labels(&mut mapping, &labels, &databases.atoms);
    check_mapping_valid(&mapping, &labels, &databases.atoms)?;
    let mut system = ChemicalSystem::new(name);
    for (index, label) in labels.iter().enumerate() {
        let symbol = mapped_symbol(&mapping, label)?;
        let atom = AtomSpec::new(&symbol, &format!("{}{}", label.label, index + 1));
        system.add_chemical_entity(ChemicalEntity::Atom(atom), databases)?;
    }
    Ok(system)
}

impl Converter for XyzConverter {
    fn name(&self) -> &'static str {
        "xyz"
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConverterOptions,
        databases: &Databases,
    ) -> AnalysisResult<ConversionSummary> {
        let text = std::fs::read_to_string(input)
            .map_err(|e| AnalysisError::io("IO.READ", format!("{}: {e}", input.display())))?;
        let frames = parse_xyz(input, &text)?;
        let scale = conversion_factor(&options.length_unit, "nm")
            .map_err(|e| AnalysisError::new(ErrorKind::Units, "INPUT.UNITS", e.to_string()))?;
        let system = build_system(input, &frames[0].labels, &options.atom_aliases, databases)?;
        let n_atoms = system.total_number_of_atoms();
        let mut writer =
            TrajectoryWriter::create(output, &system, frames.len(), None, options.writer_options()?)?;
        let mut periodic = false;
        for (index, frame) in frames.iter().enumerate() {
            if frame.labels != frames[0].labels {
                return Err(AnalysisError::new(
                    ErrorKind::InconsistentChemicalSystem,
                    "INPUT.XYZ_ATOMS",
                    format!("frame {index} lists different atoms than frame 0"),
                ));
            }
            let positions = frame.positions.iter().map(|p| p.map(|v| v * scale)).collect();
            let cell = match frame.lattice {
                Some(values) => Some(UnitCell::from_rows(
                    &values.chunks_exact(3).map(|row| row.iter().map(|v| v * scale).collect()).collect::<Vec<Vec<f64>>>(),
                )?),
                None => None,
            };
            periodic |= cell.is_some();
            let mut configuration = Configuration::from_coordinates(positions, cell);
            if let Some(velocities) = &frame.velocities {
                configuration.set_variable(VELOCITIES, velocities.iter().map(|v| v.map(|x| x * scale)).collect())?;
            }
            let time = frame.time.unwrap_or(index as f64 * options.time_step);
            writer.dump_configuration(&configuration, time)?;
        }
        let output = writer.close()?;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            frames = frames.len(),
            "converted extended XYZ"
        );
        Ok(ConversionSummary {
            output,
            n_frames: frames.len(),
            n_atoms,
            periodic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Converter, ConverterOptions, XyzConverter, comment_value};
    use crate::database::Databases;
    use crate::trajectory::Trajectory;

    const WATER: &str = "3\nLattice=\"20 0 0 0 20 0 0 0 20\" Time=0.0\nO 0.0 0.0 0.0\nH 0.957 0.0 0.0\nH -0.24 0.927 0.0\n3\nLattice=\"20 0 0 0 20 0 0 0 20\" Time=0.5\nO 0.1 0.0 0.0\nH 1.057 0.0 0.0\nH -0.14 0.927 0.0\n";

    #[test]
    fn comment_values_accept_quotes() {
        let comment = "Lattice=\"1 0 0 0 1 0 0 0 1\" Time=2.5 pbc=\"T T T\"";
        assert_eq!(comment_value(comment, "Lattice"), Some("1 0 0 0 1 0 0 0 1"));
        assert_eq!(comment_value(comment, "Time"), Some("2.5"));
        assert_eq!(comment_value(comment, "Energy"), None);
    }

    #[test]
    fn xyz_converts_to_a_native_trajectory_in_nm() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let input = directory.path().join("water.xyz");
        std::fs::write(&input, WATER).expect("write xyz");
        let output = directory.path().join("water.mdt");
        let summary = XyzConverter
            .convert(&input, &output, &ConverterOptions::default(), &databases)
            .expect("convert");
        assert_eq!(summary.n_frames, 2);
        assert_eq!(summary.n_atoms, 3);
        assert!(summary.periodic);

        let trajectory = Trajectory::open(&output, &databases).expect("open");
        assert_eq!(trajectory.times(), &[0.0, 0.5]);
        let cell = trajectory.unit_cell(1).expect("cell").expect("periodic");
        assert!((cell.volume() - 8.0).abs() < 1e-9);
        let coordinates = trajectory.coordinates(1).expect("coordinates");
        assert!((coordinates[1][0] - 0.1057).abs() < 1e-12);
        let symbols: Vec<&str> = trajectory
            .chemical_system()
            .atoms()
            .iter()
            .map(|atom| atom.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["O", "H", "H"]);
    }

    #[test]
    fn aliases_override_guessed_elements() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let input = directory.path().join("labels.xyz");
        std::fs::write(&input, "2\n\nOW 0 0 0\nXq 1 0 0\n").expect("write xyz");
        let output = directory.path().join("labels.mdt");
        let error = XyzConverter
            .convert(&input, &output, &ConverterOptions::default(), &databases)
            .expect_err("unknown label");
        assert_eq!(error.placeholder(), "INPUT.ATOM_MAPPING");

        let mut options = ConverterOptions::default();
        options.atom_aliases.entry(String::new()).or_default().insert("Xq".to_string(), "Ar".to_string());
        XyzConverter.convert(&input, &output, &options, &databases).expect("convert");
        let trajectory = Trajectory::open(&output, &databases).expect("open");
        assert!(!trajectory.is_periodic());
        assert_eq!(trajectory.chemical_system().atoms()[1].symbol, "Ar");
    }

    #[test]
    fn truncated_frames_are_corrupted_files() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let input = directory.path().join("broken.xyz");
        std::fs::write(&input, "4\ncomment\nO 0 0 0\n").expect("write xyz");
        let error = XyzConverter
            .convert(&input, &directory.path().join("out.mdt"), &ConverterOptions::default(), &databases)
            .expect_err("truncated");
        assert_eq!(error.kind(), crate::domain::ErrorKind::CorruptedFile);
    }
}
