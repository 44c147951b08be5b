use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InputValidation,
    IoSystem,
    Computation,
    Internal,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation => 2,
            Self::IoSystem => 3,
            Self::Computation => 4,
            Self::Internal => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "InputValidationError",
            Self::IoSystem => "IoSystemError",
            Self::Computation => "ComputationError",
            Self::Internal => "InternalError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownAtom,
    UnknownMolecule,
    UnknownResidue,
    InvalidVariant,
    InconsistentAtomNames,
    InvalidChemicalEntity,
    InconsistentChemicalSystem,
    CorruptedFile,
    InvalidPeptideChain,
    InvalidNucleotideChain,
    Job,
    Trajectory,
    Units,
    Io,
    Internal,
}

impl ErrorKind {
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::UnknownAtom
            | Self::UnknownMolecule
            | Self::UnknownResidue
            | Self::InvalidVariant
            | Self::InconsistentAtomNames
            | Self::InvalidChemicalEntity
            | Self::InconsistentChemicalSystem
            | Self::InvalidPeptideChain
            | Self::InvalidNucleotideChain
            | Self::Units
            | Self::Job => ErrorCategory::InputValidation,
            Self::CorruptedFile | Self::Io => ErrorCategory::IoSystem,
            Self::Trajectory => ErrorCategory::Computation,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownAtom => "UnknownAtomError",
            Self::UnknownMolecule => "UnknownMoleculeError",
            Self::UnknownResidue => "UnknownResidueError",
            Self::InvalidVariant => "InvalidVariantError",
            Self::InconsistentAtomNames => "InconsistentAtomNamesError",
            Self::InvalidChemicalEntity => "InvalidChemicalEntityError",
            Self::InconsistentChemicalSystem => "InconsistentChemicalSystemError",
            Self::CorruptedFile => "CorruptedFileError",
            Self::InvalidPeptideChain => "InvalidPeptideChainError",
            Self::InvalidNucleotideChain => "InvalidNucleotideChainError",
            Self::Job => "JobError",
            Self::Trajectory => "TrajectoryError",
            Self::Units => "UnitError",
            Self::Io => "IoError",
            Self::Internal => "InternalError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    kind: ErrorKind,
    placeholder: &'static str,
    message: String,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, placeholder: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            placeholder,
            message: message.into(),
        }
    }

    pub fn unknown_atom(symbol: &str) -> Self {
        Self::new(
            ErrorKind::UnknownAtom,
            "INPUT.UNKNOWN_ATOM",
            format!("the atom '{symbol}' is not registered in the atom database"),
        )
    }

    pub fn job(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Job, placeholder, message)
    }

    pub fn trajectory(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Trajectory, placeholder, message)
    }

    pub fn corrupted(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptedFile, placeholder, message)
    }

    pub fn io(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, placeholder, message)
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.kind.category().exit_code()
    }

    /// Prefixes the message with the component that surfaced the error.
    pub fn with_context(mut self, context: impl Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.kind.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::{AnalysisError, ErrorCategory, ErrorKind};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (ErrorKind::UnknownAtom, ErrorCategory::InputValidation, 2),
            (ErrorKind::Job, ErrorCategory::InputValidation, 2),
            (ErrorKind::CorruptedFile, ErrorCategory::IoSystem, 3),
            (ErrorKind::Io, ErrorCategory::IoSystem, 3),
            (ErrorKind::Trajectory, ErrorCategory::Computation, 4),
            (ErrorKind::Internal, ErrorCategory::Internal, 5),
        ];

        for (kind, category, exit_code) in cases {
            assert_eq!(kind.category(), category);
            assert_eq!(category.exit_code(), exit_code);
        }
    }

    #[test]
    fn diagnostic_line_carries_placeholder_and_context() {
        let error = AnalysisError::job("INPUT.FRAMES_RANGE", "last frame 12 exceeds 10")
            .with_context("frames");

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.FRAMES_RANGE] frames: last frame 12 exceeds 10"
        );
        assert_eq!(
            error.to_string(),
            "JobError [INPUT.FRAMES_RANGE] frames: last frame 12 exceeds 10"
        );
    }
}
