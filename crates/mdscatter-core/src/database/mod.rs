//! Element, molecule, residue and nucleotide tables plus the user
//! definitions store, gathered in an explicit [`Databases`] context.

pub mod atoms;
pub mod fragments;
pub mod molecules;
pub mod nucleotides;
pub mod residues;
pub mod templates;
pub mod user_definitions;

pub use atoms::{AtomDatabase, AtomEntry, PROPERTY_NAMES};
pub use fragments::{FragmentDatabase, FragmentKind};
pub use templates::{FragmentTemplate, TemplateAtom, Variant, translate_names};
pub use user_definitions::{DefinitionKey, USER_DEFINITIONS_FILE, UserDefinitions};

use crate::domain::AnalysisResult;
use std::env;
use std::path::PathBuf;

pub const ATOM_DATABASE_ENV: &str = "MDSCATTER_ATOM_DATABASE";
pub const HOME_ENV: &str = "MDSCATTER_HOME";

/// Read-only context handed to chemistry builders and jobs.
#[derive(Debug, Clone)]
pub struct Databases {
    pub atoms: AtomDatabase,
    pub molecules: FragmentDatabase,
    pub residues: FragmentDatabase,
    pub nucleotides: FragmentDatabase,
    pub user_definitions: UserDefinitions,
}

impl Databases {
    pub fn builtin() -> AnalysisResult<Self> {
        Ok(Self {
            atoms: AtomDatabase::builtin(),
            molecules: molecules::molecule_database()?,
            residues: residues::residue_database()?,
            nucleotides: nucleotides::nucleotide_database()?,
            user_definitions: UserDefinitions::in_memory(),
        })
    }

    /// Built-in tables with the atom overrides and user definitions located
    /// through `MDSCATTER_ATOM_DATABASE` and `MDSCATTER_HOME`.
    pub fn from_environment() -> AnalysisResult<Self> {
        let mut databases = Self::builtin()?;
        if let Some(path) = env::var_os(ATOM_DATABASE_ENV) {
            databases.atoms = AtomDatabase::load_with_overrides(Some(&PathBuf::from(path)))?;
        }
        databases.user_definitions = UserDefinitions::load(&home_directory().join(USER_DEFINITIONS_FILE));
        Ok(databases)
    }

    pub fn fragments(&self, kind: FragmentKind) -> &FragmentDatabase {
        match kind {
            FragmentKind::Molecule => &self.molecules,
            FragmentKind::Residue => &self.residues,
            FragmentKind::Nucleotide => &self.nucleotides,
        }
    }
}

pub fn home_directory() -> PathBuf {
    if let Some(home) = env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(".mdscatter")
}

#[cfg(test)]
mod tests {
    use super::{Databases, FragmentKind};

    #[test]
    fn builtin_context_exposes_every_table() {
        let databases = Databases::builtin().expect("databases");
        assert!(databases.atoms.contains("O"));
        assert!(databases.fragments(FragmentKind::Molecule).contains("WAT"));
        assert!(databases.fragments(FragmentKind::Residue).contains("GLY"));
        assert!(databases.fragments(FragmentKind::Nucleotide).contains("DA"));
        assert!(databases.user_definitions.is_empty());
    }
}
