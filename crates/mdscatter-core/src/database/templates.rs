//! Compact fragment templates shared by the molecule, residue and nucleotide
//! databases.
//!
//! Atoms are written as `NAME[:Symbol][(H1,H2,...)]`; names in parentheses
//! are hydrogens bonded to the preceding atom. Heavy-atom bonds are written
//! as `A-B` pairs. A missing symbol defaults to the first letter of the name.

use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAtom {
    pub name: String,
    pub symbol: String,
    pub alternatives: Vec<String>,
    pub bonds: Vec<String>,
}

/// Atom additions and removals applied to a residue or nucleotide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub code: String,
    pub removes: Vec<String>,
    pub adds: Vec<TemplateAtom>,
    pub is_n_terminus: bool,
    pub is_c_terminus: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentTemplate {
    pub code: String,
    pub name: String,
    pub alternatives: Vec<String>,
    pub atoms: Vec<TemplateAtom>,
    /// Atom linked to the previous fragment of a chain (`-R`).
    pub previous_link: Option<String>,
    /// Atom linked to the next fragment of a chain (`+R`).
    pub next_link: Option<String>,
    pub roles: BTreeMap<String, String>,
}

impl FragmentTemplate {
    pub fn atom(&self, name: &str) -> Option<&TemplateAtom> {
        self.atoms.iter().find(|atom| atom.name == name)
    }

    pub fn atom_names(&self) -> Vec<&str> {
        self.atoms.iter().map(|atom| atom.name.as_str()).collect()
    }

    /// Role of an atom within the fragment (`backbone`, `sidechain`, `base`, `sugar`, `phosphate`).
    pub fn role(&self, atom_name: &str) -> Option<&str> {
        self.roles.get(atom_name).map(String::as_str)
    }

    /// Applies a variant, returning the resulting atom templates.
    pub fn with_variant(&self, variant: Option<&Variant>) -> Vec<TemplateAtom> {
        let Some(variant) = variant else {
            return self.atoms.clone();
        };
        let mut atoms: Vec<TemplateAtom> = self
            .atoms
            .iter()
            .filter(|atom| !variant.removes.contains(&atom.name))
            .cloned()
            .map(|mut atom| {
                atom.bonds.retain(|bond| !variant.removes.contains(bond));
                atom
            })
            .collect();
        for added in &variant.adds {
            for bond in &added.bonds {
                if let Some(partner) = atoms.iter_mut().find(|atom| &atom.name == bond) {
                    if !partner.bonds.contains(&added.name) {
                        partner.bonds.push(added.name.clone());
                    }
                }
            }
            atoms.push(added.clone());
        }
        atoms
    }
}

pub(crate) struct TemplateSource<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub alternatives: &'a str,
    pub atoms: &'a str,
    pub bonds: &'a str,
    pub atom_alternatives: &'a str,
    pub previous_link: Option<&'a str>,
    pub next_link: Option<&'a str>,
}

fn template_error(code: &str, message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(
        ErrorKind::Internal,
        "SYS.TEMPLATE",
        format!("invalid template '{code}': {}", message.into()),
    )
}

fn default_symbol(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}

fn parse_atom_token(token: &str) -> (String, String) {
    match token.split_once(':') {
        Some((name, symbol)) => (name.to_string(), symbol.to_string()),
        None => (token.to_string(), default_symbol(token)),
    }
}

/// Parses the atom list notation into atoms with their hydrogen bonds filled in.
pub(crate) fn parse_atoms(code: &str, notation: &str) -> AnalysisResult<Vec<TemplateAtom>> {
    let mut atoms: Vec<TemplateAtom> = Vec::new();
    for token in notation.split_whitespace() {
        let (head, hydrogens) = match token.split_once('(') {
            Some((head, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| template_error(code, format!("unbalanced '{token}'")))?;
                (head, inner.split(',').filter(|h| !h.is_empty()).collect::<Vec<_>>())
            }
            None => (token, Vec::new()),
        };
        let (name, symbol) = parse_atom_token(head);
        let mut heavy = TemplateAtom {
            name: name.clone(),
            symbol,
            alternatives: Vec::new(),
            bonds: Vec::new(),
        };
        let mut attached = Vec::new();
        for hydrogen in hydrogens {
            let (h_name, h_symbol) = match hydrogen.split_once(':') {
                Some((n, s)) => (n.to_string(), s.to_string()),
                None => (hydrogen.to_string(), "H".to_string()),
            };
            heavy.bonds.push(h_name.clone());
            attached.push(TemplateAtom {
                name: h_name,
                symbol: h_symbol,
                alternatives: Vec::new(),
                bonds: vec![name.clone()],
            });
        }
        atoms.push(heavy);
        atoms.extend(attached);
    }
    Ok(atoms)
}

fn apply_bonds(code: &str, atoms: &mut [TemplateAtom], notation: &str) -> AnalysisResult<()> {
    for bond in notation.split_whitespace() {
        let (first, second) = bond
            .split_once('-')
            .ok_or_else(|| template_error(code, format!("bond '{bond}' is not 'A-B'")))?;
        for (from, to) in [(first, second), (second, first)] {
            let atom = atoms
                .iter_mut()
                .find(|atom| atom.name == from)
                .ok_or_else(|| template_error(code, format!("bond names unknown atom '{from}'")))?;
            if !atom.bonds.iter().any(|b| b == to) {
                atom.bonds.push(to.to_string());
            }
        }
    }
    Ok(())
}

fn apply_atom_alternatives(
    code: &str,
    atoms: &mut [TemplateAtom],
    notation: &str,
) -> AnalysisResult<()> {
    for pair in notation.split_whitespace() {
        let (name, alternative) = pair
            .split_once('=')
            .ok_or_else(|| template_error(code, format!("alternative '{pair}' is not 'A=B'")))?;
        if let Some(atom) = atoms.iter_mut().find(|atom| atom.name == name) {
            atom.alternatives.push(alternative.to_string());
        }
    }
    Ok(())
}

pub(crate) fn build_template(source: &TemplateSource<'_>) -> AnalysisResult<FragmentTemplate> {
    let mut atoms = parse_atoms(source.code, source.atoms)?;
    apply_bonds(source.code, &mut atoms, source.bonds)?;
    apply_atom_alternatives(source.code, &mut atoms, source.atom_alternatives)?;
    for link in [source.previous_link, source.next_link].into_iter().flatten() {
        if !atoms.iter().any(|atom| atom.name == link) {
            return Err(template_error(source.code, format!("link atom '{link}' missing")));
        }
    }
    Ok(FragmentTemplate {
        code: source.code.to_string(),
        name: source.name.to_string(),
        alternatives: source
            .alternatives
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        atoms,
        previous_link: source.previous_link.map(str::to_string),
        next_link: source.next_link.map(str::to_string),
        roles: BTreeMap::new(),
    })
}

/// Builds a variant from `removes` names and an `adds` atom notation whose
/// atoms are bonded to the heavy atoms listed in `attach` (`NEW>ANCHOR`).
pub(crate) fn build_variant(
    code: &str,
    removes: &str,
    adds: &str,
    attach: &str,
    is_n_terminus: bool,
    is_c_terminus: bool,
) -> AnalysisResult<Variant> {
    let mut added = parse_atoms(code, adds)?;
    for pair in attach.split_whitespace() {
        let (name, anchor) = pair
            .split_once('>')
            .ok_or_else(|| template_error(code, format!("attachment '{pair}' is not 'A>B'")))?;
        let atom = added
            .iter_mut()
            .find(|atom| atom.name == name)
            .ok_or_else(|| template_error(code, format!("attachment names unknown '{name}'")))?;
        atom.bonds.push(anchor.to_string());
    }
    Ok(Variant {
        code: code.to_string(),
        removes: removes.split_whitespace().map(str::to_string).collect(),
        adds: added,
        is_n_terminus,
        is_c_terminus,
    })
}

/// Resolves user-supplied names onto the canonical atom names of `atoms`,
/// matching either the name or any alternative.
pub fn translate_names(
    code: &str,
    atoms: &[TemplateAtom],
    user_names: &[String],
) -> AnalysisResult<Vec<String>> {
    if user_names.len() != atoms.len() {
        return Err(AnalysisError::new(
            ErrorKind::InconsistentAtomNames,
            "INPUT.ATOM_NAMES",
            format!(
                "'{code}' expects {} atoms, {} names were given",
                atoms.len(),
                user_names.len()
            ),
        ));
    }

    let mut used = vec![false; atoms.len()];
    let mut translated = Vec::with_capacity(user_names.len());
    for user_name in user_names {
        let position = atoms
            .iter()
            .enumerate()
            .position(|(index, atom)| {
                !used[index]
                    && (atom.name == *user_name || atom.alternatives.iter().any(|a| a == user_name))
            })
            .ok_or_else(|| {
                AnalysisError::new(
                    ErrorKind::InconsistentAtomNames,
                    "INPUT.ATOM_NAMES",
                    format!("atom name '{user_name}' does not match any atom of '{code}'"),
                )
            })?;
        used[position] = true;
        translated.push(atoms[position].name.clone());
    }
    Ok(translated)
}
