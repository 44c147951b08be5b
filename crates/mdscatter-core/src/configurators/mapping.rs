//! Label-to-element mappings used when importing foreign trajectories.
//!
//! A mapping is keyed by group label (residue or molecule name, empty when
//! the format has none) and then by atom label.

use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type AtomMapping = BTreeMap<String, BTreeMap<String, String>>;

/// One raw atom label as found in an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomLabel {
    pub group: String,
    pub label: String,
    #[serde(default)]
    pub mass: Option<f64>,
}

impl AtomLabel {
    pub fn new(group: &str, label: &str, mass: Option<f64>) -> Self {
        Self {
            group: group.to_string(),
            label: label.to_string(),
            mass,
        }
    }
}

fn mapped<'m>(mapping: &'m AtomMapping, label: &AtomLabel) -> Option<&'m String> {
    mapping.get(&label.group).and_then(|labels| labels.get(&label.label))
}

/// Element guessed for each label by symbol prefix and mass; labels that
/// cannot be guessed are left out.
pub fn guess_element_mapping(labels: &[AtomLabel], database: &AtomDatabase) -> AtomMapping {
    let mut mapping = AtomMapping::new();
    for label in labels {
        if let Some(symbol) = database.guess_element(&label.label, label.mass) {
            mapping
                .entry(label.group.clone())
                .or_default()
                .insert(label.label.clone(), symbol);
        }
    }
    mapping
}

/// Completes `mapping` with guesses for the labels it does not cover yet;
/// entries already present win.
pub fn fill_remaining_labels(mapping: &mut AtomMapping, labels: &[AtomLabel], database: &AtomDatabase) {
    for label in labels {
        if mapped(mapping, label).is_some() {
            continue;
        }
        let guessed = database
            .guess_element(&label.label, label.mass)
            .unwrap_or_default();
        mapping
            .entry(label.group.clone())
            .or_default()
            .insert(label.label.clone(), guessed);
    }
}

/// Every label must map to a symbol the database knows.
pub fn check_mapping_valid(mapping: &AtomMapping, labels: &[AtomLabel], database: &AtomDatabase) -> AnalysisResult<()> {
    let unresolved: Vec<String> = labels
        .iter()
        .filter(|label| mapped(mapping, label).is_none_or(|symbol| !database.contains(symbol)))
        .map(|label| {
            if label.group.is_empty() {
                label.label.clone()
            } else {
                format!("{}:{}", label.group, label.label)
            }
        })
        .collect();
    if unresolved.is_empty() {
        return Ok(());
    }
    Err(AnalysisError::new(
        ErrorKind::UnknownAtom,
        "INPUT.ATOM_MAPPING",
        format!("no known element for labels {}", unresolved.join(", ")),
    ))
}

/// Symbol for `label`, which must have passed [`check_mapping_valid`].
pub fn mapped_symbol(mapping: &AtomMapping, label: &AtomLabel) -> AnalysisResult<String> {
    mapped(mapping, label)
        .cloned()
        .ok_or_else(|| AnalysisError::unknown_atom(&label.label))
}
