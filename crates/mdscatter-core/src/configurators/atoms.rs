use super::{ConfigureContext, Configured};
use crate::chemistry::{AtomId, ChemicalSystem, EntityId, EntityKind, Selection};
use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const SELECTION_SECTION: &str = "atom_selection";

/// Atoms picked by a selection expression, one single-atom entry per atom.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSelectionValue {
    pub expression: String,
    pub indexes: Vec<Vec<usize>>,
    /// Element symbol of each entry, after transmutation.
    pub names: Vec<String>,
    pub unique_names: Vec<String>,
    pub selection_length: usize,
}

impl AtomSelectionValue {
    pub fn new(expression: String, indices: &BTreeSet<usize>, system: &ChemicalSystem) -> Self {
        let atoms = system.atoms();
        let names: Vec<String> = indices.iter().map(|&i| atoms[i].symbol.clone()).collect();
        let mut value = Self {
            expression,
            indexes: indices.iter().map(|&i| vec![i]).collect(),
            names,
            unique_names: Vec::new(),
            selection_length: indices.len(),
        };
        value.refresh_unique_names();
        value
    }

    fn refresh_unique_names(&mut self) {
        let unique: BTreeSet<&String> = self.names.iter().collect();
        self.unique_names = unique.into_iter().cloned().collect();
    }

    /// Selected atom indices in ascending order.
    pub fn flat_indices(&self) -> Vec<usize> {
        self.indexes.iter().flatten().copied().collect()
    }

    pub fn atom_ids(&self) -> Vec<AtomId> {
        self.indexes.iter().flatten().map(|&i| AtomId(i)).collect()
    }

    /// Symbol of every selected atom, keyed by atom index.
    pub fn name_map(&self) -> BTreeMap<usize, &str> {
        self.indexes
            .iter()
            .zip(&self.names)
            .flat_map(|(indices, name)| indices.iter().map(move |&i| (i, name.as_str())))
            .collect()
    }

    /// Number of selected atoms per unique name.
    pub fn get_natoms(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (indices, name) in self.indexes.iter().zip(&self.names) {
            *counts.entry(name.clone()).or_insert(0) += indices.len();
        }
        counts
    }

    /// Selected indices grouped by unique name.
    pub fn indices_by_name(&self) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (indices, name) in self.indexes.iter().zip(&self.names) {
            groups.entry(name.clone()).or_default().extend(indices);
        }
        groups
    }

    pub fn transmuted(&self, map: &BTreeMap<usize, String>) -> Self {
        let mut value = self.clone();
        for (indices, name) in value.indexes.iter().zip(value.names.iter_mut()) {
            if let Some(symbol) = indices.first().and_then(|index| map.get(index)) {
                *name = symbol.clone();
            }
        }
        value.refresh_unique_names();
        value
    }

    pub fn information(&self) -> String {
        format!(
            "'{}' selects {} atoms ({})",
            self.expression,
            self.selection_length,
            self.unique_names.join(", ")
        )
    }
}

/// The expression itself, or the one stored under that name in the user
/// definitions (for this trajectory first, then any).
fn selection_expression(raw: &str, context: &ConfigureContext<'_>) -> AnalysisResult<String> {
    let definitions = &context.databases.user_definitions;
    let target = context.trajectory()?.basename();
    let stored = definitions
        .get(&target, SELECTION_SECTION, raw)
        .or_else(|| definitions.find(SELECTION_SECTION, raw));
    match stored {
        Some(Value::String(expression)) => Ok(expression.clone()),
        Some(other) => Err(context.error(format!(
            "user definition '{raw}' is not a selection expression: {other}"
        ))),
        None => Ok(raw.to_string()),
    }
}

fn evaluate(expression: &str, context: &ConfigureContext<'_>) -> AnalysisResult<BTreeSet<usize>> {
    let system = context.trajectory()?.chemical_system();
    Selection::parse(expression)
        .and_then(|selection| selection.select(system, &context.databases.atoms))
        .map_err(|error| context.error(format!("'{expression}': {error}")))
}

pub(super) fn configure_selection(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let raw = match raw {
        Value::Null => "all",
        Value::String(text) => text.as_str(),
        _ => return Err(context.error("expects a selection expression")),
    };
    let expression = selection_expression(raw, context)?;
    let indices = evaluate(&expression, context)?;
    if indices.is_empty() {
        return Err(context.error(format!("'{expression}' selects no atoms")));
    }
    let system = context.trajectory()?.chemical_system();
    Ok(Configured::AtomSelection(AtomSelectionValue::new(expression, &indices, system)))
}

fn selection_dependency<'c>(context: &'c ConfigureContext<'_>) -> AnalysisResult<&'c AtomSelectionValue> {
    match context.dependency("atom_selection")? {
        Configured::AtomSelection(value) => Ok(value),
        _ => Err(context.error("'atom_selection' dependency is not an atom selection")),
    }
}

pub(super) fn configure_transmutation(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let rules: Vec<(String, String)> = match raw {
        Value::Null => Vec::new(),
        Value::Object(map) => map
            .iter()
            .map(|(selection, symbol)| match symbol {
                Value::String(symbol) => Ok((selection.clone(), symbol.clone())),
                _ => Err(context.error(format!("replacement for '{selection}' must be a symbol"))),
            })
            .collect::<AnalysisResult<_>>()?,
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([Value::String(selection), Value::String(symbol)]) => {
                    Ok((selection.clone(), symbol.clone()))
                }
                _ => Err(context.error("each rule must be [selection, symbol]")),
            })
            .collect::<AnalysisResult<_>>()?,
        _ => return Err(context.error("expects a list of [selection, symbol] rules")),
    };
    let selected: BTreeSet<usize> = selection_dependency(context)?.flat_indices().into_iter().collect();
    let mut map = BTreeMap::new();
    for (expression, symbol) in rules {
        if !context.databases.atoms.contains(&symbol) {
            return Err(context.error(format!("unknown element '{symbol}'")));
        }
        let expression = selection_expression(&expression, context)?;
        for index in evaluate(&expression, context)?.intersection(&selected) {
            map.insert(*index, symbol.clone());
        }
    }
    Ok(Configured::Transmutation(map))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingLevel {
    Atom,
    Group,
    Residue,
    Chain,
    Molecule,
}

impl GroupingLevel {
    pub const ALL: [Self; 5] = [Self::Atom, Self::Group, Self::Residue, Self::Chain, Self::Molecule];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::Group => "group",
            Self::Residue => "residue",
            Self::Chain => "chain",
            Self::Molecule => "molecule",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }
}

/// Selected atoms gathered into groups of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingValue {
    pub level: GroupingLevel,
    pub groups: Vec<Vec<usize>>,
    pub names: Vec<String>,
}

impl GroupingValue {
    pub fn atom_ids(&self, group: usize) -> Vec<AtomId> {
        self.groups
            .get(group)
            .map(|atoms| atoms.iter().map(|&i| AtomId(i)).collect())
            .unwrap_or_default()
    }
}

/// Closest ancestor of `atom` whose kind is one of `kinds`, or the top-level
/// entity when there is none.
fn enclosing_entity(system: &ChemicalSystem, atom: usize, kinds: &[EntityKind]) -> AnalysisResult<EntityId> {
    let mut current = Some(system.atom(AtomId(atom))?.parent);
    while let Some(id) = current {
        let entity = system.entity(id)?;
        if kinds.contains(&entity.kind) {
            return Ok(id);
        }
        current = entity.parent;
    }
    system.top_level_chemical_entity(AtomId(atom))
}

pub(super) fn configure_grouping(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let level = raw
        .as_str()
        .and_then(GroupingLevel::parse)
        .ok_or_else(|| context.error("expects one of atom, group, residue, chain, molecule"))?;
    let selection = selection_dependency(context)?;
    let system = context.trajectory()?.chemical_system();
    if level == GroupingLevel::Atom {
        return Ok(Configured::Grouping(GroupingValue {
            level,
            groups: selection.indexes.clone(),
            names: selection.names.clone(),
        }));
    }
    let mut keys: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, (Vec<usize>, String)> = BTreeMap::new();
    for index in selection.flat_indices() {
        let (key, name) = match level {
            GroupingLevel::Group => match system.atoms()[index].groups.first() {
                Some(group) => (format!("group:{group}"), group.clone()),
                None => (format!("atom:{index}"), system.atoms()[index].name.clone()),
            },
            GroupingLevel::Residue | GroupingLevel::Chain | GroupingLevel::Molecule | GroupingLevel::Atom => {
                let id = match level {
                    GroupingLevel::Residue => {
                        enclosing_entity(system, index, &[EntityKind::Residue, EntityKind::Nucleotide])?
                    }
                    GroupingLevel::Chain => {
                        enclosing_entity(system, index, &[EntityKind::PeptideChain, EntityKind::NucleotideChain])?
                    }
                    _ => system.top_level_chemical_entity(AtomId(index))?,
                };
                (format!("entity:{}", id.0), system.entity(id)?.name.clone())
            }
        };
        if !groups.contains_key(&key) {
            keys.push(key.clone());
        }
        groups.entry(key).or_insert_with(|| (Vec::new(), name)).0.push(index);
    }
    let (groups, names): (Vec<Vec<usize>>, Vec<String>) = keys
        .iter()
        .filter_map(|key| groups.remove(key))
        .unzip();
    Ok(Configured::Grouping(GroupingValue { level, groups, names }))
}

/// Scattering or mass weights for the selected elements.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsValue {
    pub property: String,
    /// Property value per unique name.
    pub values: BTreeMap<String, f64>,
}

impl WeightsValue {
    pub fn from_property(
        property: &str,
        names: &[String],
        database: &AtomDatabase,
    ) -> AnalysisResult<Self> {
        let mut values = BTreeMap::new();
        for name in names {
            values.insert(name.clone(), database.get_property(name, property)?);
        }
        Ok(Self {
            property: property.to_string(),
            values,
        })
    }

    /// Fails when every selected species has a zero property, since every
    /// weighted total would then vanish.
    pub fn check_not_vanishing(&self) -> AnalysisResult<()> {
        if self.values.is_empty() || self.values.values().any(|value| *value != 0.0) {
            return Ok(());
        }
        let species = self.values.keys().cloned().collect::<Vec<_>>().join(", ");
        Err(AnalysisError::job(
            "JOB.WEIGHTS",
            format!(
                "weights '{}' are zero for every selected species ({species}); choose another scheme",
                self.property
            ),
        ))
    }

    pub fn get_weights(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// `c_i p_i / Σ c_j p_j` with `c` the concentrations from `natoms`.
    pub fn atom_weights(&self, natoms: &BTreeMap<String, usize>) -> BTreeMap<String, f64> {
        let total: usize = natoms.values().sum();
        let raw: BTreeMap<String, f64> = natoms
            .iter()
            .map(|(name, &count)| {
                let property = self.values.get(name).copied().unwrap_or(0.0);
                (name.clone(), count as f64 / total.max(1) as f64 * property)
            })
            .collect();
        normalized(raw)
    }

    /// Pair weights `c_i c_j p_i p_j`, doubled for unlike pairs, normalized
    /// to one; keys are ordered name pairs.
    pub fn pair_weights(&self, natoms: &BTreeMap<String, usize>) -> BTreeMap<(String, String), f64> {
        let total = natoms.values().sum::<usize>().max(1) as f64;
        let names: Vec<&String> = natoms.keys().collect();
        let mut raw = BTreeMap::new();
        for (i, first) in names.iter().enumerate() {
            for second in &names[i..] {
                let concentration = natoms[*first] as f64 / total * natoms[*second] as f64 / total;
                let property = self.values.get(*first).copied().unwrap_or(0.0)
                    * self.values.get(*second).copied().unwrap_or(0.0);
                let multiplicity = if first == second { 1.0 } else { 2.0 };
                raw.insert(((*first).clone(), (*second).clone()), multiplicity * concentration * property);
            }
        }
        normalized(raw)
    }

    /// Property of one element, for per-group weighting.
    pub fn property_of(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }
}

fn normalized<K: Ord>(raw: BTreeMap<K, f64>) -> BTreeMap<K, f64> {
    let sum: f64 = raw.values().sum();
    if sum == 0.0 {
        return raw;
    }
    raw.into_iter().map(|(key, value)| (key, value / sum)).collect()
}

pub(super) fn configure_weights(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let property = match raw {
        Value::Null => "equal",
        Value::String(property) => property.as_str(),
        _ => return Err(context.error("expects a property name")),
    };
    let selection = selection_dependency(context)?;
    let value = WeightsValue::from_property(property, &selection.unique_names, &context.databases.atoms)
        .map_err(|error| context.error(error.message()))?;
    value
        .check_not_vanishing()
        .map_err(|error| error.with_context(format!("setting '{}'", context.spec.name)))?;
    Ok(Configured::Weights(value))
}

pub(super) fn configure_partial_charges(raw: &Value, context: &ConfigureContext<'_>) -> AnalysisResult<Configured> {
    let n_atoms = context.trajectory()?.chemical_system().total_number_of_atoms();
    let mut charges = BTreeMap::new();
    let mut insert = |index: Option<usize>, charge: Option<f64>| -> AnalysisResult<()> {
        match (index, charge) {
            (Some(index), Some(charge)) if index < n_atoms => {
                charges.insert(index, charge);
                Ok(())
            }
            (Some(index), Some(_)) => Err(context.error(format!(
                "atom index {index} is out of range for {n_atoms} atoms"
            ))),
            _ => Err(context.error("charges map atom indices to numbers")),
        }
    };
    match raw {
        Value::Null => {}
        Value::Object(map) => {
            for (index, charge) in map {
                insert(index.trim().parse().ok(), charge.as_f64())?;
            }
        }
        Value::Array(items) => {
            for item in items {
                match item.as_array().map(Vec::as_slice) {
                    Some([index, charge]) => {
                        insert(index.as_u64().map(|i| i as usize), charge.as_f64())?;
                    }
                    _ => return Err(context.error("each entry must be [index, charge]")),
                }
            }
        }
        _ => return Err(context.error("expects a mapping of atom index to charge")),
    }
    Ok(Configured::PartialCharges(charges))
}

#[cfg(test)]
mod tests {
    use super::GroupingLevel;
    use crate::chemistry::{ChemicalEntity, ChemicalSystem, FragmentSpec};
    use crate::configuration::{Configuration, UnitCell};
    use crate::configurators::{SettingKind, SettingSpec, resolve};
    use crate::database::{Databases, DefinitionKey};
    use crate::trajectory::{TrajectoryWriter, WriterOptions};
    use serde_json::{Value, json};
    use std::path::{Path, PathBuf};

    fn mixture(directory: &Path, databases: &Databases) -> PathBuf {
        let mut system = ChemicalSystem::new("mixture");
        for code in ["WAT", "WAT", "MOH"] {
            system
                .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new(code)), databases)
                .expect("molecule");
        }
        let n = system.total_number_of_atoms();
        let path = directory.join("mixture.mdt");
        let mut writer = TrajectoryWriter::create(&path, &system, 2, None, WriterOptions::default()).expect("writer");
        for frame in 0..2 {
            let coordinates = (0..n).map(|i| [i as f64 * 0.1, frame as f64 * 0.01, 0.0]).collect();
            let configuration = Configuration::from_coordinates(coordinates, Some(UnitCell::cubic(3.0).expect("cell")));
            writer.dump_configuration(&configuration, frame as f64).expect("dump");
        }
        writer.close().expect("close")
    }

    fn specs() -> Vec<SettingSpec> {
        vec![
            SettingSpec::new("trajectory", SettingKind::HdfTrajectory, json!("")),
            SettingSpec::new("atom_selection", SettingKind::AtomSelection, json!("all")),
            SettingSpec::new("atom_transmutation", SettingKind::AtomTransmutation, json!(null)),
            SettingSpec::new("grouping_level", SettingKind::GroupingLevel, json!("atom")),
            SettingSpec::new("weights", SettingKind::Weights, json!("equal")),
            SettingSpec::new("charges", SettingKind::PartialCharges, json!(null)),
        ]
    }

    fn parameters(path: &Path, extra: Value) -> serde_json::Map<String, Value> {
        let mut parameters = extra.as_object().cloned().expect("object");
        parameters.insert("trajectory".to_string(), json!(path.display().to_string()));
        parameters
    }

    #[test]
    fn selection_counts_names_and_transmutes() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mixture(directory.path(), &databases);
        let extra = json!({
            "atom_selection": "molecule WAT",
            "atom_transmutation": [["atom_index 1", "D"]]
        });
        let resolved = resolve(&specs(), &parameters(&path, extra), &databases).expect("resolve");
        let selection = resolved.atom_selection("atom_selection").expect("selection");
        assert_eq!(selection.selection_length, 6);
        assert_eq!(selection.indexes[0], vec![0]);
        let natoms = selection.get_natoms();
        assert_eq!(natoms["O"], 2);
        assert_eq!(natoms["H"], 3);
        assert_eq!(natoms["D"], 1);
        assert_eq!(selection.unique_names, vec!["D", "H", "O"]);
        let weights = resolved.weights("weights").expect("weights");
        assert_eq!(weights.get_weights().len(), 3);
        let atom_weights = weights.atom_weights(&natoms);
        assert!((atom_weights["H"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn grouping_by_molecule_follows_top_level_entities() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mixture(directory.path(), &databases);
        let extra = json!({"grouping_level": "molecule", "weights": "atomic_weight"});
        let resolved = resolve(&specs(), &parameters(&path, extra), &databases).expect("resolve");
        let grouping = resolved.grouping("grouping_level").expect("grouping");
        assert_eq!(grouping.level, GroupingLevel::Molecule);
        assert_eq!(grouping.groups.len(), 3);
        assert_eq!(grouping.groups[0], vec![0, 1, 2]);
        assert_eq!(grouping.groups[1], vec![3, 4, 5]);
        assert_eq!(grouping.names[0], grouping.names[1]);
        let weights = resolved.weights("weights").expect("weights");
        assert!(weights.property_of("O") > weights.property_of("H"));
        let pairs = weights.pair_weights(&resolved.atom_selection("atom_selection").expect("selection").get_natoms());
        assert!((pairs.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn user_definitions_and_charges_are_resolved() {
        let mut databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mixture(directory.path(), &databases);
        databases.user_definitions.set(
            DefinitionKey::new("mixture.mdt", "atom_selection", "oxygens"),
            json!("element O"),
        );
        let extra = json!({"atom_selection": "oxygens", "charges": {"0": -0.8, "1": 0.4}});
        let resolved = resolve(&specs(), &parameters(&path, extra), &databases).expect("resolve");
        let selection = resolved.atom_selection("atom_selection").expect("selection");
        assert_eq!(selection.expression, "element O");
        assert_eq!(selection.selection_length, 3);
        assert_eq!(resolved.partial_charges("charges").expect("charges")[&0], -0.8);

        let extra = json!({"charges": [[99, 1.0]]});
        let error = resolve(&specs(), &parameters(&path, extra), &databases).expect_err("range");
        assert_eq!(error.placeholder(), "JOB.SETTING");
        let extra = json!({"atom_selection": "element Xx"});
        assert!(resolve(&specs(), &parameters(&path, extra), &databases).is_err());
        let extra = json!({"weights": "no_such_property"});
        assert!(resolve(&specs(), &parameters(&path, extra), &databases).is_err());
    }

    #[test]
    fn weights_vanishing_for_every_species_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        let directory = tempfile::tempdir().expect("tempdir");
        let path = mixture(directory.path(), &databases);
        let extra = json!({"atom_selection": "element O", "weights": "b_incoherent"});
        let error = resolve(&specs(), &parameters(&path, extra), &databases).expect_err("zero weights");
        assert_eq!(error.placeholder(), "JOB.WEIGHTS");
        assert!(error.message().contains("b_incoherent"), "{error}");
        assert!(error.message().contains('O'), "{error}");

        let extra = json!({"weights": "b_incoherent"});
        let resolved = resolve(&specs(), &parameters(&path, extra), &databases).expect("hydrogen scatters");
        let natoms = resolved.atom_selection("atom_selection").expect("selection").get_natoms();
        let atom_weights = resolved.weights("weights").expect("weights").atom_weights(&natoms);
        assert!((atom_weights.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
