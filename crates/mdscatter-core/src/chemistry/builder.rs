//! Owned entity descriptions and their insertion into a [`ChemicalSystem`].
//!
//! A [`ChemicalEntity`] is consumed by `add_chemical_entity`, so one
//! description can never end up attached to two systems.

use super::system::{Atom, AtomId, BondEnd, ChemicalSystem, Entity, EntityId, EntityKind};
use crate::database::{Databases, FragmentKind, TemplateAtom, translate_names};
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct AtomSpec {
    pub symbol: String,
    pub name: String,
    /// Names of bonded atoms inside the same cluster.
    pub bonds: Vec<String>,
    pub groups: Vec<String>,
    pub ghost: bool,
}

impl AtomSpec {
    pub fn new(symbol: &str, name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            bonds: Vec::new(),
            groups: Vec::new(),
            ghost: false,
        }
    }

    pub fn bonded_to(mut self, names: &[&str]) -> Self {
        self.bonds.extend(names.iter().map(|name| name.to_string()));
        self
    }
}

/// A molecule, residue or nucleotide taken from its database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FragmentSpec {
    pub code: String,
    pub name: Option<String>,
    pub variant: Option<String>,
    /// User atom names, matched against canonical names and alternatives;
    /// atoms are created in this order when given.
    pub atom_names: Option<Vec<String>>,
}

impl FragmentSpec {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: &str) -> Self {
        self.variant = Some(variant.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_atom_names(mut self, names: Vec<String>) -> Self {
        self.atom_names = Some(names);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub name: String,
    pub fragments: Vec<FragmentSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChemicalEntity {
    Atom(AtomSpec),
    AtomCluster { name: String, atoms: Vec<AtomSpec> },
    Molecule(FragmentSpec),
    Residue(FragmentSpec),
    Nucleotide(FragmentSpec),
    PeptideChain(ChainSpec),
    NucleotideChain(ChainSpec),
    Protein { name: String, chains: Vec<ChainSpec> },
}

impl ChemicalEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Atom(_) => EntityKind::Atom,
            Self::AtomCluster { .. } => EntityKind::AtomCluster,
            Self::Molecule(_) => EntityKind::Molecule,
            Self::Residue(_) => EntityKind::Residue,
            Self::Nucleotide(_) => EntityKind::Nucleotide,
            Self::PeptideChain(_) => EntityKind::PeptideChain,
            Self::NucleotideChain(_) => EntityKind::NucleotideChain,
            Self::Protein { .. } => EntityKind::Protein,
        }
    }
}

fn invalid_entity(message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(
        ErrorKind::InvalidChemicalEntity,
        "INPUT.CHEMICAL_ENTITY",
        message,
    )
}

fn chain_error(kind: EntityKind, message: impl Into<String>) -> AnalysisError {
    let error_kind = if kind == EntityKind::PeptideChain {
        ErrorKind::InvalidPeptideChain
    } else {
        ErrorKind::InvalidNucleotideChain
    };
    AnalysisError::new(error_kind, "INPUT.CHAIN", message)
}

impl ChemicalSystem {
    /// Adds a top-level entity, assigning atom indices in creation order.
    pub fn add_chemical_entity(
        &mut self,
        entity: ChemicalEntity,
        databases: &Databases,
    ) -> AnalysisResult<EntityId> {
        let atoms_before = self.atoms.len();
        let entities_before = self.entities.len();
        let result = self.insert_entity(entity, None, databases);
        match result {
            Ok(id) => {
                self.top_level.push(id);
                Ok(id)
            }
            Err(error) => {
                self.atoms.truncate(atoms_before);
                self.entities.truncate(entities_before);
                Err(error)
            }
        }
    }

    /// Adds a cluster viewing atoms that already belong to other entities.
    pub fn add_parentless_cluster(
        &mut self,
        name: &str,
        atoms: &[AtomId],
    ) -> AnalysisResult<EntityId> {
        for &atom in atoms {
            self.atom(atom)?;
        }
        let id = self.push_entity(EntityKind::AtomCluster, name, None, None, None);
        let entity = &mut self.entities[id.0];
        entity.atoms = atoms.to_vec();
        entity.parentless = true;
        self.top_level.push(id);
        Ok(id)
    }

    fn push_entity(
        &mut self,
        kind: EntityKind,
        name: &str,
        code: Option<String>,
        variant: Option<String>,
        parent: Option<EntityId>,
    ) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(Entity {
            id,
            kind,
            name: name.to_string(),
            code,
            variant,
            atoms: Vec::new(),
            children: Vec::new(),
            parent,
            parentless: false,
        });
        if let Some(parent) = parent {
            self.entities[parent.0].children.push(id);
        }
        id
    }

    fn push_atom(
        &mut self,
        spec_symbol: &str,
        name: &str,
        parent: EntityId,
        databases: &Databases,
    ) -> AnalysisResult<AtomId> {
        let symbol = databases.atoms.get(spec_symbol)?.symbol.clone();
        let id = AtomId(self.atoms.len());
        self.atoms.push(Atom {
            index: id,
            symbol,
            name: name.to_string(),
            bonds: Vec::new(),
            groups: Vec::new(),
            ghost: false,
            role: None,
            parent,
        });
        self.entities[parent.0].atoms.push(id);
        Ok(id)
    }

    fn insert_entity(
        &mut self,
        entity: ChemicalEntity,
        parent: Option<EntityId>,
        databases: &Databases,
    ) -> AnalysisResult<EntityId> {
        match entity {
            ChemicalEntity::Atom(spec) => {
                if !spec.bonds.is_empty() {
                    return Err(invalid_entity(format!(
                        "free atom '{}' cannot name bonds; use a cluster",
                        spec.name
                    )));
                }
                let id = self.push_entity(EntityKind::Atom, &spec.name, None, None, parent);
                let atom = self.push_atom(&spec.symbol, &spec.name, id, databases)?;
                self.atoms[atom.0].groups = spec.groups;
                self.atoms[atom.0].ghost = spec.ghost;
                Ok(id)
            }
            ChemicalEntity::AtomCluster { name, atoms } => {
                let id = self.push_entity(EntityKind::AtomCluster, &name, None, None, parent);
                self.insert_cluster_atoms(id, &name, atoms, databases)?;
                Ok(id)
            }
            ChemicalEntity::Molecule(spec) => {
                self.insert_fragment(FragmentKind::Molecule, spec, parent, databases)
            }
            ChemicalEntity::Residue(spec) => {
                self.insert_fragment(FragmentKind::Residue, spec, parent, databases)
            }
            ChemicalEntity::Nucleotide(spec) => {
                self.insert_fragment(FragmentKind::Nucleotide, spec, parent, databases)
            }
            ChemicalEntity::PeptideChain(chain) => {
                self.insert_chain(EntityKind::PeptideChain, chain, parent, databases)
            }
            ChemicalEntity::NucleotideChain(chain) => {
                self.insert_chain(EntityKind::NucleotideChain, chain, parent, databases)
            }
            ChemicalEntity::Protein { name, chains } => {
                if chains.is_empty() {
                    return Err(invalid_entity(format!("protein '{name}' has no chains")));
                }
                let id = self.push_entity(EntityKind::Protein, &name, None, None, parent);
                for chain in chains {
                    self.insert_chain(EntityKind::PeptideChain, chain, Some(id), databases)?;
                }
                Ok(id)
            }
        }
    }

    fn insert_cluster_atoms(
        &mut self,
        id: EntityId,
        name: &str,
        atoms: Vec<AtomSpec>,
        databases: &Databases,
    ) -> AnalysisResult<()> {
        let mut by_name: HashMap<String, AtomId> = HashMap::new();
        let mut created = Vec::with_capacity(atoms.len());
        for spec in &atoms {
            let atom = self.push_atom(&spec.symbol, &spec.name, id, databases)?;
            if by_name.insert(spec.name.clone(), atom).is_some() {
                return Err(invalid_entity(format!(
                    "cluster '{name}' repeats the atom name '{}'",
                    spec.name
                )));
            }
            created.push(atom);
        }
        for (spec, atom) in atoms.into_iter().zip(created) {
            let mut bonds = Vec::with_capacity(spec.bonds.len());
            for bond in &spec.bonds {
                let partner = by_name.get(bond).ok_or_else(|| {
                    invalid_entity(format!(
                        "cluster '{name}' bonds '{}' to unknown atom '{bond}'",
                        spec.name
                    ))
                })?;
                bonds.push(BondEnd::Atom(*partner));
            }
            let entry = &mut self.atoms[atom.0];
            entry.bonds = bonds;
            entry.groups = spec.groups;
            entry.ghost = spec.ghost;
        }
        // keep bonds symmetric
        let pairs: Vec<(AtomId, AtomId)> = self.entities[id.0]
            .atoms
            .iter()
            .flat_map(|&a| {
                self.atoms[a.0]
                    .bonds
                    .iter()
                    .filter_map(move |bond| bond.atom().map(|b| (a, b)))
            })
            .collect();
        for (a, b) in pairs {
            if !self.atoms[b.0].bonds.contains(&BondEnd::Atom(a)) {
                self.atoms[b.0].bonds.push(BondEnd::Atom(a));
            }
        }
        Ok(())
    }

    fn insert_fragment(
        &mut self,
        kind: FragmentKind,
        spec: FragmentSpec,
        parent: Option<EntityId>,
        databases: &Databases,
    ) -> AnalysisResult<EntityId> {
        let database = databases.fragments(kind);
        let template = database.get(&spec.code)?;
        let variant = match &spec.variant {
            Some(code) => Some(database.variant(code)?),
            None => None,
        };
        let template_atoms: Vec<TemplateAtom> = template.with_variant(variant);
        let ordered: Vec<String> = match &spec.atom_names {
            Some(names) => translate_names(&template.code, &template_atoms, names)?,
            None => template_atoms.iter().map(|atom| atom.name.clone()).collect(),
        };

        let entity_kind = match kind {
            FragmentKind::Molecule => EntityKind::Molecule,
            FragmentKind::Residue => EntityKind::Residue,
            FragmentKind::Nucleotide => EntityKind::Nucleotide,
        };
        let display_name = spec.name.clone().unwrap_or_else(|| template.code.clone());
        let id = self.push_entity(
            entity_kind,
            &display_name,
            Some(template.code.clone()),
            spec.variant.clone(),
            parent,
        );

        let mut by_name: HashMap<&str, AtomId> = HashMap::new();
        let lookup: HashMap<&str, &TemplateAtom> = template_atoms
            .iter()
            .map(|atom| (atom.name.as_str(), atom))
            .collect();
        for name in &ordered {
            let template_atom = lookup
                .get(name.as_str())
                .ok_or_else(|| invalid_entity(format!("'{}' has no atom '{name}'", template.code)))?;
            let atom = self.push_atom(&template_atom.symbol, name, id, databases)?;
            self.atoms[atom.0].role = template.role(name).map(str::to_string);
            by_name.insert(template_atom.name.as_str(), atom);
        }

        for template_atom in &template_atoms {
            let atom = by_name[template_atom.name.as_str()];
            let mut bonds = Vec::new();
            for partner in &template_atom.bonds {
                if let Some(&partner_id) = by_name.get(partner.as_str()) {
                    bonds.push(BondEnd::Atom(partner_id));
                }
            }
            if template.previous_link.as_deref() == Some(template_atom.name.as_str())
                && !variant.is_some_and(|v| v.is_n_terminus)
            {
                bonds.push(BondEnd::ChainPrev);
            }
            if template.next_link.as_deref() == Some(template_atom.name.as_str())
                && !variant.is_some_and(|v| v.is_c_terminus)
            {
                bonds.push(BondEnd::ChainNext);
            }
            self.atoms[atom.0].bonds = bonds;
        }
        Ok(id)
    }

    fn insert_chain(
        &mut self,
        kind: EntityKind,
        chain: ChainSpec,
        parent: Option<EntityId>,
        databases: &Databases,
    ) -> AnalysisResult<EntityId> {
        if chain.fragments.is_empty() {
            return Err(chain_error(kind, format!("chain '{}' is empty", chain.name)));
        }
        let fragment_kind = if kind == EntityKind::PeptideChain {
            FragmentKind::Residue
        } else {
            FragmentKind::Nucleotide
        };
        let id = self.push_entity(kind, &chain.name, None, None, parent);
        let mut fragments = Vec::with_capacity(chain.fragments.len());
        for spec in chain.fragments {
            fragments.push(self.insert_fragment(fragment_kind, spec, Some(id), databases)?);
        }

        let placeholder = |system: &Self, fragment: EntityId, end: BondEnd| -> Option<AtomId> {
            system.entities[fragment.0]
                .atoms
                .iter()
                .copied()
                .find(|atom| system.atoms[atom.0].bonds.contains(&end))
        };

        let first = fragments[0];
        if placeholder(self, first, BondEnd::ChainPrev).is_some() {
            return Err(chain_error(
                kind,
                format!(
                    "chain '{}' must start with a terminal variant, found '{}'",
                    chain.name, self.entities[first.0].name
                ),
            ));
        }
        let last = fragments[fragments.len() - 1];
        if placeholder(self, last, BondEnd::ChainNext).is_some() {
            return Err(chain_error(
                kind,
                format!(
                    "chain '{}' must end with a terminal variant, found '{}'",
                    chain.name, self.entities[last.0].name
                ),
            ));
        }

        for pair in fragments.windows(2) {
            let next_atom = placeholder(self, pair[0], BondEnd::ChainNext);
            let previous_atom = placeholder(self, pair[1], BondEnd::ChainPrev);
            let (Some(from), Some(to)) = (next_atom, previous_atom) else {
                return Err(chain_error(
                    kind,
                    format!(
                        "'{}' and '{}' cannot be linked in chain '{}'",
                        self.entities[pair[0].0].name, self.entities[pair[1].0].name, chain.name
                    ),
                ));
            };
            for bond in self.atoms[from.0].bonds.iter_mut() {
                if *bond == BondEnd::ChainNext {
                    *bond = BondEnd::Atom(to);
                }
            }
            for bond in self.atoms[to.0].bonds.iter_mut() {
                if *bond == BondEnd::ChainPrev {
                    *bond = BondEnd::Atom(from);
                }
            }
        }
        Ok(id)
    }

    /// Owned description of an entity, suitable for another system.
    pub fn copy_entity(&self, id: EntityId) -> AnalysisResult<ChemicalEntity> {
        let entity = self.entity(id)?;
        let fragment_spec = |entity: &Entity| FragmentSpec {
            code: entity.code.clone().unwrap_or_default(),
            name: Some(entity.name.clone()),
            variant: entity.variant.clone(),
            atom_names: Some(
                entity
                    .atoms
                    .iter()
                    .map(|atom| self.atoms[atom.0].name.clone())
                    .collect(),
            ),
        };
        let chain_spec = |chain: &Entity| ChainSpec {
            name: chain.name.clone(),
            fragments: chain
                .children
                .iter()
                .map(|child| fragment_spec(&self.entities[child.0]))
                .collect(),
        };
        Ok(match entity.kind {
            EntityKind::Atom => {
                let atom = &self.atoms[entity.atoms[0].0];
                ChemicalEntity::Atom(AtomSpec {
                    symbol: atom.symbol.clone(),
                    name: atom.name.clone(),
                    bonds: Vec::new(),
                    groups: atom.groups.clone(),
                    ghost: atom.ghost,
                })
            }
            EntityKind::AtomCluster => ChemicalEntity::AtomCluster {
                name: entity.name.clone(),
                atoms: entity
                    .atoms
                    .iter()
                    .map(|id| {
                        let atom = &self.atoms[id.0];
                        AtomSpec {
                            symbol: atom.symbol.clone(),
                            name: atom.name.clone(),
                            bonds: atom
                                .bonds
                                .iter()
                                .filter_map(|bond| bond.atom())
                                .filter(|partner| entity.atoms.contains(partner))
                                .map(|partner| self.atoms[partner.0].name.clone())
                                .collect(),
                            groups: atom.groups.clone(),
                            ghost: atom.ghost,
                        }
                    })
                    .collect(),
            },
            EntityKind::Molecule => ChemicalEntity::Molecule(fragment_spec(entity)),
            EntityKind::Residue => ChemicalEntity::Residue(fragment_spec(entity)),
            EntityKind::Nucleotide => ChemicalEntity::Nucleotide(fragment_spec(entity)),
            EntityKind::PeptideChain => ChemicalEntity::PeptideChain(chain_spec(entity)),
            EntityKind::NucleotideChain => ChemicalEntity::NucleotideChain(chain_spec(entity)),
            EntityKind::Protein => ChemicalEntity::Protein {
                name: entity.name.clone(),
                chains: entity
                    .children
                    .iter()
                    .map(|child| chain_spec(&self.entities[child.0]))
                    .collect(),
            },
        })
    }
}
