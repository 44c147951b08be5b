//! Arena-backed chemical system.
//!
//! Atoms and entities live in vectors owned by [`ChemicalSystem`]; every
//! cross-reference is an [`AtomId`] or [`EntityId`]. Parent links are stored
//! on the children so that `top_level_chemical_entity` is a short walk.

use crate::database::AtomDatabase;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub usize);

/// One end of a bond; chain placeholders stand for `-R` and `+R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondEnd {
    Atom(AtomId),
    ChainPrev,
    ChainNext,
}

impl BondEnd {
    pub fn atom(self) -> Option<AtomId> {
        match self {
            Self::Atom(id) => Some(id),
            Self::ChainPrev | Self::ChainNext => None,
        }
    }

    pub fn token(self) -> String {
        match self {
            Self::Atom(id) => id.0.to_string(),
            Self::ChainPrev => "-R".to_string(),
            Self::ChainNext => "+R".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub index: AtomId,
    pub symbol: String,
    pub name: String,
    pub bonds: Vec<BondEnd>,
    pub groups: Vec<String>,
    pub ghost: bool,
    /// Role inside the owning fragment (`backbone`, `sidechain`, `base`, ...).
    pub role: Option<String>,
    pub parent: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Atom,
    AtomCluster,
    Molecule,
    Residue,
    Nucleotide,
    PeptideChain,
    NucleotideChain,
    Protein,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::AtomCluster => "atom_cluster",
            Self::Molecule => "molecule",
            Self::Residue => "residue",
            Self::Nucleotide => "nucleotide",
            Self::PeptideChain => "peptide_chain",
            Self::NucleotideChain => "nucleotide_chain",
            Self::Protein => "protein",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Atom,
            Self::AtomCluster,
            Self::Molecule,
            Self::Residue,
            Self::Nucleotide,
            Self::PeptideChain,
            Self::NucleotideChain,
            Self::Protein,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }

    /// Serialization table holding entities of this kind.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Atom => "atoms",
            Self::AtomCluster => "atom_clusters",
            Self::Molecule => "molecules",
            Self::Residue => "residues",
            Self::Nucleotide => "nucleotides",
            Self::PeptideChain => "peptide_chains",
            Self::NucleotideChain => "nucleotide_chains",
            Self::Protein => "proteins",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    /// Database code for molecules, residues and nucleotides.
    pub code: Option<String>,
    pub variant: Option<String>,
    /// Atoms held directly by this entity.
    pub atoms: Vec<AtomId>,
    pub children: Vec<EntityId>,
    pub parent: Option<EntityId>,
    /// A parentless cluster views atoms owned elsewhere.
    pub parentless: bool,
}

/// Weak view over atoms of one system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomGroup {
    atoms: Vec<AtomId>,
}

impl AtomGroup {
    pub fn atom_list(&self) -> &[AtomId] {
        &self.atoms
    }

    pub fn number_of_atoms(&self) -> usize {
        self.atoms.len()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChemicalSystem {
    name: String,
    pub(crate) atoms: Vec<Atom>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) top_level: Vec<EntityId>,
}

fn inconsistent(message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(
        ErrorKind::InconsistentChemicalSystem,
        "INPUT.CHEMICAL_SYSTEM",
        message,
    )
}

impl ChemicalSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, id: AtomId) -> AnalysisResult<&Atom> {
        self.atoms
            .get(id.0)
            .ok_or_else(|| inconsistent(format!("atom index {} is out of range", id.0)))
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> AnalysisResult<&Entity> {
        self.entities
            .get(id.0)
            .ok_or_else(|| inconsistent(format!("entity index {} is out of range", id.0)))
    }

    pub fn top_level_entities(&self) -> &[EntityId] {
        &self.top_level
    }

    /// Atoms excluding ghosts.
    pub fn number_of_atoms(&self) -> usize {
        self.atoms.iter().filter(|atom| !atom.ghost).count()
    }

    pub fn total_number_of_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom_ids(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.atoms.iter().map(|atom| atom.index)
    }

    /// Every atom under `entity`, in index order.
    pub fn atom_list(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        let mut atoms = Vec::new();
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            let node = self.entity(current)?;
            atoms.extend(node.atoms.iter().copied());
            stack.extend(node.children.iter().copied());
        }
        atoms.sort_unstable();
        atoms.dedup();
        Ok(atoms)
    }

    pub fn entity_number_of_atoms(&self, entity: EntityId) -> AnalysisResult<usize> {
        Ok(self
            .atom_list(entity)?
            .into_iter()
            .filter(|id| !self.atoms[id.0].ghost)
            .count())
    }

    pub fn entity_total_number_of_atoms(&self, entity: EntityId) -> AnalysisResult<usize> {
        Ok(self.atom_list(entity)?.len())
    }

    /// Ancestor of the atom whose parent is the system itself.
    pub fn top_level_chemical_entity(&self, atom: AtomId) -> AnalysisResult<EntityId> {
        let mut current = self.atom(atom)?.parent;
        loop {
            match self.entity(current)?.parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
    }

    /// Top-level entity index of every atom, indexed by atom.
    pub fn top_level_index_map(&self) -> Vec<usize> {
        let mut map = vec![0; self.atoms.len()];
        for (position, &entity) in self.top_level.iter().enumerate() {
            if self.entities[entity.0].parentless {
                continue;
            }
            if let Ok(atoms) = self.atom_list(entity) {
                for atom in atoms {
                    map[atom.0] = position;
                }
            }
        }
        map
    }

    pub fn bonded_neighbors(&self, atom: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.atoms
            .get(atom.0)
            .into_iter()
            .flat_map(|atom| atom.bonds.iter().filter_map(|bond| bond.atom()))
    }

    pub fn atom_group(&self, atoms: impl IntoIterator<Item = usize>) -> AnalysisResult<AtomGroup> {
        let mut ids = Vec::new();
        for index in atoms {
            ids.push(self.atom(AtomId(index))?.index);
        }
        Ok(AtomGroup { atoms: ids })
    }

    pub fn atoms_in_group(&self, group: &str) -> Vec<AtomId> {
        self.atoms
            .iter()
            .filter(|atom| atom.groups.iter().any(|g| g == group))
            .map(|atom| atom.index)
            .collect()
    }

    pub fn add_to_group(&mut self, atom: AtomId, group: &str) -> AnalysisResult<()> {
        self.atom(atom)?;
        let entry = &mut self.atoms[atom.0];
        if !entry.groups.iter().any(|g| g == group) {
            entry.groups.push(group.to_string());
        }
        Ok(())
    }

    pub fn set_ghost(&mut self, atom: AtomId, ghost: bool) -> AnalysisResult<()> {
        self.atom(atom)?;
        self.atoms[atom.0].ghost = ghost;
        Ok(())
    }

    pub fn masses(&self, atoms: &[AtomId], database: &AtomDatabase) -> AnalysisResult<Vec<f64>> {
        atoms
            .iter()
            .map(|&id| database.mass(&self.atom(id)?.symbol))
            .collect()
    }

    pub fn mass(&self, entity: EntityId, database: &AtomDatabase) -> AnalysisResult<f64> {
        Ok(self.masses(&self.atom_list(entity)?, database)?.iter().sum())
    }

    /// Mass-weighted centre of `atoms` taken from `coordinates` as stored.
    pub fn center_of_mass(
        &self,
        atoms: &[AtomId],
        coordinates: &[Vec3],
        database: &AtomDatabase,
    ) -> AnalysisResult<Vec3> {
        let masses = self.masses(atoms, database)?;
        let total: f64 = masses.iter().sum();
        if total <= 0.0 {
            return Err(inconsistent("center of mass of a massless selection"));
        }
        let mut center = [0.0; 3];
        for (id, mass) in atoms.iter().zip(&masses) {
            let position = coordinates.get(id.0).ok_or_else(|| {
                inconsistent(format!("no coordinates for atom {}", id.0))
            })?;
            for axis in 0..3 {
                center[axis] += mass * position[axis];
            }
        }
        Ok(center.map(|value| value / total))
    }

    fn atoms_with_role(&self, entity: EntityId, role: &str) -> AnalysisResult<Vec<AtomId>> {
        Ok(self
            .atom_list(entity)?
            .into_iter()
            .filter(|id| self.atoms[id.0].role.as_deref() == Some(role))
            .collect())
    }

    fn fragments_of(&self, chain: EntityId, kind: EntityKind) -> AnalysisResult<Vec<EntityId>> {
        let entity = self.entity(chain)?;
        if entity.kind == kind {
            return Ok(vec![chain]);
        }
        let mut fragments = Vec::new();
        for &child in &entity.children {
            fragments.extend(self.fragments_of(child, kind)?);
        }
        Ok(fragments)
    }

    pub fn backbone(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        self.atoms_with_role(entity, "backbone")
    }

    pub fn sidechains(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        self.atoms_with_role(entity, "sidechain")
    }

    pub fn bases(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        self.atoms_with_role(entity, "base")
    }

    pub fn sugars(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        self.atoms_with_role(entity, "sugar")
    }

    pub fn phosphates(&self, entity: EntityId) -> AnalysisResult<Vec<AtomId>> {
        self.atoms_with_role(entity, "phosphate")
    }

    pub fn residues(&self, entity: EntityId) -> AnalysisResult<Vec<EntityId>> {
        self.fragments_of(entity, EntityKind::Residue)
    }

    pub fn nucleotides(&self, entity: EntityId) -> AnalysisResult<Vec<EntityId>> {
        self.fragments_of(entity, EntityKind::Nucleotide)
    }

    /// Peptide bonds `(C_i, N_{i+1})` joining consecutive residues.
    pub fn peptides(&self, entity: EntityId) -> AnalysisResult<Vec<(AtomId, AtomId)>> {
        let mut bonds = Vec::new();
        for pair in self.residues(entity)?.windows(2) {
            let first = self.atom_list(pair[0])?;
            let second = self.atom_list(pair[1])?;
            for &atom in &first {
                for partner in self.bonded_neighbors(atom) {
                    if second.contains(&partner) {
                        bonds.push((atom, partner));
                    }
                }
            }
        }
        Ok(bonds)
    }

    pub(crate) fn set_bonds(&mut self, atom: AtomId, bonds: Vec<BondEnd>) -> AnalysisResult<()> {
        for bond in &bonds {
            if let BondEnd::Atom(partner) = bond {
                self.atom(*partner)?;
            }
        }
        self.atom(atom)?;
        self.atoms[atom.0].bonds = bonds;
        Ok(())
    }

    /// Names of the molecules present, in first-appearance order.
    pub fn unique_molecules(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for &id in &self.top_level {
            let entity = &self.entities[id.0];
            if entity.kind == EntityKind::Molecule && !names.contains(&entity.name) {
                names.push(entity.name.clone());
            }
        }
        names
    }

    pub fn number_of_molecules(&self, name: &str) -> usize {
        self.top_level
            .iter()
            .filter(|id| {
                let entity = &self.entities[id.0];
                entity.kind == EntityKind::Molecule && entity.name == name
            })
            .count()
    }

    /// Top-level entities of `kind` in insertion order.
    pub fn top_level_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.top_level
            .iter()
            .copied()
            .filter(|id| self.entities[id.0].kind == kind)
            .collect()
    }

    /// Element counts, ordered by symbol.
    pub fn composition(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.symbol.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("chemical system: {}", self.name),
            format!("number of atoms: {}", self.total_number_of_atoms()),
        ];
        let mut per_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for &id in &self.top_level {
            *per_kind.entry(self.entities[id.0].kind.as_str()).or_insert(0) += 1;
        }
        for (kind, count) in per_kind {
            lines.push(format!("{kind}: {count}"));
        }
        for name in self.unique_molecules() {
            lines.push(format!(
                "  molecule {name}: {}",
                self.number_of_molecules(&name)
            ));
        }
        let formula: Vec<String> = self
            .composition()
            .into_iter()
            .map(|(symbol, count)| format!("{symbol}{count}"))
            .collect();
        lines.push(format!("composition: {}", formula.join(" ")));
        lines.join("\n")
    }
}

impl Display for ChemicalSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChemicalSystem({}, {} atoms, {} entities)",
            self.name,
            self.atoms.len(),
            self.top_level.len()
        )
    }
}
