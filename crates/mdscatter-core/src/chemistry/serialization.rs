//! Per-entity tables describing a chemical system, and reconstruction from
//! them. Any inconsistency while rebuilding is reported as a corrupted store.

use super::builder::{AtomSpec, ChainSpec, ChemicalEntity, FragmentSpec};
use super::system::{AtomId, BondEnd, ChemicalSystem, EntityId, EntityKind};
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomRow {
    pub symbol: String,
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub name: String,
    pub atoms: Vec<AtomRow>,
    #[serde(default)]
    pub parentless: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRow {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub atom_names: Vec<String>,
    pub atom_indexes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRow {
    pub name: String,
    /// Rows of the residue or nucleotide table.
    pub fragments: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinRow {
    pub name: String,
    /// Rows of the peptide chain table.
    pub chains: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRow {
    pub kind: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChemicalSystemTables {
    pub name: String,
    pub atoms: Vec<AtomRow>,
    pub atom_clusters: Vec<ClusterRow>,
    pub molecules: Vec<FragmentRow>,
    pub residues: Vec<FragmentRow>,
    pub nucleotides: Vec<FragmentRow>,
    pub peptide_chains: Vec<ChainRow>,
    pub nucleotide_chains: Vec<ChainRow>,
    pub proteins: Vec<ProteinRow>,
    pub contents: Vec<ContentRow>,
    /// Bonds as `[atom, partner]`; placeholders are not stored.
    #[serde(default)]
    pub bonds: Vec<[usize; 2]>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub ghosts: Vec<usize>,
}

pub const TABLE_NAMES: [&str; 9] = [
    "atoms",
    "atom_clusters",
    "molecules",
    "residues",
    "nucleotides",
    "peptide_chains",
    "nucleotide_chains",
    "proteins",
    "contents",
];

fn corrupted(message: impl Into<String>) -> AnalysisError {
    AnalysisError::new(ErrorKind::CorruptedFile, "IO.CORRUPTED_CHEMICAL_SYSTEM", message)
}

impl ChemicalSystem {
    pub fn serialize(&self) -> ChemicalSystemTables {
        let mut tables = ChemicalSystemTables {
            name: self.name().to_string(),
            ..ChemicalSystemTables::default()
        };
        for &id in self.top_level_entities() {
            let entity = &self.entities[id.0];
            let index = match entity.kind {
                EntityKind::Atom => {
                    tables.atoms.push(self.atom_row(entity.atoms[0]));
                    tables.atoms.len() - 1
                }
                EntityKind::AtomCluster => {
                    tables.atom_clusters.push(ClusterRow {
                        name: entity.name.clone(),
                        atoms: entity.atoms.iter().map(|&a| self.atom_row(a)).collect(),
                        parentless: entity.parentless,
                    });
                    tables.atom_clusters.len() - 1
                }
                EntityKind::Molecule => {
                    let row = self.fragment_row(id);
                    tables.molecules.push(row);
                    tables.molecules.len() - 1
                }
                EntityKind::Residue => {
                    let row = self.fragment_row(id);
                    tables.residues.push(row);
                    tables.residues.len() - 1
                }
                EntityKind::Nucleotide => {
                    let row = self.fragment_row(id);
                    tables.nucleotides.push(row);
                    tables.nucleotides.len() - 1
                }
                EntityKind::PeptideChain => {
                    let row = self.chain_row(id, &mut tables.residues);
                    tables.peptide_chains.push(row);
                    tables.peptide_chains.len() - 1
                }
                EntityKind::NucleotideChain => {
                    let row = self.chain_row(id, &mut tables.nucleotides);
                    tables.nucleotide_chains.push(row);
                    tables.nucleotide_chains.len() - 1
                }
                EntityKind::Protein => {
                    let mut chains = Vec::new();
                    for &chain in &entity.children {
                        let row = self.chain_row(chain, &mut tables.residues);
                        tables.peptide_chains.push(row);
                        chains.push(tables.peptide_chains.len() - 1);
                    }
                    tables.proteins.push(ProteinRow {
                        name: entity.name.clone(),
                        chains,
                    });
                    tables.proteins.len() - 1
                }
            };
            tables.contents.push(ContentRow {
                kind: entity.kind.as_str().to_string(),
                index,
            });
        }

        for atom in self.atoms() {
            for bond in &atom.bonds {
                if let BondEnd::Atom(partner) = bond {
                    tables.bonds.push([atom.index.0, partner.0]);
                }
            }
            for group in &atom.groups {
                tables
                    .groups
                    .entry(group.clone())
                    .or_default()
                    .push(atom.index.0);
            }
            if atom.ghost {
                tables.ghosts.push(atom.index.0);
            }
        }
        tables
    }

    fn atom_row(&self, id: AtomId) -> AtomRow {
        let atom = &self.atoms[id.0];
        AtomRow {
            symbol: atom.symbol.clone(),
            name: atom.name.clone(),
            index: id.0,
        }
    }

    fn fragment_row(&self, id: EntityId) -> FragmentRow {
        let entity = &self.entities[id.0];
        FragmentRow {
            code: entity.code.clone().unwrap_or_default(),
            name: entity.name.clone(),
            variant: entity.variant.clone(),
            atom_names: entity
                .atoms
                .iter()
                .map(|a| self.atoms[a.0].name.clone())
                .collect(),
            atom_indexes: entity.atoms.iter().map(|a| a.0).collect(),
        }
    }

    fn chain_row(&self, id: EntityId, fragments: &mut Vec<FragmentRow>) -> ChainRow {
        let entity = &self.entities[id.0];
        let mut rows = Vec::with_capacity(entity.children.len());
        for &child in &entity.children {
            fragments.push(self.fragment_row(child));
            rows.push(fragments.len() - 1);
        }
        ChainRow {
            name: entity.name.clone(),
            fragments: rows,
        }
    }

    /// Rebuilds a system from its tables.
    pub fn build(tables: &ChemicalSystemTables, databases: &Databases) -> AnalysisResult<Self> {
        let mut system = ChemicalSystem::new(tables.name.clone());
        for content in &tables.contents {
            let kind = EntityKind::parse(&content.kind)
                .ok_or_else(|| corrupted(format!("unknown entity type '{}'", content.kind)))?;
            let row = |len: usize| -> AnalysisResult<usize> {
                if content.index < len {
                    Ok(content.index)
                } else {
                    Err(corrupted(format!(
                        "{} index {} is out of range",
                        kind.table(),
                        content.index
                    )))
                }
            };
            let (entity, expected) = match kind {
                EntityKind::Atom => {
                    let atom = &tables.atoms[row(tables.atoms.len())?];
                    (
                        ChemicalEntity::Atom(AtomSpec::new(&atom.symbol, &atom.name)),
                        vec![atom.index],
                    )
                }
                EntityKind::AtomCluster => {
                    let cluster = &tables.atom_clusters[row(tables.atom_clusters.len())?];
                    if cluster.parentless {
                        let ids: Vec<AtomId> = cluster.atoms.iter().map(|a| AtomId(a.index)).collect();
                        system
                            .add_parentless_cluster(&cluster.name, &ids)
                            .map_err(|error| corrupted(error.message().to_string()))?;
                        continue;
                    }
                    (
                        ChemicalEntity::AtomCluster {
                            name: cluster.name.clone(),
                            atoms: cluster
                                .atoms
                                .iter()
                                .map(|a| AtomSpec::new(&a.symbol, &a.name))
                                .collect(),
                        },
                        cluster.atoms.iter().map(|a| a.index).collect(),
                    )
                }
                EntityKind::Molecule => {
                    let fragment = &tables.molecules[row(tables.molecules.len())?];
                    (
                        ChemicalEntity::Molecule(fragment_spec(fragment)),
                        fragment.atom_indexes.clone(),
                    )
                }
                EntityKind::Residue => {
                    let fragment = &tables.residues[row(tables.residues.len())?];
                    (
                        ChemicalEntity::Residue(fragment_spec(fragment)),
                        fragment.atom_indexes.clone(),
                    )
                }
                EntityKind::Nucleotide => {
                    let fragment = &tables.nucleotides[row(tables.nucleotides.len())?];
                    (
                        ChemicalEntity::Nucleotide(fragment_spec(fragment)),
                        fragment.atom_indexes.clone(),
                    )
                }
                EntityKind::PeptideChain => {
                    let chain = &tables.peptide_chains[row(tables.peptide_chains.len())?];
                    let (spec, expected) = chain_spec(chain, &tables.residues)?;
                    (ChemicalEntity::PeptideChain(spec), expected)
                }
                EntityKind::NucleotideChain => {
                    let chain = &tables.nucleotide_chains[row(tables.nucleotide_chains.len())?];
                    let (spec, expected) = chain_spec(chain, &tables.nucleotides)?;
                    (ChemicalEntity::NucleotideChain(spec), expected)
                }
                EntityKind::Protein => {
                    let protein = &tables.proteins[row(tables.proteins.len())?];
                    let mut chains = Vec::new();
                    let mut expected = Vec::new();
                    for &chain_index in &protein.chains {
                        let chain = tables.peptide_chains.get(chain_index).ok_or_else(|| {
                            corrupted(format!("peptide chain index {chain_index} is out of range"))
                        })?;
                        let (spec, indexes) = chain_spec(chain, &tables.residues)?;
                        chains.push(spec);
                        expected.extend(indexes);
                    }
                    (
                        ChemicalEntity::Protein {
                            name: protein.name.clone(),
                            chains,
                        },
                        expected,
                    )
                }
            };

            let first_new = system.total_number_of_atoms();
            system.add_chemical_entity(entity, databases).map_err(|error| {
                let message = format!("{} '{}': {}", kind.as_str(), content.index, error.message());
                match error.kind() {
                    ErrorKind::InconsistentAtomNames
                    | ErrorKind::UnknownAtom
                    | ErrorKind::UnknownMolecule
                    | ErrorKind::UnknownResidue
                    | ErrorKind::InvalidVariant => corrupted(message),
                    _ => error,
                }
            })?;
            let assigned: Vec<usize> = (first_new..system.total_number_of_atoms()).collect();
            if assigned != expected {
                return Err(corrupted(format!(
                    "atom indexes of {} {} do not match the stored indexes",
                    kind.as_str(),
                    content.index
                )));
            }
        }

        let total = system.total_number_of_atoms();
        let check = |index: usize| -> AnalysisResult<AtomId> {
            if index < total {
                Ok(AtomId(index))
            } else {
                Err(corrupted(format!("atom index {index} is out of range")))
            }
        };
        let mut bonds: Vec<Vec<BondEnd>> = system
            .atoms()
            .iter()
            .map(|atom| atom.bonds.iter().copied().filter(|b| b.atom().is_none()).collect())
            .collect();
        for &[atom, partner] in &tables.bonds {
            let (atom, partner) = (check(atom)?, check(partner)?);
            bonds[atom.0].push(BondEnd::Atom(partner));
        }
        for (index, atom_bonds) in bonds.into_iter().enumerate() {
            let mut ordered = atom_bonds;
            let original = &system.atoms()[index].bonds;
            ordered.sort_by_key(|bond| {
                original
                    .iter()
                    .position(|b| b == bond)
                    .unwrap_or(usize::MAX)
            });
            system.set_bonds(AtomId(index), ordered)?;
        }
        for (group, members) in &tables.groups {
            for &member in members {
                system.add_to_group(check(member)?, group)?;
            }
        }
        for &ghost in &tables.ghosts {
            system.set_ghost(check(ghost)?, true)?;
        }
        Ok(system)
    }
}

fn fragment_spec(row: &FragmentRow) -> FragmentSpec {
    FragmentSpec {
        code: row.code.clone(),
        name: Some(row.name.clone()),
        variant: row.variant.clone(),
        atom_names: Some(row.atom_names.clone()),
    }
}

fn chain_spec(row: &ChainRow, fragments: &[FragmentRow]) -> AnalysisResult<(ChainSpec, Vec<usize>)> {
    let mut specs = Vec::with_capacity(row.fragments.len());
    let mut expected = Vec::new();
    for &index in &row.fragments {
        let fragment = fragments
            .get(index)
            .ok_or_else(|| corrupted(format!("fragment index {index} is out of range")))?;
        specs.push(fragment_spec(fragment));
        expected.extend(fragment.atom_indexes.iter().copied());
    }
    Ok((
        ChainSpec {
            name: row.name.clone(),
            fragments: specs,
        },
        expected,
    ))
}

#[cfg(test)]
mod tests {
    use super::ContentRow;
    use crate::chemistry::builder::{AtomSpec, ChainSpec, ChemicalEntity, FragmentSpec};
    use crate::chemistry::system::{AtomId, ChemicalSystem};
    use crate::database::Databases;
    use crate::domain::ErrorKind;

    fn sample(databases: &Databases) -> ChemicalSystem {
        let mut system = ChemicalSystem::new("sample");
        system
            .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new("WAT")), databases)
            .expect("water");
        system
            .add_chemical_entity(
                ChemicalEntity::Protein {
                    name: "P".to_string(),
                    chains: vec![ChainSpec {
                        name: "A".to_string(),
                        fragments: vec![
                            FragmentSpec::new("ALA").with_variant("NT1"),
                            FragmentSpec::new("GLY"),
                            FragmentSpec::new("SER").with_variant("CT2"),
                        ],
                    }],
                },
                databases,
            )
            .expect("protein");
        system
            .add_chemical_entity(
                ChemicalEntity::NucleotideChain(ChainSpec {
                    name: "N".to_string(),
                    fragments: vec![
                        FragmentSpec::new("DC").with_variant("5T1"),
                        FragmentSpec::new("DG").with_variant("3T1"),
                    ],
                }),
                databases,
            )
            .expect("dna");
        system
            .add_chemical_entity(
                ChemicalEntity::AtomCluster {
                    name: "ion_pair".to_string(),
                    atoms: vec![
                        AtomSpec::new("Na", "NA").bonded_to(&["CL"]),
                        AtomSpec::new("Cl", "CL"),
                    ],
                },
                databases,
            )
            .expect("cluster");
        system
            .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new("Ar", "AR")), databases)
            .expect("argon");
        system.add_parentless_cluster("solvent", &[AtomId(0), AtomId(1)]).expect("view");
        system.add_to_group(AtomId(0), "oxygens").expect("group");
        system.set_ghost(AtomId(2), true).expect("ghost");
        system
    }

    #[test]
    fn serialized_tables_rebuild_an_identical_system() {
        let databases = Databases::builtin().expect("databases");
        let system = sample(&databases);
        let tables = system.serialize();
        assert_eq!(tables.contents.len(), 6);
        assert_eq!(tables.residues.len(), 3);

        let json = serde_json::to_string(&tables).expect("encode");
        let decoded = serde_json::from_str(&json).expect("decode");
        let rebuilt = ChemicalSystem::build(&decoded, &databases).expect("rebuild");
        assert_eq!(rebuilt, system);
        assert_eq!(format!("{rebuilt}"), format!("{system}"));
    }

    #[test]
    fn corrupted_tables_are_reported() {
        let databases = Databases::builtin().expect("databases");
        let mut tables = sample(&databases).serialize();
        tables.contents.push(ContentRow {
            kind: "lipid".to_string(),
            index: 0,
        });
        let error = ChemicalSystem::build(&tables, &databases).expect_err("unknown type");
        assert_eq!(error.kind(), ErrorKind::CorruptedFile);

        let mut tables = sample(&databases).serialize();
        tables.contents[0].index = 40;
        let error = ChemicalSystem::build(&tables, &databases).expect_err("index");
        assert_eq!(error.kind(), ErrorKind::CorruptedFile);

        let mut tables = sample(&databases).serialize();
        tables.molecules[0].atom_names[0] = "C".to_string();
        let error = ChemicalSystem::build(&tables, &databases).expect_err("names");
        assert_eq!(error.kind(), ErrorKind::CorruptedFile);
    }
}
