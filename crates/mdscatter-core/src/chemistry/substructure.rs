//! Substructure matching over the bond graph of a chemical system.
//!
//! Patterns use a SMARTS subset: organic-subset and bracketed element atoms,
//! `*` wildcards, `#n` atomic numbers, comma alternatives, `!` negation and
//! `Hn` hydrogen counts inside brackets, branches and ring-closure digits.
//! Bond symbols are accepted but only connectivity is compared, since the
//! system stores no bond orders.

use super::system::{AtomId, ChemicalSystem};
use crate::database::AtomDatabase;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmartsError {
    #[error("empty substructure pattern")]
    Empty,
    #[error("unexpected '{character}' at position {position}")]
    Unexpected { character: char, position: usize },
    #[error("unterminated bracket atom starting at position {0}")]
    UnterminatedBracket(usize),
    #[error("unbalanced parenthesis at position {0}")]
    UnbalancedBranch(usize),
    #[error("ring closure {0} is never closed")]
    OpenRing(u32),
    #[error("unknown element '{0}'")]
    UnknownElement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Primitive {
    Any,
    Symbol(String),
    AtomicNumber(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AtomQuery {
    /// Any of these, each possibly negated.
    alternatives: Vec<(bool, Primitive)>,
    hydrogens: Option<usize>,
}

/// Pattern or target graph with symbol-labelled nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MolecularGraph {
    pub symbols: Vec<String>,
    pub adjacency: Vec<Vec<usize>>,
}

impl MolecularGraph {
    pub fn add_node(&mut self, symbol: &str) -> usize {
        self.symbols.push(symbol.to_string());
        self.adjacency.push(Vec::new());
        self.symbols.len() - 1
    }

    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a != b && !self.adjacency[a].contains(&b) {
            self.adjacency[a].push(b);
            self.adjacency[b].push(a);
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Graph of the given atoms, keeping only bonds between them.
    pub fn from_system(system: &ChemicalSystem, atoms: &[AtomId]) -> Self {
        let mut graph = Self::default();
        let mut position = std::collections::HashMap::new();
        for &atom in atoms {
            let node = graph.add_node(&system.atoms()[atom.0].symbol);
            position.insert(atom, node);
        }
        for &atom in atoms {
            for partner in system.bonded_neighbors(atom) {
                if let (Some(&a), Some(&b)) = (position.get(&atom), position.get(&partner)) {
                    graph.add_edge(a, b);
                }
            }
        }
        graph
    }

    fn hydrogen_count(&self, node: usize) -> usize {
        self.adjacency[node]
            .iter()
            .filter(|&&n| matches!(self.symbols[n].as_str(), "H" | "D" | "T"))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubstructurePattern {
    atoms: Vec<AtomQuery>,
    bonds: Vec<(usize, usize)>,
}

const ORGANIC_SUBSET: [&str; 10] = ["Cl", "Br", "B", "C", "N", "O", "P", "S", "F", "I"];

impl SubstructurePattern {
    pub fn parse(pattern: &str, database: &AtomDatabase) -> Result<Self, SmartsError> {
        let chars: Vec<char> = pattern.trim().chars().collect();
        if chars.is_empty() {
            return Err(SmartsError::Empty);
        }
        let mut atoms = Vec::new();
        let mut bonds = Vec::new();
        let mut previous: Option<usize> = None;
        let mut branches: Vec<(Option<usize>, usize)> = Vec::new();
        let mut rings: std::collections::BTreeMap<u32, usize> = std::collections::BTreeMap::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                '(' => {
                    branches.push((previous, i));
                    i += 1;
                }
                ')' => {
                    let (start, _) = branches.pop().ok_or(SmartsError::UnbalancedBranch(i))?;
                    previous = start;
                    i += 1;
                }
                '-' | '=' | '#' | '~' | ':' | '/' | '\\' => {
                    i += 1;
                }
                '0'..='9' | '%' => {
                    let (label, next) = if c == '%' {
                        let digits: String = chars[i + 1..].iter().take(2).collect();
                        let label = digits.parse().map_err(|_| SmartsError::Unexpected {
                            character: c,
                            position: i,
                        })?;
                        (label, i + 3)
                    } else {
                        (c.to_digit(10).unwrap_or(0), i + 1)
                    };
                    let current = previous.ok_or(SmartsError::Unexpected {
                        character: c,
                        position: i,
                    })?;
                    match rings.remove(&label) {
                        Some(open) => bonds.push((open, current)),
                        None => {
                            rings.insert(label, current);
                        }
                    }
                    i = next;
                }
                '[' => {
                    let end = chars[i..]
                        .iter()
                        .position(|&ch| ch == ']')
                        .ok_or(SmartsError::UnterminatedBracket(i))?;
                    let body: String = chars[i + 1..i + end].iter().collect();
                    let query = parse_bracket(&body, database)?;
                    Self::push_atom(&mut atoms, &mut bonds, &mut previous, query);
                    i += end + 1;
                }
                '*' => {
                    let query = AtomQuery {
                        alternatives: vec![(false, Primitive::Any)],
                        hydrogens: None,
                    };
                    Self::push_atom(&mut atoms, &mut bonds, &mut previous, query);
                    i += 1;
                }
                _ => {
                    let rest: String = chars[i..].iter().take(2).collect();
                    let symbol = ORGANIC_SUBSET
                        .iter()
                        .find(|symbol| rest.starts_with(**symbol))
                        .map(|symbol| symbol.to_string())
                        .or_else(|| {
                            let upper = c.to_ascii_uppercase().to_string();
                            (c.is_ascii_lowercase() && ORGANIC_SUBSET.contains(&upper.as_str()))
                                .then_some(upper)
                        })
                        .ok_or(SmartsError::Unexpected {
                            character: c,
                            position: i,
                        })?;
                    let width = if c.is_ascii_lowercase() { 1 } else { symbol.len() };
                    let query = AtomQuery {
                        alternatives: vec![(false, Primitive::Symbol(symbol))],
                        hydrogens: None,
                    };
                    Self::push_atom(&mut atoms, &mut bonds, &mut previous, query);
                    i += width;
                }
            }
        }
        if let Some((_, position)) = branches.pop() {
            return Err(SmartsError::UnbalancedBranch(position));
        }
        if let Some((&label, _)) = rings.iter().next() {
            return Err(SmartsError::OpenRing(label));
        }
        Ok(Self { atoms, bonds })
    }

    fn push_atom(
        atoms: &mut Vec<AtomQuery>,
        bonds: &mut Vec<(usize, usize)>,
        previous: &mut Option<usize>,
        query: AtomQuery,
    ) {
        atoms.push(query);
        let index = atoms.len() - 1;
        if let Some(previous) = *previous {
            bonds.push((previous, index));
        }
        *previous = Some(index);
    }

    /// Pattern matching every node of `graph` exactly by symbol.
    pub fn from_graph(graph: &MolecularGraph) -> Self {
        let atoms = graph
            .symbols
            .iter()
            .map(|symbol| AtomQuery {
                alternatives: vec![(false, Primitive::Symbol(symbol.clone()))],
                hydrogens: None,
            })
            .collect();
        let mut bonds = Vec::new();
        for (a, neighbors) in graph.adjacency.iter().enumerate() {
            for &b in neighbors {
                if a < b {
                    bonds.push((a, b));
                }
            }
        }
        Self { atoms, bonds }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    fn atom_matches(&self, query: usize, graph: &MolecularGraph, node: usize, database: &AtomDatabase) -> bool {
        let query = &self.atoms[query];
        let symbol = &graph.symbols[node];
        let matched = query.alternatives.iter().any(|(negated, primitive)| {
            let hit = match primitive {
                Primitive::Any => true,
                Primitive::Symbol(expected) => expected.eq_ignore_ascii_case(symbol),
                Primitive::AtomicNumber(number) => database
                    .get(symbol)
                    .map(|entry| entry.atomic_number == *number)
                    .unwrap_or(false),
            };
            hit != *negated
        });
        matched
            && query
                .hydrogens
                .is_none_or(|count| graph.hydrogen_count(node) == count)
    }

    /// Every embedding of the pattern, as node lists in pattern order.
    pub fn matches(&self, graph: &MolecularGraph, database: &AtomDatabase) -> Vec<Vec<usize>> {
        let mut results = Vec::new();
        if self.atoms.is_empty() || self.atoms.len() > graph.len() {
            return results;
        }
        let mut neighbors = vec![Vec::new(); self.atoms.len()];
        for &(a, b) in &self.bonds {
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
        let mut assignment: Vec<Option<usize>> = vec![None; self.atoms.len()];
        let mut used = vec![false; graph.len()];
        self.extend(0, graph, database, &neighbors, &mut assignment, &mut used, &mut results);
        results
    }

    #[allow(clippy::too_many_arguments)]
    fn extend(
        &self,
        query: usize,
        graph: &MolecularGraph,
        database: &AtomDatabase,
        neighbors: &[Vec<usize>],
        assignment: &mut Vec<Option<usize>>,
        used: &mut Vec<bool>,
        results: &mut Vec<Vec<usize>>,
    ) {
        if query == self.atoms.len() {
            results.push(assignment.iter().flatten().copied().collect());
            return;
        }
        for node in 0..graph.len() {
            if used[node] || !self.atom_matches(query, graph, node, database) {
                continue;
            }
            let consistent = neighbors[query].iter().all(|&other| match assignment[other] {
                Some(mapped) => graph.adjacency[node].contains(&mapped),
                None => true,
            });
            if !consistent {
                continue;
            }
            assignment[query] = Some(node);
            used[node] = true;
            self.extend(query + 1, graph, database, neighbors, assignment, used, results);
            used[node] = false;
            assignment[query] = None;
        }
    }

    /// True when the pattern covers `graph` exactly with the same bonds.
    pub fn is_isomorphic_to(&self, graph: &MolecularGraph, database: &AtomDatabase) -> bool {
        let pattern_edges = self.bonds.len();
        let graph_edges: usize = graph.adjacency.iter().map(Vec::len).sum::<usize>() / 2;
        self.atoms.len() == graph.len()
            && pattern_edges == graph_edges
            && !self.matches(graph, database).is_empty()
    }
}

fn parse_bracket(body: &str, database: &AtomDatabase) -> Result<AtomQuery, SmartsError> {
    let mut alternatives = Vec::new();
    let mut hydrogens = None;
    for clause in body.split(';') {
        for term in clause.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (negated, term) = match term.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, term),
            };
            if let Some(number) = term.strip_prefix('#') {
                let number = number
                    .parse()
                    .map_err(|_| SmartsError::UnknownElement(term.to_string()))?;
                alternatives.push((negated, Primitive::AtomicNumber(number)));
            } else if term == "*" {
                alternatives.push((negated, Primitive::Any));
            } else if let Some(count) = term.strip_prefix('H').filter(|rest| {
                !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) && !alternatives.is_empty()
            }) {
                hydrogens = count.parse().ok();
            } else {
                let symbol_end = term
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| !c.is_ascii_lowercase())
                    .map(|(index, _)| index)
                    .unwrap_or(term.len());
                let symbol = &term[..symbol_end];
                let canonical = database
                    .get(symbol)
                    .map(|entry| entry.symbol.clone())
                    .map_err(|_| SmartsError::UnknownElement(symbol.to_string()))?;
                alternatives.push((negated, Primitive::Symbol(canonical)));
                let rest = &term[symbol_end..];
                if let Some(count) = rest.strip_prefix('H') {
                    hydrogens = Some(if count.is_empty() { 1 } else {
                        count
                            .parse()
                            .map_err(|_| SmartsError::UnknownElement(term.to_string()))?
                    });
                }
            }
        }
    }
    if alternatives.is_empty() {
        alternatives.push((false, Primitive::Any));
    }
    Ok(AtomQuery {
        alternatives,
        hydrogens,
    })
}

/// Atom indices taking part in any match of `pattern`.
pub fn get_substructure_matches(
    system: &ChemicalSystem,
    pattern: &str,
    database: &AtomDatabase,
) -> Result<BTreeSet<usize>, SmartsError> {
    let pattern = SubstructurePattern::parse(pattern, database)?;
    let atoms: Vec<AtomId> = system.atom_ids().collect();
    let graph = MolecularGraph::from_system(system, &atoms);
    Ok(pattern
        .matches(&graph, database)
        .into_iter()
        .flatten()
        .collect())
}

pub fn has_substructure_match(
    system: &ChemicalSystem,
    pattern: &str,
    database: &AtomDatabase,
) -> Result<bool, SmartsError> {
    Ok(!get_substructure_matches(system, pattern, database)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{
        MolecularGraph, SmartsError, SubstructurePattern, get_substructure_matches,
        has_substructure_match,
    };
    use crate::chemistry::{ChemicalEntity, ChemicalSystem, FragmentSpec};
    use crate::database::Databases;

    fn methanol_and_water() -> (ChemicalSystem, Databases) {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("mix");
        for code in ["MOH", "WAT"] {
            system
                .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new(code)), &databases)
                .expect("molecule");
        }
        (system, databases)
    }

    #[test]
    fn hydroxyl_pattern_finds_both_oxygens() {
        let (system, databases) = methanol_and_water();
        let oxygens = get_substructure_matches(&system, "[OH1]C", &databases.atoms).expect("match");
        assert_eq!(oxygens.len(), 2);
        assert!(has_substructure_match(&system, "[O;H2]", &databases.atoms).expect("water"));
        assert!(!has_substructure_match(&system, "N", &databases.atoms).expect("no nitrogen"));
        let any_h = get_substructure_matches(&system, "[#1]", &databases.atoms).expect("hydrogens");
        assert_eq!(any_h.len(), 6);
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        let databases = Databases::builtin().expect("databases");
        assert_eq!(
            SubstructurePattern::parse("C(C", &databases.atoms).expect_err("branch"),
            SmartsError::UnbalancedBranch(1)
        );
        assert_eq!(
            SubstructurePattern::parse("C1CC", &databases.atoms).expect_err("ring"),
            SmartsError::OpenRing(1)
        );
        assert!(SubstructurePattern::parse("[Qq]", &databases.atoms).is_err());
        assert_eq!(
            SubstructurePattern::parse("", &databases.atoms).expect_err("empty"),
            SmartsError::Empty
        );
    }

    #[test]
    fn ring_closure_requires_a_cycle() {
        let databases = Databases::builtin().expect("databases");
        let mut triangle = MolecularGraph::default();
        let a = triangle.add_node("C");
        let b = triangle.add_node("C");
        let c = triangle.add_node("C");
        triangle.add_edge(a, b);
        triangle.add_edge(b, c);
        let chain = SubstructurePattern::parse("C1CC1", &databases.atoms).expect("pattern");
        assert!(chain.matches(&triangle, &databases.atoms).is_empty());
        triangle.add_edge(c, a);
        assert_eq!(chain.matches(&triangle, &databases.atoms).len(), 6);
        let exact = SubstructurePattern::from_graph(&triangle);
        assert!(exact.is_isomorphic_to(&triangle, &databases.atoms));
    }
}
