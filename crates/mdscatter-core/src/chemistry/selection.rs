//! Textual atom selections.
//!
//! ```text
//! expr    := term (("or" | "and") term)*
//! term    := "not" term | "(" expr ")" | keyword values*
//! ```
//!
//! `and` and `or` share one precedence level and associate left to right.

use super::substructure::{SmartsError, get_substructure_matches};
use super::system::{AtomId, ChemicalSystem, EntityKind};
use crate::database::AtomDatabase;
use std::collections::BTreeSet;

pub const SELECTION_KEYWORDS: [&str; 16] = [
    "all",
    "atom_index",
    "atom_name",
    "element",
    "group",
    "molecule",
    "molecule_index",
    "residue",
    "macromolecule",
    "backbone",
    "sidechain",
    "nucleotide_base",
    "nucleotide_sugar",
    "nucleotide_phosphate",
    "ghost",
    "substructure",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("empty selection expression")]
    Empty,
    #[error("selection ended unexpectedly")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown selection keyword '{0}'")]
    UnknownKeyword(String),
    #[error("'{keyword}' expects values")]
    MissingValues { keyword: String },
    #[error("invalid index '{0}'")]
    InvalidIndex(String),
    #[error("atom index {index} is out of range for {n_atoms} atoms")]
    IndexOutOfRange { index: usize, n_atoms: usize },
    #[error("unknown macromolecule type '{0}'")]
    UnknownMacromolecule(String),
    #[error(transparent)]
    Substructure(#[from] SmartsError),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Word(String),
}

fn tokenize(expression: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    // the word after `substructure` is a pattern and keeps its own parentheses
    let mut pattern_depth: Option<usize> = None;
    let flush = |word: &mut String, tokens: &mut Vec<Token>, pattern_depth: &mut Option<usize>| {
        if word.is_empty() {
            return;
        }
        let is_keyword = word.eq_ignore_ascii_case("substructure");
        tokens.push(Token::Word(std::mem::take(word)));
        *pattern_depth = is_keyword.then_some(0);
    };
    for c in expression.chars() {
        if let Some(depth) = pattern_depth {
            match c {
                c if c.is_whitespace() && word.is_empty() => {}
                c if c.is_whitespace() => flush(&mut word, &mut tokens, &mut pattern_depth),
                '(' => {
                    pattern_depth = Some(depth + 1);
                    word.push(c);
                }
                ')' if depth > 0 => {
                    pattern_depth = Some(depth - 1);
                    word.push(c);
                }
                ')' => {
                    flush(&mut word, &mut tokens, &mut pattern_depth);
                    pattern_depth = None;
                    tokens.push(Token::Close);
                }
                _ => word.push(c),
            }
            continue;
        }
        match c {
            '(' => {
                flush(&mut word, &mut tokens, &mut pattern_depth);
                tokens.push(Token::Open);
            }
            ')' => {
                flush(&mut word, &mut tokens, &mut pattern_depth);
                tokens.push(Token::Close);
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens, &mut pattern_depth),
            _ => word.push(c),
        }
    }
    flush(&mut word, &mut tokens, &mut pattern_depth);
    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    All,
    Keyword { keyword: String, values: Vec<String> },
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expression(&mut self) -> Result<Node, SelectionError> {
        let mut node = self.term()?;
        while let Some(Token::Word(word)) = self.peek() {
            let operator = word.to_ascii_lowercase();
            if operator != "and" && operator != "or" {
                return Err(SelectionError::UnexpectedToken(word.clone()));
            }
            self.position += 1;
            let right = self.term()?;
            node = if operator == "and" {
                Node::And(Box::new(node), Box::new(right))
            } else {
                Node::Or(Box::new(node), Box::new(right))
            };
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, SelectionError> {
        match self.next() {
            None => Err(SelectionError::UnexpectedEnd),
            Some(Token::Close) => Err(SelectionError::UnexpectedToken(")".to_string())),
            Some(Token::Open) => {
                let node = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(node),
                    Some(Token::Open) => Err(SelectionError::UnexpectedToken("(".to_string())),
                    Some(Token::Word(word)) => Err(SelectionError::UnexpectedToken(word)),
                    None => Err(SelectionError::UnexpectedEnd),
                }
            }
            Some(Token::Word(word)) => {
                let keyword = word.to_ascii_lowercase();
                if keyword == "not" {
                    return Ok(Node::Not(Box::new(self.term()?)));
                }
                if !SELECTION_KEYWORDS.contains(&keyword.as_str()) {
                    return Err(SelectionError::UnknownKeyword(word));
                }
                if keyword == "all" {
                    return Ok(Node::All);
                }
                let mut values = Vec::new();
                while let Some(Token::Word(value)) = self.peek() {
                    let lowered = value.to_ascii_lowercase();
                    if lowered == "and" || lowered == "or" {
                        break;
                    }
                    if keyword == "substructure" {
                        values.push(value.clone());
                    } else {
                        values.extend(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|v| !v.is_empty())
                                .map(str::to_string),
                        );
                    }
                    self.position += 1;
                }
                let takes_no_values = matches!(
                    keyword.as_str(),
                    "backbone"
                        | "sidechain"
                        | "nucleotide_base"
                        | "nucleotide_sugar"
                        | "nucleotide_phosphate"
                        | "ghost"
                );
                if values.is_empty() && !takes_no_values {
                    return Err(SelectionError::MissingValues { keyword });
                }
                Ok(Node::Keyword { keyword, values })
            }
        }
    }
}

/// A parsed selection that can be evaluated against any system.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    expression: String,
    root: Node,
}

impl Selection {
    pub fn parse(expression: &str) -> Result<Self, SelectionError> {
        let tokens = tokenize(expression);
        if tokens.is_empty() {
            return Err(SelectionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let root = parser.expression()?;
        if let Some(token) = parser.next() {
            let text = match token {
                Token::Open => "(".to_string(),
                Token::Close => ")".to_string(),
                Token::Word(word) => word,
            };
            return Err(SelectionError::UnexpectedToken(text));
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            root,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn select(
        &self,
        system: &ChemicalSystem,
        database: &AtomDatabase,
    ) -> Result<BTreeSet<usize>, SelectionError> {
        evaluate(&self.root, system, database)
    }
}

/// Parses and evaluates in one go.
pub fn select_atoms(
    expression: &str,
    system: &ChemicalSystem,
    database: &AtomDatabase,
) -> Result<BTreeSet<usize>, SelectionError> {
    Selection::parse(expression)?.select(system, database)
}

fn parse_indices(values: &[String]) -> Result<Vec<usize>, SelectionError> {
    let mut indices = Vec::new();
    for value in values {
        let parse = |text: &str| {
            text.trim()
                .parse::<usize>()
                .map_err(|_| SelectionError::InvalidIndex(value.clone()))
        };
        match value.split_once('-') {
            Some((first, last)) => {
                let (first, last) = (parse(first)?, parse(last)?);
                if last < first {
                    return Err(SelectionError::InvalidIndex(value.clone()));
                }
                indices.extend(first..=last);
            }
            None => indices.push(parse(value)?),
        }
    }
    Ok(indices)
}

fn atoms_of(system: &ChemicalSystem, entities: impl Iterator<Item = super::system::EntityId>) -> BTreeSet<usize> {
    entities
        .filter_map(|entity| system.atom_list(entity).ok())
        .flatten()
        .map(|atom| atom.0)
        .collect()
}

fn with_role(system: &ChemicalSystem, role: &str) -> BTreeSet<usize> {
    system
        .atoms()
        .iter()
        .filter(|atom| atom.role.as_deref() == Some(role))
        .map(|atom| atom.index.0)
        .collect()
}

fn evaluate(
    node: &Node,
    system: &ChemicalSystem,
    database: &AtomDatabase,
) -> Result<BTreeSet<usize>, SelectionError> {
    let every = || -> BTreeSet<usize> { (0..system.total_number_of_atoms()).collect() };
    Ok(match node {
        Node::All => every(),
        Node::Not(inner) => {
            let excluded = evaluate(inner, system, database)?;
            every().difference(&excluded).copied().collect()
        }
        Node::And(left, right) => {
            let left = evaluate(left, system, database)?;
            let right = evaluate(right, system, database)?;
            left.intersection(&right).copied().collect()
        }
        Node::Or(left, right) => {
            let mut left = evaluate(left, system, database)?;
            left.extend(evaluate(right, system, database)?);
            left
        }
        Node::Keyword { keyword, values } => match keyword.as_str() {
            "atom_index" => {
                let n_atoms = system.total_number_of_atoms();
                let mut selected = BTreeSet::new();
                for index in parse_indices(values)? {
                    if index >= n_atoms {
                        return Err(SelectionError::IndexOutOfRange { index, n_atoms });
                    }
                    selected.insert(index);
                }
                selected
            }
            "atom_name" => system
                .atoms()
                .iter()
                .filter(|atom| values.iter().any(|v| v == &atom.name))
                .map(|atom| atom.index.0)
                .collect(),
            "element" => system
                .atoms()
                .iter()
                .filter(|atom| {
                    values.iter().any(|v| {
                        v.eq_ignore_ascii_case(&atom.symbol)
                            || database
                                .get(v)
                                .is_ok_and(|entry| entry.symbol == atom.symbol)
                    })
                })
                .map(|atom| atom.index.0)
                .collect(),
            "group" => values
                .iter()
                .flat_map(|group| system.atoms_in_group(group))
                .map(|atom| atom.0)
                .collect(),
            "molecule" => atoms_of(
                system,
                system
                    .top_level_of_kind(EntityKind::Molecule)
                    .into_iter()
                    .filter(|id| {
                        let entity = &system.entities()[id.0];
                        values.iter().any(|v| {
                            v == &entity.name || entity.code.as_deref() == Some(v.as_str())
                        })
                    }),
            ),
            "molecule_index" => {
                let wanted = parse_indices(values)?;
                atoms_of(
                    system,
                    system
                        .top_level_entities()
                        .iter()
                        .enumerate()
                        .filter(|(position, _)| wanted.contains(position))
                        .map(|(_, id)| *id),
                )
            }
            "residue" => atoms_of(
                system,
                system.entities().iter().filter(|entity| {
                    entity.kind == EntityKind::Residue
                        && values.iter().any(|v| {
                            v == &entity.name || entity.code.as_deref() == Some(v.as_str())
                        })
                })
                .map(|entity| entity.id),
            ),
            "macromolecule" => {
                let mut kinds = Vec::new();
                for value in values {
                    let kind = match value.as_str() {
                        "protein" => EntityKind::Protein,
                        "peptide_chain" => EntityKind::PeptideChain,
                        "nucleotide_chain" => EntityKind::NucleotideChain,
                        other => return Err(SelectionError::UnknownMacromolecule(other.to_string())),
                    };
                    kinds.push(kind);
                }
                atoms_of(
                    system,
                    system
                        .top_level_entities()
                        .iter()
                        .copied()
                        .filter(|id| kinds.contains(&system.entities()[id.0].kind)),
                )
            }
            "backbone" => with_role(system, "backbone"),
            "sidechain" => with_role(system, "sidechain"),
            "nucleotide_base" => with_role(system, "base"),
            "nucleotide_sugar" => with_role(system, "sugar"),
            "nucleotide_phosphate" => with_role(system, "phosphate"),
            "ghost" => system
                .atoms()
                .iter()
                .filter(|atom| atom.ghost)
                .map(|atom| atom.index.0)
                .collect(),
            "substructure" => {
                let mut selected = BTreeSet::new();
                for pattern in values {
                    selected.extend(get_substructure_matches(system, pattern, database)?);
                }
                selected
            }
            other => return Err(SelectionError::UnknownKeyword(other.to_string())),
        },
    })
}

/// Selected indices as sorted atom ids.
pub fn selected_ids(indices: &BTreeSet<usize>) -> Vec<AtomId> {
    indices.iter().map(|&index| AtomId(index)).collect()
}

#[cfg(test)]
mod tests {
    use super::{Selection, SelectionError, select_atoms};
    use crate::chemistry::{ChainSpec, ChemicalEntity, ChemicalSystem, FragmentSpec};
    use crate::database::Databases;
    use std::collections::BTreeSet;

    fn system() -> (ChemicalSystem, Databases) {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("mixed");
        system
            .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new("WAT")), &databases)
            .expect("water");
        system
            .add_chemical_entity(
                ChemicalEntity::PeptideChain(ChainSpec {
                    name: "A".to_string(),
                    fragments: vec![
                        FragmentSpec::new("GLY").with_variant("NT1"),
                        FragmentSpec::new("ALA").with_variant("CT1"),
                    ],
                }),
                &databases,
            )
            .expect("chain");
        system
            .add_chemical_entity(ChemicalEntity::Molecule(FragmentSpec::new("MOH")), &databases)
            .expect("methanol");
        (system, databases)
    }

    #[test]
    fn keywords_combine_with_boolean_operators() {
        let (system, databases) = system();
        let n = system.total_number_of_atoms();
        assert_eq!(select_atoms("all", &system, &databases.atoms).expect("all").len(), n);
        let indices = select_atoms("atom_index 0,2, 4-5", &system, &databases.atoms).expect("index");
        assert_eq!(indices, BTreeSet::from([0, 2, 4, 5]));

        let water = select_atoms("molecule WAT", &system, &databases.atoms).expect("water");
        assert_eq!(water, BTreeSet::from([0, 1, 2]));
        let hydrogens = select_atoms("element H and not molecule WAT", &system, &databases.atoms)
            .expect("hydrogens");
        assert!(hydrogens.iter().all(|&i| i > 2));
        let union = select_atoms("(molecule_index 0 or molecule_index 2) and element O", &system, &databases.atoms)
            .expect("oxygens");
        assert_eq!(union.len(), 2);

        let sidechain = select_atoms("sidechain", &system, &databases.atoms).expect("sidechain");
        assert_eq!(sidechain.len(), 4);
        let protein = select_atoms("macromolecule peptide_chain", &system, &databases.atoms)
            .expect("protein");
        assert!(sidechain.is_subset(&protein));
    }

    #[test]
    fn substructure_patterns_keep_their_parentheses() {
        let (system, databases) = system();
        let hydroxyl = select_atoms("substructure [OH1]C", &system, &databases.atoms).expect("smarts");
        assert_eq!(hydroxyl.len(), 2);
        let carbonyl = select_atoms("substructure C(=O)N", &system, &databases.atoms).expect("amide");
        assert_eq!(carbonyl.len(), 3);
    }

    #[test]
    fn errors_are_reported() {
        let (system, databases) = system();
        assert_eq!(Selection::parse("   ").expect_err("empty"), SelectionError::Empty);
        assert!(matches!(
            Selection::parse("colour red").expect_err("keyword"),
            SelectionError::UnknownKeyword(_)
        ));
        assert!(matches!(
            Selection::parse("(all").expect_err("paren"),
            SelectionError::UnexpectedEnd
        ));
        assert!(matches!(
            select_atoms("atom_index 500", &system, &databases.atoms).expect_err("range"),
            SelectionError::IndexOutOfRange { index: 500, .. }
        ));
        assert!(matches!(
            select_atoms("atom_index x", &system, &databases.atoms).expect_err("index"),
            SelectionError::InvalidIndex(_)
        ));
    }
}
