//! Rebuilds the chemical system from geometry: bonds from covalent radii,
//! molecules from connected components, then a new trajectory over it.
//!
//! A component whose bond graph is isomorphic to a molecule template becomes
//! that molecule; anything else becomes an atom cluster named after its
//! formula.

use super::common;
use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem, FragmentSpec, MolecularGraph, SubstructurePattern};
use crate::configuration::{Configuration, UnitCell, contiguous_coordinates};
use crate::configurators::{SettingKind, SettingSpec};
use crate::database::{Databases, FragmentTemplate};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{norm, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;
use std::collections::BTreeMap;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "MoleculeFinder",
        label: "Molecule Finder",
        category: &["Analysis", "Trajectory"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(MoleculeFinder::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new(
            "tolerance",
            SettingKind::Float { minimum: Some(0.0), maximum: None },
            json!(0.04),
        )
        .with_label("bond tolerance (nm)"),
        common::output_files(),
        common::running_mode(),
    ]
}

/// Pairs closer than the sum of their covalent radii plus `tolerance`.
pub(crate) fn infer_bonds(
    symbols: &[String],
    coordinates: &[Vec3],
    cell: Option<&UnitCell>,
    tolerance: f64,
    databases: &Databases,
) -> AnalysisResult<Vec<(usize, usize)>> {
    let radii = symbols
        .iter()
        .map(|symbol| Ok(databases.atoms.get(symbol)?.covalent_radius))
        .collect::<AnalysisResult<Vec<f64>>>()?;
    let mut bonds = Vec::new();
    for i in 0..coordinates.len() {
        for j in i + 1..coordinates.len() {
            let delta = sub(coordinates[j], coordinates[i]);
            let delta = match cell {
                Some(cell) => cell.min_image(delta),
                None => delta,
            };
            if norm(delta) <= radii[i] + radii[j] + tolerance {
                bonds.push((i, j));
            }
        }
    }
    Ok(bonds)
}

/// Connected components ordered by their lowest atom, atoms ascending.
pub(crate) fn connected_components(n_atoms: usize, bonds: &[(usize, usize)]) -> Vec<Vec<usize>> {
    fn root(parents: &mut [usize], mut node: usize) -> usize {
        while parents[node] != node {
            parents[node] = parents[parents[node]];
            node = parents[node];
        }
        node
    }
    let mut parents: Vec<usize> = (0..n_atoms).collect();
    for &(a, b) in bonds {
        let (ra, rb) = (root(&mut parents, a), root(&mut parents, b));
        if ra != rb {
            parents[ra.max(rb)] = ra.min(rb);
        }
    }
    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for atom in 0..n_atoms {
        let r = root(&mut parents, atom);
        components.entry(r).or_default().push(atom);
    }
    components.into_values().collect()
}

/// Hill-order brute formula: C, then H, then the rest alphabetically.
pub(crate) fn brute_formula(symbols: &[&str]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for &symbol in symbols {
        *counts.entry(symbol).or_insert(0) += 1;
    }
    let mut order: Vec<&str> = Vec::new();
    if counts.contains_key("C") {
        order.push("C");
        if counts.contains_key("H") {
            order.push("H");
        }
    }
    let rest: Vec<&str> = counts.keys().copied().filter(|symbol| !order.contains(symbol)).collect();
    order.extend(rest);
    order
        .into_iter()
        .map(|symbol| match counts[symbol] {
            1 => symbol.to_string(),
            n => format!("{symbol}{n}"),
        })
        .collect()
}

fn template_graph(template: &FragmentTemplate, databases: &Databases) -> MolecularGraph {
    let mut graph = MolecularGraph::default();
    let mut position = BTreeMap::new();
    for atom in &template.atoms {
        let symbol = databases
            .atoms
            .get(&atom.symbol)
            .map(|entry| entry.symbol.clone())
            .unwrap_or_else(|_| atom.symbol.clone());
        position.insert(atom.name.as_str(), graph.add_node(&symbol));
    }
    for (index, atom) in template.atoms.iter().enumerate() {
        for partner in &atom.bonds {
            if let Some(&other) = position.get(partner.as_str()) {
                graph.add_edge(index, other);
            }
        }
    }
    graph
}

/// The entity describing one component, atoms in component order.
fn identify(
    symbols: &[&str],
    graph: &MolecularGraph,
    databases: &Databases,
    templates: &[(&FragmentTemplate, MolecularGraph)],
) -> ChemicalEntity {
    if let [symbol] = symbols {
        return ChemicalEntity::Atom(AtomSpec::new(symbol, symbol));
    }
    for (template, pattern_graph) in templates {
        if pattern_graph.len() != graph.len() {
            continue;
        }
        let pattern = SubstructurePattern::from_graph(pattern_graph);
        if !pattern.is_isomorphic_to(graph, &databases.atoms) {
            continue;
        }
        if let Some(embedding) = pattern.matches(graph, &databases.atoms).into_iter().next() {
            let mut names = vec![String::new(); graph.len()];
            for (atom, &node) in template.atoms.iter().zip(&embedding) {
                names[node] = atom.name.clone();
            }
            return ChemicalEntity::Molecule(FragmentSpec::new(&template.code).with_atom_names(names));
        }
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let names: Vec<String> = symbols
        .iter()
        .map(|symbol| {
            let count = seen.entry(*symbol).or_insert(0);
            *count += 1;
            format!("{symbol}{count}")
        })
        .collect();
    let atoms = symbols
        .iter()
        .zip(&names)
        .enumerate()
        .map(|(node, (symbol, name))| {
            let partners: Vec<&str> = graph.adjacency[node].iter().map(|&other| names[other].as_str()).collect();
            AtomSpec::new(symbol, name).bonded_to(&partners)
        })
        .collect();
    ChemicalEntity::AtomCluster {
        name: brute_formula(symbols),
        atoms,
    }
}

/// New system built from `components` of `system`, with bonds between
/// component atoms taken from `bonds`.
pub(crate) fn rebuild_system(
    system: &ChemicalSystem,
    components: &[Vec<usize>],
    bonds: &[(usize, usize)],
    databases: &Databases,
) -> AnalysisResult<ChemicalSystem> {
    let templates: Vec<(&FragmentTemplate, MolecularGraph)> = databases
        .molecules
        .templates()
        .map(|template| (template, template_graph(template, databases)))
        .collect();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); system.atoms().len()];
    for &(a, b) in bonds {
        neighbours[a].push(b);
        neighbours[b].push(a);
    }

    let mut rebuilt = ChemicalSystem::new(system.name());
    for component in components {
        let symbols: Vec<&str> = component.iter().map(|&atom| system.atoms()[atom].symbol.as_str()).collect();
        let local: BTreeMap<usize, usize> = component.iter().enumerate().map(|(node, &atom)| (atom, node)).collect();
        let mut graph = MolecularGraph::default();
        for symbol in &symbols {
            graph.add_node(symbol);
        }
        for (node, &atom) in component.iter().enumerate() {
            for partner in &neighbours[atom] {
                if let Some(&other) = local.get(partner) {
                    graph.add_edge(node, other);
                }
            }
        }
        rebuilt.add_chemical_entity(identify(&symbols, &graph, databases, &templates), databases)?;
    }
    Ok(rebuilt)
}

struct FinderKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    order: Vec<usize>,
    system: ChemicalSystem,
}

impl StepKernel for FinderKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let coordinates = self.trajectory.coordinates(frame)?;
        let reordered: Vec<Vec3> = self.order.iter().map(|&atom| coordinates[atom]).collect();
        let reordered = match self.trajectory.unit_cell(frame)? {
            Some(cell) => contiguous_coordinates(&self.system, &reordered, &cell),
            None => reordered,
        };
        Ok(StepPayload::new().with("coordinates", reordered.concat()))
    }
}

#[derive(Default)]
struct MoleculeFinder {
    trajectory: Option<Trajectory>,
    frames: Vec<usize>,
    times: Vec<f64>,
    writer: Option<common::OrderedFrameWriter>,
    counts: BTreeMap<String, usize>,
}

impl Analysis for MoleculeFinder {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let reference = *frames
            .value
            .first()
            .ok_or_else(|| AnalysisError::job("JOB.SETTING", "setting 'frames': no frame selected"))?;
        let system = trajectory.chemical_system();
        let symbols: Vec<String> = system.atoms().iter().map(|atom| atom.symbol.clone()).collect();
        let cell = trajectory.unit_cell(reference)?;
        let bonds = infer_bonds(
            &symbols,
            &trajectory.coordinates(reference)?,
            cell.as_ref(),
            context.config.float("tolerance")?,
            context.databases,
        )?;
        let components = connected_components(symbols.len(), &bonds);
        let rebuilt = rebuild_system(system, &components, &bonds, context.databases)?;
        tracing::info!(
            bonds = bonds.len(),
            components = components.len(),
            "molecule finder rebuilt the chemical system"
        );

        self.counts.clear();
        for &id in rebuilt.top_level_entities() {
            *self.counts.entry(rebuilt.entity(id)?.name.clone()).or_insert(0) += 1;
        }
        let path = common::trajectory_output_path(context.config.output_files("output_files")?);
        self.writer = Some(common::OrderedFrameWriter::create(&path, &rebuilt, frames.number)?);
        self.frames = frames.value.clone();
        self.times = frames.time.clone();
        self.trajectory = Some(trajectory.clone());
        Ok(JobPlan::new(
            frames.number,
            FinderKernel {
                trajectory,
                frames: frames.value.clone(),
                order: components.concat(),
                system: rebuilt,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        let (Some(trajectory), Some(writer)) = (self.trajectory.as_ref(), self.writer.as_mut()) else {
            return Err(AnalysisError::internal("JOB.STATE", "combine before initialize"));
        };
        let coordinates = payload
            .get("coordinates")?
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let configuration = Configuration::from_coordinates(coordinates, trajectory.unit_cell(self.frames[index])?);
        writer.push(index, configuration, self.times[index])
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        if let Some(mut writer) = self.writer.take() {
            let path = writer.close()?;
            context.log.info(format!("trajectory over the inferred system written to {}", path.display()));
        }
        for (name, count) in &self.counts {
            context.log.info(format!("{name}: {count}"));
        }
        let mut output = OutputData::new();
        let n = self.counts.len();
        output
            .add_data(
                "entity_counts",
                VariableKind::Line,
                &[n],
                self.counts.values().map(|&count| count as f64).collect(),
                "entity",
                "au",
            )?
            .main_result = true;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::{brute_formula, connected_components};
    use crate::analysis::common::testing::{parameters, run, write_trajectory};
    use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem};
    use crate::database::Databases;
    use crate::trajectory::Trajectory;
    use serde_json::json;

    #[test]
    fn components_follow_the_bond_graph() {
        let components = connected_components(5, &[(3, 1), (0, 4)]);
        assert_eq!(components, vec![vec![0, 4], vec![1, 3], vec![2]]);
    }

    #[test]
    fn formulas_use_hill_order() {
        assert_eq!(brute_formula(&["O", "C", "H", "H", "C", "H"]), "C2H3O");
        assert_eq!(brute_formula(&["O", "H", "H"]), "H2O");
        assert_eq!(brute_formula(&["Cl", "Na"]), "ClNa");
    }

    #[test]
    fn scattered_atoms_are_regrouped_into_molecules() {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("loose");
        for (symbol, name) in [("H", "H1"), ("O", "O1"), ("Ar", "Ar1"), ("H", "H2"), ("C", "C1"), ("O", "O2")] {
            system
                .add_chemical_entity(ChemicalEntity::Atom(AtomSpec::new(symbol, name)), &databases)
                .expect("atom");
        }
        let angle = 104.5f64.to_radians();
        let frame = vec![
            [1.0957, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
            [1.0 + 0.0957 * angle.cos(), 1.0 + 0.0957 * angle.sin(), 1.0],
            [3.0, 3.0, 3.0],
            [3.0, 3.0, 3.12],
        ];
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(&directory.path().join("loose.mdt"), &system, &[frame.clone(), frame], None, 1.0);
        let root = directory.path().join("found");
        let output = run(
            "MoleculeFinder",
            &parameters(&path, json!({"output_files": [root.display().to_string(), ["container"]]})),
        );
        assert_eq!(output.get("entity_counts").expect("counts").data.iter().sum::<f64>(), 3.0);

        let found = Trajectory::open(&root.with_extension("mdt"), &databases).expect("trajectory");
        let rebuilt = found.chemical_system();
        assert_eq!(rebuilt.unique_molecules(), vec!["WAT".to_string()]);
        assert_eq!(rebuilt.number_of_molecules("WAT"), 1);
        let names: Vec<&str> = rebuilt
            .top_level_entities()
            .iter()
            .map(|&id| rebuilt.entity(id).expect("entity").name.as_str())
            .collect();
        assert_eq!(names, vec!["WAT", "Ar", "CO"]);
        let coordinates = found.coordinates(1).expect("coordinates");
        assert_eq!(coordinates.len(), 6);
        assert_eq!(coordinates[3], [2.0, 2.0, 2.0]);
        assert_eq!(coordinates[5], [3.0, 3.0, 3.12]);
    }
}
