//! Pair distribution function g(r) split into intra- and intermolecular
//! contributions.
//!
//! Each step histograms the minimum-image distances of every selected pair
//! in one frame. The reduction divides the counts by the number of frames,
//! the number of pairs and the ideal-gas shell population
//! `shell_volume / mean_volume`, so that g(r) tends to one at large r.

use super::common;
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::AnalysisResult;
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::RadialBins;
use crate::numerics::linalg::{norm, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;
use std::collections::BTreeMap;
use std::f64::consts::PI;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "PairDistributionFunction",
        label: "Pair Distribution Function",
        category: &["Analysis", "Structure"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(PairDistribution::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new("r_values", SettingKind::DistHistCutoff, json!([0.0, 1.0, 0.01]))
            .with_label("r values (nm)"),
        common::atom_selection(),
        common::atom_transmutation(),
        common::weights("b_coherent"),
        common::output_files(),
        common::running_mode(),
    ]
}

/// Selected atoms with their species and molecule, shared by the distance
/// histogram kernels.
#[derive(Debug, Clone)]
pub(crate) struct PairSet {
    pub(crate) atoms: Vec<usize>,
    /// Index into `names` for every selected atom.
    pub(crate) species: Vec<usize>,
    /// Top-level entity of every selected atom.
    pub(crate) molecules: Vec<usize>,
    pub(crate) names: Vec<String>,
    pub(crate) counts: Vec<usize>,
}

impl PairSet {
    pub(crate) fn from_config(context: &JobContext<'_>, trajectory: &Trajectory) -> AnalysisResult<Self> {
        let selection = context.config.atom_selection("atom_selection")?;
        let names = selection.unique_names.clone();
        let name_map = selection.name_map();
        let top_level = trajectory.chemical_system().top_level_index_map();
        let atoms = selection.flat_indices();
        let species: Vec<usize> = atoms
            .iter()
            .map(|atom| {
                let name = name_map.get(atom).copied().unwrap_or_default();
                names.iter().position(|candidate| candidate == name).unwrap_or(0)
            })
            .collect();
        let mut counts = vec![0; names.len()];
        for &s in &species {
            counts[s] += 1;
        }
        Ok(Self {
            molecules: atoms.iter().map(|&atom| top_level.get(atom).copied().unwrap_or(atom)).collect(),
            atoms,
            species,
            names,
            counts,
        })
    }

    pub(crate) fn n_species(&self) -> usize {
        self.names.len()
    }

    /// Species pairs `(s, t)` with `s <= t`, in output order.
    pub(crate) fn pairs(&self) -> Vec<(usize, usize)> {
        let n = self.n_species();
        (0..n).flat_map(|s| (s..n).map(move |t| (s, t))).collect()
    }

    pub(crate) fn slot(&self, a: usize, b: usize) -> usize {
        let (s, t) = (self.species[a].min(self.species[b]), self.species[a].max(self.species[b]));
        s * self.n_species() + t
    }

    pub(crate) fn pair_key(&self, s: usize, t: usize) -> (String, String) {
        common::ordered_pair(&self.names[s], &self.names[t])
    }

    /// Unordered pairs between species `s` and `t`.
    pub(crate) fn pair_count(&self, s: usize, t: usize) -> f64 {
        let (ni, nj) = (self.counts[s] as f64, self.counts[t] as f64);
        if s == t { ni * (ni - 1.0) / 2.0 } else { ni * nj }
    }

    pub(crate) fn natoms(&self) -> BTreeMap<String, usize> {
        self.names.iter().cloned().zip(self.counts.iter().copied()).collect()
    }
}

struct DistanceHistogramKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    pairs: PairSet,
    bins: RadialBins,
}

impl StepKernel for DistanceHistogramKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let coordinates = self.trajectory.coordinates(frame)?;
        let cell = common::frame_cell(&self.trajectory, frame, None)?;
        let n_bins = self.bins.len();
        let size = self.pairs.n_species() * self.pairs.n_species() * n_bins;
        let mut intra = vec![0.0; size];
        let mut inter = vec![0.0; size];
        let atoms = &self.pairs.atoms;
        for a in 0..atoms.len() {
            for b in a + 1..atoms.len() {
                let distance = norm(cell.min_image(sub(coordinates[atoms[b]], coordinates[atoms[a]])));
                let Some(bin) = self.bins.bin(distance) else {
                    continue;
                };
                let slot = self.pairs.slot(a, b) * n_bins + bin;
                if self.pairs.molecules[a] == self.pairs.molecules[b] {
                    intra[slot] += 1.0;
                } else {
                    inter[slot] += 1.0;
                }
            }
        }
        Ok(StepPayload::new()
            .with("intra", intra)
            .with("inter", inter)
            .with_scalar("volume", cell.volume()))
    }
}

#[derive(Default)]
struct PairDistribution {
    pairs: Option<PairSet>,
    bins: Option<RadialBins>,
    midpoints: Vec<f64>,
    intra: Vec<f64>,
    inter: Vec<f64>,
    volume: f64,
    n_frames: usize,
}

impl Analysis for PairDistribution {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        common::require_periodic(&trajectory, "PairDistributionFunction")?;
        let frames = context.config.frames("frames")?;
        let range = context.config.range("r_values")?;
        let bins = common::range_bins("r_values", range)?;
        let pairs = PairSet::from_config(context, &trajectory)?;
        let size = pairs.n_species() * pairs.n_species() * bins.len();
        self.intra = vec![0.0; size];
        self.inter = vec![0.0; size];
        self.midpoints = range.midpoints.clone();
        self.n_frames = frames.number;
        self.bins = Some(bins.clone());
        self.pairs = Some(pairs.clone());
        Ok(JobPlan::new(
            frames.number,
            DistanceHistogramKernel {
                trajectory,
                frames: frames.value.clone(),
                pairs,
                bins,
            },
        ))
    }

    fn combine(&mut self, _index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        for (total, value) in self.intra.iter_mut().zip(payload.take("intra")?) {
            *total += value;
        }
        for (total, value) in self.inter.iter_mut().zip(payload.take("inter")?) {
            *total += value;
        }
        self.volume += payload.scalar("volume")?;
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let (Some(pairs), Some(bins)) = (&self.pairs, &self.bins) else {
            return Err(crate::AnalysisError::internal("JOB.STATE", "finalize before initialize"));
        };
        let n_bins = bins.len();
        let mean_volume = self.volume / self.n_frames.max(1) as f64;
        let shells = bins.shell_volumes();
        let weights = context.config.weights("weights")?.pair_weights(&pairs.natoms());

        let mut output = OutputData::new();
        output.add_data("r", VariableKind::Line, &[n_bins], self.midpoints.clone(), "", "nm")?;
        let mut total = vec![0.0; n_bins];
        let mut total_intra = vec![0.0; n_bins];
        let mut total_inter = vec![0.0; n_bins];
        for (s, t) in pairs.pairs() {
            let count = pairs.pair_count(s, t);
            let offset = (s * pairs.n_species() + t) * n_bins;
            let normalize = |histogram: &[f64]| -> Vec<f64> {
                (0..n_bins)
                    .map(|bin| {
                        let ideal = self.n_frames as f64 * count * shells[bin] / mean_volume;
                        if ideal > 0.0 { histogram[offset + bin] / ideal } else { 0.0 }
                    })
                    .collect()
            };
            let intra = normalize(&self.intra);
            let inter = normalize(&self.inter);
            let pdf: Vec<f64> = intra.iter().zip(&inter).map(|(a, b)| a + b).collect();
            let key = pairs.pair_key(s, t);
            let weight = weights.get(&key).copied().unwrap_or(0.0);
            for bin in 0..n_bins {
                total[bin] += weight * pdf[bin];
                total_intra[bin] += weight * intra[bin];
                total_inter[bin] += weight * inter[bin];
            }
            let label = common::pair_label(&key);
            output
                .add_data(&format!("pdf_intra_{label}"), VariableKind::Line, &[n_bins], intra, "r", "au")?
                .partial_result = true;
            output
                .add_data(&format!("pdf_inter_{label}"), VariableKind::Line, &[n_bins], inter, "r", "au")?
                .partial_result = true;
            output
                .add_data(&format!("pdf_{label}"), VariableKind::Line, &[n_bins], pdf, "r", "au")?
                .partial_result = true;
        }

        let density = pairs.atoms.len() as f64 / mean_volume;
        let rdf = self
            .midpoints
            .iter()
            .zip(&total)
            .map(|(r, g)| 4.0 * PI * r * r * density * g)
            .collect();
        let tcf = self
            .midpoints
            .iter()
            .zip(&total)
            .map(|(r, g)| 4.0 * PI * r * density * (g - 1.0))
            .collect();
        output.add_data("pdf_total", VariableKind::Line, &[n_bins], total, "r", "au")?.main_result = true;
        output.add_data("pdf_intra_total", VariableKind::Line, &[n_bins], total_intra, "r", "au")?;
        output.add_data("pdf_inter_total", VariableKind::Line, &[n_bins], total_inter, "r", "au")?;
        output.add_data("rdf_total", VariableKind::Line, &[n_bins], rdf, "r", "1/nm")?;
        output.add_data("tcf_total", VariableKind::Line, &[n_bins], tcf, "r", "1/nm2")?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{parameters, run, write_mock, write_trajectory};
    use crate::chemistry::{AtomSpec, ChemicalEntity, ChemicalSystem};
    use crate::configuration::UnitCell;
    use crate::database::Databases;
    use serde_json::json;
    use std::f64::consts::PI;

    #[test]
    fn lattice_shells_integrate_to_coordination_numbers() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_mock(
            &directory.path().join("argon.json"),
            json!({"element": "Ar", "lattice_constant": 0.5, "repeats": [4, 4, 4], "n_frames": 3, "time_step": 1.0}),
        );
        let output = run(
            "PairDistributionFunction",
            &parameters(&path, json!({"r_values": [0.0, 0.8, 0.04]})),
        );
        let r = &output.get("r").expect("r").data;
        let g = &output.get("pdf_total").expect("pdf").data;
        assert_eq!(r.len(), 19);
        let density = 64.0 / 8.0;
        let population = |limit: f64| -> f64 {
            (0..r.len())
                .filter(|&bin| r[bin] < limit)
                .map(|bin| {
                    let (inner, outer) = (bin as f64 * 0.04, (bin + 1) as f64 * 0.04);
                    g[bin] * density * 4.0 * PI / 3.0 * (outer.powi(3) - inner.powi(3))
                })
                .sum()
        };
        assert!((population(0.6) - 6.0 * 64.0 / 63.0).abs() < 1e-9);
        assert!((population(0.76) - 18.0 * 64.0 / 63.0).abs() < 1e-9);
        let first_shell = g.iter().position(|&value| value > 0.0).expect("first shell");
        assert!((r[first_shell] - 0.5).abs() < 0.04);
        assert_eq!(output.get("pdf_intra_total").expect("intra").data.iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn bonded_pairs_count_as_intramolecular() {
        let databases = Databases::builtin().expect("databases");
        let mut system = ChemicalSystem::new("dimers");
        for index in 0..2 {
            let atoms = vec![
                AtomSpec::new("H", "H1").bonded_to(&["H2"]),
                AtomSpec::new("H", "H2").bonded_to(&["H1"]),
            ];
            system
                .add_chemical_entity(
                    ChemicalEntity::AtomCluster {
                        name: format!("dimer{index}"),
                        atoms,
                    },
                    &databases,
                )
                .expect("dimer");
        }
        let frame = vec![[1.0, 1.0, 1.0], [1.1, 1.0, 1.0], [1.0, 1.5, 1.0], [1.1, 1.5, 1.0]];
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(
            &directory.path().join("dimers.mdt"),
            &system,
            &[frame],
            Some(UnitCell::cubic(4.0).expect("cell")),
            1.0,
        );
        let output = run(
            "PairDistributionFunction",
            &parameters(&path, json!({"r_values": [0.0, 0.8, 0.04], "weights": "equal"})),
        );
        let intra = &output.get("pdf_intra_H_H").expect("intra").data;
        let inter = &output.get("pdf_inter_H_H").expect("inter").data;
        let nonzero = |values: &[f64]| -> Vec<usize> { (0..values.len()).filter(|&i| values[i] > 0.0).collect() };
        // 0.1 nm bonds and 0.5 nm between the dimers
        assert_eq!(nonzero(intra), vec![2]);
        assert_eq!(nonzero(inter), vec![12]);
        let sum: Vec<f64> = intra.iter().zip(inter).map(|(a, b)| a + b).collect();
        assert_eq!(output.get("pdf_H_H").expect("pdf").data, sum);
    }
}
