//! Self and distinct parts of the van Hove correlation function.
//!
//! `G_s(r, τ)` histograms the displacement of each atom over a lag τ,
//! averaged over the starting frames of the correlation window, and is
//! normalized so that `∫ 4π r² G_s dr = 1`. `G_d(r, τ)` histograms the
//! distance between an atom at t and every other atom at t + τ, normalized
//! to one at large r like a pair distribution function.

use super::common;
use super::pair_distribution::PairSet;
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::{AnalysisError, AnalysisResult};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::RadialBins;
use crate::numerics::linalg::{norm, sub};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;
use std::f64::consts::PI;

pub fn self_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "VanHoveFunctionSelf",
        label: "Van Hove Function Self",
        category: &["Analysis", "Dynamics"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || settings("b_incoherent2"),
        factory: || Box::new(VanHoveSelf::default()),
    }
}

pub fn distinct_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "VanHoveFunctionDistinct",
        label: "Van Hove Function Distinct",
        category: &["Analysis", "Dynamics"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || settings("b_coherent"),
        factory: || Box::new(VanHoveDistinct::default()),
    }
}

fn settings(weights: &str) -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::correlation_frames(),
        SettingSpec::new("r_values", SettingKind::Range, json!([0.0, 1.0, 0.01])).with_label("r values (nm)"),
        common::atom_selection(),
        common::atom_transmutation(),
        common::weights(weights),
        common::output_files(),
        common::running_mode(),
    ]
}

fn not_initialized() -> AnalysisError {
    AnalysisError::internal("JOB.STATE", "finalize before initialize")
}

/// Adds the `time` and `r` axes shared by both variants.
fn add_axes(output: &mut OutputData, times: &[f64], midpoints: &[f64]) -> AnalysisResult<()> {
    output.add_data("time", VariableKind::Line, &[times.len()], times.to_vec(), "", "ps")?;
    output.add_data("r", VariableKind::Line, &[midpoints.len()], midpoints.to_vec(), "", "nm")?;
    Ok(())
}

/// `4π r² G(r, τ)` on a `[time, r]` surface.
fn radial_density(values: &[f64], midpoints: &[f64]) -> Vec<f64> {
    let n_bins = midpoints.len();
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let r = midpoints[index % n_bins];
            4.0 * PI * r * r * value
        })
        .collect()
}

struct SelfKernel {
    trajectory: Trajectory,
    atoms: Vec<usize>,
    range: (usize, usize, usize),
    n_frames: usize,
    n_configs: usize,
    bins: RadialBins,
}

impl StepKernel for SelfKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let (first, last, step) = self.range;
        let series = self
            .trajectory
            .read_atomic_trajectory(self.atoms[index], first, last, step, false)?;
        let n_bins = self.bins.len();
        let mut histogram = vec![0.0; self.n_frames * n_bins];
        for lag in 0..self.n_frames {
            for start in 0..self.n_configs {
                let Some(end) = series.get(start + lag) else {
                    continue;
                };
                if let Some(bin) = self.bins.bin(norm(sub(*end, series[start]))) {
                    histogram[lag * n_bins + bin] += 1.0;
                }
            }
        }
        Ok(StepPayload::new().with("histogram", histogram))
    }
}

#[derive(Default)]
struct VanHoveSelf {
    pairs: Option<PairSet>,
    bins: Option<RadialBins>,
    times: Vec<f64>,
    midpoints: Vec<f64>,
    n_configs: usize,
    /// `[species][time][r]`
    histograms: Vec<Vec<f64>>,
}

impl Analysis for VanHoveSelf {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let range = context.config.range("r_values")?;
        let bins = common::range_bins("r_values", range)?;
        let pairs = PairSet::from_config(context, &trajectory)?;
        self.histograms = vec![vec![0.0; frames.n_frames * bins.len()]; pairs.n_species()];
        self.times = frames.duration[..frames.n_frames].to_vec();
        self.midpoints = range.midpoints.clone();
        self.n_configs = frames.n_configs;
        self.bins = Some(bins.clone());
        self.pairs = Some(pairs.clone());
        Ok(JobPlan::new(
            pairs.atoms.len(),
            SelfKernel {
                trajectory,
                atoms: pairs.atoms,
                range: (frames.first, frames.last, frames.step),
                n_frames: frames.n_frames,
                n_configs: frames.n_configs,
                bins,
            },
        ))
    }

    fn combine(&mut self, index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        let species = self.pairs.as_ref().ok_or_else(not_initialized)?.species[index];
        for (total, value) in self.histograms[species].iter_mut().zip(payload.take("histogram")?) {
            *total += value;
        }
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let (Some(pairs), Some(bins)) = (&self.pairs, &self.bins) else {
            return Err(not_initialized());
        };
        let shells = bins.shell_volumes();
        let n_bins = bins.len();
        let n_frames = self.times.len();
        let weights = context.config.weights("weights")?.atom_weights(&pairs.natoms());

        let mut output = OutputData::new();
        add_axes(&mut output, &self.times, &self.midpoints)?;
        let mut total = vec![0.0; n_frames * n_bins];
        for (species, name) in pairs.names.iter().enumerate() {
            let count = (pairs.counts[species] * self.n_configs) as f64;
            let values: Vec<f64> = self.histograms[species]
                .iter()
                .enumerate()
                .map(|(index, value)| value / (count * shells[index % n_bins]))
                .collect();
            let weight = weights.get(name).copied().unwrap_or(0.0);
            for (slot, value) in total.iter_mut().zip(&values) {
                *slot += weight * value;
            }
            output
                .add_data(
                    &format!("4_pi_r2_g_self_{name}"),
                    VariableKind::Surface,
                    &[n_frames, n_bins],
                    radial_density(&values, &self.midpoints),
                    "time|r",
                    "1/nm",
                )?
                .partial_result = true;
            output
                .add_data(&format!("g_self_{name}"), VariableKind::Surface, &[n_frames, n_bins], values, "time|r", "1/nm3")?
                .partial_result = true;
        }
        output.add_data(
            "4_pi_r2_g_self_total",
            VariableKind::Surface,
            &[n_frames, n_bins],
            radial_density(&total, &self.midpoints),
            "time|r",
            "1/nm",
        )?;
        output
            .add_data("g_self_total", VariableKind::Surface, &[n_frames, n_bins], total, "time|r", "1/nm3")?
            .main_result = true;
        Ok(output)
    }
}

struct DistinctKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    n_frames: usize,
    pairs: PairSet,
    bins: RadialBins,
}

impl StepKernel for DistinctKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let start = self.frames[index];
        let origin = self.trajectory.coordinates(start)?;
        let n_bins = self.bins.len();
        let n_species = self.pairs.n_species();
        let atoms = &self.pairs.atoms;
        // [species_i][species_j][time][r]
        let mut histogram = vec![0.0; n_species * n_species * self.n_frames * n_bins];
        for lag in 0..self.n_frames {
            let frame = self.frames[index + lag];
            let later = self.trajectory.coordinates(frame)?;
            let cell = common::frame_cell(&self.trajectory, frame, None)?;
            for i in 0..atoms.len() {
                for j in 0..atoms.len() {
                    if i == j {
                        continue;
                    }
                    let distance = norm(cell.min_image(sub(later[atoms[j]], origin[atoms[i]])));
                    if let Some(bin) = self.bins.bin(distance) {
                        let slot = self.pairs.species[i] * n_species + self.pairs.species[j];
                        histogram[(slot * self.n_frames + lag) * n_bins + bin] += 1.0;
                    }
                }
            }
        }
        let volume = common::frame_cell(&self.trajectory, start, None)?.volume();
        Ok(StepPayload::new()
            .with("histogram", histogram)
            .with_scalar("volume", volume))
    }
}

#[derive(Default)]
struct VanHoveDistinct {
    pairs: Option<PairSet>,
    bins: Option<RadialBins>,
    times: Vec<f64>,
    midpoints: Vec<f64>,
    n_configs: usize,
    histogram: Vec<f64>,
    volume: f64,
}

impl Analysis for VanHoveDistinct {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        common::require_periodic(&trajectory, "VanHoveFunctionDistinct")?;
        let frames = context.config.frames("frames")?;
        let range = context.config.range("r_values")?;
        let bins = common::range_bins("r_values", range)?;
        let pairs = PairSet::from_config(context, &trajectory)?;
        let n_species = pairs.n_species();
        self.histogram = vec![0.0; n_species * n_species * frames.n_frames * bins.len()];
        self.times = frames.duration[..frames.n_frames].to_vec();
        self.midpoints = range.midpoints.clone();
        self.n_configs = frames.n_configs;
        self.bins = Some(bins.clone());
        self.pairs = Some(pairs.clone());
        Ok(JobPlan::new(
            frames.n_configs,
            DistinctKernel {
                trajectory,
                frames: frames.value.clone(),
                n_frames: frames.n_frames,
                pairs,
                bins,
            },
        ))
    }

    fn combine(&mut self, _index: usize, mut payload: StepPayload) -> AnalysisResult<()> {
        for (total, value) in self.histogram.iter_mut().zip(payload.take("histogram")?) {
            *total += value;
        }
        self.volume += payload.scalar("volume")?;
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let (Some(pairs), Some(bins)) = (&self.pairs, &self.bins) else {
            return Err(not_initialized());
        };
        let shells = bins.shell_volumes();
        let n_bins = bins.len();
        let n_frames = self.times.len();
        let n_species = pairs.n_species();
        let block = n_frames * n_bins;
        let mean_volume = self.volume / self.n_configs.max(1) as f64;
        let weights = context.config.weights("weights")?.pair_weights(&pairs.natoms());

        let mut output = OutputData::new();
        add_axes(&mut output, &self.times, &self.midpoints)?;
        let mut total = vec![0.0; block];
        for (s, t) in pairs.pairs() {
            let (ni, nj) = (pairs.counts[s] as f64, pairs.counts[t] as f64);
            // ordered pairs, both orders folded together for unlike species
            let ordered_pairs = if s == t { ni * (ni - 1.0) } else { 2.0 * ni * nj };
            let forward = (s * n_species + t) * block;
            let backward = (t * n_species + s) * block;
            let values: Vec<f64> = (0..block)
                .map(|index| {
                    let counts = if s == t {
                        self.histogram[forward + index]
                    } else {
                        self.histogram[forward + index] + self.histogram[backward + index]
                    };
                    let ideal = ordered_pairs * self.n_configs as f64 * shells[index % n_bins] / mean_volume;
                    if ideal > 0.0 { counts / ideal } else { 0.0 }
                })
                .collect();
            let key = pairs.pair_key(s, t);
            let weight = weights.get(&key).copied().unwrap_or(0.0);
            for (slot, value) in total.iter_mut().zip(&values) {
                *slot += weight * value;
            }
            let label = common::pair_label(&key);
            output
                .add_data(
                    &format!("4_pi_r2_g_distinct_{label}"),
                    VariableKind::Surface,
                    &[n_frames, n_bins],
                    radial_density(&values, &self.midpoints),
                    "time|r",
                    "1/nm",
                )?
                .partial_result = true;
            output
                .add_data(&format!("g_distinct_{label}"), VariableKind::Surface, &[n_frames, n_bins], values, "time|r", "au")?
                .partial_result = true;
        }
        output
            .add_data("g_distinct_total", VariableKind::Surface, &[n_frames, n_bins], total, "time|r", "au")?
            .main_result = true;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{parameters, run, write_mock};
    use serde_json::json;
    use std::f64::consts::PI;

    fn shell(bin: usize, step: f64) -> f64 {
        let (inner, outer) = (bin as f64 * step, (bin + 1) as f64 * step);
        4.0 * PI / 3.0 * (outer.powi(3) - inner.powi(3))
    }

    #[test]
    fn self_part_is_normalized_at_every_lag() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_mock(
            &directory.path().join("wave.json"),
            json!({
                "element": "Ar", "lattice_constant": 0.5, "repeats": [3, 3, 3],
                "n_frames": 10, "time_step": 0.1,
                "amplitude": 0.05, "wave_vector": [4.18879, 0.0, 0.0], "frequency": 3.0
            }),
        );
        let output = run(
            "VanHoveFunctionSelf",
            &parameters(&path, json!({"frames": [0, 10, 1, 5], "r_values": [0.0, 0.5, 0.01], "weights": "equal"})),
        );
        let g = output.get("g_self_total").expect("g self");
        assert_eq!(g.shape, vec![5, 49]);
        for lag in 0..5 {
            let integral: f64 = g.row(lag).iter().enumerate().map(|(bin, value)| value * shell(bin, 0.01)).sum();
            assert!((integral - 1.0).abs() < 1e-6, "lag {lag}: {integral}");
        }
        assert!((g.row(0)[0] * shell(0, 0.01) - 1.0).abs() < 1e-9);
        assert_eq!(output.get("time").expect("time").data.len(), 5);
    }

    #[test]
    fn distinct_part_of_a_static_lattice_is_its_pair_distribution() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_mock(
            &directory.path().join("lattice.json"),
            json!({"element": "Ar", "lattice_constant": 0.5, "repeats": [4, 4, 4], "n_frames": 4, "time_step": 1.0}),
        );
        let range = json!([0.0, 0.8, 0.04]);
        let distinct = run(
            "VanHoveFunctionDistinct",
            &parameters(&path, json!({"frames": [0, 4, 1, 2], "r_values": range})),
        );
        let pdf = run("PairDistributionFunction", &parameters(&path, json!({"r_values": range})));
        let expected = &pdf.get("pdf_total").expect("pdf").data;
        let g = distinct.get("g_distinct_total").expect("g distinct");
        assert_eq!(g.shape, vec![2, expected.len()]);
        for lag in 0..2 {
            for (value, reference) in g.row(lag).iter().zip(expected) {
                assert!((value - reference).abs() < 1e-9);
            }
        }
    }
}
