//! Dipole autocorrelation and the infrared spectrum derived from it.

use super::common;
use crate::configuration::contiguous_coordinates;
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::{AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::linalg::{add, scale};
use crate::numerics::{spectrum, vector_autocorrelation};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;

pub fn acf_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "DipoleAutoCorrelationFunction",
        label: "Dipole AutoCorrelation Function",
        category: &["Analysis", "Infrared"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || settings(false),
        factory: || Box::new(Dipole::new(false)),
    }
}

pub fn infrared_descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "Infrared",
        label: "Infrared Spectrum",
        category: &["Analysis", "Infrared"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: || settings(true),
        factory: || Box::new(Dipole::new(true)),
    }
}

fn settings(infrared: bool) -> Vec<SettingSpec> {
    let mut specs = vec![
        common::trajectory(),
        common::correlation_frames(),
        common::atom_selection(),
        SettingSpec::new("atom_charges", SettingKind::PartialCharges, json!(null)),
    ];
    if infrared {
        specs.push(
            SettingSpec::new(
                "derivative_order",
                SettingKind::Integer { minimum: Some(1), maximum: Some(5) },
                json!(3),
            )
            .with_label("d/dt dipole numerical derivative"),
        );
        specs.push(SettingSpec::new("resolution", SettingKind::InstrumentResolution, json!({"kernel": "ideal"})));
    }
    specs.push(common::output_files());
    specs.push(common::running_mode());
    specs
}

struct DipoleKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    /// (atom, charge) of the selected charged atoms.
    charges: Vec<(usize, f64)>,
}

impl StepKernel for DipoleKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let coordinates = self.trajectory.coordinates(frame)?;
        // whole molecules, so a dipole never spans the cell
        let coordinates = match self.trajectory.unit_cell(frame)? {
            Some(cell) => contiguous_coordinates(self.trajectory.chemical_system(), &coordinates, &cell),
            None => coordinates,
        };
        let dipole = self
            .charges
            .iter()
            .fold([0.0; 3], |total, &(atom, charge)| add(total, scale(coordinates[atom], charge)));
        Ok(StepPayload::new().with("dipole", dipole.to_vec()))
    }
}

struct Dipole {
    infrared: bool,
    dipoles: Vec<Vec3>,
    times: Vec<f64>,
    n_frames: usize,
    time_step: f64,
}

impl Dipole {
    fn new(infrared: bool) -> Self {
        Self {
            infrared,
            dipoles: Vec::new(),
            times: Vec::new(),
            n_frames: 0,
            time_step: 0.0,
        }
    }
}

impl Analysis for Dipole {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let selection = context.config.atom_selection("atom_selection")?;
        let charges = context.config.partial_charges("atom_charges")?;
        let charges = selection
            .flat_indices()
            .into_iter()
            .filter_map(|atom| charges.get(&atom).map(|&charge| (atom, charge)))
            .collect();
        self.dipoles = vec![[0.0; 3]; frames.number];
        self.times = frames.duration[..frames.n_frames].to_vec();
        self.n_frames = frames.n_frames;
        self.time_step = frames.time_step();
        Ok(JobPlan::new(
            frames.number,
            DipoleKernel {
                trajectory,
                frames: frames.value.clone(),
                charges,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        if let [x, y, z] = *payload.get("dipole")? {
            self.dipoles[index] = [x, y, z];
        }
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.n_frames;
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        if !self.infrared {
            let acf = vector_autocorrelation(&self.dipoles, n);
            output
                .add_data("dipole_acf", VariableKind::Line, &[acf.len()], acf, "time", "e2*nm2")?
                .main_result = true;
            return Ok(output);
        }

        let order = context.config.integer("derivative_order")? as usize;
        let derivative = common::vector_derivative(&self.dipoles, self.time_step, order)?;
        let acf = vector_autocorrelation(&derivative, n);
        let window = &context.config.resolution("resolution")?.window;
        let ir = spectrum(&acf, self.time_step, &window.time_window, &window.omegas);
        output.add_data("ddacf", VariableKind::Line, &[acf.len()], acf, "time", "e2*nm2/ps2")?;
        output.add_data("omega", VariableKind::Line, &[window.omegas.len()], window.omegas.clone(), "", "rad/ps")?;
        output
            .add_data("ir", VariableKind::Line, &[ir.len()], ir, "omega", "e2*nm2/ps")?
            .main_result = true;
        Ok(output)
    }
}
