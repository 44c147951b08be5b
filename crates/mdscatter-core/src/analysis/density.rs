//! Atomic and mass density per frame.

use super::common;
use crate::configurators::SettingSpec;
use crate::domain::AnalysisResult;
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use crate::units::{AVOGADRO, conversion_factor};

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "Density",
        label: "Density",
        category: &["Analysis", "Thermodynamics"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(Density::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        common::output_files(),
        common::running_mode(),
    ]
}

struct DensityKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    n_atoms: f64,
    /// g/mol
    total_mass: f64,
    /// nm3 to cm3
    volume_factor: f64,
}

impl StepKernel for DensityKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let volume = common::frame_cell(&self.trajectory, frame, None)?.volume() * self.volume_factor;
        Ok(StepPayload::new()
            .with_scalar("atomic_density", self.n_atoms / volume)
            .with_scalar("mass_density", self.total_mass / AVOGADRO / volume))
    }
}

#[derive(Default)]
struct Density {
    times: Vec<f64>,
    atomic: Vec<f64>,
    mass: Vec<f64>,
}

impl Analysis for Density {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        common::require_periodic(&trajectory, "Density")?;
        let frames = context.config.frames("frames")?;
        let system = trajectory.chemical_system();
        let atoms: Vec<_> = system.atom_ids().collect();
        let total_mass = system.masses(&atoms, &context.databases.atoms)?.iter().sum();
        self.times = frames.time.clone();
        self.atomic = vec![0.0; frames.number];
        self.mass = vec![0.0; frames.number];
        Ok(JobPlan::new(
            frames.number,
            DensityKernel {
                frames: frames.value.clone(),
                n_atoms: atoms.len() as f64,
                total_mass,
                volume_factor: conversion_factor("nm3", "cm3")?,
                trajectory,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        self.atomic[index] = payload.scalar("atomic_density")?;
        self.mass[index] = payload.scalar("mass_density")?;
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.times.len();
        let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len().max(1) as f64;
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        output
            .add_data("atomic_density", VariableKind::Line, &[n], self.atomic.clone(), "time", "1/cm3")?
            .main_result = true;
        output
            .add_data("mass_density", VariableKind::Line, &[n], self.mass.clone(), "time", "g/cm3")?
            .main_result = true;
        output.add_data("avg_atomic_density", VariableKind::Line, &[1], vec![mean(&self.atomic)], "", "1/cm3")?;
        output.add_data("avg_mass_density", VariableKind::Line, &[1], vec![mean(&self.mass)], "", "g/cm3")?;
        Ok(output)
    }
}
