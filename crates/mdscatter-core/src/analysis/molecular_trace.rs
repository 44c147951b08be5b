//! Voxel histogram of where the selected atoms go over a trajectory.

use super::common;
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::{AnalysisError, AnalysisResult, Vec3};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "MolecularTrace",
        label: "Molecular Trace",
        category: &["Analysis", "Trajectory"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(MolecularTrace::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        common::atom_selection(),
        SettingSpec::new(
            "spatial_resolution",
            SettingKind::Float { minimum: Some(1.0e-6), maximum: None },
            json!(0.1),
        )
        .with_label("spatial resolution (nm)"),
        common::output_files(),
        common::running_mode(),
    ]
}

/// Regular grid covering a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    origin: Vec3,
    spacing: f64,
    shape: [usize; 3],
}

impl Grid {
    fn covering(minimum: Vec3, maximum: Vec3, spacing: f64) -> Self {
        let shape = [0, 1, 2].map(|axis| ((maximum[axis] - minimum[axis]) / spacing).floor() as usize + 1);
        Self {
            origin: minimum,
            spacing,
            shape,
        }
    }

    fn len(&self) -> usize {
        self.shape.iter().product()
    }

    fn voxel(&self, position: Vec3) -> Option<usize> {
        let mut offset = 0;
        for axis in 0..3 {
            let cell = ((position[axis] - self.origin[axis]) / self.spacing).floor();
            if cell < 0.0 || cell as usize >= self.shape[axis] {
                return None;
            }
            offset = offset * self.shape[axis] + cell as usize;
        }
        Some(offset)
    }
}

struct TraceKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    atoms: Vec<usize>,
    grid: Grid,
}

impl StepKernel for TraceKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let coordinates = self.trajectory.coordinates(self.frames[index])?;
        let mut counts = vec![0.0; self.grid.len()];
        for &atom in &self.atoms {
            if let Some(voxel) = self.grid.voxel(coordinates[atom]) {
                counts[voxel] += 1.0;
            }
        }
        Ok(StepPayload::new().with("trace", counts))
    }
}

#[derive(Default)]
struct MolecularTrace {
    grid: Option<Grid>,
    trace: Vec<f64>,
}

impl Analysis for MolecularTrace {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        let atoms = context.config.atom_selection("atom_selection")?.flat_indices();
        if atoms.is_empty() {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "no atoms selected"));
        }
        let spacing = context.config.float("spatial_resolution")?;

        let mut minimum = [f64::INFINITY; 3];
        let mut maximum = [f64::NEG_INFINITY; 3];
        for &frame in &frames.value {
            let coordinates = trajectory.coordinates(frame)?;
            for &atom in &atoms {
                for axis in 0..3 {
                    minimum[axis] = minimum[axis].min(coordinates[atom][axis]);
                    maximum[axis] = maximum[axis].max(coordinates[atom][axis]);
                }
            }
        }
        let grid = Grid::covering(minimum, maximum, spacing);
        tracing::debug!(shape = ?grid.shape, "molecular trace grid");
        self.trace = vec![0.0; grid.len()];
        self.grid = Some(grid);
        Ok(JobPlan::new(
            frames.number,
            TraceKernel {
                trajectory,
                frames: frames.value.clone(),
                atoms,
                grid,
            },
        ))
    }

    fn combine(&mut self, _index: usize, payload: StepPayload) -> AnalysisResult<()> {
        for (total, value) in self.trace.iter_mut().zip(payload.get("trace")?) {
            *total += value;
        }
        Ok(())
    }

    fn finalize(&mut self, _context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let grid = self
            .grid
            .ok_or_else(|| AnalysisError::internal("JOB.STATE", "finalize before initialize"))?;
        let mut output = OutputData::new();
        output
            .add_data(
                "molecular_trace",
                VariableKind::Volume,
                &grid.shape,
                std::mem::take(&mut self.trace),
                "x|y|z",
                "au",
            )?
            .main_result = true;
        output.add_data("origin", VariableKind::Line, &[3], grid.origin.to_vec(), "", "nm")?;
        output.add_data("spacing", VariableKind::Line, &[3], vec![grid.spacing; 3], "", "nm")?;
        output.add_data(
            "grid_shape",
            VariableKind::Line,
            &[3],
            grid.shape.iter().map(|&n| n as f64).collect(),
            "",
            "au",
        )?;
        Ok(output)
    }
}
