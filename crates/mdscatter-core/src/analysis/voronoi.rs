//! Voronoi tessellation of every frame: mean cell volume and the
//! distribution of neighbour counts.

use super::common;
use crate::configurators::{SettingKind, SettingSpec};
use crate::domain::{AnalysisError, AnalysisResult};
use crate::jobs::{Analysis, JobContext, JobDescriptor, JobPlan, StepKernel, StepPayload};
use crate::numerics::voronoi_cells;
use crate::output::{OutputData, VariableKind};
use crate::trajectory::Trajectory;
use serde_json::json;

pub fn descriptor() -> JobDescriptor {
    JobDescriptor {
        name: "Voronoi",
        label: "Voronoi",
        category: &["Analysis", "Structure"],
        ancestor: &["hdf_trajectory", "molecular_viewer"],
        declare: settings,
        factory: || Box::new(Voronoi::default()),
    }
}

fn settings() -> Vec<SettingSpec> {
    vec![
        common::trajectory(),
        common::frames(),
        SettingSpec::new("apply_pbc", SettingKind::Boolean, json!(true)).with_label("apply periodic boundary conditions"),
        SettingSpec::new(
            "pbc_border_size",
            SettingKind::Float { minimum: Some(0.0), maximum: None },
            json!(0.0),
        )
        .with_label("padding around open systems (nm)"),
        common::output_files(),
        common::running_mode(),
    ]
}

struct VoronoiKernel {
    trajectory: Trajectory,
    frames: Vec<usize>,
    apply_pbc: bool,
    padding: f64,
}

impl StepKernel for VoronoiKernel {
    fn run_step(&self, index: usize) -> AnalysisResult<StepPayload> {
        let frame = self.frames[index];
        let cell = if self.apply_pbc { self.trajectory.unit_cell(frame)? } else { None };
        let coordinates = self.trajectory.coordinates(frame)?;
        let points = match &cell {
            Some(cell) => coordinates.iter().map(|&r| cell.fold(r)).collect(),
            None => coordinates,
        };
        let cells = voronoi_cells(&points, cell.as_ref().map(|cell| cell.direct()), self.padding);

        let mut volume = 0.0;
        let mut valid = 0usize;
        let mut histogram: Vec<f64> = Vec::new();
        for cell in cells.iter().filter(|cell| !cell.bounded_by_box) {
            volume += cell.volume;
            valid += 1;
            let count = cell.neighbors.len();
            if histogram.len() <= count {
                histogram.resize(count + 1, 0.0);
            }
            histogram[count] += 1.0;
        }
        let mean = if valid == 0 { 0.0 } else { volume / valid as f64 };
        Ok(StepPayload::new()
            .with_scalar("mean_volume", mean)
            .with_scalar("valid_cells", valid as f64)
            .with("neighbours", histogram))
    }
}

#[derive(Default)]
struct Voronoi {
    mean_volumes: Vec<f64>,
    valid_cells: Vec<f64>,
    histogram: Vec<f64>,
    times: Vec<f64>,
}

impl Analysis for Voronoi {
    fn initialize(&mut self, context: &JobContext<'_>) -> AnalysisResult<JobPlan> {
        let trajectory = context.config.trajectory("trajectory")?.instance().clone();
        let frames = context.config.frames("frames")?;
        if trajectory.chemical_system().number_of_atoms() == 0 {
            return Err(AnalysisError::job("JOB.EMPTY_SELECTION", "the trajectory holds no atoms"));
        }
        let apply_pbc = context.config.boolean("apply_pbc")? && trajectory.is_periodic();
        if context.config.boolean("apply_pbc")? && !apply_pbc {
            context.log.warn("trajectory is not periodic; cells are bounded by padding instead");
        }
        self.mean_volumes = vec![0.0; frames.number];
        self.valid_cells = vec![0.0; frames.number];
        self.histogram.clear();
        self.times = frames.time.clone();
        Ok(JobPlan::new(
            frames.number,
            VoronoiKernel {
                trajectory,
                frames: frames.value.clone(),
                apply_pbc,
                padding: context.config.float("pbc_border_size")?,
            },
        ))
    }

    fn combine(&mut self, index: usize, payload: StepPayload) -> AnalysisResult<()> {
        self.mean_volumes[index] = payload.scalar("mean_volume")?;
        self.valid_cells[index] = payload.scalar("valid_cells")?;
        let neighbours = payload.get("neighbours")?;
        if self.histogram.len() < neighbours.len() {
            self.histogram.resize(neighbours.len(), 0.0);
        }
        for (total, count) in self.histogram.iter_mut().zip(neighbours) {
            *total += count;
        }
        Ok(())
    }

    fn finalize(&mut self, context: &JobContext<'_>) -> AnalysisResult<OutputData> {
        let n = self.times.len();
        if self.valid_cells.iter().all(|&count| count == 0.0) {
            context.log.warn("every Voronoi cell touched the bounding box");
        }
        let mut output = OutputData::new();
        output.add_data("time", VariableKind::Line, &[n], self.times.clone(), "", "ps")?;
        output
            .add_data("mean_volume", VariableKind::Line, &[n], self.mean_volumes.clone(), "time", "nm3")?
            .main_result = true;
        output.add_data("valid_cells", VariableKind::Line, &[n], self.valid_cells.clone(), "time", "au")?;
        let bins = self.histogram.len();
        output.add_data(
            "n_neighbours",
            VariableKind::Line,
            &[bins],
            (0..bins).map(|count| count as f64).collect(),
            "",
            "au",
        )?;
        output.add_data(
            "neighbourhood_histogram",
            VariableKind::Line,
            &[bins],
            self.histogram.clone(),
            "n_neighbours",
            "au",
        )?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::common::testing::{atoms, parameters, run, write_trajectory};
    use crate::configuration::UnitCell;
    use crate::database::Databases;
    use serde_json::json;

    #[test]
    fn simple_cubic_lattice_tiles_the_cell() {
        let databases = Databases::builtin().expect("databases");
        let mut lattice = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    lattice.push([0.5 + i as f64, 0.5 + j as f64, 0.5 + k as f64]);
                }
            }
        }
        let directory = tempfile::tempdir().expect("tempdir");
        let cell = UnitCell::cubic(2.0).expect("cell");
        let path = write_trajectory(
            &directory.path().join("cubic.mdt"),
            &atoms("Ar", 8, &databases),
            &vec![lattice; 3],
            Some(cell),
            1.0,
        );
        let output = run("Voronoi", &parameters(&path, json!({})));

        let volumes = &output.get("mean_volume").expect("volume").data;
        assert_eq!(volumes.len(), 3);
        assert!(volumes.iter().all(|volume| (volume - 1.0).abs() < 1e-9));
        let histogram = &output.get("neighbourhood_histogram").expect("histogram").data;
        assert_eq!(histogram.len(), 7);
        assert_eq!(histogram[6], 24.0);
        assert_eq!(histogram.iter().sum::<f64>(), 24.0);
    }

    #[test]
    fn open_systems_only_count_enclosed_cells() {
        let databases = Databases::builtin().expect("databases");
        let frame = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let directory = tempfile::tempdir().expect("tempdir");
        let path = write_trajectory(&directory.path().join("pair.mdt"), &atoms("Ar", 2, &databases), &[frame], None, 1.0);
        let output = run("Voronoi", &parameters(&path, json!({"pbc_border_size": 1.0})));
        assert_eq!(output.get("valid_cells").expect("valid").data, vec![0.0]);
        assert_eq!(output.get("mean_volume").expect("volume").data, vec![0.0]);
    }
}
