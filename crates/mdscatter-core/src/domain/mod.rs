pub mod errors;

pub use errors::{AnalysisError, AnalysisResult, ErrorCategory, ErrorKind};

use serde_json::{Map, Value};

/// Cartesian triple in nm (or nm/ps for velocities).
pub type Vec3 = [f64; 3];

/// Plain mapping of setting names to primitive values, as written by job documents.
pub type JobParameters = Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::JobParameters;
    use serde_json::json;

    #[test]
    fn job_parameters_are_plain_json_objects() {
        let value = json!({ "frames": [0, 10, 1], "trajectory": "traj.mdt" });
        let parameters: JobParameters = value.as_object().cloned().expect("object");
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters["trajectory"], "traj.mdt");
    }
}
