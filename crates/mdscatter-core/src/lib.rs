//! Molecular-dynamics trajectory analysis for neutron scattering.

pub mod analysis;
pub mod chemistry;
pub mod configuration;
pub mod configurators;
pub mod database;
pub mod domain;
pub mod jobs;
pub mod numerics;
pub mod output;
pub mod trajectory;
pub mod units;

pub use domain::{AnalysisError, AnalysisResult, ErrorCategory, ErrorKind, JobParameters, Vec3};
