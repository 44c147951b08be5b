//! Analysis jobs. Each module exposes one or more [`JobDescriptor`]s; the
//! registry built here is what documents, the CLI and remote workers use to
//! look jobs up by name.

pub(crate) mod common;
pub mod density;
pub mod dipole;
pub mod displacement;
pub mod eisf;
pub mod membrane;
pub mod molecular_trace;
pub mod molecule_finder;
pub mod pair_distribution;
pub mod rigid_body;
pub mod structure;
pub mod vacf;
pub mod van_hove;
pub mod voronoi;

use crate::domain::AnalysisResult;
use crate::jobs::{JobDescriptor, JobRegistry};

pub fn descriptors() -> Vec<JobDescriptor> {
    vec![
        density::descriptor(),
        pair_distribution::descriptor(),
        van_hove::self_descriptor(),
        van_hove::distinct_descriptor(),
        eisf::descriptor(),
        dipole::acf_descriptor(),
        dipole::infrared_descriptor(),
        displacement::msd_descriptor(),
        displacement::rmsd_descriptor(),
        vacf::descriptor(),
        molecular_trace::descriptor(),
        rigid_body::descriptor(),
        membrane::descriptor(),
        voronoi::descriptor(),
        molecule_finder::descriptor(),
        structure::radius_of_gyration_descriptor(),
        structure::density_profile_descriptor(),
        structure::center_of_masses_descriptor(),
    ]
}

/// Registry holding every built-in analysis.
pub fn registry() -> AnalysisResult<JobRegistry> {
    let mut registry = JobRegistry::new();
    for descriptor in descriptors() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::{descriptors, registry};

    #[test]
    fn every_builtin_job_is_registered_once() {
        let registry = registry().expect("registry");
        assert_eq!(registry.len(), descriptors().len());
        for name in ["Density", "PairDistributionFunction", "MeanSquareDisplacement", "Voronoi", "MoleculeFinder"] {
            assert!(registry.get(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn defaults_cover_trajectory_and_outputs() {
        for descriptor in registry().expect("registry").iter() {
            let defaults = descriptor.default_parameters();
            assert!(defaults.contains_key("trajectory"), "{}", descriptor.name);
            assert!(defaults.contains_key("output_files"), "{}", descriptor.name);
            assert!(!descriptor.category.is_empty());
        }
    }
}
