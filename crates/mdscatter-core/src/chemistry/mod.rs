//! Chemical systems: arena storage, construction from the fragment
//! databases, table serialization, rigid transformations, substructure
//! queries and the selection language.

pub mod builder;
pub mod selection;
pub mod serialization;
pub mod substructure;
pub mod system;
pub mod transformations;

pub use builder::{AtomSpec, ChainSpec, ChemicalEntity, FragmentSpec};
pub use selection::{SELECTION_KEYWORDS, Selection, SelectionError, select_atoms, selected_ids};
pub use serialization::{
    AtomRow, ChainRow, ChemicalSystemTables, ClusterRow, ContentRow, FragmentRow, ProteinRow,
    TABLE_NAMES,
};
pub use substructure::{
    MolecularGraph, SmartsError, SubstructurePattern, get_substructure_matches,
    has_substructure_match,
};
pub use system::{
    Atom, AtomGroup, AtomId, BondEnd, ChemicalSystem, Entity, EntityId, EntityKind,
};
pub use transformations::{
    QuaternionFit, REPRESENTATIONS, RigidTransformation, find_transformation,
    find_transformation_as_quaternion, fit_quaternion, normalizing_transformation,
    weighted_center,
};
