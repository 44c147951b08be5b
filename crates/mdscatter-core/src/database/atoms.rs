//! Element and isotope constants used by weighting schemes and mass lookups.
//!
//! Scattering lengths are in fm, cross sections in barn, radii in nm and
//! atomic weights in g/mol.

use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomEntry {
    pub symbol: String,
    pub name: String,
    pub atomic_number: u32,
    pub atomic_weight: f64,
    pub b_coherent: f64,
    pub b_incoherent: f64,
    pub xs_coherent: f64,
    pub xs_incoherent: f64,
    pub xs_absorption: f64,
    pub abundance: f64,
    pub covalent_radius: f64,
    pub vdw_radius: f64,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, f64>,
}

impl AtomEntry {
    /// Numeric property by name; unknown names fall back to user-defined extras.
    pub fn property(&self, name: &str) -> Option<f64> {
        let value = match name {
            "atomic_weight" | "mass" => self.atomic_weight,
            "atomic_number" | "proton" => f64::from(self.atomic_number),
            "b_coherent" => self.b_coherent,
            "b_incoherent" => self.b_incoherent,
            "b_coherent2" => self.b_coherent * self.b_coherent,
            "b_incoherent2" => self.b_incoherent * self.b_incoherent,
            "xs_coherent" => self.xs_coherent,
            "xs_incoherent" => self.xs_incoherent,
            "xs_absorption" => self.xs_absorption,
            "abundance" => self.abundance,
            "covalent_radius" => self.covalent_radius,
            "vdw_radius" => self.vdw_radius,
            "equal" => 1.0,
            other => return self.extra.get(other).copied(),
        };
        Some(value)
    }

    fn set_property(&mut self, name: &str, value: f64) {
        match name {
            "atomic_weight" | "mass" => self.atomic_weight = value,
            "b_coherent" => self.b_coherent = value,
            "b_incoherent" => self.b_incoherent = value,
            "xs_coherent" => self.xs_coherent = value,
            "xs_incoherent" => self.xs_incoherent = value,
            "xs_absorption" => self.xs_absorption = value,
            "abundance" => self.abundance = value,
            "covalent_radius" => self.covalent_radius = value,
            "vdw_radius" => self.vdw_radius = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }
}

pub const PROPERTY_NAMES: [&str; 12] = [
    "atomic_weight",
    "atomic_number",
    "b_coherent",
    "b_incoherent",
    "b_coherent2",
    "b_incoherent2",
    "xs_coherent",
    "xs_incoherent",
    "xs_absorption",
    "abundance",
    "covalent_radius",
    "vdw_radius",
];

// symbol, name, Z, weight, b_coh, b_inc, xs_coh, xs_inc, xs_abs, abundance, r_cov, r_vdw
type ElementRow = (
    &'static str,
    &'static str,
    u32,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
);

const ELEMENTS: [ElementRow; 48] = [
    ("H", "hydrogen", 1, 1.00794, -3.739, 25.274, 1.7568, 80.26, 0.3326, 100.0, 0.031, 0.110),
    ("H2", "deuterium", 1, 2.014102, 6.671, 4.04, 5.592, 2.05, 0.000519, 0.0115, 0.031, 0.110),
    ("H3", "tritium", 1, 3.016049, 4.792, -1.04, 2.89, 0.14, 0.0, 0.0, 0.031, 0.110),
    ("He", "helium", 2, 4.002602, 3.26, 0.0, 1.34, 0.0, 0.00747, 100.0, 0.028, 0.140),
    ("Li", "lithium", 3, 6.941, -1.90, 0.0, 0.454, 0.92, 70.5, 100.0, 0.128, 0.182),
    ("Be", "beryllium", 4, 9.012182, 7.79, 0.12, 7.63, 0.0018, 0.0076, 100.0, 0.096, 0.153),
    ("B", "boron", 5, 10.811, 5.30, 0.0, 3.54, 1.70, 767.0, 100.0, 0.084, 0.192),
    ("C", "carbon", 6, 12.0107, 6.646, 0.0, 5.551, 0.001, 0.0035, 100.0, 0.076, 0.170),
    ("N", "nitrogen", 7, 14.0067, 9.36, 0.0, 11.01, 0.50, 1.90, 100.0, 0.071, 0.155),
    ("O", "oxygen", 8, 15.9994, 5.803, 0.0, 4.232, 0.0008, 0.00019, 100.0, 0.066, 0.152),
    ("F", "fluorine", 9, 18.998403, 5.654, -0.082, 4.017, 0.0008, 0.0096, 100.0, 0.057, 0.147),
    ("Ne", "neon", 10, 20.1797, 4.566, 0.0, 2.62, 0.008, 0.039, 100.0, 0.058, 0.154),
    ("Na", "sodium", 11, 22.98977, 3.63, 3.59, 1.66, 1.62, 0.53, 100.0, 0.166, 0.227),
    ("Mg", "magnesium", 12, 24.305, 5.375, 0.0, 3.631, 0.08, 0.063, 100.0, 0.141, 0.173),
    ("Al", "aluminium", 13, 26.981538, 3.449, 0.256, 1.495, 0.0082, 0.231, 100.0, 0.121, 0.184),
    ("Si", "silicon", 14, 28.0855, 4.1491, 0.0, 2.163, 0.004, 0.171, 100.0, 0.111, 0.210),
    ("P", "phosphorus", 15, 30.973762, 5.13, 0.2, 3.307, 0.005, 0.172, 100.0, 0.107, 0.180),
    ("S", "sulfur", 16, 32.065, 2.847, 0.0, 1.0186, 0.007, 0.53, 100.0, 0.105, 0.180),
    ("Cl", "chlorine", 17, 35.453, 9.577, 0.0, 11.5257, 5.3, 33.5, 100.0, 0.102, 0.175),
    ("Ar", "argon", 18, 39.948, 1.909, 0.0, 0.458, 0.225, 0.675, 100.0, 0.106, 0.188),
    ("K", "potassium", 19, 39.0983, 3.67, 0.0, 1.69, 0.27, 2.1, 100.0, 0.203, 0.275),
    ("Ca", "calcium", 20, 40.078, 4.70, 0.0, 2.78, 0.05, 0.43, 100.0, 0.176, 0.231),
    ("Ti", "titanium", 22, 47.867, -3.438, 0.0, 1.485, 2.87, 6.09, 100.0, 0.160, 0.211),
    ("Cr", "chromium", 24, 51.9961, 3.635, 0.0, 1.660, 1.83, 3.05, 100.0, 0.139, 0.206),
    ("Mn", "manganese", 25, 54.938049, -3.73, 1.79, 1.75, 0.40, 13.3, 100.0, 0.139, 0.205),
    ("Fe", "iron", 26, 55.845, 9.45, 0.0, 11.22, 0.40, 2.56, 100.0, 0.132, 0.204),
    ("Co", "cobalt", 27, 58.9332, 2.49, -6.2, 0.779, 4.8, 37.18, 100.0, 0.126, 0.200),
    ("Ni", "nickel", 28, 58.6934, 10.3, 0.0, 13.3, 5.2, 4.49, 100.0, 0.124, 0.163),
    ("Cu", "copper", 29, 63.546, 7.718, 0.0, 7.485, 0.55, 3.78, 100.0, 0.132, 0.140),
    ("Zn", "zinc", 30, 65.38, 5.680, 0.0, 4.054, 0.077, 1.11, 100.0, 0.122, 0.139),
    ("Ga", "gallium", 31, 69.723, 7.288, 0.0, 6.675, 0.16, 2.75, 100.0, 0.122, 0.187),
    ("Ge", "germanium", 32, 72.64, 8.185, 0.0, 8.42, 0.18, 2.20, 100.0, 0.120, 0.211),
    ("As", "arsenic", 33, 74.9216, 6.58, -0.69, 5.44, 0.060, 4.5, 100.0, 0.119, 0.185),
    ("Se", "selenium", 34, 78.96, 7.970, 0.0, 7.98, 0.32, 11.7, 100.0, 0.120, 0.190),
    ("Br", "bromine", 35, 79.904, 6.795, 0.0, 5.80, 0.10, 6.9, 100.0, 0.120, 0.185),
    ("Kr", "krypton", 36, 83.798, 7.81, 0.0, 7.67, 0.01, 25.0, 100.0, 0.116, 0.202),
    ("Rb", "rubidium", 37, 85.4678, 7.09, 0.0, 6.32, 0.5, 0.38, 100.0, 0.220, 0.303),
    ("Sr", "strontium", 38, 87.62, 7.02, 0.0, 6.19, 0.06, 1.28, 100.0, 0.195, 0.249),
    ("Zr", "zirconium", 40, 91.224, 7.16, 0.0, 6.44, 0.02, 0.185, 100.0, 0.175, 0.200),
    ("Mo", "molybdenum", 42, 95.94, 6.715, 0.0, 5.67, 0.04, 2.48, 100.0, 0.154, 0.200),
    ("Ag", "silver", 47, 107.8682, 5.922, 0.0, 4.407, 0.58, 63.3, 100.0, 0.145, 0.172),
    ("Cd", "cadmium", 48, 112.411, 4.87, 0.0, 3.04, 3.46, 2520.0, 100.0, 0.144, 0.158),
    ("Sn", "tin", 50, 118.71, 6.225, 0.0, 4.871, 0.022, 0.626, 100.0, 0.139, 0.217),
    ("I", "iodine", 53, 126.90447, 5.28, 1.58, 3.50, 0.31, 6.15, 100.0, 0.139, 0.198),
    ("Xe", "xenon", 54, 131.293, 4.92, 0.0, 2.96, 0.0, 23.9, 100.0, 0.140, 0.216),
    ("Cs", "caesium", 55, 132.90545, 5.42, 1.29, 3.69, 0.21, 29.0, 100.0, 0.244, 0.343),
    ("Pt", "platinum", 78, 195.078, 9.60, 0.0, 11.58, 0.13, 10.3, 100.0, 0.136, 0.175),
    ("Au", "gold", 79, 196.96655, 7.90, -1.84, 7.32, 0.43, 98.65, 100.0, 0.136, 0.166),
];

/// Runtime-editable atom database.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AtomDatabase {
    atoms: BTreeMap<String, AtomEntry>,
}

impl AtomDatabase {
    pub fn builtin() -> Self {
        let mut atoms = BTreeMap::new();
        for (
            symbol,
            name,
            atomic_number,
            atomic_weight,
            b_coherent,
            b_incoherent,
            xs_coherent,
            xs_incoherent,
            xs_absorption,
            abundance,
            covalent_radius,
            vdw_radius,
        ) in ELEMENTS
        {
            let alternatives = match symbol {
                "H2" => vec!["D".to_string()],
                "H3" => vec!["T".to_string()],
                _ => Vec::new(),
            };
            atoms.insert(
                symbol.to_string(),
                AtomEntry {
                    symbol: symbol.to_string(),
                    name: name.to_string(),
                    atomic_number,
                    atomic_weight,
                    b_coherent,
                    b_incoherent,
                    xs_coherent,
                    xs_incoherent,
                    xs_absorption,
                    abundance,
                    covalent_radius,
                    vdw_radius,
                    alternatives,
                    extra: BTreeMap::new(),
                },
            );
        }
        Self { atoms }
    }

    /// Built-in table, overridden entry-by-entry by a JSON file when one is given.
    pub fn load_with_overrides(path: Option<&Path>) -> AnalysisResult<Self> {
        let mut database = Self::builtin();
        if let Some(path) = path {
            let source = fs::read_to_string(path).map_err(|source| {
                AnalysisError::io(
                    "IO.ATOM_DATABASE",
                    format!("failed to read atom database '{}': {source}", path.display()),
                )
            })?;
            let overrides: Vec<AtomEntry> = serde_json::from_str(&source).map_err(|source| {
                AnalysisError::corrupted(
                    "IO.ATOM_DATABASE",
                    format!("failed to parse atom database '{}': {source}", path.display()),
                )
            })?;
            for entry in overrides {
                database.add_atom(entry);
            }
        }
        Ok(database)
    }

    pub fn save(&self, path: &Path) -> AnalysisResult<()> {
        let entries: Vec<&AtomEntry> = self.atoms.values().collect();
        let payload = serde_json::to_string_pretty(&entries).map_err(|source| {
            AnalysisError::internal("IO.ATOM_DATABASE", format!("failed to encode: {source}"))
        })?;
        fs::write(path, payload).map_err(|source| {
            AnalysisError::io(
                "IO.ATOM_DATABASE",
                format!("failed to write atom database '{}': {source}", path.display()),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.atoms.keys().map(String::as_str)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.lookup(symbol).is_some()
    }

    fn lookup(&self, symbol: &str) -> Option<&AtomEntry> {
        self.atoms.get(symbol).or_else(|| {
            self.atoms
                .values()
                .find(|entry| entry.alternatives.iter().any(|alt| alt == symbol))
        })
    }

    pub fn get(&self, symbol: &str) -> AnalysisResult<&AtomEntry> {
        self.lookup(symbol)
            .ok_or_else(|| AnalysisError::unknown_atom(symbol))
    }

    pub fn get_property(&self, symbol: &str, property: &str) -> AnalysisResult<f64> {
        let entry = self.get(symbol)?;
        entry.property(property).ok_or_else(|| {
            AnalysisError::new(
                ErrorKind::UnknownAtom,
                "INPUT.ATOM_PROPERTY",
                format!("atom '{symbol}' has no property '{property}'"),
            )
        })
    }

    pub fn mass(&self, symbol: &str) -> AnalysisResult<f64> {
        self.get(symbol).map(|entry| entry.atomic_weight)
    }

    pub fn add_atom(&mut self, entry: AtomEntry) {
        self.atoms.insert(entry.symbol.clone(), entry);
    }

    pub fn remove_atom(&mut self, symbol: &str) -> AnalysisResult<AtomEntry> {
        self.atoms
            .remove(symbol)
            .ok_or_else(|| AnalysisError::unknown_atom(symbol))
    }

    pub fn set_property(&mut self, symbol: &str, property: &str, value: f64) -> AnalysisResult<()> {
        let entry = self
            .atoms
            .get_mut(symbol)
            .ok_or_else(|| AnalysisError::unknown_atom(symbol))?;
        entry.set_property(property, value);
        Ok(())
    }

    /// Guesses an element from a raw label: exact symbol, then alternatives,
    /// then the longest element symbol prefixing the label (case-insensitive),
    /// disambiguated by mass when one is supplied.
    pub fn guess_element(&self, label: &str, mass: Option<f64>) -> Option<String> {
        let trimmed = label.trim();
        if let Some(entry) = self.lookup(trimmed) {
            return Some(entry.symbol.clone());
        }

        let letters: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        let mut candidates: Vec<&AtomEntry> = self
            .atoms
            .values()
            .filter(|entry| {
                entry.symbol.chars().all(|c| c.is_ascii_alphabetic())
                    && letters
                        .to_ascii_lowercase()
                        .starts_with(&entry.symbol.to_ascii_lowercase())
            })
            .collect();

        if let Some(mass) = mass {
            candidates.sort_by(|a, b| {
                (a.atomic_weight - mass)
                    .abs()
                    .total_cmp(&(b.atomic_weight - mass).abs())
            });
            if let Some(best) = candidates.first() {
                if (best.atomic_weight - mass).abs() < 1.0 {
                    return Some(best.symbol.clone());
                }
            }
            return self
                .atoms
                .values()
                .filter(|entry| (entry.atomic_weight - mass).abs() < 0.5)
                .min_by(|a, b| {
                    (a.atomic_weight - mass)
                        .abs()
                        .total_cmp(&(b.atomic_weight - mass).abs())
                })
                .map(|entry| entry.symbol.clone());
        }

        candidates.sort_by_key(|entry| std::cmp::Reverse(entry.symbol.len()));
        candidates.first().map(|entry| entry.symbol.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::AtomDatabase;
    use crate::domain::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn builtin_database_exposes_scattering_constants() {
        let database = AtomDatabase::builtin();
        let hydrogen = database.get("H").expect("hydrogen");
        assert_eq!(hydrogen.atomic_number, 1);
        assert!(hydrogen.b_coherent < 0.0);
        assert_eq!(
            database.get_property("D", "atomic_weight").expect("deuterium alias"),
            2.014102
        );
        assert_eq!(database.get_property("O", "equal").expect("equal"), 1.0);
    }

    #[test]
    fn missing_symbols_signal_unknown_atom() {
        let database = AtomDatabase::builtin();
        let error = database.get("Xx").expect_err("unknown");
        assert_eq!(error.kind(), ErrorKind::UnknownAtom);
    }

    #[test]
    fn database_is_editable_and_persistable() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut database = AtomDatabase::builtin();
        database
            .set_property("C", "b_coherent", 1.5)
            .expect("set property");
        database
            .set_property("C", "custom_weight", 3.0)
            .expect("set extra");
        let path = temp.path().join("atoms.json");
        database.save(&path).expect("save");

        let reloaded = AtomDatabase::load_with_overrides(Some(&path)).expect("reload");
        assert_eq!(reloaded.get_property("C", "b_coherent").expect("b"), 1.5);
        assert_eq!(reloaded.get_property("C", "custom_weight").expect("extra"), 3.0);
    }

    #[test]
    fn element_guessing_uses_prefix_and_mass() {
        let database = AtomDatabase::builtin();
        assert_eq!(database.guess_element("CA", None).as_deref(), Some("Ca"));
        assert_eq!(database.guess_element("CA", Some(12.01)).as_deref(), Some("C"));
        assert_eq!(database.guess_element("OW", None).as_deref(), Some("O"));
        assert_eq!(database.guess_element("HW1", Some(1.008)).as_deref(), Some("H"));
        assert_eq!(database.guess_element("Qq", None), None);
    }
}
