use super::fragments::{FragmentDatabase, FragmentKind};
use super::templates::TemplateSource;
use crate::domain::AnalysisResult;

const MOLECULES: [TemplateSource<'static>; 7] = [
    TemplateSource {
        code: "WAT",
        name: "water",
        alternatives: "HOH SOL TIP3",
        atoms: "OW:O(HW1,HW2)",
        bonds: "",
        atom_alternatives: "OW=O OW=OH2 HW1=H1 HW2=H2",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "DOD",
        name: "heavy_water",
        alternatives: "D2O",
        atoms: "OW:O(DW1:H2,DW2:H2)",
        bonds: "",
        atom_alternatives: "OW=O DW1=D1 DW2=D2",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "CH4",
        name: "methane",
        alternatives: "MTH",
        atoms: "C1:C(H1,H2,H3,H4)",
        bonds: "",
        atom_alternatives: "C1=C",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "CO2",
        name: "carbon_dioxide",
        alternatives: "",
        atoms: "C1:C O1:O O2:O",
        bonds: "C1-O1 C1-O2",
        atom_alternatives: "C1=C",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "NH3",
        name: "ammonia",
        alternatives: "AMM",
        atoms: "N1:N(H1,H2,H3)",
        bonds: "",
        atom_alternatives: "N1=N",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "MOH",
        name: "methanol",
        alternatives: "MEOH",
        atoms: "C1:C(H11,H12,H13) O1:O(HO)",
        bonds: "C1-O1",
        atom_alternatives: "",
        previous_link: None,
        next_link: None,
    },
    TemplateSource {
        code: "EOH",
        name: "ethanol",
        alternatives: "ETOH",
        atoms: "C1:C(H11,H12,H13) C2:C(H21,H22) O1:O(HO)",
        bonds: "C1-C2 C2-O1",
        atom_alternatives: "",
        previous_link: None,
        next_link: None,
    },
];

pub fn molecule_database() -> AnalysisResult<FragmentDatabase> {
    FragmentDatabase::from_sources(FragmentKind::Molecule, &MOLECULES)
}

#[cfg(test)]
mod tests {
    use super::molecule_database;
    use crate::domain::ErrorKind;

    #[test]
    fn water_resolves_by_code_name_and_alternative() {
        let database = molecule_database().expect("molecules");
        for key in ["WAT", "water", "HOH"] {
            assert_eq!(database.get(key).expect("water").code, "WAT");
        }
        let heavy = database.get("DOD").expect("DOD");
        assert_eq!(heavy.atom("DW1").expect("DW1").symbol, "H2");

        let error = database.get("XYZ").expect_err("unknown molecule");
        assert_eq!(error.kind(), ErrorKind::UnknownMolecule);
    }
}
