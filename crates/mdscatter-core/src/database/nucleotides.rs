use super::fragments::{FragmentDatabase, FragmentKind, VariantSource, add_variants};
use super::templates::{FragmentTemplate, TemplateSource};
use crate::domain::AnalysisResult;

const PHOSPHATE: &str = "P OP1 OP2";
const DEOXY_SUGAR: &str = "O5' C5'(H5',H5'') C4'(H4') O4' C3'(H3') O3' C2'(H2',H2'') C1'(H1')";
const RIBOSE: &str = "O5' C5'(H5',H5'') C4'(H4') O4' C3'(H3') O3' C2'(H2') O2'(HO2') C1'(H1')";
const BACKBONE_BONDS: &str =
    "P-OP1 P-OP2 P-O5' O5'-C5' C5'-C4' C4'-O4' C4'-C3' C3'-O3' C3'-C2' C2'-C1' C1'-O4'";

struct Base {
    letter: &'static str,
    name: &'static str,
    atoms: &'static str,
    bonds: &'static str,
}

const BASES: [Base; 5] = [
    Base {
        letter: "A",
        name: "adenine",
        atoms: "N9 C8(H8) N7 C5 C6 N6(H61,H62) N1 C2(H2) N3 C4",
        bonds: "C1'-N9 N9-C8 C8-N7 N7-C5 C5-C6 C6-N6 C6-N1 N1-C2 C2-N3 N3-C4 C4-C5 C4-N9",
    },
    Base {
        letter: "G",
        name: "guanine",
        atoms: "N9 C8(H8) N7 C5 C6 O6 N1(H1) C2 N2(H21,H22) N3 C4",
        bonds: "C1'-N9 N9-C8 C8-N7 N7-C5 C5-C6 C6-O6 C6-N1 N1-C2 C2-N2 C2-N3 N3-C4 C4-C5 C4-N9",
    },
    Base {
        letter: "C",
        name: "cytosine",
        atoms: "N1 C6(H6) C5(H5) C4 N4(H41,H42) N3 C2 O2",
        bonds: "C1'-N1 N1-C6 C6-C5 C5-C4 C4-N4 C4-N3 N3-C2 C2-O2 C2-N1",
    },
    Base {
        letter: "T",
        name: "thymine",
        atoms: "N1 C6(H6) C5 C7(H71,H72,H73) C4 O4 N3(H3) C2 O2",
        bonds: "C1'-N1 N1-C6 C6-C5 C5-C7 C5-C4 C4-O4 C4-N3 N3-C2 C2-O2 C2-N1",
    },
    Base {
        letter: "U",
        name: "uracil",
        atoms: "N1 C6(H6) C5(H5) C4 O4 N3(H3) C2 O2",
        bonds: "C1'-N1 N1-C6 C6-C5 C5-C4 C4-O4 C4-N3 N3-C2 C2-O2 C2-N1",
    },
];

const VARIANTS: [VariantSource<'static>; 2] = [
    VariantSource {
        code: "5T1",
        removes: "P OP1 OP2",
        adds: "HO5'",
        attach: "HO5'>O5'",
        is_n_terminus: true,
        is_c_terminus: false,
    },
    VariantSource {
        code: "3T1",
        removes: "",
        adds: "HO3'",
        attach: "HO3'>O3'",
        is_n_terminus: false,
        is_c_terminus: true,
    },
];

/// Role of a nucleotide atom: primed names belong to the sugar.
fn nucleotide_role(name: &str) -> &'static str {
    if matches!(name, "P" | "OP1" | "OP2") {
        "phosphate"
    } else if name.contains('\'') {
        "sugar"
    } else {
        "base"
    }
}

fn assign_roles(template: &mut FragmentTemplate) {
    for atom in &template.atoms {
        template
            .roles
            .insert(atom.name.clone(), nucleotide_role(&atom.name).to_string());
    }
    for name in ["HO5'", "HO3'"] {
        template.roles.insert(name.to_string(), "sugar".to_string());
    }
}

pub fn nucleotide_database() -> AnalysisResult<FragmentDatabase> {
    let mut owned = Vec::new();
    for base in &BASES {
        if base.letter != "U" {
            owned.push((
                format!("D{}", base.letter),
                format!("deoxy{}", base.name),
                format!("{PHOSPHATE} {DEOXY_SUGAR} {}", base.atoms),
                format!("{BACKBONE_BONDS} {}", base.bonds),
            ));
        }
        if base.letter != "T" {
            owned.push((
                base.letter.to_string(),
                base.name.to_string(),
                format!("{PHOSPHATE} {RIBOSE} {}", base.atoms),
                format!("{BACKBONE_BONDS} C2'-O2' {}", base.bonds),
            ));
        }
    }

    let sources: Vec<TemplateSource<'_>> = owned
        .iter()
        .map(|(code, name, atoms, bonds)| TemplateSource {
            code,
            name,
            alternatives: "",
            atoms,
            bonds,
            atom_alternatives: "OP1=O1P OP2=O2P",
            previous_link: Some("P"),
            next_link: Some("O3'"),
        })
        .collect();
    let mut database = FragmentDatabase::from_sources(FragmentKind::Nucleotide, &sources)?;
    let codes: Vec<String> = database.codes().map(str::to_string).collect();
    for code in codes {
        let mut template = database.get(&code)?.clone();
        assign_roles(&mut template);
        database.insert(template);
    }
    add_variants(&mut database, &VARIANTS)?;
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::nucleotide_database;

    #[test]
    fn dna_and_rna_nucleotides_are_registered() {
        let database = nucleotide_database().expect("nucleotides");
        let codes: Vec<&str> = database.codes().collect();
        assert_eq!(codes, vec!["A", "C", "DA", "DC", "DG", "DT", "G", "U"]);

        let thymidine = database.get("DT").expect("DT");
        assert_eq!(thymidine.role("P"), Some("phosphate"));
        assert_eq!(thymidine.role("C1'"), Some("sugar"));
        assert_eq!(thymidine.role("C7"), Some("base"));
        assert!(thymidine.atom("O2'").is_none());
        assert!(database.get("A").expect("A").atom("O2'").is_some());
        let glycosidic = thymidine.atom("C1'").expect("C1'");
        assert!(glycosidic.bonds.iter().any(|b| b == "N1"));
    }

    #[test]
    fn five_prime_terminus_drops_the_phosphate() {
        let database = nucleotide_database().expect("nucleotides");
        let guanosine = database.get("DG").expect("DG");
        let atoms = guanosine.with_variant(Some(database.variant("5T1").expect("5T1")));
        assert!(atoms.iter().all(|atom| atom.name != "P"));
        let hydroxyl = atoms.iter().find(|atom| atom.name == "HO5'").expect("HO5'");
        assert_eq!(hydroxyl.bonds, vec!["O5'"]);
        assert_eq!(atoms.len(), guanosine.atoms.len() - 2);
    }
}
