//! Standard amino-acid residues and their terminal variants.

use super::fragments::{FragmentDatabase, FragmentKind, VariantSource, add_variants};
use super::templates::{FragmentTemplate, TemplateSource};
use crate::domain::AnalysisResult;

const BACKBONE_ATOMS: [&str; 13] = [
    "N", "H", "CA", "HA", "HA2", "HA3", "C", "O", "OXT", "H1", "H2", "H3", "HXT",
];

macro_rules! residue {
    ($code:expr, $name:expr, $atoms:expr, $bonds:expr) => {
        TemplateSource {
            code: $code,
            name: $name,
            alternatives: "",
            atoms: $atoms,
            bonds: $bonds,
            atom_alternatives: "H=HN O=OT1",
            previous_link: Some("N"),
            next_link: Some("C"),
        }
    };
}

fn residue_sources() -> Vec<TemplateSource<'static>> {
    vec![
        residue!("ALA", "alanine", "N(H) CA(HA) CB(HB1,HB2,HB3) C O", "CA-CB"),
        residue!("GLY", "glycine", "N(H) CA(HA2,HA3) C O", ""),
        residue!("SER", "serine", "N(H) CA(HA) CB(HB2,HB3) OG(HG) C O", "CA-CB CB-OG"),
        residue!("CYS", "cysteine", "N(H) CA(HA) CB(HB2,HB3) SG(HG) C O", "CA-CB CB-SG"),
        residue!(
            "VAL",
            "valine",
            "N(H) CA(HA) CB(HB) CG1(HG11,HG12,HG13) CG2(HG21,HG22,HG23) C O",
            "CA-CB CB-CG1 CB-CG2"
        ),
        residue!(
            "THR",
            "threonine",
            "N(H) CA(HA) CB(HB) OG1(HG1) CG2(HG21,HG22,HG23) C O",
            "CA-CB CB-OG1 CB-CG2"
        ),
        residue!(
            "LEU",
            "leucine",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG) CD1(HD11,HD12,HD13) CD2(HD21,HD22,HD23) C O",
            "CA-CB CB-CG CG-CD1 CG-CD2"
        ),
        residue!(
            "ILE",
            "isoleucine",
            "N(H) CA(HA) CB(HB) CG2(HG21,HG22,HG23) CG1(HG12,HG13) CD1(HD11,HD12,HD13) C O",
            "CA-CB CB-CG2 CB-CG1 CG1-CD1"
        ),
        residue!(
            "MET",
            "methionine",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG2,HG3) SD CE(HE1,HE2,HE3) C O",
            "CA-CB CB-CG CG-SD SD-CE"
        ),
        residue!(
            "PRO",
            "proline",
            "N CD(HD2,HD3) CG(HG2,HG3) CB(HB2,HB3) CA(HA) C O",
            "N-CD CD-CG CG-CB CB-CA"
        ),
        residue!(
            "PHE",
            "phenylalanine",
            "N(H) CA(HA) CB(HB2,HB3) CG CD1(HD1) CE1(HE1) CZ(HZ) CE2(HE2) CD2(HD2) C O",
            "CA-CB CB-CG CG-CD1 CD1-CE1 CE1-CZ CZ-CE2 CE2-CD2 CD2-CG"
        ),
        residue!(
            "TYR",
            "tyrosine",
            "N(H) CA(HA) CB(HB2,HB3) CG CD1(HD1) CE1(HE1) CZ OH(HH) CE2(HE2) CD2(HD2) C O",
            "CA-CB CB-CG CG-CD1 CD1-CE1 CE1-CZ CZ-OH CZ-CE2 CE2-CD2 CD2-CG"
        ),
        residue!(
            "TRP",
            "tryptophan",
            "N(H) CA(HA) CB(HB2,HB3) CG CD1(HD1) NE1(HE1) CE2 CZ2(HZ2) CH2(HH2) CZ3(HZ3) CE3(HE3) CD2 C O",
            "CA-CB CB-CG CG-CD1 CD1-NE1 NE1-CE2 CE2-CZ2 CZ2-CH2 CH2-CZ3 CZ3-CE3 CE3-CD2 CD2-CG CD2-CE2"
        ),
        residue!(
            "ASP",
            "aspartate",
            "N(H) CA(HA) CB(HB2,HB3) CG OD1 OD2 C O",
            "CA-CB CB-CG CG-OD1 CG-OD2"
        ),
        residue!(
            "GLU",
            "glutamate",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG2,HG3) CD OE1 OE2 C O",
            "CA-CB CB-CG CG-CD CD-OE1 CD-OE2"
        ),
        residue!(
            "ASN",
            "asparagine",
            "N(H) CA(HA) CB(HB2,HB3) CG OD1 ND2(HD21,HD22) C O",
            "CA-CB CB-CG CG-OD1 CG-ND2"
        ),
        residue!(
            "GLN",
            "glutamine",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG2,HG3) CD OE1 NE2(HE21,HE22) C O",
            "CA-CB CB-CG CG-CD CD-OE1 CD-NE2"
        ),
        residue!(
            "LYS",
            "lysine",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG2,HG3) CD(HD2,HD3) CE(HE2,HE3) NZ(HZ1,HZ2,HZ3) C O",
            "CA-CB CB-CG CG-CD CD-CE CE-NZ"
        ),
        residue!(
            "ARG",
            "arginine",
            "N(H) CA(HA) CB(HB2,HB3) CG(HG2,HG3) CD(HD2,HD3) NE(HE) CZ NH1(HH11,HH12) NH2(HH21,HH22) C O",
            "CA-CB CB-CG CG-CD CD-NE NE-CZ CZ-NH1 CZ-NH2"
        ),
        residue!(
            "HIS",
            "histidine",
            "N(H) CA(HA) CB(HB2,HB3) CG ND1(HD1) CE1(HE1) NE2 CD2(HD2) C O",
            "CA-CB CB-CG CG-ND1 ND1-CE1 CE1-NE2 NE2-CD2 CD2-CG"
        ),
    ]
}

const VARIANTS: [VariantSource<'static>; 4] = [
    VariantSource {
        code: "NT1",
        removes: "H",
        adds: "H1 H2 H3",
        attach: "H1>N H2>N H3>N",
        is_n_terminus: true,
        is_c_terminus: false,
    },
    VariantSource {
        code: "NT2",
        removes: "H",
        adds: "H1 H2",
        attach: "H1>N H2>N",
        is_n_terminus: true,
        is_c_terminus: false,
    },
    VariantSource {
        code: "CT1",
        removes: "",
        adds: "OXT",
        attach: "OXT>C",
        is_n_terminus: false,
        is_c_terminus: true,
    },
    VariantSource {
        code: "CT2",
        removes: "",
        adds: "OXT(HXT)",
        attach: "OXT>C",
        is_n_terminus: false,
        is_c_terminus: true,
    },
];

pub fn residue_database() -> AnalysisResult<FragmentDatabase> {
    let mut database = FragmentDatabase::from_sources(FragmentKind::Residue, &residue_sources())?;
    let codes: Vec<String> = database.codes().map(str::to_string).collect();
    let mut templates = Vec::new();
    for code in codes {
        let mut template = database.get(&code)?.clone();
        let names: Vec<String> = template.atoms.iter().map(|atom| atom.name.clone()).collect();
        for name in names {
            let role = if BACKBONE_ATOMS.contains(&name.as_str()) {
                "backbone"
            } else {
                "sidechain"
            };
            template.roles.insert(name, role.to_string());
        }
        link_backbone(&mut template);
        templates.push(template);
    }
    for template in templates {
        database.insert(template);
    }
    add_variants(&mut database, &VARIANTS)?;
    Ok(database)
}

fn link_backbone(template: &mut FragmentTemplate) {
    for (from, to) in [("N", "CA"), ("CA", "C"), ("C", "O")] {
        if let Some(atom) = template.atoms.iter_mut().find(|atom| atom.name == from) {
            if !atom.bonds.iter().any(|bond| bond == to) {
                atom.bonds.push(to.to_string());
            }
        }
        if let Some(atom) = template.atoms.iter_mut().find(|atom| atom.name == to) {
            if !atom.bonds.iter().any(|bond| bond == from) {
                atom.bonds.push(from.to_string());
            }
        }
    }
    for name in ["OXT", "HXT", "H1", "H2", "H3"] {
        template.roles.insert(name.to_string(), "backbone".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::residue_database;
    use crate::domain::ErrorKind;

    #[test]
    fn all_twenty_residues_are_available() {
        let database = residue_database().expect("residues");
        assert_eq!(database.len(), 20);
        let alanine = database.get("ALA").expect("ALA");
        assert_eq!(alanine.atoms.len(), 10);
        assert_eq!(alanine.previous_link.as_deref(), Some("N"));
        assert_eq!(alanine.next_link.as_deref(), Some("C"));
        assert_eq!(alanine.role("CB"), Some("sidechain"));
        assert_eq!(alanine.role("CA"), Some("backbone"));
        let carbon = alanine.atom("CA").expect("CA");
        assert!(carbon.bonds.iter().any(|b| b == "CB"));
        assert!(carbon.bonds.iter().any(|b| b == "C"));
    }

    #[test]
    fn glycine_and_proline_keep_their_special_backbones() {
        let database = residue_database().expect("residues");
        let glycine = database.get("glycine").expect("by name");
        assert!(glycine.atom("HA").is_none());
        assert!(glycine.atom("HA2").is_some());
        let proline = database.get("PRO").expect("PRO");
        assert!(proline.atom("H").is_none());
        assert!(proline.atom("N").expect("N").bonds.iter().any(|b| b == "CD"));
    }

    #[test]
    fn terminal_variants_reshape_atoms() {
        let database = residue_database().expect("residues");
        let glycine = database.get("GLY").expect("GLY");
        let nterm = database.variant("NT1").expect("NT1");
        let atoms = glycine.with_variant(Some(nterm));
        let names: Vec<&str> = atoms.iter().map(|atom| atom.name.as_str()).collect();
        assert!(!names.contains(&"H"));
        assert!(names.contains(&"H1") && names.contains(&"H3"));

        let error = database.variant("XT9").expect_err("unknown variant");
        assert_eq!(error.kind(), ErrorKind::InvalidVariant);
    }
}
