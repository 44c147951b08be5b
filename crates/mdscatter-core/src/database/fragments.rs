use super::templates::{FragmentTemplate, TemplateSource, Variant, build_template, build_variant};
use crate::domain::{AnalysisError, AnalysisResult, ErrorKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Molecule,
    Residue,
    Nucleotide,
}

impl FragmentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Molecule => "molecule",
            Self::Residue => "residue",
            Self::Nucleotide => "nucleotide",
        }
    }

    fn unknown_kind(self) -> ErrorKind {
        match self {
            Self::Molecule => ErrorKind::UnknownMolecule,
            Self::Residue | Self::Nucleotide => ErrorKind::UnknownResidue,
        }
    }
}

/// Named fragment templates plus the variants that may decorate them.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDatabase {
    kind: FragmentKind,
    templates: BTreeMap<String, FragmentTemplate>,
    variants: BTreeMap<String, Variant>,
}

impl FragmentDatabase {
    pub fn new(kind: FragmentKind) -> Self {
        Self {
            kind,
            templates: BTreeMap::new(),
            variants: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    pub fn insert(&mut self, template: FragmentTemplate) {
        self.templates.insert(template.code.clone(), template);
    }

    pub fn insert_variant(&mut self, variant: Variant) {
        self.variants.insert(variant.code.clone(), variant);
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn templates(&self) -> impl Iterator<Item = &FragmentTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, code: &str) -> AnalysisResult<&FragmentTemplate> {
        self.templates
            .get(code)
            .or_else(|| {
                self.templates.values().find(|template| {
                    template.name.eq_ignore_ascii_case(code)
                        || template.alternatives.iter().any(|alt| alt == code)
                })
            })
            .ok_or_else(|| {
                AnalysisError::new(
                    self.kind.unknown_kind(),
                    "INPUT.UNKNOWN_FRAGMENT",
                    format!("unknown {} '{code}'", self.kind.as_str()),
                )
            })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_ok()
    }

    pub fn variant(&self, code: &str) -> AnalysisResult<&Variant> {
        self.variants.get(code).ok_or_else(|| {
            AnalysisError::new(
                ErrorKind::InvalidVariant,
                "INPUT.INVALID_VARIANT",
                format!("unknown {} variant '{code}'", self.kind.as_str()),
            )
        })
    }

    pub fn variant_codes(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    pub(crate) fn from_sources(
        kind: FragmentKind,
        sources: &[TemplateSource<'_>],
    ) -> AnalysisResult<Self> {
        let mut database = Self::new(kind);
        for source in sources {
            database.insert(build_template(source)?);
        }
        Ok(database)
    }
}

pub(crate) struct VariantSource<'a> {
    pub code: &'a str,
    pub removes: &'a str,
    pub adds: &'a str,
    pub attach: &'a str,
    pub is_n_terminus: bool,
    pub is_c_terminus: bool,
}

pub(crate) fn add_variants(
    database: &mut FragmentDatabase,
    sources: &[VariantSource<'_>],
) -> AnalysisResult<()> {
    for source in sources {
        database.insert_variant(build_variant(
            source.code,
            source.removes,
            source.adds,
            source.attach,
            source.is_n_terminus,
            source.is_c_terminus,
        )?);
    }
    Ok(())
}
