use super::entries::{self, ObservationKeys};
use super::{DomainProfile, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "47420-5",
    name: "Functional Status",
    alternate_codes: &[],
    table_columns: &["assessment", "value", "date"],
    header_terms: &["assessment", "functional status", "finding", "category", "ability"],
    narrative_pattern: r"^(?P<assessment>[a-z][^:]*?)\s*:\s*(?P<value>[^(]+?)\s*(?:\((?P<date>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &[],
    natural_key: "assessment",
};

const KEYS: ObservationKeys = ObservationKeys {
    name: "assessment",
    group: Some("category"),
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "assessment",
        &["assessment", "finding", "name"],
        FieldKind::Coded,
        "Functional assessment",
    ),
    FieldSpec::new("value", &["value", "result", "score"], FieldKind::Value, NOT_SPECIFIED),
    FieldSpec::new("category", &["category"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "effective_date"], FieldKind::Date, NOT_SPECIFIED),
];

pub struct FunctionalStatusExtractor {
    parser: SectionParser,
}

impl FunctionalStatusExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for FunctionalStatusExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for FunctionalStatusExtractor {
    fn domain_code(&self) -> &str {
        PROFILE.code
    }

    fn domain_name(&self) -> &str {
        PROFILE.name
    }

    fn extract(&self, document: &ClinicalDocument) -> Result<Extraction> {
        Ok(self.parser.run(document, walk_entry))
    }

    fn field_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }
}

fn walk_entry(section: &Section<'_>, entry: &Element) -> ItemResult<Vec<RawClinicalItem>> {
    entries::observation_items(section, entry, KEYS)
}
