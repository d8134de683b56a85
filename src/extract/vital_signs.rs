use super::entries::{self, ObservationKeys};
use super::{DomainProfile, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "8716-3",
    name: "Vital Signs",
    alternate_codes: &[],
    table_columns: &["vital_sign", "value", "unit", "date"],
    header_terms: &["vital sign", "vital signs", "measurement", "observation", "parameter"],
    narrative_pattern: r"^(?P<vital_sign>[a-z][a-z ()]*?)\s*:\s*(?P<value>\d+(?:[.,]\d+)?(?:/\d+)?)\s*(?P<unit>[^\d\s(][^(]*?)?\s*(?:\((?P<date>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &[],
    natural_key: "vital_sign",
};

const KEYS: ObservationKeys = ObservationKeys {
    name: "vital_sign",
    group: None,
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "vital_sign",
        &["vital_sign", "observation", "name"],
        FieldKind::Coded,
        "Unknown measurement",
    ),
    FieldSpec::new(
        "value",
        &["value", "result"],
        FieldKind::Quantity { unit_keys: &["unit"] },
        NOT_SPECIFIED,
    ),
    FieldSpec::new("interpretation", &["interpretation"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "effective_date"], FieldKind::Date, NOT_SPECIFIED),
];

pub struct VitalSignsExtractor {
    parser: SectionParser,
}

impl VitalSignsExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for VitalSignsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for VitalSignsExtractor {
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
