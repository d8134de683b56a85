use super::entries::{self, ObservationKeys};
use super::{DomainProfile, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "10162-6",
    name: "History of Pregnancies",
    alternate_codes: &[],
    table_columns: &["observation", "value", "date"],
    header_terms: &["observation", "pregnancy", "item", "finding"],
    narrative_pattern: r"^(?P<observation>[a-z][^:]*?)\s*:\s*(?P<value>[^(]+?)\s*(?:\((?P<date>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no pregnancy history", "never pregnant"],
    natural_key: "observation",
};

const KEYS: ObservationKeys = ObservationKeys {
    name: "observation",
    group: None,
};

/// Status (82810-3), expected delivery date (11778-8) and outcome counts
/// all share the observation shape; the value kind depends on the code.
pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "observation",
        &["observation", "name"],
        FieldKind::Coded,
        "Pregnancy observation",
    ),
    FieldSpec::new("value", &["value", "result", "outcome"], FieldKind::Value, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "effective_date"], FieldKind::Date, NOT_SPECIFIED),
];

pub struct PregnancyExtractor {
    parser: SectionParser,
}

impl PregnancyExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for PregnancyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for PregnancyExtractor {
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
