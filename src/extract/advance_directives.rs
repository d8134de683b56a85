use super::entries::{self, StructuredItem};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "42348-3",
    name: "Advance Directives",
    alternate_codes: &[],
    table_columns: &["directive", "value", "date", "document"],
    header_terms: &["directive", "advance directive", "directives", "type"],
    narrative_pattern: r"^(?P<directive>[^:–-]+?)\s*[:–-]\s*(?P<value>[^(]+?)(?:\s*\((?P<date>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no advance directive", "no directives"],
    natural_key: "directive",
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "directive",
        &["directive", "directive_type", "name"],
        FieldKind::Coded,
        "Unknown directive",
    ),
    FieldSpec::new("value", &["value"], FieldKind::Value, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "start_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("end_date", &["end_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("document", &["document", "reference"], FieldKind::Text, NOT_SPECIFIED),
];

pub struct AdvanceDirectivesExtractor {
    parser: SectionParser,
}

impl AdvanceDirectivesExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for AdvanceDirectivesExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for AdvanceDirectivesExtractor {
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
    let observation = entries::statement(entry)
        .filter(|el| el.name == "observation" || el.name == "act")
        .ok_or_else(|| ItemError::new("entry holds no directive observation"))?;

    let mut item = StructuredItem::new();
    item.concept("directive", section, observation.child("code"));
    item.value(
        "value",
        observation
            .child("value")
            .and_then(|value| entries::typed_value(section, value)),
    );
    item.text("status", entries::status_code(observation));
    let (start, end) = entries::effective_time(observation);
    item.text("date", start).text("end_date", end);
    item.text("document", document_reference(observation));

    let item = item.finish();
    if !item.contains("directive") {
        return Err(ItemError::new("directive has no code"));
    }
    Ok(vec![item])
}

/// 外部文件（例如掃描的同意書）的位置或識別碼
fn document_reference(observation: &Element) -> Option<String> {
    let external = observation
        .children_named("reference")
        .find_map(|reference| reference.child("externalDocument"))?;
    external
        .path(&["text", "reference"])
        .and_then(|reference| reference.attr("value"))
        .or_else(|| external.child("id").and_then(|id| id.attr("extension").or_else(|| id.attr("root"))))
        .map(str::to_string)
}
