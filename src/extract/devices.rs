use super::entries::{self, StructuredItem};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "46264-8",
    name: "Medical Devices",
    alternate_codes: &[],
    table_columns: &["device", "implant_date", "status", "identifier"],
    header_terms: &["device", "devices", "medical device", "implant", "device name"],
    narrative_pattern: r"^(?P<device>[^(]+?)\s*\((?:implanted|since|placed)?\s*:?\s*(?P<implant_date>[^)]+)\)\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no known device", "no devices", "no medical device", "no implant"],
    natural_key: "device",
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("device", &["device", "device_name"], FieldKind::Coded, "Unknown device"),
    FieldSpec::new("identifier", &["identifier", "udi"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new(
        "implant_date",
        &["implant_date", "start_date", "date"],
        FieldKind::Date,
        NOT_SPECIFIED,
    ),
    FieldSpec::new("end_date", &["end_date", "removal_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
];

pub struct DevicesExtractor {
    parser: SectionParser,
}

impl DevicesExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for DevicesExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for DevicesExtractor {
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

/// supply / procedure → participant → participantRole → playingDevice
fn walk_entry(section: &Section<'_>, entry: &Element) -> ItemResult<Vec<RawClinicalItem>> {
    let statement =
        entries::statement(entry).ok_or_else(|| ItemError::new("entry holds no clinical statement"))?;
    if entries::is_negated(statement) {
        return Ok(Vec::new());
    }
    let role = statement
        .children_named("participant")
        .filter_map(|participant| participant.child("participantRole"))
        .find(|role| role.child("playingDevice").is_some())
        .ok_or_else(|| ItemError::new("no device participant"))?;

    let mut item = StructuredItem::new();
    let device = role.child("playingDevice");
    item.concept("device", section, device.and_then(|d| d.child("code")));
    item.text(
        "device_name",
        device
            .and_then(|d| d.child("manufacturerModelName"))
            .map(|name| name.text())
            .filter(|name| !name.is_empty()),
    );
    item.text(
        "identifier",
        role.child("id")
            .and_then(|id| id.attr("extension").or_else(|| id.attr("root")))
            .map(str::to_string),
    );
    let (implanted, removed) = entries::effective_time(statement);
    item.text("implant_date", implanted).text("end_date", removed);
    item.text("status", entries::status_code(statement));

    let item = item.finish();
    if !item.contains("device") && !item.contains("device_name") {
        return Err(ItemError::new("device has neither code nor name"));
    }
    Ok(vec![item])
}
