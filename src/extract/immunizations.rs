use super::entries::{self, StructuredItem};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

/// LOINC "Dose number in series".
const DOSE_NUMBER_OBSERVATION: &str = "30973-2";

pub static PROFILE: DomainProfile = DomainProfile {
    code: "11369-6",
    name: "Immunizations",
    alternate_codes: &["60484-3"],
    table_columns: &["vaccine", "date", "dose_number", "lot_number", "manufacturer"],
    header_terms: &[
        "vaccine",
        "vaccines",
        "vaccination",
        "immunization",
        "immunisation",
        "vaccine name",
    ],
    narrative_pattern: r"^(?P<vaccine>.+?)\s*[-–:,]\s*(?P<date>\d{4}(?:-\d{2}(?:-\d{2})?)?|\d{6,8})(?:\s*\(dose\s*(?P<dose_number>\d+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no known immuni", "no vaccination", "no immuni", "not immuni"],
    natural_key: "vaccine",
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "vaccine",
        &["vaccine", "vaccine_name", "brand_name", "product"],
        FieldKind::Coded,
        "Unknown vaccine",
    ),
    FieldSpec::new("brand_name", &["brand_name"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("target_disease", &["target_disease"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "administration_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("dose_number", &["dose_number"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("lot_number", &["lot_number"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("manufacturer", &["manufacturer"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("route", &["route"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
];

pub struct ImmunizationsExtractor {
    parser: SectionParser,
}

impl ImmunizationsExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for ImmunizationsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for ImmunizationsExtractor {
    fn domain_code(&self) -> &str {
        PROFILE.code
    }

    fn domain_name(&self) -> &str {
        PROFILE.name
    }

    fn accepted_codes(&self) -> Vec<&str> {
        PROFILE.accepted_codes()
    }

    fn extract(&self, document: &ClinicalDocument) -> Result<Extraction> {
        Ok(self.parser.run(document, walk_entry))
    }

    fn field_schema(&self) -> &'static [FieldSpec] {
        SCHEMA
    }
}

fn walk_entry(section: &Section<'_>, entry: &Element) -> ItemResult<Vec<RawClinicalItem>> {
    let administration = entries::statement(entry)
        .filter(|el| el.name == "substanceAdministration")
        .ok_or_else(|| ItemError::new("entry holds no substance administration"))?;
    // negationInd：疫苗未施打
    if entries::is_negated(administration) {
        return Ok(Vec::new());
    }

    let mut item = StructuredItem::new();
    let product = administration.path(&["consumable", "manufacturedProduct"]);
    if let Some(product) = product {
        let material = product.child("manufacturedMaterial");
        item.concept("vaccine", section, material.and_then(|m| m.child("code")));
        item.text("brand_name", text_of(material.and_then(|m| m.child("name"))));
        item.text("lot_number", text_of(material.and_then(|m| m.child("lotNumberText"))));
        item.text(
            "manufacturer",
            text_of(product.path(&["manufacturerOrganization", "name"])),
        );
    }

    item.text("date", entries::effective_time(administration).0);
    item.text("dose_number", dose_number(section, administration));
    item.concept("route", section, administration.child("routeCode"));
    item.text("status", entries::status_code(administration));

    let target = entries::related(administration, "RSON")
        .into_iter()
        .find(|el| el.name == "observation");
    item.concept("target_disease", section, target.and_then(|obs| obs.child("value")));

    let item = item.finish();
    if !item.contains("vaccine") && !item.contains("brand_name") {
        return Err(ItemError::new("administration names no vaccine"));
    }
    Ok(vec![item])
}

fn text_of(element: Option<&Element>) -> Option<String> {
    element.map(|el| el.text()).filter(|text| !text.is_empty())
}

fn dose_number(section: &Section<'_>, administration: &Element) -> Option<String> {
    if let Some(value) = entries::related_value(section, administration, DOSE_NUMBER_OBSERVATION) {
        return value.display_text();
    }
    administration
        .children_named("entryRelationship")
        .find_map(|rel| rel.child("sequenceNumber"))
        .and_then(|seq| seq.attr("value"))
        .map(str::to_string)
}
