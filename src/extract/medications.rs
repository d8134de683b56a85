use super::entries::{self, StructuredItem};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "10160-0",
    name: "Medication Summary",
    alternate_codes: &["10183-2", "29549-3"],
    table_columns: &[
        "medication",
        "strength",
        "dose_form",
        "posology",
        "route",
        "start_date",
        "end_date",
    ],
    header_terms: &[
        "medication",
        "medicine",
        "medicinal product",
        "drug",
        "brand name",
        "product",
        "active ingredient",
    ],
    narrative_pattern: r"^(?P<medication>[a-z][^\d,;:]*?)\s+(?P<strength>\d+(?:[.,]\d+)?\s*(?:mg|g|mcg|µg|ug|ml|iu|units?|%)(?:\s*/\s*\d*\s*[a-z]+)?)(?:\s*[-–,:]\s*(?P<posology>.+?))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &[
        "no known medication",
        "no current medication",
        "no regular medication",
        "no medication",
    ],
    natural_key: "medication",
};

const START_KEYS: &[&str] = &["start_date", "start"];
const END_KEYS: &[&str] = &["end_date", "end"];

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "medication",
        &["medication", "brand_name", "active_ingredient", "active_ingredient_name", "product"],
        FieldKind::Coded,
        "Unknown medication",
    ),
    FieldSpec::new(
        "active_ingredient",
        &["active_ingredient", "active_ingredient_name", "ingredient"],
        FieldKind::Coded,
        NOT_SPECIFIED,
    ),
    FieldSpec::new("brand_name", &["brand_name"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("strength", &["strength"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("dose_form", &["dose_form", "form"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new(
        "dose",
        &["dose", "dose_quantity"],
        FieldKind::Quantity {
            unit_keys: &["dose_unit"],
        },
        NOT_SPECIFIED,
    ),
    FieldSpec::new(
        "frequency",
        &["frequency", "posology"],
        FieldKind::Text,
        NOT_SPECIFIED,
    ),
    FieldSpec::new("route", &["route", "route_of_administration"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("start_date", START_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("end_date", END_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("period", START_KEYS, FieldKind::Period { end_keys: END_KEYS }, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
    FieldSpec::new("instructions", &["instructions"], FieldKind::Text, NOT_SPECIFIED),
];

pub struct MedicationsExtractor {
    parser: SectionParser,
}

impl MedicationsExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for MedicationsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for MedicationsExtractor {
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
    if entries::is_negated(administration) {
        return Ok(Vec::new());
    }

    let mut item = StructuredItem::new();
    let material = administration.path(&["consumable", "manufacturedProduct", "manufacturedMaterial"]);
    if let Some(material) = material {
        item.concept("medication", section, material.child("code"));
        item.text("brand_name", element_text(material.child("name")));
        item.concept("dose_form", section, material.child("formCode"));

        let ingredient = material
            .children_named("ingredient")
            .find(|ing| ing.attr("classCode").map(|c| c == "ACTI").unwrap_or(true));
        if let Some(ingredient) = ingredient {
            let substance = ingredient.child("ingredientSubstance");
            item.concept("active_ingredient", section, substance.and_then(|s| s.child("code")));
            item.text(
                "active_ingredient_name",
                element_text(substance.and_then(|s| s.child("name"))),
            );
            item.text("strength", strength(ingredient));
        }
    }

    item.value(
        "dose",
        administration.child("doseQuantity").and_then(entries::quantity),
    );
    item.text("frequency", frequency(administration));
    item.concept("route", section, administration.child("routeCode"));

    let (start, end) = entries::effective_time(administration);
    item.text("start_date", start).text("end_date", end);
    item.text("status", entries::status_code(administration));

    let instructions = entries::related(administration, "SUBJ")
        .into_iter()
        .filter(|el| el.name == "act")
        .find_map(|act| entries::narrative_text(section, act));
    item.text("instructions", instructions);

    let item = item.finish();
    if !["medication", "brand_name", "active_ingredient", "active_ingredient_name"]
        .iter()
        .any(|key| item.contains(key))
    {
        return Err(ItemError::new("administration names no product"));
    }
    Ok(vec![item])
}

fn element_text(element: Option<&Element>) -> Option<String> {
    element.map(|el| el.text()).filter(|text| !text.is_empty())
}

/// "500 mg" 或 "250 mg/5 mL"
fn strength(ingredient: &Element) -> Option<String> {
    let quantity = ingredient.child("quantity")?;
    let part = |name: &str| {
        quantity.child(name).and_then(|el| {
            let value = el.attr("value")?;
            Some(match el.attr("unit").filter(|unit| *unit != "1") {
                Some(unit) => format!("{} {}", value, unit),
                None => value.to_string(),
            })
        })
    };
    let numerator = part("numerator")?;
    match part("denominator").filter(|denominator| denominator != "1") {
        Some(denominator) => Some(format!("{}/{}", numerator, denominator)),
        None => Some(numerator),
    }
}

/// Periodic (PIVL_TS) or event-based (EIVL_TS) timing as text.
fn frequency(administration: &Element) -> Option<String> {
    administration
        .children_named("effectiveTime")
        .find_map(|time| match time.attr("type") {
            Some("PIVL_TS") => time.child("period").and_then(|period| {
                let value = period.attr("value")?;
                let unit = period.attr("unit").unwrap_or_default();
                Some(format!("every {} {}", value, unit).trim().to_string())
            }),
            Some("EIVL_TS") => time
                .child("event")
                .and_then(|event| event.attr("code"))
                .map(|code| format!("event {}", code)),
            _ => None,
        })
}
