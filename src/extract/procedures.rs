use super::entries::{self, StructuredItem};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "47519-4",
    name: "History of Procedures",
    alternate_codes: &[],
    table_columns: &["procedure", "date", "performer", "body_site"],
    header_terms: &["procedure", "procedures", "intervention", "surgery", "procedure name"],
    narrative_pattern: r"^(?P<procedure>.+?)\s*(?:\(|\bon\s+|[-–,:]\s*)(?P<date>\d{4}(?:-\d{2}(?:-\d{2})?)?|\d{6,8})\)?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no known procedure", "no procedures", "no surgical history", "no past surg"],
    natural_key: "procedure",
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "procedure",
        &["procedure", "procedure_name", "name"],
        FieldKind::Coded,
        "Unknown procedure",
    ),
    FieldSpec::new("date", &["date", "procedure_date", "start_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("body_site", &["body_site", "target_site"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("performer", &["performer", "provider"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
];

pub struct ProceduresExtractor {
    parser: SectionParser,
}

impl ProceduresExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for ProceduresExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for ProceduresExtractor {
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
    let procedure =
        entries::statement(entry).ok_or_else(|| ItemError::new("entry holds no clinical statement"))?;
    if entries::is_negated(procedure) {
        return Ok(Vec::new());
    }

    let mut item = StructuredItem::new();
    item.concept("procedure", section, procedure.child("code"));
    item.text("date", entries::effective_time(procedure).0);
    item.concept("body_site", section, procedure.child("targetSiteCode"));
    item.text("performer", performer(procedure));
    item.text("status", entries::status_code(procedure));

    let item = item.finish();
    if !item.contains("procedure") {
        return Err(ItemError::new("procedure has no code"));
    }
    Ok(vec![item])
}

fn performer(procedure: &Element) -> Option<String> {
    let entity = procedure.path(&["performer", "assignedEntity"])?;
    entity
        .path(&["assignedPerson", "name"])
        .or_else(|| entity.path(&["representedOrganization", "name"]))
        .map(|name| name.text())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_procedure() {
        let doc = ClinicalDocument::parse(
            r#"<section><code code="47519-4"/><entry><procedure classCode="PROC" moodCode="EVN">
  <code code="80146002" codeSystem="2.16.840.1.113883.6.96" displayName="Appendectomy"/>
  <statusCode code="completed"/>
  <effectiveTime value="20110203"/>
  <performer><assignedEntity><representedOrganization><name>General Hospital</name></representedOrganization></assignedEntity></performer>
</procedure></entry></section>"#,
        )
        .unwrap();
        let extraction = ProceduresExtractor::new().extract(&doc).unwrap();
        let item = &extraction.items[0];
        assert_eq!(item.text("procedure").as_deref(), Some("Appendectomy"));
        assert_eq!(item.text("date").as_deref(), Some("20110203"));
        assert_eq!(item.text("performer").as_deref(), Some("General Hospital"));
    }

    #[test]
    fn test_narrative_dates() {
        let parser = SectionParser::new(&PROFILE);
        let item = parser.parse_line("Knee arthroscopy (2015-06)").unwrap();
        assert_eq!(item.text("procedure").as_deref(), Some("Knee arthroscopy"));
        assert_eq!(item.text("date").as_deref(), Some("2015-06"));

        let item = parser.parse_line("Cholecystectomy on 20190312").unwrap();
        assert_eq!(item.text("date").as_deref(), Some("20190312"));
        assert!(parser.parse_line("No surgical history").is_none());
    }
}
