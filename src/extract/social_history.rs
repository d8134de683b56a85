use super::entries::{self, ObservationKeys};
use super::{DomainProfile, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "29762-2",
    name: "Social History",
    alternate_codes: &[],
    table_columns: &["observation", "value", "date", "end_date"],
    header_terms: &["observation", "social history", "habit", "category", "type"],
    narrative_pattern: r"^(?P<observation>[a-z][^:]*?)\s*:\s*(?P<value>[^(]+?)\s*(?:\((?P<date>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &[],
    natural_key: "observation",
};

const KEYS: ObservationKeys = ObservationKeys {
    name: "observation",
    group: None,
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "observation",
        &["observation", "habit", "name"],
        FieldKind::Coded,
        "Social history observation",
    ),
    FieldSpec::new(
        "value",
        &["value", "result"],
        FieldKind::Quantity { unit_keys: &["unit"] },
        NOT_SPECIFIED,
    ),
    FieldSpec::new("date", &["date", "start_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("end_date", &["end_date", "end"], FieldKind::Date, NOT_SPECIFIED),
];

pub struct SocialHistoryExtractor {
    parser: SectionParser,
}

impl SocialHistoryExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for SocialHistoryExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for SocialHistoryExtractor {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoking_observation() {
        let doc = ClinicalDocument::parse(
            r#"<section xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><code code="29762-2"/>
<entry><observation><code code="72166-2" displayName="Tobacco smoking status"/>
  <effectiveTime><low value="20050101"/><high value="20150601"/></effectiveTime>
  <value xsi:type="CD" code="8517006" codeSystem="2.16.840.1.113883.6.96" displayName="Ex-smoker"/>
</observation></entry></section>"#,
        )
        .unwrap();
        let extraction = SocialHistoryExtractor::new().extract(&doc).unwrap();
        let item = &extraction.items[0];
        assert_eq!(item.text("value").as_deref(), Some("Ex-smoker"));
        assert_eq!(item.text("date").as_deref(), Some("20050101"));
        assert_eq!(item.text("end_date").as_deref(), Some("20150601"));
    }

    #[test]
    fn test_narrative_fallback() {
        let doc = ClinicalDocument::parse(
            r#"<section><code code="29762-2"/><text><paragraph>Alcohol use: 2 units per week</paragraph></text></section>"#,
        )
        .unwrap();
        let extraction = SocialHistoryExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(
            extraction.items[0].text("value").as_deref(),
            Some("2 units per week")
        );
    }
}
