use super::entries::{self, ObservationKeys};
use super::{DomainProfile, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "30954-2",
    name: "Results",
    alternate_codes: &["26436-6"],
    table_columns: &["test", "value", "unit", "reference_range", "interpretation", "date"],
    header_terms: &[
        "test",
        "result",
        "results",
        "laboratory test",
        "lab test",
        "analyte",
        "examination",
    ],
    narrative_pattern: r"^(?P<test>[a-z][^:]*?)\s*:\s*(?P<value>[<>]?\s*\d+(?:[.,]\d+)?)\s*(?P<unit>[^\s(]+)?\s*(?:\((?P<interpretation>[^)]+)\))?\s*\.?$",
    narrative_requires: &[],
    negation_phrases: &["no results", "no laboratory"],
    natural_key: "test",
};

const KEYS: ObservationKeys = ObservationKeys {
    name: "test",
    group: Some("panel"),
};

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "test",
        &["test", "test_name", "observation", "name"],
        FieldKind::Coded,
        "Unknown test",
    ),
    FieldSpec::new(
        "value",
        &["value", "result"],
        FieldKind::Quantity { unit_keys: &["unit"] },
        NOT_SPECIFIED,
    ),
    FieldSpec::new("reference_range", &["reference_range"], FieldKind::Text, NOT_SPECIFIED),
    FieldSpec::new("interpretation", &["interpretation"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("panel", &["panel", "battery"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("date", &["date", "effective_date"], FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
];

pub struct ResultsExtractor {
    parser: SectionParser,
}

impl ResultsExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for ResultsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for ResultsExtractor {
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
    entries::observation_items(section, entry, KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_components() {
        let doc = ClinicalDocument::parse(
            r#"<section xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><code code="30954-2"/>
<entry><organizer classCode="BATTERY"><code code="24331-1" displayName="Lipid panel"/><statusCode code="completed"/>
  <component><observation><code code="2093-3" displayName="Cholesterol"/><effectiveTime value="20220110"/>
    <value xsi:type="PQ" value="5.2" unit="mmol/L"/>
    <interpretationCode code="H" codeSystem="2.16.840.1.113883.5.83"/>
    <referenceRange><observationRange><value xsi:type="IVL_PQ"><low value="3.0" unit="mmol/L"/><high value="5.0" unit="mmol/L"/></value></observationRange></referenceRange>
  </observation></component>
  <component><observation><code nullFlavor="UNK"/></observation></component>
</organizer></entry></section>"#,
        )
        .unwrap();
        let extraction = ResultsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        let item = &extraction.items[0];
        assert_eq!(item.text("test").as_deref(), Some("Cholesterol"));
        assert_eq!(item.text("panel").as_deref(), Some("Lipid panel"));
        assert_eq!(item.get("interpretation").unwrap().as_coded().unwrap().code, "H");
        assert_eq!(
            item.text("reference_range").as_deref(),
            Some("3.0 mmol/L - 5.0 mmol/L")
        );
    }

    #[test]
    fn test_table_results() {
        let doc = ClinicalDocument::parse(
            r#"<section><code code="26436-6"/><text><table>
<tr><th>Test</th><th>Value</th><th>Unit</th></tr>
<tr><td>HbA1c</td><td>6.1</td><td>%</td></tr></table></text></section>"#,
        )
        .unwrap();
        let extraction = ResultsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].text("unit").as_deref(), Some("%"));
    }
}
