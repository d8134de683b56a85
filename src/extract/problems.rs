use super::entries::{self, StructuredItem, SEVERITY_OBSERVATION, STATUS_OBSERVATION};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "11450-4",
    name: "Problem List",
    alternate_codes: &["11348-0"],
    table_columns: &["problem", "status", "onset", "resolution", "severity"],
    header_terms: &[
        "problem",
        "problems",
        "condition",
        "diagnosis",
        "active problem",
        "problem name",
    ],
    narrative_pattern: r"^(?P<problem>[^(]+?)(?:\s*\((?:since|onset|from)?\s*:?\s*(?P<onset>[^)]+)\))?(?:\s*[-–:,]\s*(?P<status>active|inactive|resolved|in remission|remission|inctive|actve))?\s*\.?$",
    narrative_requires: &["onset", "status"],
    negation_phrases: &["no known problem", "no current problem", "no active problem"],
    natural_key: "problem",
};

const ONSET_KEYS: &[&str] = &["onset", "onset_date", "start_date"];
const END_KEYS: &[&str] = &["resolution", "resolution_date", "end"];

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "problem",
        &["problem", "condition", "diagnosis"],
        FieldKind::Coded,
        "Unknown problem",
    ),
    FieldSpec::new("problem_type", &["problem_type"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new(
        "status",
        &["status", "clinical_status", "concern_status"],
        FieldKind::Status,
        NOT_SPECIFIED,
    ),
    FieldSpec::new("severity", &["severity"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("onset", ONSET_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("resolution", END_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("time", ONSET_KEYS, FieldKind::Period { end_keys: END_KEYS }, NOT_SPECIFIED),
];

pub struct ProblemsExtractor {
    parser: SectionParser,
}

impl ProblemsExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for ProblemsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for ProblemsExtractor {
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

/// A concern act may track several problem observations.
fn walk_entry(section: &Section<'_>, entry: &Element) -> ItemResult<Vec<RawClinicalItem>> {
    let statement =
        entries::statement(entry).ok_or_else(|| ItemError::new("entry holds no clinical statement"))?;
    let (concern, observations) = if statement.name == "act" {
        let observations: Vec<&Element> = entries::related(statement, "SUBJ")
            .into_iter()
            .filter(|el| el.name == "observation")
            .collect();
        (Some(statement), observations)
    } else {
        (None, vec![statement])
    };
    if observations.is_empty() {
        return Err(ItemError::new("problem concern without an observation"));
    }

    let concern_time = concern.map(entries::effective_time).unwrap_or_default();
    let mut items = Vec::new();
    let mut unreadable = 0;
    for observation in observations {
        if entries::is_negated(observation) {
            continue;
        }
        let mut item = StructuredItem::new();
        item.concept("problem", section, observation.child("value"));
        item.concept("problem_type", section, observation.child("code"));
        item.value(
            "status",
            entries::related_value(section, observation, STATUS_OBSERVATION),
        );
        item.text("concern_status", concern.and_then(entries::status_code));
        item.value(
            "severity",
            entries::related_value(section, observation, SEVERITY_OBSERVATION),
        );

        let (onset, resolution) = entries::effective_time(observation);
        item.text("onset", onset.or_else(|| concern_time.0.clone()));
        item.text("resolution", resolution.or_else(|| concern_time.1.clone()));

        let item = item.finish();
        if !item.contains("problem") {
            tracing::debug!("⏭️ Problem observation without a value ignored");
            unreadable += 1;
            continue;
        }
        items.push(item);
    }
    if items.is_empty() && unreadable > 0 {
        return Err(ItemError::new("problem observation has no value"));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(section_body: &str) -> ClinicalDocument {
        ClinicalDocument::parse(&format!(
            r#"<ClinicalDocument xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><component><structuredBody><component><section><code code="11450-4"/>{}</section></component></structuredBody></component></ClinicalDocument>"#,
            section_body
        ))
        .unwrap()
    }

    #[test]
    fn test_concern_status_and_onset() {
        let doc = document(
            r##"<text><content ID="p1">Penicillin allergy</content></text>
<entry><act><statusCode code="active"/><effectiveTime><low value="20180101"/></effectiveTime>
  <entryRelationship typeCode="SUBJ"><observation>
    <code code="282291009" codeSystem="2.16.840.1.113883.6.96"/>
    <value xsi:type="CD" nullFlavor="OTH"><originalText><reference value="#p1"/></originalText></value>
  </observation></entryRelationship>
</act></entry>"##,
        );
        let extraction = ProblemsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        let item = &extraction.items[0];
        assert_eq!(item.text("problem").as_deref(), Some("Penicillin allergy"));
        assert_eq!(item.text("concern_status").as_deref(), Some("active"));
        assert_eq!(item.text("onset").as_deref(), Some("20180101"));
    }

    #[test]
    fn test_unreadable_observation_keeps_its_siblings() {
        let doc = document(
            r#"<entry><act><statusCode code="active"/>
  <entryRelationship typeCode="SUBJ"><observation>
    <code code="55607006" codeSystem="2.16.840.1.113883.6.96"/>
    <value xsi:type="CD" code="38341003" codeSystem="2.16.840.1.113883.6.96" displayName="Hypertension"/>
  </observation></entryRelationship>
  <entryRelationship typeCode="SUBJ"><observation>
    <code code="55607006" codeSystem="2.16.840.1.113883.6.96"/>
  </observation></entryRelationship>
</act></entry>
<entry><act><entryRelationship typeCode="SUBJ"><observation>
  <code code="55607006" codeSystem="2.16.840.1.113883.6.96"/>
</observation></entryRelationship></act></entry>"#,
        );
        let extraction = ProblemsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.skipped, 1);
        let problem = extraction.items[0].get("problem").unwrap().as_coded().unwrap();
        assert_eq!(problem.code, "38341003");
    }

    #[test]
    fn test_alternate_section_code() {
        let doc = ClinicalDocument::parse(
            r#"<ClinicalDocument><section><code code="11348-0"/><text><paragraph>Appendicitis (since 2001) - resolved</paragraph></text></section></ClinicalDocument>"#,
        )
        .unwrap();
        let extraction = ProblemsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        let item = &extraction.items[0];
        assert_eq!(item.text("problem").as_deref(), Some("Appendicitis"));
        assert_eq!(item.text("onset").as_deref(), Some("2001"));
        assert_eq!(item.text("status").as_deref(), Some("resolved"));
    }

    #[test]
    fn test_table_rows() {
        let doc = document(
            "<text><table><tr><th>Problem</th><th>Status</th><th>Onset</th></tr>\
             <tr><td>Hypertension</td><td>Inctive</td><td>20091006</td></tr></table></text>",
        );
        let extraction = ProblemsExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].text("status").as_deref(), Some("Inctive"));
        assert_eq!(extraction.items[0].text("onset").as_deref(), Some("20091006"));
    }
}
