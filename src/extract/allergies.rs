use super::entries::{self, StructuredItem, CRITICALITY_OBSERVATION, SEVERITY_OBSERVATION, STATUS_OBSERVATION};
use super::{DomainProfile, ItemError, ItemResult, SectionParser};
use crate::document::{ClinicalDocument, Element, Section};
use crate::domain::model::{Extraction, RawClinicalItem};
use crate::domain::ports::SectionExtractor;
use crate::domain::schema::{
    EnrichmentRule, FieldCopy, FieldKind, FieldSpec, CRITICALITY_UNASSESSED, NOT_SPECIFIED,
};
use crate::utils::error::Result;

pub static PROFILE: DomainProfile = DomainProfile {
    code: "48765-2",
    name: "Allergies and Intolerances",
    alternate_codes: &[],
    table_columns: &["allergen", "reaction", "severity", "status", "onset"],
    header_terms: &[
        "allergen",
        "agent",
        "substance",
        "allergy",
        "allergies",
        "allergy type",
        "causative agent",
    ],
    narrative_pattern: r"^(?:allerg(?:y|ies)(?:\s+to)?\s*:\s*)?(?P<allergen>[^-–(:]+?)\s*(?:[-–:]\s*(?P<reaction>[^(]+?))?\s*(?:\((?P<severity>[^)]+)\))?\s*\.?$",
    narrative_requires: &["reaction", "severity"],
    negation_phrases: &["no known allerg", "nkda", "no allerg", "no drug allerg"],
    natural_key: "allergen",
};

const ONSET_KEYS: &[&str] = &["onset", "onset_date", "start_date"];
const END_KEYS: &[&str] = &["end", "resolution", "end_date"];

pub static SCHEMA: &[FieldSpec] = &[
    FieldSpec::new(
        "agent",
        &["agent", "allergen", "agent_name", "substance"],
        FieldKind::Coded,
        "Unknown allergen",
    ),
    FieldSpec::new("reaction", &["reaction", "manifestation"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("severity", &["severity"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new(
        "criticality",
        &["criticality"],
        FieldKind::Criticality {
            severity_field: "severity",
        },
        CRITICALITY_UNASSESSED,
    ),
    FieldSpec::new("type", &["type", "allergy_type", "category"], FieldKind::Coded, NOT_SPECIFIED),
    FieldSpec::new("status", &["status", "clinical_status"], FieldKind::Status, NOT_SPECIFIED),
    FieldSpec::new("onset", ONSET_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("end", END_KEYS, FieldKind::Date, NOT_SPECIFIED),
    FieldSpec::new("time", ONSET_KEYS, FieldKind::Period { end_keys: END_KEYS }, NOT_SPECIFIED),
];

/// 過敏的時間與狀態常只記在問題清單
pub const ENRICHMENT: EnrichmentRule = EnrichmentRule {
    source_domain: "11450-4",
    target_keys: &["reaction", "manifestation", "agent", "allergen", "agent_name"],
    source_keys: &["problem", "condition"],
    copies: &[
        FieldCopy {
            from: &["onset", "onset_date"],
            to: "onset",
        },
        FieldCopy {
            from: &["resolution", "resolution_date"],
            to: "end",
        },
        FieldCopy {
            from: &["status", "clinical_status", "concern_status"],
            to: "status",
        },
        FieldCopy {
            from: &["severity"],
            to: "severity",
        },
    ],
    criticality_field: Some("criticality"),
};

/// SNOMED CT findings that record the absence of allergies.
const NO_KNOWN_ALLERGY_CODES: &[&str] = &["716186003", "409137002", "428607008", "429625007"];

pub struct AllergiesExtractor {
    parser: SectionParser,
}

impl AllergiesExtractor {
    pub fn new() -> Self {
        Self {
            parser: SectionParser::new(&PROFILE),
        }
    }
}

impl Default for AllergiesExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionExtractor for AllergiesExtractor {
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

    fn enrichment(&self) -> Option<EnrichmentRule> {
        Some(ENRICHMENT)
    }
}

/// entry → act (concern) → entryRelationship[SUBJ] → observation
/// A concern act may track several allergy observations.
fn walk_entry(section: &Section<'_>, entry: &Element) -> ItemResult<Vec<RawClinicalItem>> {
    let statement =
        entries::statement(entry).ok_or_else(|| ItemError::new("entry holds no clinical statement"))?;
    let observations: Vec<&Element> = if statement.name == "observation" {
        vec![statement]
    } else {
        entries::related(statement, "SUBJ")
            .into_iter()
            .filter(|el| el.name == "observation")
            .collect()
    };
    if observations.is_empty() {
        return Err(ItemError::new("allergy concern without an observation"));
    }

    let mut items = Vec::new();
    let mut unreadable = 0;
    for observation in observations {
        if entries::is_negated(observation) || states_no_allergy(observation) {
            continue;
        }
        match allergy_item(section, observation) {
            Some(item) => items.push(item),
            None => {
                tracing::debug!("⏭️ Allergy observation without readable fields ignored");
                unreadable += 1;
            }
        }
    }
    if items.is_empty() && unreadable > 0 {
        return Err(ItemError::new("allergy observation has no readable fields"));
    }
    Ok(items)
}

fn allergy_item(section: &Section<'_>, observation: &Element) -> Option<RawClinicalItem> {
    let mut item = StructuredItem::new();
    item.concept("type", section, observation.child("value"));

    let entity = observation
        .children_named("participant")
        .filter_map(|participant| participant.path(&["participantRole", "playingEntity"]))
        .next();
    if let Some(entity) = entity {
        item.concept("agent", section, entity.child("code"));
        item.text(
            "agent_name",
            entity.child("name").map(|name| name.text()).filter(|name| !name.is_empty()),
        );
    }

    let manifestation = entries::related(observation, "MFST")
        .into_iter()
        .find(|el| el.name == "observation");
    if let Some(manifestation) = manifestation {
        item.concept("reaction", section, manifestation.child("value"));
    }

    // 嚴重度可能掛在過敏觀察或其反應之下
    let severity = entries::related_value(section, observation, SEVERITY_OBSERVATION).or_else(|| {
        manifestation.and_then(|m| entries::related_value(section, m, SEVERITY_OBSERVATION))
    });
    item.value("severity", severity);
    item.value(
        "criticality",
        entries::related_value(section, observation, CRITICALITY_OBSERVATION),
    );
    item.value(
        "status",
        entries::related_value(section, observation, STATUS_OBSERVATION),
    );

    let (onset, end) = entries::effective_time(observation);
    item.text("onset", onset).text("end", end);

    if item.is_empty() {
        return None;
    }
    Some(item.finish())
}

fn states_no_allergy(observation: &Element) -> bool {
    observation
        .child("value")
        .and_then(|value| value.attr("code"))
        .map(|code| NO_KNOWN_ALLERGY_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FieldSource;

    fn document(section_body: &str) -> ClinicalDocument {
        ClinicalDocument::parse(&format!(
            r#"<ClinicalDocument xmlns="urn:hl7-org:v3" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><component><structuredBody><component><section><code code="48765-2" codeSystem="2.16.840.1.113883.6.1"/>{}</section></component></structuredBody></component></ClinicalDocument>"#,
            section_body
        ))
        .unwrap()
    }

    const STRUCTURED: &str = r##"
<text><table><tr><td ID="agent1">Amoxicillin</td><td ID="reaction1">Skin eruption</td></tr></table></text>
<entry>
  <act classCode="ACT" moodCode="EVN">
    <statusCode code="active"/>
    <entryRelationship typeCode="SUBJ">
      <observation classCode="OBS" moodCode="EVN">
        <value xsi:type="CD" code="419511003" codeSystem="2.16.840.1.113883.6.96" displayName="Propensity to adverse reactions to drug"/>
        <participant typeCode="CSM"><participantRole><playingEntity>
          <code code="372687004" codeSystem="2.16.840.1.113883.6.96"><originalText><reference value="#agent1"/></originalText></code>
        </playingEntity></participantRole></participant>
        <entryRelationship typeCode="MFST" inversionInd="true">
          <observation><value xsi:type="CD" code="271807003" codeSystem="2.16.840.1.113883.6.96"/></observation>
        </entryRelationship>
        <entryRelationship typeCode="SUBJ" inversionInd="true">
          <observation><code code="SEV"/><value xsi:type="CD" code="6736007" codeSystem="2.16.840.1.113883.6.96"/></observation>
        </entryRelationship>
      </observation>
    </entryRelationship>
  </act>
</entry>"##;

    #[test]
    fn test_every_observation_of_a_concern_act() {
        let doc = document(
            r#"<entry><act classCode="ACT" moodCode="EVN">
  <entryRelationship typeCode="SUBJ"><observation>
    <participant typeCode="CSM"><participantRole><playingEntity>
      <code code="372687004" codeSystem="2.16.840.1.113883.6.96"/>
    </playingEntity></participantRole></participant>
  </observation></entryRelationship>
  <entryRelationship typeCode="SUBJ"><observation>
    <participant typeCode="CSM"><participantRole><playingEntity>
      <code code="256349002" codeSystem="2.16.840.1.113883.6.96"/>
    </playingEntity></participantRole></participant>
  </observation></entryRelationship>
</act></entry>"#,
        );
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.skipped, 0);
        let agents: Vec<String> = extraction
            .items
            .iter()
            .map(|item| item.get("agent").unwrap().as_coded().unwrap().code.clone())
            .collect();
        assert_eq!(agents, vec!["372687004", "256349002"]);
    }

    #[test]
    fn test_structured_entry() {
        let doc = document(STRUCTURED);
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        let item = &extraction.items[0];

        let agent = item.get("agent").unwrap().as_coded().unwrap();
        assert_eq!(agent.code, "372687004");
        assert_eq!(agent.reference_text.as_deref(), Some("Amoxicillin"));
        assert_eq!(item.get("reaction").unwrap().as_coded().unwrap().code, "271807003");
        assert_eq!(item.get("severity").unwrap().as_coded().unwrap().code, "6736007");
        assert_eq!(item.source_of("agent"), Some(FieldSource::Structured));
        assert!(!item.contains("status"));
        assert!(!item.contains("onset"));
    }

    #[test]
    fn test_structured_entries_win_over_table() {
        // 有結構化項目時表格不再產生項目
        let doc = document(STRUCTURED);
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 1);
        assert!(!extraction.items[0].contains("allergen"));
    }

    #[test]
    fn test_table_fallback_with_header() {
        let doc = document(
            "<text><table><thead><tr><th>Allergen</th><th>Reaction</th><th>Severity</th></tr></thead>\
             <tbody><tr><td>Penicillin</td><td>Rash</td><td>Moderate</td></tr>\
             <tr><td>Peanuts</td><td>Anaphylaxis</td><td>Severe</td></tr></tbody></table></text>",
        );
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.items[0].text("allergen").as_deref(), Some("Penicillin"));
        assert_eq!(extraction.items[1].text("severity").as_deref(), Some("Severe"));
        assert_eq!(extraction.items[1].source_of("severity"), Some(FieldSource::Table));
    }

    #[test]
    fn test_narrative_pattern() {
        let doc = document(
            "<text><paragraph>Allergy to: Latex - Urticaria (Mild)</paragraph><paragraph>Cat dander (Moderate)</paragraph></text>",
        );
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.items.len(), 2);
        let latex = &extraction.items[0];
        assert_eq!(latex.text("allergen").as_deref(), Some("Latex"));
        assert_eq!(latex.text("reaction").as_deref(), Some("Urticaria"));
        assert_eq!(latex.text("severity").as_deref(), Some("Mild"));
        assert_eq!(latex.source_of("allergen"), Some(FieldSource::Narrative));
        assert_eq!(extraction.items[1].text("allergen").as_deref(), Some("Cat dander"));
    }

    #[test]
    fn test_no_known_allergies() {
        let doc = document(
            r#"<text><paragraph>No known allergies</paragraph></text>
<entry><act><entryRelationship typeCode="SUBJ"><observation><value xsi:type="CD" code="716186003" codeSystem="2.16.840.1.113883.6.96"/></observation></entryRelationship></act></entry>"#,
        );
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert!(extraction.items.is_empty());
        assert_eq!(extraction.skipped, 0);
    }

    #[test]
    fn test_malformed_entry_is_counted() {
        let doc = document(
            r#"<entry><act><statusCode code="active"/></act></entry>
<entry><observation><participant><participantRole><playingEntity><name>Latex</name></playingEntity></participantRole></participant></observation></entry>"#,
        );
        let extraction = AllergiesExtractor::new().extract(&doc).unwrap();
        assert_eq!(extraction.skipped, 1);
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].text("agent_name").as_deref(), Some("Latex"));
    }
}
