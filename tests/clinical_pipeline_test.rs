use async_trait::async_trait;
use clinical_etl::core::TerminologyService;
use clinical_etl::extract::allergies;
use clinical_etl::{PipelineManager, Registry, TerminologyResolver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 以固定對照表回應，並計算呼叫次數
struct MockTerminology {
    answers: HashMap<&'static str, &'static str>,
    calls: AtomicUsize,
}

impl MockTerminology {
    fn new(answers: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TerminologyService for MockTerminology {
    async fn lookup(&self, code: &str, _code_system: &str, _language: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(code).map(|display| display.to_string())
    }
}

/// 永遠失敗的術語服務
struct BrokenTerminology;

#[async_trait]
impl TerminologyService for BrokenTerminology {
    async fn lookup(&self, _code: &str, _code_system: &str, _language: &str) -> Option<String> {
        None
    }
}

fn manager_with(service: Arc<dyn TerminologyService>) -> PipelineManager {
    let resolver = TerminologyResolver::offline().with_service(service);
    PipelineManager::new(Registry::bootstrap(), Arc::new(resolver))
}

fn document(sections: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ClinicalDocument xmlns="urn:hl7-org:v3" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <component><structuredBody>{}</structuredBody></component>
</ClinicalDocument>"#,
        sections
    )
}

const ALLERGIES: &str = r#"
<component><section>
  <code code="48765-2" codeSystem="2.16.840.1.113883.6.1"/>
  <entry><act classCode="ACT" moodCode="EVN">
    <entryRelationship typeCode="SUBJ"><observation classCode="OBS" moodCode="EVN">
      <value xsi:type="CD" code="416098002" codeSystem="2.16.840.1.113883.6.96"/>
      <participant typeCode="CSM"><participantRole><playingEntity>
        <code code="372687004" codeSystem="2.16.840.1.113883.6.96"/>
      </playingEntity></participantRole></participant>
      <entryRelationship typeCode="MFST" inversionInd="true">
        <observation><value xsi:type="CD" code="271807003" codeSystem="2.16.840.1.113883.6.96"/></observation>
      </entryRelationship>
      <entryRelationship typeCode="SUBJ" inversionInd="true">
        <observation><code code="SEV"/><value xsi:type="CD" code="6736007" codeSystem="2.16.840.1.113883.6.96" displayName="Moderate"/></observation>
      </entryRelationship>
    </observation></entryRelationship>
  </act></entry>
</section></component>"#;

const PROBLEMS: &str = r#"
<component><section>
  <code code="11450-4" codeSystem="2.16.840.1.113883.6.1"/>
  <entry><act classCode="ACT" moodCode="EVN">
    <statusCode code="active"/>
    <entryRelationship typeCode="SUBJ"><observation classCode="OBS" moodCode="EVN">
      <code code="55607006" codeSystem="2.16.840.1.113883.6.96" displayName="Problem"/>
      <effectiveTime><low value="20180101"/></effectiveTime>
      <value xsi:type="CD" code="91936005" codeSystem="2.16.840.1.113883.6.96" displayName="Penicillin allergy"/>
    </observation></entryRelationship>
  </act></entry>
</section></component>"#;

#[tokio::test]
async fn test_allergy_enriched_from_problem_list() {
    let service = MockTerminology::new(&[("372687004", "Penicillin")]);
    let manager = manager_with(service.clone());

    let record = manager
        .process(&document(&format!("{}{}", ALLERGIES, PROBLEMS)))
        .await
        .unwrap();

    let allergies = &record["48765-2"];
    assert_eq!(allergies.metadata.item_count, 1);
    assert!(allergies.metadata.has_items);
    let allergy = &allergies.items[0];

    let agent = allergy.field("agent").unwrap();
    assert_eq!(agent.display_value, "Penicillin");
    assert_eq!(agent.code.as_deref(), Some("372687004"));
    assert_eq!(agent.extra.get("resolved_by").map(String::as_str), Some("external"));

    assert_eq!(allergy.display("severity"), Some("Moderate"));
    assert_eq!(allergy.display("criticality"), Some("Low"));
    assert_eq!(allergy.display("status"), Some("Active"));
    assert_eq!(allergy.display("onset"), Some("2018-01-01"));
    assert_eq!(allergy.display("time"), Some("since 2018-01-01"));
    assert_eq!(allergy.flat_value("time"), Some("since 2018-01-01"));

    // 問題清單本身不受影響
    let problem = &record["11450-4"].items[0];
    assert_eq!(problem.display("problem"), Some("Allergy to penicillin"));
    assert_eq!(problem.display("status"), Some("Active"));
}

#[tokio::test]
async fn test_same_code_resolved_once_per_document() {
    let service = MockTerminology::new(&[("372687004", "Penicillin")]);
    let manager = manager_with(service.clone());
    let text = document(ALLERGIES);

    manager.process(&text).await.unwrap();
    let after_first = service.calls.load(Ordering::SeqCst);
    manager.process(&text).await.unwrap();

    assert!(after_first > 0);
    assert_eq!(service.calls.load(Ordering::SeqCst), after_first);
}

#[tokio::test]
async fn test_absent_section_is_an_empty_result() {
    let manager = PipelineManager::offline();
    let record = manager.process(&document(PROBLEMS)).await.unwrap();

    let allergies = &record["48765-2"];
    assert!(allergies.items.is_empty());
    assert!(!allergies.metadata.has_items);
    assert!(allergies.metadata.error.is_none());
    assert_eq!(allergies.metadata.domain_name, "Allergies and Intolerances");
}

#[tokio::test]
async fn test_failing_service_still_uses_fallback_table() {
    let manager = manager_with(Arc::new(BrokenTerminology));
    let record = manager.process(&document(ALLERGIES)).await.unwrap();
    let allergy = &record["48765-2"].items[0];

    let agent = allergy.field("agent").unwrap();
    assert_eq!(agent.display_value, "Amoxicillin");
    assert_eq!(agent.extra.get("resolved_by").map(String::as_str), Some("fallback_table"));
    assert_eq!(allergy.display("reaction"), Some("Eruption of skin"));
}

#[tokio::test]
async fn test_every_schema_field_is_present_and_mirrored() {
    let manager = PipelineManager::offline();
    let record = manager
        .process(&document(&format!("{}{}", ALLERGIES, PROBLEMS)))
        .await
        .unwrap();

    for item in &record["48765-2"].items {
        for spec in allergies::SCHEMA {
            let field = item.field(spec.name).unwrap();
            assert!(!field.value.trim().is_empty(), "{} has no value", spec.name);
            assert!(!field.display_value.trim().is_empty(), "{} has no display", spec.name);
            assert_eq!(item.flat_value(spec.name), Some(field.display_value.as_str()));
        }
    }
}

#[tokio::test]
async fn test_table_header_row_is_skipped() {
    let manager = PipelineManager::offline();
    let sections = r#"
<component><section><code code="48765-2"/><title>Allergies</title><text><table>
  <tr><td>Allergen</td><td>Reaction</td><td>Severity</td></tr>
  <tr><td>Peanuts</td><td>Anaphylaxis</td><td>severe</td></tr>
</table></text></section></component>
<component><section><code code="30954-2"/><text><table>
  <thead><tr><th>Test</th><th>Value</th><th>Unit</th></tr></thead>
  <tbody><tr><td>Hemoglobin</td><td>13.5</td><td>g/dL</td></tr></tbody>
</table></text></section></component>"#;
    let record = manager.process(&document(sections)).await.unwrap();

    let allergies = &record["48765-2"];
    assert_eq!(allergies.metadata.item_count, 1);
    let allergy = &allergies.items[0];
    assert_eq!(allergy.display("agent"), Some("Peanuts"));
    assert_eq!(allergy.display("criticality"), Some("High"));

    let results = &record["30954-2"];
    assert_eq!(results.metadata.item_count, 1);
    assert_eq!(results.items[0].display("test"), Some("Hemoglobin"));
    assert_eq!(results.items[0].display("value"), Some("13.5 g/dL"));
    assert_eq!(results.items[0].display("reference_range"), Some("Not specified"));
}

#[tokio::test]
async fn test_deeply_nested_document_is_processed() {
    let depth = 200_000;
    let text = document(&format!("{}{}{}", "<a>".repeat(depth), "</a>".repeat(depth), ALLERGIES));

    let record = PipelineManager::offline().process(&text).await.unwrap();
    assert_eq!(record.len(), 12);
    assert_eq!(record["48765-2"].metadata.item_count, 1);
}
