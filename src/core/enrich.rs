use crate::core::normalize::first_candidate;
use crate::domain::model::{ClinicalValue, RawClinicalItem};
use crate::domain::schema::{criticality_for_severity, EnrichmentRule};
use crate::terminology::TerminologyResolver;
use std::collections::HashMap;
use std::sync::Arc;

/// 以另一個領域的項目補齊目標項目缺少的欄位
///
/// Sources are indexed by the display name of their natural key. A target
/// matches on the exact name first, then on whole-word containment in
/// either direction. Only fields the target lacks are copied, keeping the
/// rank of the source field.
pub struct CrossReferenceEnricher {
    resolver: Arc<TerminologyResolver>,
    language: Option<String>,
}

struct SourceIndex<'a> {
    ordered: Vec<(Vec<String>, &'a RawClinicalItem)>,
    exact: HashMap<String, usize>,
}

impl<'a> SourceIndex<'a> {
    fn find(&self, name: &str) -> Option<&'a RawClinicalItem> {
        let words = words(name);
        if words.is_empty() {
            return None;
        }
        if let Some(&position) = self.exact.get(&words.join(" ")) {
            return Some(self.ordered[position].1);
        }
        self.ordered
            .iter()
            .find(|(source_words, _)| contains_words(source_words, &words) || contains_words(&words, source_words))
            .map(|(_, item)| *item)
    }
}

impl CrossReferenceEnricher {
    pub fn new(resolver: Arc<TerminologyResolver>) -> Self {
        Self {
            resolver,
            language: None,
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// Returns the targets with copied fields and how many of them changed.
    pub async fn enrich(
        &self,
        rule: &EnrichmentRule,
        mut targets: Vec<RawClinicalItem>,
        sources: &[RawClinicalItem],
    ) -> (Vec<RawClinicalItem>, usize) {
        if targets.is_empty() || sources.is_empty() {
            return (targets, 0);
        }

        let index = self.index_sources(rule, sources).await;
        if index.ordered.is_empty() {
            return (targets, 0);
        }

        let mut enriched = 0;
        for target in targets.iter_mut() {
            let mut matched = None;
            for key in rule.target_keys {
                let Some(name) = self.key_name(target, key).await else {
                    continue;
                };
                if let Some(source) = index.find(&name) {
                    tracing::debug!("🔗 '{}' matched {} item", name, rule.source_domain);
                    matched = Some(source);
                    break;
                }
            }

            if let Some(source) = matched {
                if self.apply(rule, target, source).await {
                    enriched += 1;
                }
            }
        }

        (targets, enriched)
    }

    async fn index_sources<'a>(&self, rule: &EnrichmentRule, sources: &'a [RawClinicalItem]) -> SourceIndex<'a> {
        let mut index = SourceIndex {
            ordered: Vec::new(),
            exact: HashMap::new(),
        };
        for source in sources {
            for key in rule.source_keys {
                if let Some(name) = self.key_name(source, key).await {
                    let words = words(&name);
                    if words.is_empty() {
                        continue;
                    }
                    // 同名者保留第一筆
                    index.exact.entry(words.join(" ")).or_insert(index.ordered.len());
                    index.ordered.push((words, source));
                }
            }
        }
        index
    }

    async fn key_name(&self, item: &RawClinicalItem, key: &str) -> Option<String> {
        let field = first_candidate(item, &[key])?;
        self.display_of(&field.value).await
    }

    async fn display_of(&self, value: &ClinicalValue) -> Option<String> {
        match value {
            ClinicalValue::Coded(coded) => {
                let resolution = self.resolver.resolve_coded(coded, self.language.as_deref()).await;
                Some(resolution.display).filter(|d| !d.trim().is_empty())
            }
            other => other.display_text(),
        }
    }

    async fn apply(&self, rule: &EnrichmentRule, target: &mut RawClinicalItem, source: &RawClinicalItem) -> bool {
        let mut changed = false;
        let mut severity_copied = false;

        for copy in rule.copies {
            if first_candidate(target, &[copy.to]).is_some() {
                continue;
            }
            if let Some(field) = first_candidate(source, copy.from) {
                if target.set(copy.to, field.value.clone(), field.source) {
                    changed = true;
                    severity_copied |= copy.to == "severity";
                }
            }
        }

        if let (true, Some(criticality_field)) = (severity_copied, rule.criticality_field) {
            if first_candidate(target, &[criticality_field]).is_none() {
                if let Some(severity) = target.fields.get("severity").cloned() {
                    let display = self.display_of(&severity.value).await.unwrap_or_default();
                    if let Some(derived) = criticality_for_severity(&display) {
                        target.set_text(criticality_field, derived, severity.source);
                    }
                }
            }
        }

        changed
    }
}

fn words(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// `needle` appears in `haystack` as a run of whole words.
fn contains_words(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CodedValue, FieldSource};
    use crate::domain::schema::FieldCopy;
    use crate::terminology::code_systems::SNOMED_CT;

    const RULE: EnrichmentRule = EnrichmentRule {
        source_domain: "11450-4",
        target_keys: &["reaction", "agent"],
        source_keys: &["problem"],
        copies: &[
            FieldCopy {
                from: &["onset"],
                to: "onset",
            },
            FieldCopy {
                from: &["status", "concern_status"],
                to: "status",
            },
            FieldCopy {
                from: &["severity"],
                to: "severity",
            },
        ],
        criticality_field: Some("criticality"),
    };

    fn enricher() -> CrossReferenceEnricher {
        CrossReferenceEnricher::new(Arc::new(TerminologyResolver::offline()))
    }

    fn problem(name: &str, onset: &str) -> RawClinicalItem {
        let mut item = RawClinicalItem::new();
        item.set_text("problem", name, FieldSource::Structured);
        item.set_text("onset", onset, FieldSource::Structured);
        item.set_text("concern_status", "active", FieldSource::Structured);
        item
    }

    #[tokio::test]
    async fn test_whole_word_match_fills_missing_fields_only() {
        let mut allergy = RawClinicalItem::new();
        allergy.set_text("agent", "Penicillin", FieldSource::Structured);
        allergy.set_text("status", "resolved", FieldSource::Table);

        let sources = vec![problem("Asthma", "2001"), problem("Penicillin allergy", "20180101")];
        let (items, enriched) = enricher().enrich(&RULE, vec![allergy], &sources).await;

        assert_eq!(enriched, 1);
        assert_eq!(items[0].text("onset").as_deref(), Some("20180101"));
        assert_eq!(items[0].source_of("onset"), Some(FieldSource::Structured));
        assert_eq!(items[0].text("status").as_deref(), Some("resolved"));
    }

    #[tokio::test]
    async fn test_exact_match_preferred_over_containment() {
        let mut allergy = RawClinicalItem::new();
        allergy.set_text("reaction", "Hives", FieldSource::Narrative);

        let sources = vec![problem("Chronic hives", "2010"), problem("hives", "2015")];
        let (items, _) = enricher().enrich(&RULE, vec![allergy], &sources).await;
        assert_eq!(items[0].text("onset").as_deref(), Some("2015"));
    }

    #[tokio::test]
    async fn test_partial_words_do_not_match() {
        let mut allergy = RawClinicalItem::new();
        allergy.set_text("agent", "Pen", FieldSource::Table);
        let (items, enriched) = enricher()
            .enrich(&RULE, vec![allergy], &[problem("Penicillin allergy", "2018")])
            .await;
        assert_eq!(enriched, 0);
        assert!(!items[0].contains("onset"));
    }

    #[tokio::test]
    async fn test_copied_severity_derives_criticality() {
        let mut allergy = RawClinicalItem::new();
        allergy.set_text("agent", "Latex", FieldSource::Structured);
        let mut source = problem("Latex allergy", "2012");
        source.set_coded("severity", CodedValue::new("24484000", SNOMED_CT), FieldSource::Structured);

        let (items, _) = enricher().enrich(&RULE, vec![allergy], &[source]).await;
        assert_eq!(items[0].text("criticality").as_deref(), Some("High"));
        assert_eq!(items[0].text("status").as_deref(), Some("active"));
    }

    #[test]
    fn test_contains_words() {
        let haystack = words("Penicillin allergy (finding)");
        assert!(contains_words(&haystack, &words("penicillin")));
        assert!(contains_words(&haystack, &words("Allergy")));
        assert!(!contains_words(&haystack, &words("pen")));
    }
}
