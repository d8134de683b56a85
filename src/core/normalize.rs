use crate::core::dates::{looks_like_date, normalize_date};
use crate::domain::model::{
    ClinicalValue, CodedValue, FieldSource, FieldValue, NormalizedClinicalItem, NormalizedItemBuilder,
    RawClinicalItem, RawField,
};
use crate::domain::schema::{criticality_for_severity, FieldKind, FieldSpec, NOT_SPECIFIED};
use crate::terminology::cleanup::{capitalize_first, clean_display, is_generic};
use crate::terminology::code_systems::UCUM;
use crate::terminology::{TerminologyResolver, TextReferenceResolver};
use std::sync::Arc;

/// 原始項目 → 可直接呈現的項目
///
/// Each schema field is read from the first candidate key holding an
/// informative value, normalized by kind, and falls back to the field's
/// sentinel. Without a schema every raw key becomes a field of its own.
pub struct FieldNormalizer {
    resolver: Arc<TerminologyResolver>,
    references: Option<TextReferenceResolver>,
    language: Option<String>,
}

impl FieldNormalizer {
    pub fn new(resolver: Arc<TerminologyResolver>) -> Self {
        Self {
            resolver,
            references: None,
            language: None,
        }
    }

    /// Anchors of the document being normalized, for coded values that
    /// carry an anchor but no text.
    pub fn with_text_references(mut self, references: TextReferenceResolver) -> Self {
        self.references = Some(references);
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub async fn normalize(
        &self,
        domain_code: &str,
        schema: &[FieldSpec],
        items: &[RawClinicalItem],
    ) -> Vec<NormalizedClinicalItem> {
        let mut normalized = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let built = if schema.is_empty() {
                self.normalize_schemaless(domain_code, index, item).await
            } else {
                self.normalize_item(domain_code, index, schema, item).await
            };
            normalized.push(built);
        }
        normalized
    }

    async fn normalize_item(
        &self,
        domain_code: &str,
        index: usize,
        schema: &[FieldSpec],
        item: &RawClinicalItem,
    ) -> NormalizedClinicalItem {
        let mut builder = NormalizedItemBuilder::new(domain_code, index);
        // 依 schema 順序：衍生欄位可讀取先前已正規化的欄位
        for spec in schema {
            let value = self.normalize_field(spec, item, &builder).await;
            builder.insert(spec.name, value);
        }
        builder.build()
    }

    async fn normalize_schemaless(
        &self,
        domain_code: &str,
        index: usize,
        item: &RawClinicalItem,
    ) -> NormalizedClinicalItem {
        let mut builder = NormalizedItemBuilder::new(domain_code, index);
        for (key, field) in &item.fields {
            let value = if is_informative(&field.value) {
                self.value_field(field).await
            } else {
                FieldValue::sentinel(NOT_SPECIFIED)
            };
            builder.insert(key, value);
        }
        builder.build()
    }

    async fn normalize_field(
        &self,
        spec: &FieldSpec,
        item: &RawClinicalItem,
        builder: &NormalizedItemBuilder,
    ) -> FieldValue {
        let found = first_candidate(item, spec.candidates);
        let value = match spec.kind {
            FieldKind::Period { end_keys } => {
                self.period_field(found, first_candidate(item, end_keys))
            }
            FieldKind::Criticality { severity_field } => match found {
                Some(field) => {
                    let mut value = self.coded_field(field).await;
                    value.display_value = capitalize_first(&value.display_value);
                    Some(value)
                }
                None => derive_criticality(builder.get(severity_field), severity_field),
            },
            _ => match found {
                None => None,
                Some(field) => Some(match spec.kind {
                    FieldKind::Coded => self.coded_field(field).await,
                    FieldKind::Text => self.text_field(field).await,
                    FieldKind::Date => date_field(field),
                    FieldKind::Status => {
                        let mut value = self.coded_field(field).await;
                        value.display_value = capitalize_first(&value.display_value);
                        value
                    }
                    FieldKind::Value => self.value_field(field).await,
                    FieldKind::Quantity { unit_keys } => {
                        self.quantity_field(field, first_candidate(item, unit_keys)).await
                    }
                    FieldKind::Period { .. } | FieldKind::Criticality { .. } => {
                        FieldValue::sentinel(spec.default)
                    }
                }),
            },
        };

        match value {
            Some(value) if !value.display_value.trim().is_empty() => value,
            _ => FieldValue::sentinel(spec.default),
        }
    }

    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    async fn resolve_coded(&self, coded: &CodedValue) -> FieldValue {
        let filled;
        let coded = match (&coded.reference_text, &coded.text_reference, &self.references) {
            (None, Some(anchor), Some(references)) => match references.resolve(anchor) {
                Some(text) => {
                    filled = CodedValue {
                        reference_text: Some(text.to_string()),
                        ..coded.clone()
                    };
                    &filled
                }
                None => coded,
            },
            _ => coded,
        };

        let resolution = self.resolver.resolve_coded(coded, self.language()).await;
        let raw = if coded.code.trim().is_empty() {
            resolution.display.clone()
        } else {
            coded.code.clone()
        };
        let mut value = FieldValue::text(raw, resolution.display, FieldSource::Structured)
            .with_extra("resolved_by", resolution.source.as_str());
        if !coded.code.trim().is_empty() {
            value = value.with_code(coded.code.trim(), coded.code_system.trim());
        }
        if let Some(anchor) = &coded.text_reference {
            value = value.with_extra("text_reference", format!("#{}", anchor));
        }
        value
    }

    async fn coded_field(&self, field: &RawField) -> FieldValue {
        let mut value = match &field.value {
            ClinicalValue::Coded(coded) => self.resolve_coded(coded).await,
            other => {
                let raw = other.display_text().unwrap_or_default();
                FieldValue::text(raw.clone(), clean_display(&raw), field.source)
            }
        };
        value.source = field.source;
        value
    }

    async fn text_field(&self, field: &RawField) -> FieldValue {
        self.coded_field(field).await
    }

    /// Coded → resolved; date-like → canonical date; quantity → "value unit".
    async fn value_field(&self, field: &RawField) -> FieldValue {
        match &field.value {
            ClinicalValue::Coded(_) => self.coded_field(field).await,
            ClinicalValue::Struct(map) if map.contains_key("value") => {
                let unit = map.get("unit").map(|unit| RawField {
                    value: unit.clone(),
                    source: field.source,
                });
                let value = RawField {
                    value: map["value"].clone(),
                    source: field.source,
                };
                self.quantity_field(&value, unit.as_ref()).await
            }
            other => {
                let raw = other.display_text().unwrap_or_default();
                let display = if looks_like_date(&raw) {
                    normalize_date(&raw)
                } else {
                    clean_display(&raw)
                };
                FieldValue::text(raw, display, field.source)
            }
        }
    }

    async fn quantity_field(&self, field: &RawField, unit_field: Option<&RawField>) -> FieldValue {
        let (amount, unit) = match &field.value {
            ClinicalValue::Struct(map) => (
                map.get("value").and_then(|v| v.display_text()),
                map.get("unit").and_then(|u| u.display_text()),
            ),
            ClinicalValue::Coded(_) => return self.coded_field(field).await,
            ClinicalValue::Scalar(s) => (
                Some(s.trim().to_string()),
                unit_field.and_then(|u| u.value.display_text()),
            ),
        };
        let Some(amount) = amount.filter(|a| !is_generic(a)) else {
            return FieldValue::sentinel(NOT_SPECIFIED);
        };

        let mut value = FieldValue::text(amount.clone(), clean_display(&amount), field.source);
        if let Some(unit) = unit.filter(|u| !is_generic(u)) {
            let unit_display = self.resolver.resolve(&unit, UCUM, self.language()).await;
            value.display_value = format!("{} {}", value.display_value, unit_display);
            value = value.with_extra("unit", unit);
        }
        value
    }

    /// "<onset> to <end>" / "since <onset>" / "until <end>"
    fn period_field(&self, onset: Option<&RawField>, end: Option<&RawField>) -> Option<FieldValue> {
        let onset_text = onset.and_then(|f| f.value.display_text()).map(|t| normalize_date(&t));
        let end_text = end.and_then(|f| f.value.display_text()).map(|t| normalize_date(&t));
        let display = match (&onset_text, &end_text) {
            (Some(onset), Some(end)) => format!("{} to {}", onset, end),
            (Some(onset), None) => format!("since {}", onset),
            (None, Some(end)) => format!("until {}", end),
            (None, None) => return None,
        };
        let source = onset
            .map(|f| f.source)
            .into_iter()
            .chain(end.map(|f| f.source))
            .max()
            .unwrap_or(FieldSource::Default);

        let mut value = FieldValue::text(display.clone(), display, source);
        if let Some(onset) = onset_text {
            value = value.with_extra("onset", onset);
        }
        if let Some(end) = end_text {
            value = value.with_extra("end", end);
        }
        Some(value)
    }
}

fn date_field(field: &RawField) -> FieldValue {
    let raw = field.value.display_text().unwrap_or_default();
    FieldValue::text(raw.clone(), normalize_date(&raw), field.source)
}

fn derive_criticality(severity: Option<&FieldValue>, severity_field: &str) -> Option<FieldValue> {
    let severity = severity.filter(|s| !s.is_sentinel())?;
    let derived = criticality_for_severity(&severity.display_value)?;
    Some(FieldValue::text(derived, derived, severity.source).with_extra("derived_from", severity_field))
}

/// 依序找第一個有內容的候選欄位
pub fn first_candidate<'a>(item: &'a RawClinicalItem, candidates: &[&str]) -> Option<&'a RawField> {
    candidates
        .iter()
        .filter_map(|key| item.fields.get(*key))
        .find(|field| is_informative(&field.value))
}

fn is_informative(value: &ClinicalValue) -> bool {
    match value {
        ClinicalValue::Coded(coded) => {
            !coded.code.trim().is_empty() || coded.local_text().map(|t| !is_generic(t)).unwrap_or(false)
        }
        other => other.display_text().map(|t| !is_generic(&t)).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::CRITICALITY_UNASSESSED;
    use crate::terminology::code_systems::SNOMED_CT;
    use std::collections::BTreeMap;

    static SCHEMA: &[FieldSpec] = &[
        FieldSpec::new("agent", &["agent", "allergen"], FieldKind::Coded, "Unknown allergen"),
        FieldSpec::new("severity", &["severity"], FieldKind::Coded, NOT_SPECIFIED),
        FieldSpec::new(
            "criticality",
            &["criticality"],
            FieldKind::Criticality {
                severity_field: "severity",
            },
            CRITICALITY_UNASSESSED,
        ),
        FieldSpec::new("status", &["status"], FieldKind::Status, NOT_SPECIFIED),
        FieldSpec::new("onset", &["onset"], FieldKind::Date, NOT_SPECIFIED),
        FieldSpec::new("time", &["onset"], FieldKind::Period { end_keys: &["end"] }, NOT_SPECIFIED),
        FieldSpec::new("value", &["value"], FieldKind::Quantity { unit_keys: &["unit"] }, NOT_SPECIFIED),
    ];

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new(Arc::new(TerminologyResolver::offline()))
    }

    #[tokio::test]
    async fn test_every_field_present_with_flat_mirror() {
        let items = vec![RawClinicalItem::new()];
        let normalized = normalizer().normalize("48765-2", SCHEMA, &items).await;
        let item = &normalized[0];
        for spec in SCHEMA {
            let field = item.field(spec.name).unwrap();
            assert!(!field.value.is_empty());
            assert!(!field.display_value.is_empty());
            assert_eq!(item.flat_value(spec.name), Some(field.display_value.as_str()));
        }
        assert_eq!(item.display("agent"), Some("Unknown allergen"));
        assert_eq!(item.display("criticality"), Some(CRITICALITY_UNASSESSED));
    }

    #[tokio::test]
    async fn test_candidates_skip_generic_values() {
        let mut raw = RawClinicalItem::new();
        raw.set_text("agent", "N/A", FieldSource::Structured);
        raw.set_text("allergen", "Peanuts", FieldSource::Table);
        let normalized = normalizer().normalize("48765-2", SCHEMA, &[raw]).await;
        assert_eq!(normalized[0].display("agent"), Some("Peanuts"));
        assert_eq!(normalized[0].field("agent").unwrap().source, FieldSource::Table);
    }

    #[tokio::test]
    async fn test_coded_fallback_and_derived_criticality() {
        let mut raw = RawClinicalItem::new();
        raw.set_coded("severity", CodedValue::new("24484000", SNOMED_CT), FieldSource::Structured);
        raw.set_text("status", "inctive", FieldSource::Narrative);
        raw.set_text("onset", "20180101", FieldSource::Structured);
        let normalized = normalizer().normalize("48765-2", SCHEMA, &[raw]).await;
        let item = &normalized[0];

        let severity = item.field("severity").unwrap();
        assert_eq!(severity.display_value, "Severe");
        assert_eq!(severity.code.as_deref(), Some("24484000"));
        assert_eq!(item.flat_value("severity_code"), Some("24484000"));
        assert_eq!(item.display("criticality"), Some("High"));
        assert_eq!(item.display("status"), Some("Inactive"));
        assert_eq!(item.display("onset"), Some("2018-01-01"));
        assert_eq!(item.display("time"), Some("since 2018-01-01"));
    }

    #[tokio::test]
    async fn test_quantity_resolves_unit() {
        let mut raw = RawClinicalItem::new();
        raw.set_text("value", "120", FieldSource::Structured);
        raw.set_text("unit", "mm[Hg]", FieldSource::Structured);
        let normalized = normalizer().normalize("8716-3", SCHEMA, &[raw]).await;
        let value = normalized[0].field("value").unwrap();
        assert_eq!(value.value, "120");
        assert_eq!(value.display_value, "120 mmHg");
        assert_eq!(value.extra.get("unit").map(String::as_str), Some("mm[Hg]"));
    }

    #[tokio::test]
    async fn test_period_with_both_ends() {
        let mut raw = RawClinicalItem::new();
        raw.set_text("onset", "2019", FieldSource::Table);
        raw.set_text("end", "202003", FieldSource::Table);
        let normalized = normalizer().normalize("48765-2", SCHEMA, &[raw]).await;
        assert_eq!(normalized[0].display("time"), Some("2019 to 2020-03"));
    }

    #[tokio::test]
    async fn test_text_reference_filled_from_document_anchors() {
        let mut anchors = std::collections::HashMap::new();
        anchors.insert("a1".to_string(), "Penicillin G".to_string());
        let normalizer = normalizer().with_text_references(TextReferenceResolver::new(anchors));

        let mut raw = RawClinicalItem::new();
        raw.set_coded(
            "agent",
            CodedValue::new("999999", SNOMED_CT).with_text_reference("a1", None),
            FieldSource::Structured,
        );
        let normalized = normalizer.normalize("48765-2", SCHEMA, &[raw]).await;
        let agent = normalized[0].field("agent").unwrap();
        assert_eq!(agent.display_value, "Penicillin G");
        assert_eq!(agent.extra.get("resolved_by").map(String::as_str), Some("text_reference"));
    }

    #[tokio::test]
    async fn test_schemaless_items_mirror_every_key() {
        let mut raw = RawClinicalItem::new();
        raw.set_text("note", "Lives alone", FieldSource::Narrative);
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), ClinicalValue::scalar("37.2"));
        map.insert("unit".to_string(), ClinicalValue::scalar("Cel"));
        raw.set("temperature", ClinicalValue::Struct(map), FieldSource::Structured);

        let normalized = normalizer().normalize("99999-9", &[], &[raw]).await;
        let item = &normalized[0];
        assert_eq!(item.flat_value("note"), Some("Lives alone"));
        assert_eq!(item.display("temperature"), Some("37.2 °C"));
    }
}
