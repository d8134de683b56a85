use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 欄位來源，排序即衝突時的優先順序（後者勝出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Default,
    Narrative,
    Table,
    TextReference,
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedValue {
    pub code: String,
    pub code_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Narrative anchor id, without the leading `#`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_reference: Option<String>,
    /// Narrative text the anchor pointed at when the value was extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
}

impl CodedValue {
    pub fn new(code: impl Into<String>, code_system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            code_system: code_system.into(),
            display_name: None,
            text_reference: None,
            reference_text: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_name = Some(display.into());
        self
    }

    pub fn with_text_reference(mut self, anchor: impl Into<String>, text: Option<String>) -> Self {
        self.text_reference = Some(anchor.into());
        self.reference_text = text;
        self
    }

    /// Best text available without asking the terminology service.
    pub fn local_text(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.reference_text.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClinicalValue {
    Scalar(String),
    Coded(CodedValue),
    Struct(BTreeMap<String, ClinicalValue>),
}

impl ClinicalValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        ClinicalValue::Scalar(value.into())
    }

    /// 取得可顯示的文字；Struct 依序嘗試 display / value / text
    pub fn display_text(&self) -> Option<String> {
        match self {
            ClinicalValue::Scalar(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            ClinicalValue::Coded(coded) => coded.local_text().map(|s| s.trim().to_string()),
            ClinicalValue::Struct(map) => ["display", "value", "text"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.display_text())),
        }
    }

    pub fn as_coded(&self) -> Option<&CodedValue> {
        match self {
            ClinicalValue::Coded(coded) => Some(coded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub value: ClinicalValue,
    pub source: FieldSource,
}

/// 抽取器輸出的原始項目：欄位名稱 → 值（含來源）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClinicalItem {
    pub fields: BTreeMap<String, RawField>,
}

impl RawClinicalItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field unless an existing value came from a higher-ranked source.
    /// Returns whether the value was stored.
    pub fn set(&mut self, key: &str, value: ClinicalValue, source: FieldSource) -> bool {
        if let ClinicalValue::Scalar(s) = &value {
            if s.trim().is_empty() {
                return false;
            }
        }
        match self.fields.get(key) {
            Some(existing) if existing.source > source => false,
            _ => {
                self.fields
                    .insert(key.to_string(), RawField { value, source });
                true
            }
        }
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>, source: FieldSource) -> bool {
        self.set(key, ClinicalValue::Scalar(value.into()), source)
    }

    pub fn set_opt_text(&mut self, key: &str, value: Option<String>, source: FieldSource) -> bool {
        match value {
            Some(v) => self.set_text(key, v, source),
            None => false,
        }
    }

    pub fn set_coded(&mut self, key: &str, value: CodedValue, source: FieldSource) -> bool {
        self.set(key, ClinicalValue::Coded(value), source)
    }

    pub fn get(&self, key: &str) -> Option<&ClinicalValue> {
        self.fields.get(key).map(|f| &f.value)
    }

    pub fn source_of(&self, key: &str) -> Option<FieldSource> {
        self.fields.get(key).map(|f| f.source)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.display_text())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 合併另一個項目，同名欄位依來源等級決定
    pub fn merge_from(&mut self, other: RawClinicalItem) {
        for (key, field) in other.fields {
            self.set(&key, field.value, field.source);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub items: Vec<RawClinicalItem>,
    pub skipped: usize,
}

impl Extraction {
    pub fn new(items: Vec<RawClinicalItem>, skipped: usize) -> Self {
        Self { items, skipped }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub display_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_system: Option<String>,
    pub source: FieldSource,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl FieldValue {
    pub fn text(value: impl Into<String>, display: impl Into<String>, source: FieldSource) -> Self {
        Self {
            value: value.into(),
            display_value: display.into(),
            code: None,
            code_system: None,
            source,
            extra: BTreeMap::new(),
        }
    }

    pub fn sentinel(default: &str) -> Self {
        Self::text(default, default, FieldSource::Default)
    }

    pub fn with_code(mut self, code: impl Into<String>, system: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.code_system = Some(system.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn is_sentinel(&self) -> bool {
        self.source == FieldSource::Default
    }
}

/// 正規化後的項目；只能透過 [`NormalizedItemBuilder`] 建立，
/// 以確保每個 data 欄位都有對應的平面欄位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedClinicalItem {
    domain_code: String,
    index: usize,
    data: BTreeMap<String, FieldValue>,
    #[serde(flatten)]
    flat: BTreeMap<String, String>,
}

impl NormalizedClinicalItem {
    pub fn domain_code(&self) -> &str {
        &self.domain_code
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &BTreeMap<String, FieldValue> {
        &self.data
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name)
    }

    pub fn display(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(|f| f.display_value.as_str())
    }

    pub fn flat(&self) -> &BTreeMap<String, String> {
        &self.flat
    }

    pub fn flat_value(&self, name: &str) -> Option<&str> {
        self.flat.get(name).map(String::as_str)
    }
}

pub struct NormalizedItemBuilder {
    domain_code: String,
    index: usize,
    data: BTreeMap<String, FieldValue>,
}

impl NormalizedItemBuilder {
    pub fn new(domain_code: impl Into<String>, index: usize) -> Self {
        Self {
            domain_code: domain_code.into(),
            index,
            data: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: &str, value: FieldValue) -> Self {
        self.data.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.data.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name)
    }

    pub fn build(self) -> NormalizedClinicalItem {
        let mut flat = BTreeMap::new();
        for (name, field) in &self.data {
            flat.insert(name.clone(), field.display_value.clone());
            if let Some(code) = &field.code {
                flat.insert(format!("{}_code", name), code.clone());
            }
        }
        NormalizedClinicalItem {
            domain_code: self.domain_code,
            index: self.index,
            data: self.data,
            flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub domain_code: String,
    pub domain_name: String,
    pub item_count: usize,
    pub has_items: bool,
    pub skipped_items: usize,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub items: Vec<NormalizedClinicalItem>,
    pub metadata: DomainMetadata,
}

impl DomainResult {
    pub fn new(
        domain_code: &str,
        domain_name: &str,
        items: Vec<NormalizedClinicalItem>,
        skipped_items: usize,
        from_cache: bool,
    ) -> Self {
        let item_count = items.len();
        Self {
            items,
            metadata: DomainMetadata {
                domain_code: domain_code.to_string(),
                domain_name: domain_name.to_string(),
                item_count,
                has_items: item_count > 0,
                skipped_items,
                from_cache,
                error: None,
            },
        }
    }

    pub fn empty(domain_code: &str, domain_name: &str) -> Self {
        Self::new(domain_code, domain_name, Vec::new(), 0, false)
    }

    pub fn fault(domain_code: &str, domain_name: &str, error: impl Into<String>) -> Self {
        let mut result = Self::empty(domain_code, domain_name);
        result.metadata.error = Some(error.into());
        result
    }

    pub fn is_fault(&self) -> bool {
        self.metadata.error.is_some()
    }
}

/// 先前抽取並暫存的區段資料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSection {
    pub domain_code: String,
    pub items: Vec<RawClinicalItem>,
    pub stored_at: DateTime<Utc>,
}

impl CachedSection {
    pub fn new(domain_code: &str, items: Vec<RawClinicalItem>) -> Self {
        Self {
            domain_code: domain_code.to_string(),
            items,
            stored_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        !self.items.is_empty() && now.signed_duration_since(self.stored_at) <= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_source_is_not_overwritten() {
        let mut item = RawClinicalItem::new();
        assert!(item.set_text("agent", "Penicillin", FieldSource::Structured));
        assert!(!item.set_text("agent", "Penicilin", FieldSource::Table));
        assert_eq!(item.text("agent").as_deref(), Some("Penicillin"));

        let mut reversed = RawClinicalItem::new();
        reversed.set_text("agent", "Penicilin", FieldSource::Narrative);
        reversed.set_text("agent", "Penicillin", FieldSource::TextReference);
        assert_eq!(reversed.text("agent").as_deref(), Some("Penicillin"));
        assert_eq!(reversed.source_of("agent"), Some(FieldSource::TextReference));
    }

    #[test]
    fn test_blank_scalar_is_ignored() {
        let mut item = RawClinicalItem::new();
        assert!(!item.set_text("status", "   ", FieldSource::Table));
        assert!(item.is_empty());
    }

    #[test]
    fn test_builder_mirrors_every_field() {
        let item = NormalizedItemBuilder::new("48765-2", 0)
            .field(
                "agent",
                FieldValue::text("372687004", "Amoxicillin", FieldSource::Structured)
                    .with_code("372687004", "2.16.840.1.113883.6.96"),
            )
            .field("status", FieldValue::sentinel("Not specified"))
            .build();

        assert_eq!(item.flat_value("agent"), Some("Amoxicillin"));
        assert_eq!(item.flat_value("agent_code"), Some("372687004"));
        assert_eq!(item.flat_value("status"), Some("Not specified"));
        for name in item.data().keys() {
            assert!(item.flat().contains_key(name));
        }
    }

    #[test]
    fn test_struct_display_text() {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), ClinicalValue::scalar("120"));
        map.insert("unit".to_string(), ClinicalValue::scalar("mm[Hg]"));
        assert_eq!(ClinicalValue::Struct(map).display_text().as_deref(), Some("120"));
    }

    #[test]
    fn test_cached_section_freshness() {
        let mut cached = CachedSection::new("48765-2", vec![RawClinicalItem::new()]);
        let now = Utc::now();
        assert!(cached.is_fresh(chrono::Duration::minutes(15), now));
        cached.stored_at = now - chrono::Duration::minutes(30);
        assert!(!cached.is_fresh(chrono::Duration::minutes(15), now));
        cached.items.clear();
        cached.stored_at = now;
        assert!(!cached.is_fresh(chrono::Duration::minutes(15), now));
    }

    #[test]
    fn test_domain_result_fault_has_error() {
        let result = DomainResult::fault("10160-0", "Medication Summary", "panic");
        assert!(result.items.is_empty());
        assert!(!result.metadata.has_items);
        assert_eq!(result.metadata.error.as_deref(), Some("panic"));
    }
}
