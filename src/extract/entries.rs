//! Readers for the structured-entry shapes shared by most sections:
//! coded triplets, effective times, statuses, typed values and
//! entry relationships.

use crate::document::{Element, Section};
use crate::domain::model::{ClinicalValue, CodedValue, FieldSource, RawClinicalItem};
use std::collections::BTreeMap;

/// LOINC code of the clinical status observation nested in concern acts.
pub const STATUS_OBSERVATION: &str = "33999-4";
/// Severity observation code.
pub const SEVERITY_OBSERVATION: &str = "SEV";
pub const CRITICALITY_OBSERVATION: &str = "CRIT";

/// Coded triplet from a CD-like element, with its narrative reference.
/// Falls back to the first `translation` when the element itself only
/// carries a nullFlavor.
pub fn coded(section: &Section<'_>, element: &Element) -> Option<CodedValue> {
    let source = match (element.attr("code"), element.child("translation")) {
        (None, Some(translation)) if translation.attr("code").is_some() => translation,
        _ => element,
    };
    let code = source.attr("code")?;
    let mut value = CodedValue::new(code, source.attr("codeSystem").unwrap_or_default());
    if let Some(display) = source.attr("displayName").or_else(|| element.attr("displayName")) {
        value = value.with_display(display.trim());
    }
    if let Some((anchor, text)) = section.reference_of(element) {
        value = value.with_text_reference(anchor, text);
    }
    Some(value)
}

/// Coded value if the element has a code, otherwise whatever text it
/// carries (reference text, originalText, displayName or content).
pub fn concept(section: &Section<'_>, element: &Element) -> Option<ClinicalValue> {
    if let Some(value) = coded(section, element) {
        return Some(ClinicalValue::Coded(value));
    }
    if let Some((_, Some(text))) = section.reference_of(element) {
        return Some(ClinicalValue::scalar(text));
    }
    element
        .child("originalText")
        .map(|original| original.text())
        .filter(|text| !text.is_empty())
        .or_else(|| element.attr("displayName").map(str::to_string))
        .or_else(|| Some(element.text()).filter(|text| !text.is_empty()))
        .map(ClinicalValue::Scalar)
}

/// 依 xsi:type 讀取 observation 的 value
pub fn typed_value(section: &Section<'_>, value: &Element) -> Option<ClinicalValue> {
    let kind = value.attr("type").unwrap_or_default().to_ascii_uppercase();
    match kind.as_str() {
        "PQ" | "IVL_PQ" => quantity(value),
        "CD" | "CE" | "CV" | "CO" => concept(section, value),
        "TS" | "IVL_TS" => value
            .attr("value")
            .or_else(|| value.child("low").and_then(|low| low.attr("value")))
            .map(ClinicalValue::scalar),
        "BL" | "INT" | "REAL" => value.attr("value").map(ClinicalValue::scalar),
        _ => value
            .attr("value")
            .map(ClinicalValue::scalar)
            .or_else(|| concept(section, value)),
    }
}

/// Struct {value, unit}; an interval with only a bound is read from that bound.
pub fn quantity(element: &Element) -> Option<ClinicalValue> {
    let source = if element.attr("value").is_some() {
        element
    } else {
        element.child("low").or_else(|| element.child("high"))?
    };
    let mut map = BTreeMap::new();
    map.insert("value".to_string(), ClinicalValue::scalar(source.attr("value")?));
    if let Some(unit) = source.attr("unit").filter(|unit| *unit != "1") {
        map.insert("unit".to_string(), ClinicalValue::scalar(unit));
    }
    Some(ClinicalValue::Struct(map))
}

/// (low or point value, high) of the first interval-like effectiveTime.
pub fn effective_time(element: &Element) -> (Option<String>, Option<String>) {
    let Some(time) = element
        .children_named("effectiveTime")
        .find(|t| t.attr("type").map(|kind| kind != "PIVL_TS" && kind != "EIVL_TS").unwrap_or(true))
    else {
        return (None, None);
    };
    let low = time
        .attr("value")
        .or_else(|| time.child("low").and_then(|low| low.attr("value")))
        .map(str::to_string);
    let high = time
        .child("high")
        .and_then(|high| high.attr("value"))
        .map(str::to_string);
    (low, high)
}

pub fn status_code(element: &Element) -> Option<String> {
    element
        .child("statusCode")
        .and_then(|status| status.attr("code"))
        .map(str::to_string)
}

pub fn is_negated(element: &Element) -> bool {
    element
        .attr("negationInd")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Observations and acts directly under `entryRelationship[typeCode]`.
pub fn related<'a>(element: &'a Element, type_code: &str) -> Vec<&'a Element> {
    element
        .children_named("entryRelationship")
        .filter(|rel| {
            rel.attr("typeCode")
                .map(|code| code.eq_ignore_ascii_case(type_code))
                .unwrap_or(false)
        })
        .flat_map(|rel| rel.child_elements())
        .collect()
}

/// First related observation (any relationship type) with the given code.
pub fn related_observation<'a>(element: &'a Element, code: &str) -> Option<&'a Element> {
    element
        .children_named("entryRelationship")
        .filter_map(|rel| rel.child("observation"))
        .find(|obs| {
            obs.child("code")
                .and_then(|c| c.attr("code"))
                .map(|c| c.eq_ignore_ascii_case(code))
                .unwrap_or(false)
        })
}

/// Value of a related observation identified by its code.
pub fn related_value(section: &Section<'_>, element: &Element, code: &str) -> Option<ClinicalValue> {
    related_observation(element, code)
        .and_then(|obs| obs.child("value"))
        .and_then(|value| typed_value(section, value))
}

/// Text of the element's own `<text>`, following a reference if present.
pub fn narrative_text(section: &Section<'_>, element: &Element) -> Option<String> {
    let text = element.child("text")?;
    if let Some(reference) = text.child("reference").and_then(|r| r.attr("value")) {
        if let Some(resolved) = section.anchor_text(reference) {
            return Some(resolved.to_string());
        }
    }
    Some(text.text()).filter(|t| !t.is_empty())
}

/// The clinical statement an entry wraps: act, observation,
/// substanceAdministration, procedure, organizer, supply or encounter.
pub fn statement(entry: &Element) -> Option<&Element> {
    entry.child_elements().find(|el| {
        matches!(
            el.name.as_str(),
            "act" | "observation" | "substanceAdministration" | "procedure" | "organizer" | "supply" | "encounter"
        )
    })
}

/// Raw keys used by [`observation_items`].
#[derive(Debug, Clone, Copy)]
pub struct ObservationKeys {
    pub name: &'static str,
    /// Key for the organizer code, when the domain groups observations.
    pub group: Option<&'static str>,
}

/// Flattens an observation-shaped entry into one item per valued
/// observation: organizer components, panel members nested under
/// `entryRelationship`/`component`, or the observation itself.
pub fn observation_items(
    section: &Section<'_>,
    entry: &Element,
    keys: ObservationKeys,
) -> super::ItemResult<Vec<RawClinicalItem>> {
    let statement = statement(entry)
        .ok_or_else(|| super::ItemError::new("entry holds no clinical statement"))?;

    let (group, group_time, observations) = if statement.name == "organizer" {
        let members: Vec<&Element> = statement
            .children_named("component")
            .filter_map(|component| component.child("observation"))
            .collect();
        (statement.child("code"), effective_time(statement).0, members)
    } else {
        (None, None, vec![statement])
    };

    let mut items = Vec::new();
    let mut unreadable = 0;
    for observation in observations {
        unreadable += collect_observation(section, observation, keys, group, group_time.as_deref(), &mut items);
    }
    if items.is_empty() && unreadable > 0 {
        return Err(super::ItemError::new("observation has neither code nor value"));
    }
    Ok(items)
}

/// Pushes the readable observations and returns how many were unreadable.
fn collect_observation(
    section: &Section<'_>,
    observation: &Element,
    keys: ObservationKeys,
    group: Option<&Element>,
    group_time: Option<&str>,
    items: &mut Vec<RawClinicalItem>,
) -> usize {
    if is_negated(observation) {
        return 0;
    }

    // 沒有 value 的 panel：展開其成員
    if observation.child("value").is_none() {
        let members: Vec<&Element> = observation
            .children_named("entryRelationship")
            .chain(observation.children_named("component"))
            .filter_map(|rel| rel.child("observation"))
            .collect();
        if !members.is_empty() {
            let time = effective_time(observation).0;
            let time = time.as_deref().or(group_time);
            let panel = observation.child("code").or(group);
            return members
                .into_iter()
                .map(|member| collect_observation(section, member, keys, panel, time, items))
                .sum();
        }
    }

    let mut item = StructuredItem::new();
    item.concept(keys.name, section, observation.child("code"));
    match observation.child("value").and_then(|value| typed_value(section, value)) {
        Some(ClinicalValue::Struct(mut map)) => {
            item.value("value", map.remove("value"));
            item.value("unit", map.remove("unit"));
        }
        other => {
            item.value("value", other);
        }
    }
    item.concept("interpretation", section, observation.child("interpretationCode"));
    item.text("reference_range", reference_range(observation));
    let (low, high) = effective_time(observation);
    item.text("date", low.or_else(|| group_time.map(str::to_string)));
    item.text("end_date", high);
    item.text("status", status_code(observation));
    if let Some(key) = keys.group {
        item.concept(key, section, group);
    }

    let item = item.finish();
    if !item.contains(keys.name) && !item.contains("value") {
        tracing::debug!("⏭️ Observation without code or value ignored");
        return 1;
    }
    items.push(item);
    0
}

fn reference_range(observation: &Element) -> Option<String> {
    let range = observation.path(&["referenceRange", "observationRange"])?;
    if let Some(text) = range.child("text").map(|t| t.text()).filter(|t| !t.is_empty()) {
        return Some(text);
    }
    let value = range.child("value")?;
    let bound = |name: &str| {
        value.child(name).and_then(|b| {
            b.attr("value")
                .map(|v| format!("{}{}", v, b.attr("unit").map(|u| format!(" {}", u)).unwrap_or_default()))
        })
    };
    match (bound("low"), bound("high")) {
        (Some(low), Some(high)) => Some(format!("{} - {}", low, high)),
        (Some(low), None) => Some(format!(">= {}", low)),
        (None, Some(high)) => Some(format!("<= {}", high)),
        (None, None) => None,
    }
}

/// 設定欄位的小工具，統一以結構化來源寫入
pub struct StructuredItem {
    item: RawClinicalItem,
}

impl StructuredItem {
    pub fn new() -> Self {
        Self {
            item: RawClinicalItem::new(),
        }
    }

    pub fn value(&mut self, key: &str, value: Option<ClinicalValue>) -> &mut Self {
        if let Some(value) = value {
            self.item.set(key, value, FieldSource::Structured);
        }
        self
    }

    /// Reads a concept element. Text found only through a narrative
    /// reference is stored at text-reference rank.
    pub fn concept(&mut self, key: &str, section: &Section<'_>, element: Option<&Element>) -> &mut Self {
        let Some(element) = element else {
            return self;
        };
        if let Some(value) = coded(section, element) {
            self.item.set_coded(key, value, FieldSource::Structured);
        } else if let Some((_, Some(text))) = section.reference_of(element) {
            self.item.set_text(key, text, FieldSource::TextReference);
        } else if let Some(value) = concept(section, element) {
            self.item.set(key, value, FieldSource::Structured);
        }
        self
    }

    pub fn text(&mut self, key: &str, value: Option<String>) -> &mut Self {
        self.item.set_opt_text(key, value, FieldSource::Structured);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_empty()
    }

    pub fn finish(self) -> RawClinicalItem {
        self.item
    }
}

impl Default for StructuredItem {
    fn default() -> Self {
        Self::new()
    }
}
