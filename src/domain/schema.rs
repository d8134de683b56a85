//! Field schemas: per logical field, the ordered raw keys it may be read
//! from, how it is normalized, and the sentinel used when nothing is found.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Coded concept resolved through the terminology chain.
    Coded,
    /// Free text, typo-cleaned.
    Text,
    /// Date reformatted to the canonical form.
    Date,
    /// Coded or textual status, capitalized.
    Status,
    /// Coded value, date or text depending on what the raw value holds.
    Value,
    /// Numeric value plus unit read from `unit_keys`.
    Quantity { unit_keys: &'static [&'static str] },
    /// Time span built from onset and end candidates.
    Period {
        end_keys: &'static [&'static str],
    },
    /// Read from the candidates, else derived from an already-normalized
    /// severity field.
    Criticality { severity_field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub candidates: &'static [&'static str],
    pub kind: FieldKind,
    pub default: &'static str,
}

impl FieldSpec {
    pub const fn new(
        name: &'static str,
        candidates: &'static [&'static str],
        kind: FieldKind,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            candidates,
            kind,
            default,
        }
    }
}

pub const NOT_SPECIFIED: &str = "Not specified";

/// Copies one fact from a sibling-domain item into the target item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCopy {
    pub from: &'static [&'static str],
    pub to: &'static str,
}

/// 宣告某領域的欄位需從另一個已抽取的領域補齊
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentRule {
    pub source_domain: &'static str,
    /// Natural-key candidates on the target item, in priority order.
    pub target_keys: &'static [&'static str],
    /// Natural-key fields on the source items.
    pub source_keys: &'static [&'static str],
    pub copies: &'static [FieldCopy],
    /// Derived field recomputed from the copied severity, if any.
    pub criticality_field: Option<&'static str>,
}

pub const CRITICALITY_UNASSESSED: &str = "Unable to assess";

/// Criticality implied by a severity display term.
pub fn criticality_for_severity(severity: &str) -> Option<&'static str> {
    let severity = severity.to_lowercase();
    let words: Vec<&str> = severity
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |word: &str| words.contains(&word);

    // 修飾語優先："moderately severe" 不是高風險
    if has("mild") || has("moderate") || has("moderately") {
        Some("Low")
    } else if has("severe")
        || has("fatal")
        || words.windows(2).any(|pair| pair == ["life", "threatening"])
    {
        Some("High")
    } else {
        None
    }
}
