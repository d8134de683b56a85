use regex::Regex;
use std::sync::OnceLock;

/// 來源系統常見的拼寫錯誤
const TYPO_CORRECTIONS: &[(&str, &str)] = &[
    ("inctive", "Inactive"),
    ("inacitve", "Inactive"),
    ("inactve", "Inactive"),
    ("actve", "Active"),
    ("acitve", "Active"),
    ("activ", "Active"),
    ("resovled", "Resolved"),
    ("resloved", "Resolved"),
    ("completd", "Completed"),
    ("compleated", "Completed"),
    ("modrate", "Moderate"),
    ("moderat", "Moderate"),
    ("servere", "Severe"),
    ("unknwon", "Unknown"),
];

fn typo_patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TYPO_CORRECTIONS
            .iter()
            .filter_map(|(typo, fixed)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(typo)))
                    .ok()
                    .map(|re| (re, *fixed))
            })
            .collect()
    })
}

/// Collapses whitespace, strips wrapping quotes and corrects known typos.
pub fn clean_display(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cleaned = collapsed
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    for (pattern, fixed) in typo_patterns() {
        if pattern.is_match(&cleaned) {
            cleaned = pattern.replace_all(&cleaned, *fixed).into_owned();
        }
    }
    cleaned
}

/// Values that carry no information and should be treated as absent.
pub fn is_generic(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "unknown" | "n/a" | "na" | "none" | "null" | "-" | "--" | "nullflavor"
    )
}

/// "active" → "Active"；已有大寫的字串保持不變
pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        Some(_) => value.to_string(),
        None => String::new(),
    }
}
