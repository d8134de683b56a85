use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

fn compact_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    // YYYYMMDD[hhmm[ss[.fff]]][±zzzz]
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(\d{4})(\d{2})(\d{2})(?:\d{2}(?:\d{2}(?:\d{2}(?:\.\d+)?)?)?)?(?:[+-]\d{4}|Z)?$").ok()
        })
        .as_ref()
}

fn dashed_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T ].*)?$").ok())
        .as_ref()
}

/// 將各種日期寫法轉為單一格式；無法辨識者原樣回傳
///
/// - `YYYYMMDD[hhmm[ss]][±zzzz]` and `YYYY-MM-DD[T...]` → `YYYY-MM-DD`
/// - `YYYYMM` and `YYYY-MM` → `YYYY-MM`
/// - `YYYY` → `YYYY`
pub fn normalize_date(raw: &str) -> String {
    parse_date(raw).unwrap_or_else(|| raw.to_string())
}

/// Whether the value reads as one of the accepted date forms.
pub fn looks_like_date(raw: &str) -> bool {
    parse_date(raw).is_some()
}

fn parse_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    let full = compact_pattern()
        .and_then(|re| re.captures(trimmed))
        .or_else(|| dashed_pattern().and_then(|re| re.captures(trimmed)));
    if let Some(caps) = full {
        return calendar_date(&caps[1], &caps[2], &caps[3]).map(|date| date.format("%Y-%m-%d").to_string());
    }

    if is_digits(trimmed) {
        return match trimmed.len() {
            6 => year_month(&trimmed[..4], &trimmed[4..]),
            4 => Some(trimmed.to_string()),
            _ => None,
        };
    }

    match trimmed.split_once('-') {
        Some((year, month)) if year.len() == 4 && month.len() == 2 && is_digits(year) && is_digits(month) => {
            year_month(year, month)
        }
        _ => None,
    }
}

fn calendar_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn year_month(year: &str, month: &str) -> Option<String> {
    calendar_date(year, month, "01").map(|date| date.format("%Y-%m").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_forms_share_one_output() {
        assert_eq!(normalize_date("20091006"), "2009-10-06");
        assert_eq!(normalize_date("2009-10-06"), "2009-10-06");
        assert_eq!(normalize_date("20091006143000+0200"), "2009-10-06");
        assert_eq!(normalize_date("2009-10-06T14:30:00Z"), "2009-10-06");
        assert_eq!(normalize_date("200910"), "2009-10");
        assert_eq!(normalize_date("2009-10"), "2009-10");
        assert_eq!(normalize_date("2009"), "2009");
    }

    #[test]
    fn test_unparseable_passes_through() {
        assert_eq!(normalize_date("last spring"), "last spring");
        assert_eq!(normalize_date("20091340"), "20091340");
        assert_eq!(normalize_date("200913"), "200913");
        assert_eq!(normalize_date(""), "");
    }

    #[test]
    fn test_normalizing_twice_is_stable() {
        for raw in ["20091006", "2009-10-06", "200910", "2009", "unknown date"] {
            let once = normalize_date(raw);
            assert_eq!(normalize_date(&once), once);
        }
    }

    #[test]
    fn test_looks_like_date() {
        assert!(looks_like_date("20240801"));
        assert!(looks_like_date("2024"));
        assert!(!looks_like_date("Pregnant"));
        assert!(!looks_like_date("2"));
    }
}
