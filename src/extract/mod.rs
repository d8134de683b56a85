//! Section extractors, one per clinical domain, sharing a layered parse:
//! structured entries first, then narrative tables and prose lines merged by
//! natural key.

pub mod advance_directives;
pub mod allergies;
pub mod devices;
pub mod entries;
pub mod functional_status;
pub mod immunizations;
pub mod medications;
pub mod pregnancy;
pub mod problems;
pub mod procedures;
pub mod results;
pub mod social_history;
pub mod vital_signs;

pub use advance_directives::AdvanceDirectivesExtractor;
pub use allergies::AllergiesExtractor;
pub use devices::DevicesExtractor;
pub use functional_status::FunctionalStatusExtractor;
pub use immunizations::ImmunizationsExtractor;
pub use medications::MedicationsExtractor;
pub use pregnancy::PregnancyExtractor;
pub use problems::ProblemsExtractor;
pub use procedures::ProceduresExtractor;
pub use results::ResultsExtractor;
pub use social_history::SocialHistoryExtractor;
pub use vital_signs::VitalSignsExtractor;

use crate::document::{ClinicalDocument, Element, Section, TableRow};
use crate::domain::model::{Extraction, FieldSource, RawClinicalItem};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// A single entry, row or line that could not be read. Counted and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    reason: String,
}

impl ItemError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

pub type ItemResult<T> = std::result::Result<T, ItemError>;

/// 每個領域的靜態解析設定
#[derive(Debug, Clone, Copy)]
pub struct DomainProfile {
    pub code: &'static str,
    pub name: &'static str,
    pub alternate_codes: &'static [&'static str],
    /// Raw key per table column, in column order.
    pub table_columns: &'static [&'static str],
    /// First-cell values that mark a header row.
    pub header_terms: &'static [&'static str],
    /// Case-insensitive pattern whose named groups are raw keys.
    pub narrative_pattern: &'static str,
    /// A line matches only if at least one of these groups captured text.
    /// Empty means the pattern alone decides.
    pub narrative_requires: &'static [&'static str],
    /// Lines containing one of these phrases state an absence, not an item.
    pub negation_phrases: &'static [&'static str],
    /// Raw key used to merge table rows with narrative lines.
    pub natural_key: &'static str,
}

impl DomainProfile {
    pub fn accepted_codes(&self) -> Vec<&'static str> {
        std::iter::once(self.code)
            .chain(self.alternate_codes.iter().copied())
            .collect()
    }
}

/// Walks one `<entry>` and returns the items it holds. An entry may hold
/// several items (an organizer with components) or none (a negated entry).
pub type EntryWalker = fn(&Section<'_>, &Element) -> ItemResult<Vec<RawClinicalItem>>;

/// Runs the layered parse for one domain profile.
#[derive(Debug)]
pub struct SectionParser {
    profile: &'static DomainProfile,
    pattern: Option<Regex>,
}

impl SectionParser {
    pub fn new(profile: &'static DomainProfile) -> Self {
        let pattern = if profile.narrative_pattern.is_empty() {
            None
        } else {
            match Regex::new(&format!("(?i){}", profile.narrative_pattern)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(
                        "❌ Narrative pattern for {} does not compile: {}",
                        profile.code,
                        e
                    );
                    None
                }
            }
        };
        Self { profile, pattern }
    }

    pub fn profile(&self) -> &'static DomainProfile {
        self.profile
    }

    pub fn run(&self, document: &ClinicalDocument, walker: EntryWalker) -> Extraction {
        let sections = document.find_sections(&self.profile.accepted_codes());
        if sections.is_empty() {
            tracing::debug!("📭 No {} section in document", self.profile.name);
            return Extraction::default();
        }

        let mut items = Vec::new();
        let mut skipped = 0;
        for section in &sections {
            let (structured, structured_skipped) = self.parse_entries(section, walker);
            skipped += structured_skipped;
            if !structured.is_empty() {
                items.extend(structured);
                continue;
            }

            let (rows, rows_skipped) = self.parse_tables(section);
            skipped += rows_skipped;
            let lines = self.parse_narrative(section);
            items.extend(self.merge_by_key(rows, lines));
        }

        tracing::debug!(
            "📋 {}: {} item(s), {} skipped",
            self.profile.name,
            items.len(),
            skipped
        );
        Extraction::new(items, skipped)
    }

    fn parse_entries(&self, section: &Section<'_>, walker: EntryWalker) -> (Vec<RawClinicalItem>, usize) {
        let mut items = Vec::new();
        let mut skipped = 0;
        for entry in section.entries() {
            match walker(section, entry) {
                Ok(found) => items.extend(found.into_iter().filter(|item| !item.is_empty())),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!("⏭️ Skipping {} entry: {}", self.profile.name, e);
                }
            }
        }
        (items, skipped)
    }

    pub fn parse_tables(&self, section: &Section<'_>) -> (Vec<RawClinicalItem>, usize) {
        let mut items = Vec::new();
        let mut skipped = 0;
        for row in section.table_rows() {
            if self.is_header_row(&row) {
                continue;
            }
            match self.parse_row(&row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!("⏭️ Skipping {} table row: {}", self.profile.name, e);
                }
            }
        }
        (items, skipped)
    }

    pub fn is_header_row(&self, row: &TableRow) -> bool {
        row.cell(0)
            .map(|cell| {
                let cell = cell.trim().trim_end_matches(':').trim();
                self.profile
                    .header_terms
                    .iter()
                    .any(|term| term.eq_ignore_ascii_case(cell))
            })
            .unwrap_or(false)
    }

    fn parse_row(&self, row: &TableRow) -> ItemResult<RawClinicalItem> {
        let first = row
            .cell(0)
            .ok_or_else(|| ItemError::new("first column is empty"))?;
        if self.is_negation(first) {
            return Err(ItemError::new(format!("negated row '{}'", first)));
        }

        let mut item = RawClinicalItem::new();
        for (index, key) in self.profile.table_columns.iter().enumerate() {
            if let Some(cell) = row.cell(index) {
                item.set_text(key, cell.trim(), FieldSource::Table);
            }
        }
        Ok(item)
    }

    pub fn parse_narrative(&self, section: &Section<'_>) -> Vec<RawClinicalItem> {
        section
            .narrative_lines()
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// 單行敘述 → 原始項目；不符合規則的行直接略過（非錯誤）
    pub fn parse_line(&self, line: &str) -> Option<RawClinicalItem> {
        let pattern = self.pattern.as_ref()?;
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
        if line.is_empty() || self.is_negation(line) {
            return None;
        }

        let captures = pattern.captures(line)?;
        let captured = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };
        if !self.profile.narrative_requires.is_empty()
            && !self
                .profile
                .narrative_requires
                .iter()
                .any(|name| captured(name).is_some())
        {
            return None;
        }

        let mut item = RawClinicalItem::new();
        for name in pattern.capture_names().flatten() {
            if let Some(value) = captured(name) {
                item.set_text(name, value, FieldSource::Narrative);
            }
        }
        item.contains(self.profile.natural_key).then_some(item)
    }

    fn is_negation(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.profile
            .negation_phrases
            .iter()
            .any(|phrase| lowered.contains(phrase))
    }

    /// 表格列優先；敘述行以自然鍵併入相同項目，否則附加在後
    fn merge_by_key(
        &self,
        rows: Vec<RawClinicalItem>,
        lines: Vec<RawClinicalItem>,
    ) -> Vec<RawClinicalItem> {
        let mut merged = rows;
        let mut index: HashMap<String, usize> = HashMap::new();
        for (position, item) in merged.iter().enumerate() {
            if let Some(key) = item.text(self.profile.natural_key).map(|k| natural_key(&k)) {
                index.entry(key).or_insert(position);
            }
        }

        for line in lines {
            let key = line.text(self.profile.natural_key).map(|k| natural_key(&k));
            match key.as_ref().and_then(|k| index.get(k)) {
                Some(&position) => merged[position].merge_from(line),
                None => {
                    if let Some(key) = key {
                        index.insert(key, merged.len());
                    }
                    merged.push(line);
                }
            }
        }
        merged
    }
}

/// Lower-cased, whitespace-collapsed name with trailing punctuation removed.
pub fn natural_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ',', ';', ':'])
        .to_lowercase()
}
