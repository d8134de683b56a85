use crate::domain::ports::SectionExtractor;
use crate::extract::{
    AdvanceDirectivesExtractor, AllergiesExtractor, DevicesExtractor, FunctionalStatusExtractor,
    ImmunizationsExtractor, MedicationsExtractor, PregnancyExtractor, ProblemsExtractor, ProceduresExtractor,
    ResultsExtractor, SocialHistoryExtractor, VitalSignsExtractor,
};
use std::collections::HashMap;
use std::sync::Arc;

/// 領域代碼 / 名稱 → 抽取器
///
/// Registration order is kept; registering a code twice replaces the
/// earlier extractor in place.
#[derive(Default, Clone)]
pub struct Registry {
    extractors: Vec<Arc<dyn SectionExtractor>>,
    by_code: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in domains.
    pub fn bootstrap() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AllergiesExtractor::new()));
        registry.register(Arc::new(ProblemsExtractor::new()));
        registry.register(Arc::new(MedicationsExtractor::new()));
        registry.register(Arc::new(ProceduresExtractor::new()));
        registry.register(Arc::new(ImmunizationsExtractor::new()));
        registry.register(Arc::new(VitalSignsExtractor::new()));
        registry.register(Arc::new(ResultsExtractor::new()));
        registry.register(Arc::new(PregnancyExtractor::new()));
        registry.register(Arc::new(SocialHistoryExtractor::new()));
        registry.register(Arc::new(FunctionalStatusExtractor::new()));
        registry.register(Arc::new(DevicesExtractor::new()));
        registry.register(Arc::new(AdvanceDirectivesExtractor::new()));
        tracing::debug!("📋 Registered {} domain extractors", registry.len());
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn SectionExtractor>) {
        let code = extractor.domain_code().to_string();
        let name = extractor.domain_name().to_lowercase();

        let position = match self.by_code.get(&code) {
            Some(&position) => {
                tracing::warn!("♻️ Replacing extractor for domain {}", code);
                let old_name = self.extractors[position].domain_name().to_lowercase();
                // 名稱可能已被其他領域接手
                if self.by_name.get(&old_name) == Some(&position) {
                    self.by_name.remove(&old_name);
                }
                self.extractors[position] = extractor;
                position
            }
            None => {
                self.extractors.push(extractor);
                self.extractors.len() - 1
            }
        };
        self.by_code.insert(code, position);
        self.by_name.insert(name, position);
    }

    /// Looks up by domain code, then by case-insensitive domain name.
    pub fn get(&self, code_or_name: &str) -> Option<Arc<dyn SectionExtractor>> {
        let key = code_or_name.trim();
        self.by_code
            .get(key)
            .or_else(|| self.by_name.get(&key.to_lowercase()))
            .map(|&position| Arc::clone(&self.extractors[position]))
    }

    pub fn codes(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.domain_code()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SectionExtractor>> {
        self.extractors.iter()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
