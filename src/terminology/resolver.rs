use super::cache::{CacheKey, CacheStats, TerminologyCache, TerminologyCacheEntry};
use super::cleanup::{clean_display, is_generic};
use super::code_systems::{default_value_set_prefixes, is_resolvable};
use super::fallback::FallbackTable;
use crate::domain::model::CodedValue;
use crate::domain::ports::TerminologyService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    External,
    TextReference,
    FallbackTable,
    RawDisplay,
    RawCode,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::External => "external",
            ResolutionSource::TextReference => "text_reference",
            ResolutionSource::FallbackTable => "fallback_table",
            ResolutionSource::RawDisplay => "raw_display",
            ResolutionSource::RawCode => "raw_code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub display: String,
    pub source: ResolutionSource,
}

impl Resolution {
    fn new(display: impl Into<String>, source: ResolutionSource) -> Self {
        Self {
            display: display.into(),
            source,
        }
    }
}

/// 代碼 → 顯示文字，固定順序：外部服務、文字參照、靜態對照表、清理後原始值
pub struct TerminologyResolver {
    service: Option<Arc<dyn TerminologyService>>,
    cache: Arc<TerminologyCache>,
    fallback: Arc<FallbackTable>,
    value_set_prefixes: Vec<String>,
    timeout: Duration,
    language: String,
}

impl TerminologyResolver {
    pub fn new(fallback: FallbackTable) -> Self {
        Self {
            service: None,
            cache: Arc::new(TerminologyCache::new(DEFAULT_CACHE_TTL)),
            fallback: Arc::new(fallback),
            value_set_prefixes: default_value_set_prefixes(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Resolver without an external service: text references, fallback
    /// table and raw values only.
    pub fn offline() -> Self {
        Self::new(FallbackTable::builtin())
    }

    pub fn with_service(mut self, service: Arc<dyn TerminologyService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Arc::new(TerminologyCache::new(ttl));
        self
    }

    /// Shares an existing cache, e.g. across documents of one process.
    pub fn with_cache(mut self, cache: Arc<TerminologyCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_value_set_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.value_set_prefixes = prefixes;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn fallback_table(&self) -> &FallbackTable {
        &self.fallback
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Cached external outcome for a code, if it was ever looked up.
    pub async fn cached_entry(
        &self,
        code: &str,
        code_system: &str,
        language: Option<&str>,
    ) -> Option<TerminologyCacheEntry> {
        let language = language.unwrap_or(&self.language);
        self.cache.entry(&CacheKey::new(code, code_system, language)).await
    }

    /// Resolves a bare code. Never empty unless the code itself is empty.
    pub async fn resolve(&self, code: &str, code_system: &str, language: Option<&str>) -> String {
        self.resolve_parts(code, code_system, None, None, language)
            .await
            .display
    }

    /// Resolves a coded value using its narrative reference text and raw
    /// display name as the local steps of the chain.
    pub async fn resolve_coded(&self, coded: &CodedValue, language: Option<&str>) -> Resolution {
        self.resolve_parts(
            &coded.code,
            &coded.code_system,
            coded.reference_text.as_deref(),
            coded.display_name.as_deref(),
            language,
        )
        .await
    }

    pub async fn resolve_parts(
        &self,
        code: &str,
        code_system: &str,
        text_reference: Option<&str>,
        raw_display: Option<&str>,
        language: Option<&str>,
    ) -> Resolution {
        let language = language.unwrap_or(&self.language);
        let code = code.trim();

        if !code.is_empty() {
            if let Some(display) = self.lookup_external(code, code_system, language).await {
                return Resolution::new(display, ResolutionSource::External);
            }
        }

        if let Some(text) = text_reference.filter(|t| !is_generic(t)) {
            return Resolution::new(clean_display(text), ResolutionSource::TextReference);
        }

        if !code.is_empty() {
            if let Some(display) = self.fallback.lookup(code, code_system) {
                return Resolution::new(display, ResolutionSource::FallbackTable);
            }
        }

        if let Some(display) = raw_display.filter(|d| !is_generic(d)) {
            return Resolution::new(clean_display(display), ResolutionSource::RawDisplay);
        }

        tracing::debug!("🔎 No display for {}|{}, using raw code", code_system, code);
        Resolution::new(code, ResolutionSource::RawCode)
    }

    async fn lookup_external(&self, code: &str, code_system: &str, language: &str) -> Option<String> {
        let service = self.service.as_ref()?;
        if !is_resolvable(code_system, &self.value_set_prefixes) {
            return None;
        }

        let key = CacheKey::new(code, code_system, language);
        let timeout = self.timeout;
        self.cache
            .get_or_fetch(key, || async move {
                match tokio::time::timeout(timeout, service.lookup(code, code_system, language)).await {
                    Ok(display) => display
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                    Err(_) => {
                        tracing::warn!(
                            "⏱️ {} lookup for {}|{} timed out after {:?}",
                            service.name(),
                            code_system,
                            code,
                            timeout
                        );
                        None
                    }
                }
            })
            .await
    }
}
