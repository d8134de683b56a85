use crate::core::enrich::CrossReferenceEnricher;
use crate::core::normalize::FieldNormalizer;
use crate::core::registry::Registry;
use crate::document::ClinicalDocument;
use crate::domain::model::{CachedSection, DomainResult, Extraction, RawClinicalItem};
use crate::domain::ports::{SectionExtractor, SectionStore};
use crate::terminology::TerminologyResolver;
use crate::utils::error::{ClinicalError, Result};
use crate::utils::monitor::SystemMonitor;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// 領域代碼 → 該領域結果
pub type ClinicalRecord = BTreeMap<String, DomainResult>;

pub const DEFAULT_SECTION_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct ExtractedDomain {
    extractor: Arc<dyn SectionExtractor>,
    items: Vec<RawClinicalItem>,
    skipped: usize,
    from_cache: bool,
}

struct ExtractionFault {
    code: String,
    name: String,
    message: String,
}

type ExtractionOutcome = std::result::Result<ExtractedDomain, ExtractionFault>;

/// 文件 → 抽取 → 補齊 → 正規化 → 各領域結果
///
/// Extraction of every registered domain runs concurrently; enrichment and
/// normalization run in a second concurrent phase once all extractions are
/// joined, so a domain used as an enrichment source is always complete. A
/// fault inside one domain becomes an empty result carrying `error`.
pub struct PipelineManager {
    registry: Registry,
    resolver: Arc<TerminologyResolver>,
    section_store: Option<Arc<dyn SectionStore>>,
    section_cache_ttl: Duration,
    language: Option<String>,
    monitoring: bool,
}

impl PipelineManager {
    pub fn new(registry: Registry, resolver: Arc<TerminologyResolver>) -> Self {
        Self {
            registry,
            resolver,
            section_store: None,
            section_cache_ttl: DEFAULT_SECTION_CACHE_TTL,
            language: None,
            monitoring: false,
        }
    }

    /// All built-in domains, resolving codes without an external service.
    pub fn offline() -> Self {
        Self::new(Registry::bootstrap(), Arc::new(TerminologyResolver::offline()))
    }

    pub fn register(&mut self, extractor: Arc<dyn SectionExtractor>) {
        self.registry.register(extractor);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn with_section_store(mut self, store: Arc<dyn SectionStore>) -> Self {
        self.section_store = Some(store);
        self
    }

    pub fn with_section_cache_ttl(mut self, ttl: Duration) -> Self {
        self.section_cache_ttl = ttl;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring = enabled;
        self
    }

    pub async fn process(&self, text: &str) -> Result<ClinicalRecord> {
        self.process_with_session(text, None).await
    }

    /// Same as [`process`](Self::process), reusing section items cached
    /// under `session_key` when they are fresh and non-empty.
    pub async fn process_with_session(&self, text: &str, session_key: Option<&str>) -> Result<ClinicalRecord> {
        let started = Instant::now();
        let monitor = self.monitoring.then(SystemMonitor::new);
        let document = Arc::new(ClinicalDocument::parse(text)?);
        if document.is_malformed() {
            tracing::warn!("⚠️ Document is malformed, extracting from the readable part");
        }
        if let Some(monitor) = &monitor {
            monitor.record_phase("Document parsed");
        }

        let extracted = self.extract_all(&document, session_key).await;
        if let Some(monitor) = &monitor {
            monitor.record_phase("Extraction completed");
        }

        let record = self.normalize_all(&document, extracted).await;
        if let Some(monitor) = &monitor {
            monitor.record_phase("Normalization completed");
        }

        let items: usize = record.values().map(|r| r.metadata.item_count).sum();
        let faults = record.values().filter(|r| r.is_fault()).count();
        tracing::info!(
            "✅ Processed {} domains ({} items, {} faults) in {:?}",
            record.len(),
            items,
            faults,
            started.elapsed()
        );
        if let Some(monitor) = &monitor {
            monitor.log_summary(record.len(), items);
        }
        Ok(record)
    }

    /// Abandons all in-flight work once `limit` elapses.
    pub async fn process_with_timeout(
        &self,
        text: &str,
        session_key: Option<&str>,
        limit: Duration,
    ) -> Result<ClinicalRecord> {
        match tokio::time::timeout(limit, self.process_with_session(text, session_key)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("⏱️ Processing exceeded {:?}, abandoning", limit);
                Err(ClinicalError::Timeout {
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    async fn extract_all(&self, document: &Arc<ClinicalDocument>, session_key: Option<&str>) -> Vec<ExtractionOutcome> {
        let ttl = chrono::Duration::from_std(self.section_cache_ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let mut tasks = JoinSet::new();

        for extractor in self.registry.iter() {
            let extractor = Arc::clone(extractor);
            let document = Arc::clone(document);
            let store = self.section_store.clone();
            let session = session_key.map(str::to_string);

            tasks.spawn(async move {
                let code = extractor.domain_code().to_string();
                let cache = store.zip(session);

                if let Some((store, session)) = &cache {
                    if let Some(cached) = store.get(session, &code).await {
                        if cached.is_fresh(ttl, chrono::Utc::now()) {
                            tracing::debug!("💾 Using cached section {} ({} items)", code, cached.items.len());
                            return Ok(ExtractedDomain {
                                extractor,
                                items: cached.items,
                                skipped: 0,
                                from_cache: true,
                            });
                        }
                        tracing::debug!("🔄 Cached section {} is stale or empty, re-parsing", code);
                    }
                }

                let extraction = match run_extractor(extractor.as_ref(), &document) {
                    Ok(extraction) => extraction,
                    Err(fault) => return Err(fault),
                };
                tracing::debug!(
                    "📥 Extracted {} {} items ({} skipped)",
                    extraction.items.len(),
                    code,
                    extraction.skipped
                );

                if let Some((store, session)) = &cache {
                    if !extraction.items.is_empty() {
                        let section = CachedSection::new(&code, extraction.items.clone());
                        if let Err(e) = store.store(session, section).await {
                            tracing::warn!("⚠️ Could not cache section {}: {}", code, e);
                        }
                    }
                }

                Ok(ExtractedDomain {
                    extractor,
                    items: extraction.items,
                    skipped: extraction.skipped,
                    from_cache: false,
                })
            });
        }

        let mut outcomes = Vec::with_capacity(self.registry.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("❌ Extraction task did not complete: {}", e),
            }
        }
        outcomes
    }

    async fn normalize_all(&self, document: &ClinicalDocument, extracted: Vec<ExtractionOutcome>) -> ClinicalRecord {
        let mut record = ClinicalRecord::new();
        let mut domains = Vec::new();
        for outcome in extracted {
            match outcome {
                Ok(domain) => domains.push(domain),
                Err(fault) => {
                    tracing::error!(
                        domain_code = %fault.code,
                        domain_name = %fault.name,
                        "❌ Extractor fault: {}",
                        fault.message
                    );
                    record.insert(fault.code.clone(), DomainResult::fault(&fault.code, &fault.name, fault.message));
                }
            }
        }

        // 補齊來源：各領域抽取完成後的原始項目
        let sources: HashMap<String, Arc<Vec<RawClinicalItem>>> = domains
            .iter()
            .map(|d| (d.extractor.domain_code().to_string(), Arc::new(d.items.clone())))
            .collect();

        let mut tasks = JoinSet::new();
        for domain in domains {
            let enricher = self.enricher();
            let normalizer = self.normalizer(document);
            let rule = domain.extractor.enrichment();
            let rule_sources = rule.and_then(|r| sources.get(r.source_domain).cloned());

            tasks.spawn(async move {
                let code = domain.extractor.domain_code().to_string();
                let name = domain.extractor.domain_name().to_string();
                let mut items = domain.items;

                if let (Some(rule), Some(rule_sources)) = (rule, rule_sources) {
                    let (enriched_items, enriched) = enricher.enrich(&rule, items, &rule_sources).await;
                    if enriched > 0 {
                        tracing::info!("🔗 Enriched {} {} items from {}", enriched, code, rule.source_domain);
                    }
                    items = enriched_items;
                }

                let normalized = normalizer
                    .normalize(&code, domain.extractor.field_schema(), &items)
                    .await;
                DomainResult::new(&code, &name, normalized, domain.skipped, domain.from_cache)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    record.insert(result.metadata.domain_code.clone(), result);
                }
                Err(e) => tracing::error!("❌ Normalization task did not complete: {}", e),
            }
        }

        // 任務中斷者也要有結果
        for extractor in self.registry.iter() {
            let code = extractor.domain_code();
            if !record.contains_key(code) {
                tracing::error!(
                    domain_code = %code,
                    domain_name = %extractor.domain_name(),
                    "❌ Domain produced no result"
                );
                record.insert(
                    code.to_string(),
                    DomainResult::fault(code, extractor.domain_name(), "processing task aborted"),
                );
            }
        }
        record
    }

    fn enricher(&self) -> CrossReferenceEnricher {
        let enricher = CrossReferenceEnricher::new(Arc::clone(&self.resolver));
        match &self.language {
            Some(language) => enricher.with_language(language),
            None => enricher,
        }
    }

    fn normalizer(&self, document: &ClinicalDocument) -> FieldNormalizer {
        let normalizer = FieldNormalizer::new(Arc::clone(&self.resolver))
            .with_text_references(document.text_references().clone());
        match &self.language {
            Some(language) => normalizer.with_language(language),
            None => normalizer,
        }
    }
}

/// Runs one extractor, turning an error or a panic into a fault that names
/// the domain.
fn run_extractor(
    extractor: &dyn SectionExtractor,
    document: &ClinicalDocument,
) -> std::result::Result<Extraction, ExtractionFault> {
    let fault = |message: String| ExtractionFault {
        code: extractor.domain_code().to_string(),
        name: extractor.domain_name().to_string(),
        message,
    };
    match catch_unwind(AssertUnwindSafe(|| extractor.extract(document))) {
        Ok(Ok(extraction)) => Ok(extraction),
        Ok(Err(e)) => Err(fault(e.to_string())),
        Err(payload) => Err(fault(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("extractor panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("extractor panicked: {}", message)
    } else {
        "extractor panicked".to_string()
    }
}
