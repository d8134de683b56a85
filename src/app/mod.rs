// Application layer: wires settings into the resolver, stores and pipeline
// manager, and runs one document end to end.

use crate::adapters::{FhirTerminologyClient, FileSectionStore, InMemorySectionStore, LocalStorage};
use crate::config::PipelineSettings;
use crate::core::{ClinicalRecord, PipelineManager, Registry, ResultExporter};
use crate::domain::ports::SectionStore;
use crate::terminology::{FallbackTable, TerminologyResolver};
use crate::utils::error::Result;
use std::sync::Arc;

pub fn build_resolver(settings: &PipelineSettings) -> Result<TerminologyResolver> {
    let terminology = &settings.terminology;
    let fallback = match &terminology.fallback_table {
        Some(path) => FallbackTable::builtin_with_file(path)?,
        None => FallbackTable::builtin(),
    };
    tracing::debug!("📚 Fallback table {} ({} entries)", fallback.version(), fallback.len());
    let mut resolver = TerminologyResolver::new(fallback)
        .with_cache_ttl(settings.cache_ttl())
        .with_timeout(settings.lookup_timeout())
        .with_language(&terminology.language);
    if let Some(prefixes) = &terminology.value_set_prefixes {
        resolver = resolver.with_value_set_prefixes(prefixes.clone());
    }

    match &terminology.endpoint {
        Some(endpoint) => {
            let client = FhirTerminologyClient::new(endpoint)?
                .with_headers(terminology.headers.clone())
                .with_timeout(settings.lookup_timeout());
            tracing::info!("🌐 Terminology service: {}", client.base_url());
            Ok(resolver.with_service(Arc::new(client)))
        }
        None => {
            tracing::info!("📴 No terminology endpoint configured, resolving offline");
            Ok(resolver)
        }
    }
}

pub fn build_section_store(settings: &PipelineSettings) -> Arc<dyn SectionStore> {
    match &settings.pipeline.section_cache_dir {
        Some(dir) => Arc::new(FileSectionStore::new(dir)),
        None => Arc::new(InMemorySectionStore::new()),
    }
}

pub fn build_manager(settings: &PipelineSettings) -> Result<PipelineManager> {
    let resolver = build_resolver(settings)?;
    Ok(PipelineManager::new(Registry::bootstrap(), Arc::new(resolver))
        .with_section_store(build_section_store(settings))
        .with_section_cache_ttl(settings.section_cache_ttl())
        .with_language(&settings.terminology.language)
        .with_monitoring(settings.monitoring.enabled))
}

#[derive(Debug)]
pub struct RunOutcome {
    pub record: ClinicalRecord,
    /// Files written under the output path; empty on a dry run.
    pub written: Vec<String>,
}

/// 處理單一文件並寫出結果
pub async fn run_document(
    settings: &PipelineSettings,
    document: &str,
    session_key: Option<&str>,
    dry_run: bool,
) -> Result<RunOutcome> {
    let manager = build_manager(settings)?;
    let record = manager
        .process_with_timeout(document, session_key, settings.processing_timeout())
        .await?;

    if dry_run {
        tracing::info!("🧪 Dry run, nothing written");
        return Ok(RunOutcome {
            record,
            written: Vec::new(),
        });
    }

    let storage = LocalStorage::new(settings.output.output_path.clone());
    let written = ResultExporter::new(storage)
        .with_csv(settings.output.csv)
        .with_zip_bundle(settings.output.zip)
        .export(&record)
        .await?;
    Ok(RunOutcome { record, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"<ClinicalDocument><component><structuredBody>
<component><section><code code="11450-4"/><text><paragraph>Hypertension (since 2015) - active</paragraph></text></section></component>
</structuredBody></component></ClinicalDocument>"#;

    #[test]
    fn test_offline_resolver_without_endpoint() {
        let resolver = build_resolver(&PipelineSettings::default()).unwrap();
        assert!(!resolver.has_service());
        assert_eq!(resolver.language(), "en");
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut settings = PipelineSettings::default();
        settings.terminology.endpoint = Some("not a url".to_string());
        assert!(build_resolver(&settings).is_err());
    }

    #[tokio::test]
    async fn test_fallback_table_file_extends_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fallback.toml");
        std::fs::write(
            &path,
            "version = \"site-1\"\n[systems.\"2.16.840.1.113883.6.96\"]\n\"999000\" = \"Local concept\"\n",
        )
        .unwrap();

        let mut settings = PipelineSettings::default();
        settings.terminology.fallback_table = Some(path.to_str().unwrap().to_string());
        let resolver = build_resolver(&settings).unwrap();
        assert_eq!(resolver.resolve("999000", "2.16.840.1.113883.6.96", None).await, "Local concept");
        // 內建項目仍在
        assert_eq!(resolver.resolve("24484000", "2.16.840.1.113883.6.96", None).await, "Severe");
    }

    #[tokio::test]
    async fn test_run_document_writes_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = PipelineSettings::default();
        settings.output.output_path = temp_dir.path().to_str().unwrap().to_string();

        let outcome = run_document(&settings, DOCUMENT, None, false).await.unwrap();
        assert_eq!(outcome.record["11450-4"].metadata.item_count, 1);
        assert!(temp_dir.path().join("clinical_record.json").exists());
        assert!(temp_dir.path().join("11450-4_problem_list.csv").exists());
        assert_eq!(outcome.written.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = PipelineSettings::default();
        settings.output.output_path = temp_dir.path().join("out").to_str().unwrap().to_string();

        let outcome = run_document(&settings, DOCUMENT, Some("s1"), true).await.unwrap();
        assert!(outcome.written.is_empty());
        assert!(!temp_dir.path().join("out").exists());
    }
}
