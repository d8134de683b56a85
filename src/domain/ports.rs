use crate::document::ClinicalDocument;
use crate::domain::model::{CachedSection, Extraction};
use crate::domain::schema::{EnrichmentRule, FieldSpec};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 每個臨床領域一個抽取器
pub trait SectionExtractor: Send + Sync {
    fn domain_code(&self) -> &str;
    fn domain_name(&self) -> &str;

    /// Section codes this domain is read from; the same facts are sometimes
    /// filed under an alternate code.
    fn accepted_codes(&self) -> Vec<&str> {
        vec![self.domain_code()]
    }

    fn extract(&self, document: &ClinicalDocument) -> Result<Extraction>;

    /// Normalization schema; an empty schema normalizes every raw key as text.
    fn field_schema(&self) -> &'static [FieldSpec] {
        &[]
    }

    /// Sibling domain this one pulls facts from after extraction.
    fn enrichment(&self) -> Option<EnrichmentRule> {
        None
    }
}

/// 外部術語服務邊界。實作不得回傳錯誤：任何失敗都視為查無結果。
#[async_trait]
pub trait TerminologyService: Send + Sync {
    async fn lookup(&self, code: &str, code_system: &str, language: &str) -> Option<String>;

    fn name(&self) -> &str {
        "terminology-service"
    }
}

/// 區段快取的持久化邊界（類 session 儲存）
#[async_trait]
pub trait SectionStore: Send + Sync {
    async fn get(&self, session_key: &str, domain_code: &str) -> Option<CachedSection>;
    async fn store(&self, session_key: &str, section: CachedSection) -> Result<()>;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
