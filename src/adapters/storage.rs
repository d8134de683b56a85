use crate::domain::model::CachedSection;
use crate::domain::ports::{SectionStore, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}

/// 記憶體內的區段快取（單一程序內共用）
#[derive(Debug, Default)]
pub struct InMemorySectionStore {
    sections: RwLock<HashMap<(String, String), CachedSection>>,
}

impl InMemorySectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sections.read().await.len()
    }
}

#[async_trait]
impl SectionStore for InMemorySectionStore {
    async fn get(&self, session_key: &str, domain_code: &str) -> Option<CachedSection> {
        self.sections
            .read()
            .await
            .get(&(session_key.to_string(), domain_code.to_string()))
            .cloned()
    }

    async fn store(&self, session_key: &str, section: CachedSection) -> Result<()> {
        self.sections
            .write()
            .await
            .insert((session_key.to_string(), section.domain_code.clone()), section);
        Ok(())
    }
}

/// Section cache persisted as `<base>/<session>/<domain>.json`.
#[derive(Debug, Clone)]
pub struct FileSectionStore {
    base_path: PathBuf,
}

impl FileSectionStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn section_path(&self, session_key: &str, domain_code: &str) -> PathBuf {
        self.base_path
            .join(sanitize(session_key))
            .join(format!("{}.json", sanitize(domain_code)))
    }
}

#[async_trait]
impl SectionStore for FileSectionStore {
    async fn get(&self, session_key: &str, domain_code: &str) -> Option<CachedSection> {
        let path = self.section_path(session_key, domain_code);
        let data = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&data) {
            Ok(section) => Some(section),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable cached section {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn store(&self, session_key: &str, section: CachedSection) -> Result<()> {
        let path = self.section_path(session_key, &section.domain_code);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&section)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FieldSource, RawClinicalItem};
    use tempfile::TempDir;

    fn section() -> CachedSection {
        let mut item = RawClinicalItem::new();
        item.set_text("medication", "Metformin", FieldSource::Table);
        CachedSection::new("10160-0", vec![item])
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemorySectionStore::new();
        assert!(store.get("s1", "10160-0").await.is_none());
        store.store("s1", section()).await.unwrap();
        let cached = store.get("s1", "10160-0").await.unwrap();
        assert_eq!(cached.items.len(), 1);
        assert!(store.get("s2", "10160-0").await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_file_store_persists_json() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSectionStore::new(temp_dir.path());
        store.store("../session 1", section()).await.unwrap();

        let cached = store.get("../session 1", "10160-0").await.unwrap();
        assert_eq!(cached.items[0].text("medication").as_deref(), Some("Metformin"));
        assert!(temp_dir.path().join("_session_1").join("10160-0.json").exists());
    }

    #[tokio::test]
    async fn test_local_storage_writes_nested_paths() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());
        storage.write_file("out/a.txt", b"hello").await.unwrap();
        assert_eq!(storage.read_file("out/a.txt").await.unwrap(), b"hello");
    }
}
