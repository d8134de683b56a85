use crate::core::pipeline::ClinicalRecord;
use crate::domain::model::DomainResult;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::collections::BTreeSet;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const RECORD_FILE: &str = "clinical_record.json";
pub const BUNDLE_FILE: &str = "clinical_record.zip";

/// 將結果寫出：整體 JSON，加上每個有資料領域的 CSV（平面欄位）
pub struct ResultExporter<S: Storage> {
    storage: S,
    write_csv: bool,
    bundle: bool,
}

impl<S: Storage> ResultExporter<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            write_csv: true,
            bundle: false,
        }
    }

    pub fn with_csv(mut self, enabled: bool) -> Self {
        self.write_csv = enabled;
        self
    }

    /// Writes a single zip holding every file instead of loose files.
    pub fn with_zip_bundle(mut self, enabled: bool) -> Self {
        self.bundle = enabled;
        self
    }

    /// Returns the storage paths written.
    pub async fn export(&self, record: &ClinicalRecord) -> Result<Vec<String>> {
        let mut files = vec![(RECORD_FILE.to_string(), serde_json::to_vec_pretty(record)?)];
        if self.write_csv {
            for result in record.values().filter(|r| r.metadata.has_items) {
                files.push((csv_file_name(result), domain_csv(result)?));
            }
        }

        if self.bundle {
            tracing::debug!("📦 Bundling {} files into {}", files.len(), BUNDLE_FILE);
            let zip_data = bundle(&files)?;
            self.storage.write_file(BUNDLE_FILE, &zip_data).await?;
            tracing::info!("💾 Wrote {} ({} bytes)", BUNDLE_FILE, zip_data.len());
            return Ok(vec![BUNDLE_FILE.to_string()]);
        }

        let mut written = Vec::with_capacity(files.len());
        for (path, data) in files {
            self.storage.write_file(&path, &data).await?;
            tracing::debug!("💾 Wrote {} ({} bytes)", path, data.len());
            written.push(path);
        }
        tracing::info!("💾 Exported {} files", written.len());
        Ok(written)
    }
}

/// `48765-2_allergies_and_intolerances.csv`
pub fn csv_file_name(result: &DomainResult) -> String {
    let slug = result
        .metadata
        .domain_name
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_{}.csv", result.metadata.domain_code, slug)
}

/// One row per item; columns are `index` and the union of flat field names.
pub fn domain_csv(result: &DomainResult) -> Result<Vec<u8>> {
    let columns: BTreeSet<&str> = result
        .items
        .iter()
        .flat_map(|item| item.flat().keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["index"];
    header.extend(columns.iter().copied());
    writer.write_record(&header)?;

    for item in &result.items {
        let mut row = vec![item.index().to_string()];
        row.extend(
            columns
                .iter()
                .map(|column| item.flat_value(column).unwrap_or_default().to_string()),
        );
        writer.write_record(&row)?;
    }

    let data = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(data)
}

fn bundle(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }
    // 完成並取回底層 Vec<u8>
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FieldSource, FieldValue, NormalizedItemBuilder};
    use crate::utils::error::ClinicalError;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                ClinicalError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn record() -> ClinicalRecord {
        let first = NormalizedItemBuilder::new("48765-2", 0)
            .field(
                "agent",
                FieldValue::text("372687004", "Amoxicillin", FieldSource::Structured)
                    .with_code("372687004", "2.16.840.1.113883.6.96"),
            )
            .field("status", FieldValue::sentinel("Not specified"))
            .build();
        let second = NormalizedItemBuilder::new("48765-2", 1)
            .field("agent", FieldValue::text("Latex, natural", "Latex, natural", FieldSource::Table))
            .build();

        let mut record = ClinicalRecord::new();
        record.insert(
            "48765-2".to_string(),
            DomainResult::new("48765-2", "Allergies and Intolerances", vec![first, second], 0, false),
        );
        record.insert("47519-4".to_string(), DomainResult::empty("47519-4", "History of Procedures"));
        record
    }

    #[test]
    fn test_domain_csv_uses_union_of_flat_fields() {
        let record = record();
        let csv = String::from_utf8(domain_csv(&record["48765-2"]).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "index,agent,agent_code,status");
        assert_eq!(lines[1], "0,Amoxicillin,372687004,Not specified");
        assert_eq!(lines[2], "1,\"Latex, natural\",,");
    }

    #[tokio::test]
    async fn test_export_writes_json_and_non_empty_domains() {
        let storage = MockStorage::new();
        let written = ResultExporter::new(storage.clone()).export(&record()).await.unwrap();

        assert_eq!(
            written,
            vec![RECORD_FILE.to_string(), "48765-2_allergies_and_intolerances.csv".to_string()]
        );
        let json: serde_json::Value =
            serde_json::from_slice(&storage.get_file(RECORD_FILE).await.unwrap()).unwrap();
        assert_eq!(json["48765-2"]["items"][0]["agent"], "Amoxicillin");
        assert_eq!(json["48765-2"]["items"][0]["data"]["agent"]["code"], "372687004");
        assert_eq!(json["47519-4"]["metadata"]["has_items"], false);
    }

    #[tokio::test]
    async fn test_zip_bundle_contains_every_file() {
        let storage = MockStorage::new();
        let written = ResultExporter::new(storage.clone())
            .with_zip_bundle(true)
            .export(&record())
            .await
            .unwrap();
        assert_eq!(written, vec![BUNDLE_FILE.to_string()]);

        let data = storage.get_file(BUNDLE_FILE).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut json = String::new();
        archive.by_name(RECORD_FILE).unwrap().read_to_string(&mut json).unwrap();
        assert!(json.contains("Amoxicillin"));
    }
}
