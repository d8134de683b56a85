use crate::utils::error::{ClinicalError, Result};
use crate::utils::validation::{
    validate_language_tag, validate_log_level, validate_path, validate_positive_number, validate_range,
    validate_substituted, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// 管線設定檔，所有區段皆可省略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub terminology: TerminologySettings,
    pub pipeline: ProcessingSettings,
    pub output: OutputSettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologySettings {
    /// FHIR terminology server base URL; unset means offline resolution.
    pub endpoint: Option<String>,
    pub language: String,
    pub timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub headers: HashMap<String, String>,
    /// Replaces the built-in OID prefixes treated as resolvable value sets.
    pub value_set_prefixes: Option<Vec<String>>,
    /// TOML file extending the built-in fallback table.
    pub fallback_table: Option<String>,
}

impl Default for TerminologySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            language: "en".to_string(),
            timeout_seconds: 3,
            cache_ttl_seconds: 3600,
            headers: HashMap::new(),
            value_set_prefixes: None,
            fallback_table: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub processing_timeout_seconds: u64,
    pub section_cache_ttl_seconds: u64,
    /// Directory of the file section cache; unset keeps it in memory.
    pub section_cache_dir: Option<String>,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            processing_timeout_seconds: 60,
            section_cache_ttl_seconds: 15 * 60,
            section_cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub output_path: String,
    pub csv: bool,
    pub zip: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            csv: true,
            zip: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub enabled: bool,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl PipelineSettings {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ClinicalError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ClinicalError::ConfigValidationError {
            field: "config".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.terminology.timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.terminology.cache_ttl_seconds)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.processing_timeout_seconds)
    }

    pub fn section_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.pipeline.section_cache_ttl_seconds)
    }
}

fn env_var_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok()).as_ref()
}

/// 替換環境變數 (例如 ${TX_TOKEN})；未設定者保留原文
fn substitute_env_vars(content: &str) -> String {
    let Some(re) = env_var_pattern() else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}

impl Validate for PipelineSettings {
    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.terminology.endpoint {
            validate_url("terminology.endpoint", endpoint)?;
        }
        validate_language_tag("terminology.language", &self.terminology.language)?;
        validate_range("terminology.timeout_seconds", self.terminology.timeout_seconds, 1, 60)?;
        validate_positive_number("terminology.cache_ttl_seconds", self.terminology.cache_ttl_seconds, 1)?;
        if let Some(path) = &self.terminology.fallback_table {
            validate_path("terminology.fallback_table", path)?;
        }
        for (name, value) in &self.terminology.headers {
            validate_substituted(&format!("terminology.headers.{}", name), value)?;
        }

        validate_range(
            "pipeline.processing_timeout_seconds",
            self.pipeline.processing_timeout_seconds,
            1,
            3600,
        )?;
        validate_positive_number(
            "pipeline.section_cache_ttl_seconds",
            self.pipeline.section_cache_ttl_seconds,
            1,
        )?;
        if let Some(dir) = &self.pipeline.section_cache_dir {
            validate_path("pipeline.section_cache_dir", dir)?;
        }

        validate_path("output.output_path", &self.output.output_path)?;

        validate_log_level("monitoring.log_level", &self.monitoring.log_level)
    }
}
