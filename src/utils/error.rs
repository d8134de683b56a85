use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClinicalError {
    #[error("Document is not parseable markup: {message}")]
    DocumentMalformed { message: String },

    #[error("Extractor for domain {domain} failed: {message}")]
    ExtractorFault { domain: String, message: String },

    #[error("Processing timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Terminology request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Document,
    Extraction,
    Network,
    Storage,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ClinicalError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClinicalError::DocumentMalformed { .. } => ErrorCategory::Document,
            ClinicalError::ExtractorFault { .. } | ClinicalError::Timeout { .. } => {
                ErrorCategory::Extraction
            }
            ClinicalError::HttpError(_) => ErrorCategory::Network,
            ClinicalError::ZipError(_)
            | ClinicalError::CsvError(_)
            | ClinicalError::IoError(_)
            | ClinicalError::SerializationError(_) => ErrorCategory::Storage,
            ClinicalError::ConfigError { .. }
            | ClinicalError::MissingConfigError { .. }
            | ClinicalError::InvalidConfigValueError { .. }
            | ClinicalError::ConfigValidationError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ClinicalError::ExtractorFault { .. } => ErrorSeverity::Low,
            ClinicalError::HttpError(_) | ClinicalError::Timeout { .. } => ErrorSeverity::Medium,
            ClinicalError::DocumentMalformed { .. }
            | ClinicalError::CsvError(_)
            | ClinicalError::SerializationError(_) => ErrorSeverity::High,
            ClinicalError::ZipError(_)
            | ClinicalError::IoError(_)
            | ClinicalError::ConfigError { .. }
            | ClinicalError::MissingConfigError { .. }
            | ClinicalError::InvalidConfigValueError { .. }
            | ClinicalError::ConfigValidationError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ClinicalError::DocumentMalformed { .. } => {
                "Check that the input file is a clinical XML document and not truncated".to_string()
            }
            ClinicalError::ExtractorFault { domain, .. } => {
                format!("Inspect section {} of the document; other domains were processed", domain)
            }
            ClinicalError::Timeout { .. } => {
                "Increase pipeline.processing_timeout_seconds or run with --offline".to_string()
            }
            ClinicalError::HttpError(_) => {
                "Verify the terminology endpoint is reachable, or run with --offline".to_string()
            }
            ClinicalError::IoError(_) | ClinicalError::ZipError(_) => {
                "Check file permissions and free disk space for the output path".to_string()
            }
            ClinicalError::CsvError(_) | ClinicalError::SerializationError(_) => {
                "Report the document that produced this output".to_string()
            }
            ClinicalError::MissingConfigError { field } => {
                format!("Set '{}' in the configuration file", field)
            }
            ClinicalError::InvalidConfigValueError { field, .. }
            | ClinicalError::ConfigValidationError { field, .. } => {
                format!("Fix the value of '{}' in the configuration file", field)
            }
            ClinicalError::ConfigError { .. } => "Review the configuration file".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ClinicalError::DocumentMalformed { .. } => {
                "The clinical document could not be read".to_string()
            }
            ClinicalError::ExtractorFault { domain, .. } => {
                format!("Section {} could not be extracted", domain)
            }
            ClinicalError::Timeout { seconds } => {
                format!("Processing did not finish within {} seconds", seconds)
            }
            ClinicalError::HttpError(_) => "The terminology service is unavailable".to_string(),
            other if other.category() == ErrorCategory::Configuration => {
                format!("Configuration problem: {}", other)
            }
            other => format!("Could not write the output: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClinicalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_fault_is_low_severity() {
        let err = ClinicalError::ExtractorFault {
            domain: "48765-2".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Extraction);
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.recovery_suggestion().contains("48765-2"));
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = ClinicalError::MissingConfigError {
            field: "terminology.endpoint".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().starts_with("Configuration problem"));
    }
}
