use crate::utils::error::{ClinicalError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ClinicalError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_language_tag(field_name: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 8
        && value.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if !valid {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Expected a language tag such as 'en' or 'pt-PT'".to_string(),
        });
    }
    Ok(())
}

/// 未替換的 `${VAR}` 代表環境變數缺漏
pub fn validate_substituted(field_name: &str, value: &str) -> Result<()> {
    if value.contains("${") {
        return Err(ClinicalError::MissingConfigError {
            field: field_name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_log_level(field_name: &str, value: &str) -> Result<()> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    validate_non_empty_string(field_name, value)?;
    if !LEVELS.contains(&value.to_lowercase().as_str()) {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Valid levels: {}", LEVELS.join(", ")),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ClinicalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("terminology.endpoint", "https://tx.example.org/fhir").is_ok());
        assert!(validate_url("terminology.endpoint", "http://localhost:8080").is_ok());
        assert!(validate_url("terminology.endpoint", "").is_err());
        assert!(validate_url("terminology.endpoint", "invalid-url").is_err());
        assert!(validate_url("terminology.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("terminology.timeout_ms", 500, 1).is_ok());
        assert!(validate_positive_number("terminology.timeout_ms", 0, 1).is_err());
    }

    #[test]
    fn test_validate_language_tag() {
        assert!(validate_language_tag("terminology.language", "en").is_ok());
        assert!(validate_language_tag("terminology.language", "pt-PT").is_ok());
        assert!(validate_language_tag("terminology.language", "").is_err());
        assert!(validate_language_tag("terminology.language", "en_US!").is_err());
    }

    #[test]
    fn test_validate_substituted_and_log_level() {
        assert!(validate_substituted("terminology.headers.Authorization", "Bearer abc").is_ok());
        assert!(matches!(
            validate_substituted("terminology.headers.Authorization", "Bearer ${TX_TOKEN}"),
            Err(ClinicalError::MissingConfigError { .. })
        ));
        assert!(validate_log_level("monitoring.log_level", "DEBUG").is_ok());
        assert!(validate_log_level("monitoring.log_level", "loud").is_err());
        assert!(validate_log_level("monitoring.log_level", " ").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("pipeline.processing_timeout_seconds", 30, 1, 600).is_ok());
        assert!(validate_range("pipeline.processing_timeout_seconds", 0, 1, 600).is_err());
    }
}
