use crate::domain::ports::TerminologyService;
use crate::terminology::code_systems::fhir_system_uri;
use crate::utils::error::Result;
use crate::utils::validation::validate_url;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// FHIR `CodeSystem/$lookup` 術語服務客戶端
#[derive(Debug, Clone)]
pub struct FhirTerminologyClient {
    client: Client,
    base_url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl FhirTerminologyClient {
    pub fn new(base_url: &str) -> Result<Self> {
        validate_url("terminology.endpoint", base_url)?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(3),
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Ok(None)` when the server does not know the code.
    pub async fn fetch_display(
        &self,
        code: &str,
        code_system: &str,
        language: &str,
    ) -> Result<Option<String>> {
        let endpoint = format!("{}/CodeSystem/$lookup", self.base_url);
        let system = fhir_system_uri(code_system);

        let mut request = self
            .client
            .get(&endpoint)
            .query(&[
                ("system", system.as_str()),
                ("code", code),
                ("displayLanguage", language),
            ])
            .header("Accept", "application/fhir+json")
            .timeout(self.timeout);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        tracing::debug!("📡 Terminology lookup {}|{} ({})", system, code, language);
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let body: Value = response.json().await?;

        Ok(parse_lookup_display(&body, language))
    }
}

#[async_trait]
impl TerminologyService for FhirTerminologyClient {
    async fn lookup(&self, code: &str, code_system: &str, language: &str) -> Option<String> {
        match self.fetch_display(code, code_system, language).await {
            Ok(display) => display,
            Err(e) => {
                tracing::warn!("⚠️ Terminology lookup for {}|{} failed: {}", code_system, code, e);
                None
            }
        }
    }

    fn name(&self) -> &str {
        "fhir-terminology"
    }
}

/// Picks a designation in the requested language, else the `display`
/// parameter of a `Parameters` resource.
pub fn parse_lookup_display(body: &Value, language: &str) -> Option<String> {
    let parameters = body.get("parameter")?.as_array()?;

    let designation = parameters
        .iter()
        .filter(|p| p.get("name").and_then(Value::as_str) == Some("designation"))
        .find_map(|p| {
            let parts = p.get("part")?.as_array()?;
            let part_value = |name: &str, field: &str| {
                parts
                    .iter()
                    .find(|part| part.get("name").and_then(Value::as_str) == Some(name))
                    .and_then(|part| part.get(field))
                    .and_then(Value::as_str)
            };
            let lang = part_value("language", "valueCode")?;
            if lang.eq_ignore_ascii_case(language)
                || lang.split('-').next() == Some(language)
            {
                part_value("value", "valueString").map(str::to_string)
            } else {
                None
            }
        });

    designation
        .or_else(|| {
            parameters
                .iter()
                .find(|p| p.get("name").and_then(Value::as_str) == Some("display"))
                .and_then(|p| p.get("valueString"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|display| !display.trim().is_empty())
}
