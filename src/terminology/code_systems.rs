//! Code system OIDs used across sections, and the mapping to the canonical
//! URIs a FHIR terminology server expects.

pub const SNOMED_CT: &str = "2.16.840.1.113883.6.96";
pub const LOINC: &str = "2.16.840.1.113883.6.1";
pub const ATC: &str = "2.16.840.1.113883.6.73";
pub const ICD_10: &str = "2.16.840.1.113883.6.3";
pub const ICD_10_CM: &str = "2.16.840.1.113883.6.90";
pub const UCUM: &str = "2.16.840.1.113883.6.8";
pub const EDQM: &str = "0.4.0.127.0.16.1.1.2.1";

pub const HL7_ACT_CODE: &str = "2.16.840.1.113883.5.4";
pub const HL7_ACT_STATUS: &str = "2.16.840.1.113883.5.14";
pub const HL7_OBSERVATION_INTERPRETATION: &str = "2.16.840.1.113883.5.83";
pub const HL7_ROUTE_OF_ADMINISTRATION: &str = "2.16.840.1.113883.5.112";
pub const HL7_CRITICALITY: &str = "2.16.840.1.113883.5.1063";
pub const HL7_NULL_FLAVOR: &str = "2.16.840.1.113883.5.1008";

/// 跨境摘要常用的 value set 家族（依 OID 前綴比對）
pub const DEFAULT_VALUE_SET_PREFIXES: &[&str] =
    &["1.3.6.1.4.1.12559.11.10.1.3.1", "0.4.0.127.0.16.1.1.2"];

const RESOLVABLE_SYSTEMS: &[&str] = &[SNOMED_CT, LOINC, ATC, ICD_10, ICD_10_CM];

/// Whether the external terminology service should be asked about this
/// code system at all.
pub fn is_resolvable(code_system: &str, value_set_prefixes: &[String]) -> bool {
    let system = code_system.trim().trim_start_matches("urn:oid:");
    RESOLVABLE_SYSTEMS.contains(&system)
        || value_set_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && system.starts_with(prefix.as_str()))
}

pub fn fhir_system_uri(code_system: &str) -> String {
    let system = code_system.trim().trim_start_matches("urn:oid:");
    match system {
        SNOMED_CT => "http://snomed.info/sct".to_string(),
        LOINC => "http://loinc.org".to_string(),
        ATC => "http://www.whocc.no/atc".to_string(),
        ICD_10 => "http://hl7.org/fhir/sid/icd-10".to_string(),
        ICD_10_CM => "http://hl7.org/fhir/sid/icd-10-cm".to_string(),
        UCUM => "http://unitsofmeasure.org".to_string(),
        other if other.starts_with("http://") || other.starts_with("https://") => other.to_string(),
        other => format!("urn:oid:{}", other),
    }
}

pub fn default_value_set_prefixes() -> Vec<String> {
    DEFAULT_VALUE_SET_PREFIXES
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}
