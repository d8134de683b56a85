use super::code_systems::*;
use crate::utils::error::{ClinicalError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const FALLBACK_TABLE_VERSION: &str = "2026.1";

/// 已知術語服務缺漏的靜態對照（code system → code → display）
const BUILTIN_ENTRIES: &[(&str, &str, &str)] = &[
    // HL7 v3 ActCode
    (HL7_ACT_CODE, "ASSERTION", "Assertion"),
    (HL7_ACT_CODE, "SEV", "Severity"),
    (HL7_ACT_CODE, "IMMUNIZ", "Immunization"),
    (HL7_ACT_CODE, "DRUG", "Drug therapy"),
    // HL7 v3 ActStatus
    (HL7_ACT_STATUS, "active", "Active"),
    (HL7_ACT_STATUS, "completed", "Completed"),
    (HL7_ACT_STATUS, "aborted", "Aborted"),
    (HL7_ACT_STATUS, "suspended", "Suspended"),
    (HL7_ACT_STATUS, "cancelled", "Cancelled"),
    (HL7_ACT_STATUS, "held", "Held"),
    (HL7_ACT_STATUS, "new", "New"),
    // HL7 v3 ObservationInterpretation
    (HL7_OBSERVATION_INTERPRETATION, "N", "Normal"),
    (HL7_OBSERVATION_INTERPRETATION, "A", "Abnormal"),
    (HL7_OBSERVATION_INTERPRETATION, "H", "High"),
    (HL7_OBSERVATION_INTERPRETATION, "L", "Low"),
    (HL7_OBSERVATION_INTERPRETATION, "HH", "Critical high"),
    (HL7_OBSERVATION_INTERPRETATION, "LL", "Critical low"),
    (HL7_OBSERVATION_INTERPRETATION, "POS", "Positive"),
    (HL7_OBSERVATION_INTERPRETATION, "NEG", "Negative"),
    // HL7 v3 RouteOfAdministration
    (HL7_ROUTE_OF_ADMINISTRATION, "PO", "Oral"),
    (HL7_ROUTE_OF_ADMINISTRATION, "SWALLOW", "Oral"),
    (HL7_ROUTE_OF_ADMINISTRATION, "IV", "Intravenous"),
    (HL7_ROUTE_OF_ADMINISTRATION, "IM", "Intramuscular"),
    (HL7_ROUTE_OF_ADMINISTRATION, "SQ", "Subcutaneous"),
    (HL7_ROUTE_OF_ADMINISTRATION, "INHL", "Inhalation"),
    (HL7_ROUTE_OF_ADMINISTRATION, "TOPICAL", "Topical"),
    // HL7 v3 Criticality
    (HL7_CRITICALITY, "CRITL", "Low"),
    (HL7_CRITICALITY, "CRITH", "High"),
    (HL7_CRITICALITY, "CRITU", "Unable to assess"),
    // HL7 NullFlavor
    (HL7_NULL_FLAVOR, "UNK", "Unknown"),
    (HL7_NULL_FLAVOR, "NA", "Not applicable"),
    (HL7_NULL_FLAVOR, "NI", "No information"),
    (HL7_NULL_FLAVOR, "ASKU", "Asked but unknown"),
    // UCUM
    (UCUM, "mm[Hg]", "mmHg"),
    (UCUM, "/min", "per minute"),
    (UCUM, "Cel", "°C"),
    (UCUM, "kg", "kg"),
    (UCUM, "cm", "cm"),
    (UCUM, "kg/m2", "kg/m²"),
    (UCUM, "%", "%"),
    (UCUM, "mg/dL", "mg/dL"),
    (UCUM, "mmol/L", "mmol/L"),
    // SNOMED CT: statuses, severities, allergy types and frequent concepts
    (SNOMED_CT, "55561003", "Active"),
    (SNOMED_CT, "73425007", "Inactive"),
    (SNOMED_CT, "413322009", "Resolved"),
    (SNOMED_CT, "277022003", "Remission"),
    (SNOMED_CT, "255604002", "Mild"),
    (SNOMED_CT, "6736007", "Moderate"),
    (SNOMED_CT, "24484000", "Severe"),
    (SNOMED_CT, "419199007", "Allergy to substance"),
    (SNOMED_CT, "416098002", "Drug allergy"),
    (SNOMED_CT, "414285001", "Food allergy"),
    (SNOMED_CT, "419511003", "Propensity to adverse reaction to drug"),
    (SNOMED_CT, "420134006", "Propensity to adverse reaction"),
    (SNOMED_CT, "716186003", "No known allergy"),
    (SNOMED_CT, "271807003", "Eruption of skin"),
    (SNOMED_CT, "39579001", "Anaphylaxis"),
    (SNOMED_CT, "126485001", "Urticaria"),
    (SNOMED_CT, "372687004", "Amoxicillin"),
    (SNOMED_CT, "764146007", "Penicillin"),
    (SNOMED_CT, "91936005", "Allergy to penicillin"),
    (SNOMED_CT, "38341003", "Hypertensive disorder"),
    (SNOMED_CT, "44054006", "Diabetes mellitus type 2"),
    (SNOMED_CT, "195967001", "Asthma"),
    (SNOMED_CT, "77386006", "Pregnant"),
    (SNOMED_CT, "60001007", "Not pregnant"),
    (SNOMED_CT, "8517006", "Ex-smoker"),
    (SNOMED_CT, "266919005", "Never smoked tobacco"),
    (SNOMED_CT, "77176002", "Smoker"),
    (SNOMED_CT, "80146002", "Appendectomy"),
    (SNOMED_CT, "787483001", "No known procedures"),
    (SNOMED_CT, "14106009", "Cardiac pacemaker"),
    (SNOMED_CT, "787481004", "No known device use"),
    // LOINC: vital signs, pregnancy and social history observations
    (LOINC, "8480-6", "Systolic blood pressure"),
    (LOINC, "8462-4", "Diastolic blood pressure"),
    (LOINC, "85354-9", "Blood pressure panel"),
    (LOINC, "8867-4", "Heart rate"),
    (LOINC, "9279-1", "Respiratory rate"),
    (LOINC, "8310-5", "Body temperature"),
    (LOINC, "29463-7", "Body weight"),
    (LOINC, "8302-2", "Body height"),
    (LOINC, "39156-5", "Body mass index"),
    (LOINC, "59408-5", "Oxygen saturation"),
    (LOINC, "82810-3", "Pregnancy status"),
    (LOINC, "11449-6", "Pregnancy status"),
    (LOINC, "11778-8", "Delivery date estimated"),
    (LOINC, "72166-2", "Tobacco smoking status"),
    (LOINC, "74013-4", "Alcoholic drinks per day"),
    (LOINC, "2339-0", "Glucose"),
    (LOINC, "718-7", "Hemoglobin"),
    (LOINC, "2160-0", "Creatinine"),
    // ATC
    (ATC, "J01CA04", "Amoxicillin"),
    (ATC, "J01CE01", "Benzylpenicillin"),
    (ATC, "C09AA05", "Ramipril"),
    (ATC, "A10BA02", "Metformin"),
    (ATC, "N02BE01", "Paracetamol"),
    (ATC, "B01AC06", "Acetylsalicylic acid"),
    (ATC, "J07BB02", "Influenza, inactivated, split virus or surface antigen"),
    // EDQM dose forms
    (EDQM, "10219000", "Tablet"),
    (EDQM, "10221000", "Film-coated tablet"),
    (EDQM, "10210000", "Capsule, hard"),
    (EDQM, "11210000", "Solution for injection"),
];

#[derive(Debug, Deserialize)]
struct FallbackFile {
    version: Option<String>,
    #[serde(default)]
    systems: HashMap<String, HashMap<String, String>>,
}

/// 版本化的靜態對照表；執行期間唯讀
#[derive(Debug, Clone)]
pub struct FallbackTable {
    version: String,
    entries: HashMap<String, HashMap<String, String>>,
}

impl FallbackTable {
    pub fn empty() -> Self {
        Self {
            version: "empty".to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self {
            version: FALLBACK_TABLE_VERSION.to_string(),
            entries: HashMap::new(),
        };
        for (system, code, display) in BUILTIN_ENTRIES {
            table.insert(system, code, display);
        }
        table
    }

    /// Builtin entries extended (and overridden) by a TOML file.
    pub fn builtin_with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let mut table = Self::builtin();
        table.extend_from_toml(&content)?;
        Ok(table)
    }

    pub fn extend_from_toml(&mut self, content: &str) -> Result<()> {
        let file: FallbackFile =
            toml::from_str(content).map_err(|e| ClinicalError::ConfigValidationError {
                field: "terminology.fallback_table".to_string(),
                message: format!("Fallback table TOML parsing error: {}", e),
            })?;
        let added: usize = file.systems.values().map(HashMap::len).sum();
        for (system, codes) in file.systems {
            for (code, display) in codes {
                self.insert(&system, &code, &display);
            }
        }
        if let Some(version) = file.version {
            self.version = format!("{}+{}", self.version, version);
        }
        tracing::debug!("📚 Fallback table extended with {} entries ({})", added, self.version);
        Ok(())
    }

    fn insert(&mut self, system: &str, code: &str, display: &str) {
        self.entries
            .entry(normalize_system(system).to_string())
            .or_default()
            .insert(code.to_string(), display.to_string());
    }

    pub fn lookup(&self, code: &str, code_system: &str) -> Option<&str> {
        let codes = self.entries.get(normalize_system(code_system))?;
        codes
            .get(code)
            .or_else(|| {
                codes
                    .iter()
                    .find(|(candidate, _)| candidate.eq_ignore_ascii_case(code))
                    .map(|(_, display)| display)
            })
            .map(String::as_str)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize_system(system: &str) -> &str {
    system.trim().trim_start_matches("urn:oid:")
}
