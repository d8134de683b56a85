pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod document;
pub mod domain;
pub mod extract;
pub mod terminology;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{FhirTerminologyClient, FileSectionStore, InMemorySectionStore, LocalStorage};
pub use config::PipelineSettings;
pub use core::{ClinicalRecord, PipelineManager, Registry, ResultExporter};
pub use document::ClinicalDocument;
pub use domain::model::{DomainResult, NormalizedClinicalItem, RawClinicalItem};
pub use terminology::TerminologyResolver;
pub use utils::error::{ClinicalError, Result};
