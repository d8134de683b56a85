pub mod dates;
pub mod enrich;
pub mod export;
pub mod normalize;
pub mod pipeline;
pub mod registry;

pub use enrich::CrossReferenceEnricher;
pub use export::ResultExporter;
pub use normalize::FieldNormalizer;
pub use pipeline::{ClinicalRecord, PipelineManager};
pub use registry::Registry;

pub use crate::domain::ports::{SectionExtractor, SectionStore, Storage, TerminologyService};
pub use crate::utils::error::Result;
