// Adapters layer: concrete implementations of the domain ports for external
// systems (terminology server over HTTP, file and in-memory storage).

pub mod http;
pub mod storage;

pub use http::FhirTerminologyClient;
pub use storage::{FileSectionStore, InMemorySectionStore, LocalStorage};
