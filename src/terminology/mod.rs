pub mod cache;
pub mod cleanup;
pub mod code_systems;
pub mod fallback;
pub mod resolver;
pub mod text_reference;

pub use cache::{CacheKey, CacheStats, TerminologyCache, TerminologyCacheEntry};
pub use fallback::{FallbackTable, FALLBACK_TABLE_VERSION};
pub use resolver::{Resolution, ResolutionSource, TerminologyResolver};
pub use text_reference::TextReferenceResolver;
