// Domain layer: clinical models, field schemas and ports (interfaces) shared
// by extractors, terminology resolution and the pipeline engine.

pub mod model;
pub mod ports;
pub mod schema;
