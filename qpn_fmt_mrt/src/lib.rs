//! MapReduce-template frontend of the pre-processor: importer for XML
//! template declarations (optionally wrapping a base model in the
//! archive schema) and the fork/queue/semaphore/join instantiation.

pub mod builder;
pub mod parser;

pub use builder::TemplateBuilder;
pub use parser::{MrtDocument, MrtTemplate};
