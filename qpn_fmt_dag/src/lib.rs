//! DAG frontend of the pre-processor: importer for JSON pipeline
//! descriptions and the open fork/queue/scaler/join instantiation.

pub mod builder;
pub mod parser;

pub use builder::PipelineBuilder;
pub use parser::DagDocument;
