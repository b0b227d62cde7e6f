//! PNML frontend of the pre-processor: importer for the PNML interchange
//! format, interpreter for the vendor annotation grammars, and the two
//! translation algorithms (generic GSPN and HadoopCap colored-net expansion).

pub mod annotation;
pub mod builder;
pub mod colorset;
pub mod expander;
pub mod parser;

pub use annotation::AnnotationParam;
pub use builder::ModelBuilder;
pub use colorset::{Color, ColorSet};
pub use expander::HadoopCapBuilder;
pub use parser::PnmlDocument;
