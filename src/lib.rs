//! Pre-processor turning Petri-net and template descriptions into
//! queueing-Petri-net simulation archives. Accepted input dialects:
//!
//! - PNML documents with DICE `toolspecific` annotations, translated
//!   either as generic GSPNs or by expansion over the HadoopCap
//!   colored-net template;
//! - XML MapReduce-template declarations, optionally wrapping a base
//!   model;
//! - JSON DAG pipeline descriptions.
//!
//! The common model representation and the archive reader/writer live
//! in [`qpn_core`]; each dialect has its own frontend crate.

pub mod cli;

pub use cli::Cli;
