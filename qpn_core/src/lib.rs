//! Core library of the PNML pre-processor,
//! defining the queueing-Petri-net simulation model
//! and its persistence as a simulation archive.

pub mod archive;
pub mod model;

pub use model::{
    ClassId, ClassKind, Condition, Distribution, ForkPath, JobClass, Measure, ModelError, QpnModel,
    ServerCount, Station, StationId, StationKind, TransitionMode, MODE_NAME,
};
