//! Fetch probe: seeds a collection, bursts concurrent full-collection reads
//! against it and captures a CPU profile of the client while it does.

pub mod config;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod load;
pub mod profiler;
pub mod report;
pub mod store;
pub mod telemetry;

pub use error::ProbeError;
pub use harness::{Harness, RunReport};
