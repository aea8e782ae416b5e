// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod ingest;
pub mod metrics;

pub use crate::config::PipelineConfig;
pub use crate::ingest::types::{CanonicalJob, ClassificationDecision, SourceDescriptor};
pub use crate::ingest::{Pipeline, RunReport};
