pub mod pipeline;
pub mod cli;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod export;
pub mod observability;
pub mod metrics_server;

pub use pipeline::{Pipeline, PipelineError};
