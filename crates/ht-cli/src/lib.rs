//! Library side of the `hypertune` binary: configuration layering and the
//! launch pipeline.

pub mod config;
pub mod pipeline;

pub use config::{ConfigOverrides, PipelineConfig};
pub use pipeline::{assemble, job_name, launch, prepare, upload, LaunchReport, Prepared};
