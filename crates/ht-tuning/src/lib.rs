//! # ht-tuning
//!
//! Remote hyperparameter tuning for hypertune.
//!
//! Provides search space definitions, the tuning-job and training-job
//! descriptions, built-in image resolution, and a [`TuningService`] with a
//! signed SageMaker client and an in-process recording implementation.

mod image;
mod job;
mod sagemaker;
mod search;
mod service;
mod sigv4;

pub use image::resolve_image_uri;
pub use job::{
    BestTrial, Channel, Compression, ComputeResources, EarlyStopping, InputMode,
    ObjectiveDirection, ResourceLimits, TrainingJobDefinition, TrialCounters, TuningJobConfig,
    TuningJobHandle, TuningJobName, TuningJobStatus, TuningJobSummary, TuningObjective,
    TuningStrategy,
};
pub use sagemaker::{classify_error, create_request_body, SageMakerClient, SageMakerConfig};
pub use search::{CategoricalRange, ContinuousRange, IntegerRange, ParameterRanges, ScalingType};
pub use service::{CreateTuningJobRequest, RecordingTuningService, TuningService};
pub use sigv4::Credentials;
