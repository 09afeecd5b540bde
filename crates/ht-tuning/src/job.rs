//! Tuning-job configuration, training-job definition and remote job status.

use chrono::{DateTime, Utc};
use ht_types::{validation_error, HtResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::search::ParameterRanges;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    #[default]
    Minimize,
}

/// The metric the tuning strategy optimizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningObjective {
    /// Metric emitted by the algorithm, e.g. "validation:merror".
    pub metric_name: String,
    pub direction: ObjectiveDirection,
}

impl TuningObjective {
    pub fn minimize(metric: &str) -> Self {
        Self {
            metric_name: metric.to_string(),
            direction: ObjectiveDirection::Minimize,
        }
    }

    pub fn maximize(metric: &str) -> Self {
        Self {
            metric_name: metric.to_string(),
            direction: ObjectiveDirection::Maximize,
        }
    }
}

/// Trial budget for one tuning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Total number of training jobs the tuner may launch.
    pub max_trials: u32,
    /// How many of them may run at the same time.
    pub max_parallel_trials: u32,
}

impl ResourceLimits {
    pub fn new(max_trials: u32, max_parallel_trials: u32) -> Self {
        Self {
            max_trials,
            max_parallel_trials,
        }
    }

    pub fn validate(&self) -> HtResult<()> {
        if self.max_trials == 0 || self.max_parallel_trials == 0 {
            return Err(validation_error!("resource limits must be at least 1"));
        }
        if self.max_parallel_trials > self.max_trials {
            return Err(validation_error!(
                "max parallel trials ({}) exceeds max trials ({})",
                self.max_parallel_trials,
                self.max_trials
            ));
        }
        Ok(())
    }
}

/// Search strategy run by the remote tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TuningStrategy {
    #[default]
    Bayesian,
    Random,
    Hyperband,
    Grid,
}

/// Whether the tuner may stop unpromising trials early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EarlyStopping {
    #[default]
    Off,
    Auto,
}

/// Search space, strategy, objective and limits for one tuning job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningJobConfig {
    pub strategy: TuningStrategy,
    pub objective: TuningObjective,
    pub limits: ResourceLimits,
    pub ranges: ParameterRanges,
    #[serde(default)]
    pub early_stopping: EarlyStopping,
}

impl TuningJobConfig {
    pub fn new(ranges: ParameterRanges, objective: TuningObjective) -> Self {
        Self {
            strategy: TuningStrategy::Bayesian,
            objective,
            limits: ResourceLimits::new(4, 2),
            ranges,
            early_stopping: EarlyStopping::Off,
        }
    }

    pub fn with_strategy(mut self, strategy: TuningStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_limits(mut self, max_trials: u32, max_parallel_trials: u32) -> Self {
        self.limits = ResourceLimits::new(max_trials, max_parallel_trials);
        self
    }

    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    pub fn validate(&self) -> HtResult<()> {
        if self.objective.metric_name.trim().is_empty() {
            return Err(validation_error!("objective metric name must not be empty"));
        }
        self.limits.validate()?;
        self.ranges.validate()?;

        if self.strategy == TuningStrategy::Grid && !self.ranges.continuous.is_empty() {
            return Err(validation_error!(
                "grid strategy only supports integer and categorical ranges"
            ));
        }
        if self.strategy == TuningStrategy::Hyperband
            && self.early_stopping == EarlyStopping::Auto
        {
            return Err(validation_error!(
                "hyperband has its own early stopping; set early stopping to Off"
            ));
        }
        Ok(())
    }
}

/// How a channel's objects are compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

/// One named input data source of a training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub compression: Compression,
    /// Object storage prefix holding the channel's files.
    pub s3_uri: String,
}

impl Channel {
    pub fn csv(name: &str, s3_uri: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: "text/csv".to_string(),
            compression: Compression::None,
            s3_uri: s3_uri.to_string(),
        }
    }
}

/// Compute shape for each trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResources {
    pub instance_type: String,
    pub instance_count: u32,
    pub volume_size_gb: u32,
}

impl Default for ComputeResources {
    fn default() -> Self {
        Self {
            instance_type: "ml.m5.xlarge".to_string(),
            instance_count: 1,
            volume_size_gb: 5,
        }
    }
}

/// How training data is delivered to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputMode {
    #[default]
    File,
    Pipe,
    FastFile,
}

/// Everything the service needs to launch one trial, minus the tuned values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobDefinition {
    pub image_uri: String,
    #[serde(default)]
    pub input_mode: InputMode,
    pub role_arn: String,
    pub channels: Vec<Channel>,
    pub output_path: String,
    pub resources: ComputeResources,
    /// Hyperparameters held fixed across trials.
    pub static_hyperparameters: BTreeMap<String, String>,
    pub max_runtime_seconds: u64,
}

impl TrainingJobDefinition {
    pub fn new(image_uri: &str, role_arn: &str, output_path: &str) -> Self {
        Self {
            image_uri: image_uri.to_string(),
            input_mode: InputMode::File,
            role_arn: role_arn.to_string(),
            channels: Vec::new(),
            output_path: output_path.to_string(),
            resources: ComputeResources::default(),
            static_hyperparameters: BTreeMap::new(),
            max_runtime_seconds: 1800,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_resources(mut self, resources: ComputeResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_hyperparameter(mut self, name: &str, value: impl ToString) -> Self {
        self.static_hyperparameters
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_max_runtime(mut self, seconds: u64) -> Self {
        self.max_runtime_seconds = seconds;
        self
    }

    /// Check the definition on its own and against the tuned parameter set.
    pub fn validate(&self, ranges: &ParameterRanges) -> HtResult<()> {
        if self.image_uri.is_empty() {
            return Err(validation_error!("training image must be set"));
        }
        if !self.role_arn.starts_with("arn:") {
            return Err(validation_error!(
                "execution role '{}' is not an ARN",
                self.role_arn
            ));
        }
        if self.channels.is_empty() {
            return Err(validation_error!("training job needs at least one input channel"));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(validation_error!("duplicate channel '{}'", channel.name));
            }
            if !channel.s3_uri.starts_with("s3://") {
                return Err(validation_error!(
                    "channel '{}' source '{}' is not an s3:// URI",
                    channel.name,
                    channel.s3_uri
                ));
            }
        }

        if !self.output_path.starts_with("s3://") {
            return Err(validation_error!(
                "output path '{}' is not an s3:// URI",
                self.output_path
            ));
        }
        if self.resources.instance_count == 0 || self.resources.volume_size_gb == 0 {
            return Err(validation_error!("instance count and volume size must be at least 1"));
        }
        if self.max_runtime_seconds == 0 {
            return Err(validation_error!("max runtime must be at least 1 second"));
        }

        if let Some(name) = ranges
            .names()
            .find(|n| self.static_hyperparameters.contains_key(*n))
        {
            return Err(validation_error!(
                "hyperparameter '{}' is both tuned and static",
                name
            ));
        }

        Ok(())
    }
}

/// Unique tuning job name: 1 to 32 ASCII alphanumerics or hyphens,
/// starting and ending with an alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TuningJobName(String);

impl TuningJobName {
    pub const MAX_LEN: usize = 32;

    pub fn parse(name: &str) -> HtResult<Self> {
        let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        let bookended = name
            .chars()
            .next()
            .zip(name.chars().last())
            .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
            .unwrap_or(false);

        if name.len() > Self::MAX_LEN || !valid_chars || !bookended {
            return Err(validation_error!(
                "invalid tuning job name '{}': use 1-{} letters, digits or hyphens, \
                 starting and ending with a letter or digit",
                name,
                Self::MAX_LEN
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// `{prefix}-{yymmdd}-{hhmmss}`, with the prefix trimmed to fit.
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> HtResult<Self> {
        let stamp = now.format("%y%m%d-%H%M%S").to_string();
        let room = Self::MAX_LEN - stamp.len() - 1;
        let prefix: String = prefix.chars().take(room).collect();
        Self::parse(&format!("{}-{}", prefix.trim_end_matches('-'), stamp))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TuningJobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TuningJobName {
    type Error = ht_types::HtError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TuningJobName> for String {
    fn from(name: TuningJobName) -> Self {
        name.0
    }
}

/// Handle returned by the service when it accepts a tuning job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningJobHandle {
    pub name: TuningJobName,
    pub arn: String,
}

// ---------------------------------------------------------------------------
// Remote job status
// ---------------------------------------------------------------------------

/// Lifecycle state of a tuning job, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningJobStatus {
    InProgress,
    Completed,
    Failed,
    Stopping,
    Stopped,
}

impl TuningJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

/// Per-state trial counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCounters {
    pub completed: u32,
    pub in_progress: u32,
    pub retryable_error: u32,
    pub non_retryable_error: u32,
    pub stopped: u32,
}

impl TrialCounters {
    pub fn total(&self) -> u32 {
        self.completed
            + self.in_progress
            + self.retryable_error
            + self.non_retryable_error
            + self.stopped
    }
}

/// Best trial seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub training_job_name: String,
    pub metric_name: Option<String>,
    pub objective: Option<f64>,
    pub tuned_hyperparameters: BTreeMap<String, String>,
}

/// Snapshot of a tuning job's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningJobSummary {
    pub name: String,
    pub arn: String,
    pub status: TuningJobStatus,
    pub counters: TrialCounters,
    pub best_trial: Option<BestTrial>,
    pub failure_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}
