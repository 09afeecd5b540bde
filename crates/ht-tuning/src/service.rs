//! Tuning service interface.
//!
//! Implementations either submit to the managed tuning API
//! (see [`crate::sagemaker::SageMakerClient`]) or record requests locally
//! (see [`RecordingTuningService`]) for dry runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use ht_types::{HtResult, SubmitError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::job::{
    TrainingJobDefinition, TrialCounters, TuningJobConfig, TuningJobHandle, TuningJobName,
    TuningJobStatus, TuningJobSummary,
};

/// A complete "create tuning job" request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTuningJobRequest {
    pub name: TuningJobName,
    pub config: TuningJobConfig,
    pub definition: TrainingJobDefinition,
}

impl CreateTuningJobRequest {
    pub fn new(
        name: TuningJobName,
        config: TuningJobConfig,
        definition: TrainingJobDefinition,
    ) -> Self {
        Self {
            name,
            config,
            definition,
        }
    }

    /// Validate the config, the definition and how they fit together.
    pub fn validate(&self) -> HtResult<()> {
        self.config.validate()?;
        self.definition.validate(&self.config.ranges)
    }
}

/// Remote hyperparameter tuning service.
#[async_trait]
pub trait TuningService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Submit a tuning job. Returns once the service has accepted or
    /// rejected it; trials run asynchronously on the service side.
    async fn create_tuning_job(&self, request: &CreateTuningJobRequest)
        -> HtResult<TuningJobHandle>;

    /// Fetch the current state of a previously submitted job.
    async fn describe_tuning_job(&self, name: &TuningJobName) -> HtResult<TuningJobSummary>;
}

/// In-process service that accepts every valid request and remembers it.
///
/// Job names are unique, like on the real service.
#[derive(Debug)]
pub struct RecordingTuningService {
    account: String,
    region: String,
    submitted: Mutex<Vec<CreateTuningJobRequest>>,
}

impl Default for RecordingTuningService {
    fn default() -> Self {
        Self::new("000000000000", "us-east-1")
    }
}

impl RecordingTuningService {
    pub fn new(account: &str, region: &str) -> Self {
        Self {
            account: account.to_string(),
            region: region.to_string(),
            submitted: Mutex::new(Vec::new()),
        }
    }

    fn arn_for(&self, name: &TuningJobName) -> String {
        format!(
            "arn:aws:sagemaker:{}:{}:hyper-parameter-tuning-job/{}",
            self.region,
            self.account,
            name.as_str().to_lowercase()
        )
    }

    /// Requests accepted so far, in submission order.
    pub async fn submitted(&self) -> Vec<CreateTuningJobRequest> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl TuningService for RecordingTuningService {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_tuning_job(
        &self,
        request: &CreateTuningJobRequest,
    ) -> HtResult<TuningJobHandle> {
        request.validate().map_err(|e| SubmitError::Malformed {
            message: e.to_string(),
        })?;

        let mut submitted = self.submitted.lock().await;
        if submitted.iter().any(|r| r.name == request.name) {
            return Err(SubmitError::NameCollision {
                name: request.name.to_string(),
            }
            .into());
        }
        submitted.push(request.clone());

        let handle = TuningJobHandle {
            name: request.name.clone(),
            arn: self.arn_for(&request.name),
        };
        info!("Recorded tuning job {} ({})", handle.name, handle.arn);
        Ok(handle)
    }

    async fn describe_tuning_job(&self, name: &TuningJobName) -> HtResult<TuningJobSummary> {
        let submitted = self.submitted.lock().await;
        let request = submitted
            .iter()
            .find(|r| &r.name == name)
            .ok_or_else(|| SubmitError::NotFound {
                name: name.to_string(),
            })?;

        Ok(TuningJobSummary {
            name: request.name.to_string(),
            arn: self.arn_for(&request.name),
            status: TuningJobStatus::InProgress,
            counters: TrialCounters::default(),
            best_trial: None,
            failure_reason: None,
            created_at: Some(Utc::now()),
            ended_at: None,
        })
    }
}
