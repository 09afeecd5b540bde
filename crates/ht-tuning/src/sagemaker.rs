//! SageMaker hyperparameter tuning client.
//!
//! Speaks the JSON 1.1 protocol over HTTPS: every call is a signed `POST /`
//! with the operation named in `X-Amz-Target`. Requests are sent once;
//! there is no retry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ht_types::{config_error, HtResult, SubmitError};
use object_store::aws::{AwsCredential, AwsCredentialProvider};
use object_store::{CredentialProvider, StaticCredentialProvider};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::job::{
    BestTrial, Compression, EarlyStopping, InputMode, ObjectiveDirection, TrialCounters,
    TuningJobHandle, TuningJobName, TuningJobStatus, TuningJobSummary, TuningStrategy,
};
use crate::search::ScalingType;
use crate::service::{CreateTuningJobRequest, TuningService};
use crate::sigv4::{self, Credentials, SigningRequest};

const SERVICE: &str = "sagemaker";
const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";
const TARGET_CREATE: &str = "SageMaker.CreateHyperParameterTuningJob";
const TARGET_DESCRIBE: &str = "SageMaker.DescribeHyperParameterTuningJob";

/// Where and how to reach the tuning API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SageMakerConfig {
    pub region: String,
    /// Overrides the regional endpoint, e.g. for a VPC endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SageMakerConfig {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

impl SageMakerConfig {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// The URL requests are posted to.
    pub fn endpoint_url(&self) -> HtResult<Url> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let suffix = if self.region.starts_with("cn-") {
                    "amazonaws.com.cn"
                } else {
                    "amazonaws.com"
                };
                format!("https://api.sagemaker.{}.{}/", self.region, suffix)
            }
        };
        Url::parse(&raw).map_err(|e| config_error!("invalid tuning endpoint '{}': {}", raw, e))
    }
}

/// Client for the managed tuning API.
///
/// Credentials come from an `object_store` provider, the same chain the S3
/// client uses, and are fetched again for every request.
#[derive(Clone)]
pub struct SageMakerClient {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: AwsCredentialProvider,
}

impl fmt::Debug for SageMakerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SageMakerClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.region)
            .finish()
    }
}

impl SageMakerClient {
    /// Client signing with fixed credentials.
    pub fn new(config: &SageMakerConfig, credentials: Credentials) -> HtResult<Self> {
        let provider: AwsCredentialProvider = Arc::new(StaticCredentialProvider::new(
            AwsCredential::from(credentials),
        ));
        Self::with_provider(config, provider)
    }

    /// Client signing with whatever `provider` currently resolves, e.g. the
    /// provider of an S3 store built from the environment.
    pub fn with_provider(
        config: &SageMakerConfig,
        credentials: AwsCredentialProvider,
    ) -> HtResult<Self> {
        let endpoint = config.endpoint_url()?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(config_error!("tuning endpoint '{}' has no host", endpoint)),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SubmitError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            host,
            region: config.region.clone(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        target: &str,
        body: &serde_json::Value,
        job_name: &str,
    ) -> HtResult<T> {
        let credential = self.credentials.get_credential().await.map_err(|e| {
            SubmitError::MissingCredentials {
                message: format!("failed to resolve AWS credentials: {}", e),
            }
        })?;
        let credentials = Credentials::from(credential.as_ref());

        let payload = serde_json::to_vec(body)?;
        let signed = sigv4::sign(
            &credentials,
            &self.region,
            SERVICE,
            &SigningRequest {
                method: "POST",
                host: &self.host,
                path: "/",
                headers: &[("content-type", CONTENT_TYPE_JSON), ("x-amz-target", target)],
                payload: &payload,
            },
            Utc::now(),
        );

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &signed.amz_date)
            .header(AUTHORIZATION, &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        debug!(operation = target, bytes = payload.len(), "sending tuning API request");
        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| SubmitError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            let err = classify_error(status.as_u16(), &text, job_name);
            warn!(
                operation = target,
                status = status.as_u16(),
                error = %err,
                "tuning API call rejected"
            );
            return Err(err.into());
        }

        serde_json::from_str(&text).map_err(|e| {
            SubmitError::Remote {
                code: "InvalidResponse".to_string(),
                message: format!("failed to parse {} response: {}", target, e),
            }
            .into()
        })
    }
}

#[async_trait]
impl TuningService for SageMakerClient {
    fn name(&self) -> &str {
        "sagemaker"
    }

    async fn create_tuning_job(
        &self,
        request: &CreateTuningJobRequest,
    ) -> HtResult<TuningJobHandle> {
        request.validate()?;
        let body = create_request_body(request)?;

        info!(
            "Submitting tuning job {} to {}",
            request.name,
            self.endpoint.as_str()
        );
        let response: CreateResponse = self
            .call(TARGET_CREATE, &body, request.name.as_str())
            .await?;

        info!(
            "Tuning job {} accepted: {}",
            request.name, response.hyper_parameter_tuning_job_arn
        );
        Ok(TuningJobHandle {
            name: request.name.clone(),
            arn: response.hyper_parameter_tuning_job_arn,
        })
    }

    async fn describe_tuning_job(&self, name: &TuningJobName) -> HtResult<TuningJobSummary> {
        let body = serde_json::json!({ "HyperParameterTuningJobName": name.as_str() });
        let response: DescribeResponse = self.call(TARGET_DESCRIBE, &body, name.as_str()).await?;
        Ok(response.into_summary())
    }
}

/// Map a non-2xx response onto a submission error.
///
/// The service reports the error code in `__type`, optionally namespaced
/// as `prefix#Code`.
pub fn classify_error(status: u16, body: &str, job_name: &str) -> SubmitError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .kind
        .as_deref()
        .map(|k| k.rsplit('#').next().unwrap_or(k).to_string())
        .unwrap_or_else(|| format!("HTTP {}", status));
    let message = parsed.message.unwrap_or_else(|| body.trim().to_string());

    match code.as_str() {
        "ResourceInUse" => SubmitError::NameCollision {
            name: job_name.to_string(),
        },
        "ResourceNotFound" => SubmitError::NotFound {
            name: job_name.to_string(),
        },
        "ValidationException" => SubmitError::Malformed { message },
        "ResourceLimitExceeded" => SubmitError::QuotaExceeded { message },
        c if c.starts_with("AccessDenied")
            || c.starts_with("UnrecognizedClient")
            || status == 403 =>
        {
            SubmitError::PermissionDenied { message }
        }
        _ => SubmitError::Remote { code, message },
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// The JSON body of a create call.
pub fn create_request_body(request: &CreateTuningJobRequest) -> HtResult<serde_json::Value> {
    let config = &request.config;
    let definition = &request.definition;
    let ranges = &config.ranges;

    let body = CreateBody {
        hyper_parameter_tuning_job_name: request.name.as_str(),
        hyper_parameter_tuning_job_config: WireTuningConfig {
            strategy: config.strategy,
            hyper_parameter_tuning_job_objective: WireObjective {
                kind: config.objective.direction,
                metric_name: &config.objective.metric_name,
            },
            resource_limits: WireResourceLimits {
                max_number_of_training_jobs: config.limits.max_trials,
                max_parallel_training_jobs: config.limits.max_parallel_trials,
            },
            parameter_ranges: WireParameterRanges {
                categorical_parameter_ranges: ranges
                    .categorical
                    .iter()
                    .map(|p| WireCategorical {
                        name: &p.name,
                        values: &p.values,
                    })
                    .collect(),
                continuous_parameter_ranges: ranges
                    .continuous
                    .iter()
                    .map(|p| WireNumeric {
                        name: &p.name,
                        min_value: p.min_value.to_string(),
                        max_value: p.max_value.to_string(),
                        scaling_type: p.scaling_type,
                    })
                    .collect(),
                integer_parameter_ranges: ranges
                    .integer
                    .iter()
                    .map(|p| WireNumeric {
                        name: &p.name,
                        min_value: p.min_value.to_string(),
                        max_value: p.max_value.to_string(),
                        scaling_type: p.scaling_type,
                    })
                    .collect(),
            },
            training_job_early_stopping_type: config.early_stopping,
        },
        training_job_definition: WireTrainingDefinition {
            algorithm_specification: WireAlgorithm {
                training_image: &definition.image_uri,
                training_input_mode: definition.input_mode,
            },
            role_arn: &definition.role_arn,
            input_data_config: definition
                .channels
                .iter()
                .map(|c| WireChannel {
                    channel_name: &c.name,
                    content_type: &c.content_type,
                    compression_type: c.compression,
                    data_source: WireDataSource {
                        s3_data_source: WireS3DataSource {
                            s3_data_type: "S3Prefix",
                            s3_uri: &c.s3_uri,
                            s3_data_distribution_type: "FullyReplicated",
                        },
                    },
                })
                .collect(),
            output_data_config: WireOutput {
                s3_output_path: &definition.output_path,
            },
            resource_config: WireResourceConfig {
                instance_type: &definition.resources.instance_type,
                instance_count: definition.resources.instance_count,
                volume_size_in_gb: definition.resources.volume_size_gb,
            },
            static_hyper_parameters: &definition.static_hyperparameters,
            stopping_condition: WireStoppingCondition {
                max_runtime_in_seconds: definition.max_runtime_seconds,
            },
        },
    };

    Ok(serde_json::to_value(body)?)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateBody<'a> {
    hyper_parameter_tuning_job_name: &'a str,
    hyper_parameter_tuning_job_config: WireTuningConfig<'a>,
    training_job_definition: WireTrainingDefinition<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireTuningConfig<'a> {
    strategy: TuningStrategy,
    hyper_parameter_tuning_job_objective: WireObjective<'a>,
    resource_limits: WireResourceLimits,
    parameter_ranges: WireParameterRanges<'a>,
    training_job_early_stopping_type: EarlyStopping,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireObjective<'a> {
    #[serde(rename = "Type")]
    kind: ObjectiveDirection,
    metric_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireResourceLimits {
    max_number_of_training_jobs: u32,
    max_parallel_training_jobs: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireParameterRanges<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categorical_parameter_ranges: Vec<WireCategorical<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    continuous_parameter_ranges: Vec<WireNumeric<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    integer_parameter_ranges: Vec<WireNumeric<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireCategorical<'a> {
    name: &'a str,
    values: &'a [String],
}

/// Numeric bounds travel as strings.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireNumeric<'a> {
    name: &'a str,
    min_value: String,
    max_value: String,
    scaling_type: ScalingType,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireTrainingDefinition<'a> {
    algorithm_specification: WireAlgorithm<'a>,
    role_arn: &'a str,
    input_data_config: Vec<WireChannel<'a>>,
    output_data_config: WireOutput<'a>,
    resource_config: WireResourceConfig<'a>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    static_hyper_parameters: &'a BTreeMap<String, String>,
    stopping_condition: WireStoppingCondition,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAlgorithm<'a> {
    training_image: &'a str,
    training_input_mode: InputMode,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireChannel<'a> {
    channel_name: &'a str,
    content_type: &'a str,
    compression_type: Compression,
    data_source: WireDataSource<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireDataSource<'a> {
    s3_data_source: WireS3DataSource<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireS3DataSource<'a> {
    s3_data_type: &'a str,
    s3_uri: &'a str,
    s3_data_distribution_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireOutput<'a> {
    s3_output_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireResourceConfig<'a> {
    instance_type: &'a str,
    instance_count: u32,
    #[serde(rename = "VolumeSizeInGB")]
    volume_size_in_gb: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireStoppingCondition {
    max_runtime_in_seconds: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateResponse {
    hyper_parameter_tuning_job_arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResponse {
    hyper_parameter_tuning_job_name: String,
    hyper_parameter_tuning_job_arn: String,
    hyper_parameter_tuning_job_status: TuningJobStatus,
    #[serde(default)]
    training_job_status_counters: WireCounters,
    best_training_job: Option<WireBestTrainingJob>,
    failure_reason: Option<String>,
    creation_time: Option<f64>,
    hyper_parameter_tuning_end_time: Option<f64>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireCounters {
    completed: u32,
    in_progress: u32,
    retryable_error: u32,
    non_retryable_error: u32,
    stopped: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireBestTrainingJob {
    training_job_name: String,
    final_hyper_parameter_tuning_job_objective_metric: Option<WireMetric>,
    #[serde(default)]
    tuned_hyper_parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMetric {
    metric_name: String,
    value: f64,
}

fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64)
        .single()
}

impl DescribeResponse {
    fn into_summary(self) -> TuningJobSummary {
        let counters = self.training_job_status_counters;
        TuningJobSummary {
            name: self.hyper_parameter_tuning_job_name,
            arn: self.hyper_parameter_tuning_job_arn,
            status: self.hyper_parameter_tuning_job_status,
            counters: TrialCounters {
                completed: counters.completed,
                in_progress: counters.in_progress,
                retryable_error: counters.retryable_error,
                non_retryable_error: counters.non_retryable_error,
                stopped: counters.stopped,
            },
            best_trial: self.best_training_job.map(|best| {
                let metric = best.final_hyper_parameter_tuning_job_objective_metric;
                BestTrial {
                    training_job_name: best.training_job_name,
                    metric_name: metric.as_ref().map(|m| m.metric_name.clone()),
                    objective: metric.map(|m| m.value),
                    tuned_hyperparameters: best.tuned_hyper_parameters,
                }
            }),
            failure_reason: self.failure_reason,
            created_at: self.creation_time.and_then(epoch_to_datetime),
            ended_at: self.hyper_parameter_tuning_end_time.and_then(epoch_to_datetime),
        }
    }
}
