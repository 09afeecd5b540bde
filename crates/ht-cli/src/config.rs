//! Pipeline configuration.
//!
//! Layered as: built-in defaults, then an optional JSON file, then
//! environment variables, then command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ht_data::{DatasetSource, SplitConfig, StorageLocation};
use ht_tuning::{
    ComputeResources, ParameterRanges, SageMakerConfig, TuningJobConfig, TuningObjective,
};
use ht_types::{config_error, HtResult};
use serde::{Deserialize, Serialize};

pub const ENV_BUCKET: &str = "HYPERTUNE_BUCKET";
pub const ENV_PREFIX: &str = "HYPERTUNE_PREFIX";
pub const ENV_ROLE_ARN: &str = "HYPERTUNE_ROLE_ARN";

/// Everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetSource,
    pub split: SplitConfig,
    /// Local directory the CSV partitions are written to before upload.
    pub staging_dir: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub role_arn: String,
    pub job_name_prefix: String,
    pub framework: String,
    pub framework_version: String,
    /// Skips image resolution when set.
    pub image_uri: Option<String>,
    pub tuning: TuningJobConfig,
    pub resources: ComputeResources,
    pub static_hyperparameters: BTreeMap<String, String>,
    pub max_runtime_seconds: u64,
    pub endpoint: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSource::Iris,
            split: SplitConfig::default(),
            staging_dir: PathBuf::from("staging"),
            bucket: String::new(),
            prefix: "xgboost-iris".to_string(),
            region: "us-east-1".to_string(),
            role_arn: String::new(),
            job_name_prefix: "xgb-iris".to_string(),
            framework: "xgboost".to_string(),
            framework_version: "1.7-1".to_string(),
            image_uri: None,
            tuning: default_tuning(),
            resources: ComputeResources::default(),
            static_hyperparameters: default_static_hyperparameters(),
            max_runtime_seconds: 1800,
            endpoint: None,
        }
    }
}

/// Learning rate and tree depth, minimizing multiclass validation error.
pub fn default_tuning() -> TuningJobConfig {
    let ranges = ParameterRanges::new()
        .add_float("eta", 0.1, 0.5)
        .add_int("max_depth", 2, 5);
    TuningJobConfig::new(ranges, TuningObjective::minimize("validation:merror")).with_limits(4, 2)
}

fn default_static_hyperparameters() -> BTreeMap<String, String> {
    [
        ("objective", "multi:softmax"),
        ("num_class", "3"),
        ("num_round", "100"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Values given on the command line. `None` leaves the setting alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub role_arn: Option<String>,
    pub staging_dir: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub seed: Option<u64>,
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> HtResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read config {}: {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| config_error!("invalid config {}: {}", path.display(), e))
    }

    /// Resolve the effective configuration for a run.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> HtResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.apply_overrides(overrides);
        tracing::debug!("Effective config: {:?}", config);
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(bucket) = get(ENV_BUCKET) {
            self.bucket = bucket;
        }
        if let Some(prefix) = get(ENV_PREFIX) {
            self.prefix = prefix;
        }
        if let Some(role) = get(ENV_ROLE_ARN) {
            self.role_arn = role;
        }
        if let Some(region) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
            self.region = region;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(bucket) = &overrides.bucket {
            self.bucket = bucket.clone();
        }
        if let Some(prefix) = &overrides.prefix {
            self.prefix = prefix.clone();
        }
        if let Some(region) = &overrides.region {
            self.region = region.clone();
        }
        if let Some(role) = &overrides.role_arn {
            self.role_arn = role.clone();
        }
        if let Some(dir) = &overrides.staging_dir {
            self.staging_dir = dir.clone();
        }
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        if let Some(seed) = overrides.seed {
            self.split.seed = seed;
        }
    }

    /// Upload destination; the bucket has no default.
    pub fn storage_location(&self) -> HtResult<StorageLocation> {
        if self.bucket.trim().is_empty() {
            return Err(config_error!(
                "no bucket configured: pass --bucket or set {}",
                ENV_BUCKET
            ));
        }
        Ok(StorageLocation::new(&self.bucket, &self.prefix))
    }

    pub fn require_role_arn(&self) -> HtResult<&str> {
        if self.role_arn.trim().is_empty() {
            return Err(config_error!(
                "no execution role configured: pass --role-arn or set {}",
                ENV_ROLE_ARN
            ));
        }
        Ok(&self.role_arn)
    }

    pub fn sagemaker(&self) -> SageMakerConfig {
        let config = SageMakerConfig::new(&self.region);
        match &self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_tuning::{EarlyStopping, ObjectiveDirection, TuningStrategy};
    use std::collections::HashMap;

    #[test]
    fn default_search_space_and_budget() {
        let config = PipelineConfig::default();
        let tuning = &config.tuning;

        assert_eq!(tuning.ranges.continuous.len(), 1);
        assert_eq!(tuning.ranges.continuous[0].name, "eta");
        assert_eq!(tuning.ranges.continuous[0].min_value, 0.1);
        assert_eq!(tuning.ranges.continuous[0].max_value, 0.5);
        assert_eq!(tuning.ranges.integer.len(), 1);
        assert_eq!(tuning.ranges.integer[0].name, "max_depth");
        assert_eq!(
            (tuning.ranges.integer[0].min_value, tuning.ranges.integer[0].max_value),
            (2, 5)
        );
        assert!(tuning.ranges.categorical.is_empty());

        assert_eq!(tuning.limits.max_trials, 4);
        assert_eq!(tuning.limits.max_parallel_trials, 2);
        assert!(tuning.limits.max_parallel_trials <= tuning.limits.max_trials);
        assert_eq!(tuning.objective.metric_name, "validation:merror");
        assert_eq!(tuning.objective.direction, ObjectiveDirection::Minimize);
        assert_eq!(tuning.strategy, TuningStrategy::Bayesian);
        assert_eq!(tuning.early_stopping, EarlyStopping::Off);
        tuning.validate().unwrap();

        assert_eq!(config.split, SplitConfig::default());
        assert_eq!(config.max_runtime_seconds, 1800);
        assert_eq!(config.resources.instance_type, "ml.m5.xlarge");
        assert_eq!(config.static_hyperparameters["num_class"], "3");
        assert!(!tuning
            .ranges
            .names()
            .any(|n| config.static_hyperparameters.contains_key(n)));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hypertune.json");
        std::fs::write(
            &path,
            r#"{"bucket": "ml-bucket", "split": {"held_out_ratio": 0.3, "test_fraction": 0.5, "seed": 7}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.bucket, "ml-bucket");
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.prefix, "xgboost-iris");
        assert_eq!(config.tuning, default_tuning());
    }

    #[test]
    fn bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ht_types::HtError::Config(_)));
        assert!(PipelineConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn env_then_flags() {
        let env: HashMap<&str, &str> = [
            (ENV_BUCKET, "env-bucket"),
            (ENV_ROLE_ARN, "arn:aws:iam::111122223333:role/env"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            (ENV_PREFIX, ""),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.bucket, "env-bucket");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.prefix, "xgboost-iris");

        config.apply_overrides(&ConfigOverrides {
            bucket: Some("flag-bucket".to_string()),
            seed: Some(1),
            ..Default::default()
        });
        assert_eq!(config.bucket, "flag-bucket");
        assert_eq!(config.role_arn, "arn:aws:iam::111122223333:role/env");
        assert_eq!(config.split.seed, 1);
    }

    #[test]
    fn aws_region_wins_over_default_region() {
        let mut config = PipelineConfig::default();
        config.apply_env(|name| match name {
            "AWS_REGION" => Some("ap-southeast-2".to_string()),
            "AWS_DEFAULT_REGION" => Some("eu-west-1".to_string()),
            _ => None,
        });
        assert_eq!(config.region, "ap-southeast-2");
        assert_eq!(
            config.sagemaker().endpoint_url().unwrap().as_str(),
            "https://api.sagemaker.ap-southeast-2.amazonaws.com/"
        );
    }

    #[test]
    fn bucket_and_role_are_required() {
        let mut config = PipelineConfig::default();
        assert!(config.storage_location().is_err());
        assert!(config.require_role_arn().is_err());

        config.bucket = "ml-bucket".to_string();
        config.role_arn = "arn:aws:iam::111122223333:role/tuning".to_string();
        assert_eq!(
            config.storage_location().unwrap().to_string(),
            "s3://ml-bucket/xgboost-iris"
        );
        assert!(config.require_role_arn().is_ok());
    }
}
