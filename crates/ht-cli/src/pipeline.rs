//! The launch pipeline: partition, stage, upload, assemble, submit.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ht_data::{export_to_dir, partition, RemoteStore, StorageLocation, UploadReceipt};
use ht_tuning::{
    resolve_image_uri, Channel, CreateTuningJobRequest, TrainingJobDefinition, TuningJobHandle,
    TuningJobName, TuningService,
};
use ht_types::{Dataset, HtError, HtResult, PartitionKind, Split};
use tracing::{info, warn};

use crate::config::PipelineConfig;

/// Partitions handed to the training job as channels.
pub const CHANNEL_PARTITIONS: [PartitionKind; 2] =
    [PartitionKind::Train, PartitionKind::Validation];

/// Dataset, its split, and the local staging files.
#[derive(Debug)]
pub struct Prepared {
    pub dataset: Dataset,
    pub split: Split,
    pub staged: Vec<(PartitionKind, PathBuf)>,
}

/// Outcome of a full launch.
#[derive(Debug)]
pub struct LaunchReport {
    pub split_sizes: [usize; 3],
    pub uploads: Vec<UploadReceipt>,
    pub handle: TuningJobHandle,
}

/// Load and partition the dataset, then write the channel partitions to the
/// staging directory.
pub fn prepare(config: &PipelineConfig) -> HtResult<Prepared> {
    let dataset = config.dataset.load()?;
    let split = partition(&dataset, &config.split)?;

    let mut staged = Vec::with_capacity(CHANNEL_PARTITIONS.len());
    for kind in CHANNEL_PARTITIONS {
        let path = export_to_dir(split.get(kind), &config.staging_dir)?;
        staged.push((kind, path));
    }

    Ok(Prepared {
        dataset,
        split,
        staged,
    })
}

/// Upload the staged files and confirm each one before returning.
pub async fn upload(
    store: &RemoteStore,
    staged: &[(PartitionKind, PathBuf)],
) -> HtResult<Vec<UploadReceipt>> {
    let mut receipts = Vec::with_capacity(staged.len());
    for (kind, path) in staged {
        let bytes = tokio::fs::read(path).await?;
        let receipt = store.upload(*kind, &kind.file_name(), bytes).await?;
        store.confirm(&receipt).await?;
        receipts.push(receipt);
    }
    info!(
        "Uploaded and confirmed {} partitions under {}",
        receipts.len(),
        store.location()
    );
    Ok(receipts)
}

/// Build the tuning request for data staged at `location`.
pub fn assemble(
    config: &PipelineConfig,
    location: &StorageLocation,
    name: TuningJobName,
) -> HtResult<CreateTuningJobRequest> {
    let image = match &config.image_uri {
        Some(uri) => uri.clone(),
        None => resolve_image_uri(&config.framework, &config.framework_version, &config.region)?,
    };

    let mut definition =
        TrainingJobDefinition::new(&image, config.require_role_arn()?, &location.output_uri())
            .with_resources(config.resources.clone())
            .with_max_runtime(config.max_runtime_seconds);
    for kind in CHANNEL_PARTITIONS {
        let channel = Channel::csv(kind.as_str(), &location.channel_uri(kind));
        definition = definition.with_channel(channel);
    }
    for (key, value) in &config.static_hyperparameters {
        definition = definition.with_hyperparameter(key, value);
    }

    let request = CreateTuningJobRequest::new(name, config.tuning.clone(), definition);
    request.validate()?;
    Ok(request)
}

/// Name for the next job: the explicit one, or `{prefix}-{timestamp}`.
pub fn job_name(
    config: &PipelineConfig,
    explicit: Option<&str>,
    now: DateTime<Utc>,
) -> HtResult<TuningJobName> {
    match explicit {
        Some(name) => TuningJobName::parse(name),
        None => TuningJobName::generate(&config.job_name_prefix, now),
    }
}

/// Run every step against the given store and service.
///
/// The request is assembled and checked before anything is uploaded, and
/// submission comes last. Stops at the first failure. Objects uploaded
/// before a failed submission are left in place.
pub async fn launch(
    config: &PipelineConfig,
    store: &RemoteStore,
    service: &dyn TuningService,
    name: TuningJobName,
) -> HtResult<LaunchReport> {
    let prepared = prepare(config)?;
    let request = assemble(config, store.location(), name)?;
    let uploads = upload(store, &prepared.staged).await?;

    info!("Submitting {} via {}", request.name, service.name());
    let handle = match service.create_tuning_job(&request).await {
        Ok(handle) => handle,
        Err(HtError::Submit(err)) => {
            if err.is_rejection() {
                warn!(
                    "{} rejected {}; uploads under {} left in place",
                    service.name(),
                    request.name,
                    store.location()
                );
            } else {
                warn!(
                    "{} was not delivered to {}; uploads under {} left in place",
                    request.name,
                    service.name(),
                    store.location()
                );
            }
            return Err(err.into());
        }
        Err(err) => return Err(err),
    };

    Ok(LaunchReport {
        split_sizes: [
            prepared.split.train.len(),
            prepared.split.validation.len(),
            prepared.split.test.len(),
        ],
        uploads,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ht_data::read_records;
    use ht_tuning::{RecordingTuningService, TuningJobStatus};
    use ht_types::SubmitError;

    fn test_config(staging: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            staging_dir: staging.to_path_buf(),
            bucket: "ml-bucket".to_string(),
            role_arn: "arn:aws:iam::111122223333:role/tuning".to_string(),
            ..Default::default()
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    #[test]
    fn prepare_stages_train_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let prepared = prepare(&test_config(dir.path())).unwrap();

        assert_eq!(prepared.split.train.len(), 120);
        assert_eq!(prepared.split.validation.len(), 15);
        assert_eq!(prepared.split.test.len(), 15);
        assert!(prepared.split.is_disjoint());

        let files: Vec<_> = prepared.staged.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(
            files,
            vec![dir.path().join("train.csv"), dir.path().join("validation.csv")]
        );
        assert!(!dir.path().join("test.csv").exists());

        let records = read_records(&std::fs::read(&files[1]).unwrap()).unwrap();
        assert_eq!(records.len(), 15);
        assert!(records.iter().all(|r| r.len() == 5));
        assert!(records.iter().all(|r| [0.0, 1.0, 2.0].contains(&r[0])));
    }

    #[test]
    fn assemble_points_channels_at_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let location = config.storage_location().unwrap();
        let name = job_name(&config, None, fixed_now()).unwrap();
        assert_eq!(name.as_str(), "xgb-iris-261016-093000");

        let request = assemble(&config, &location, name).unwrap();
        let definition = &request.definition;
        assert_eq!(
            definition.image_uri,
            "683313688378.dkr.ecr.us-east-1.amazonaws.com/sagemaker-xgboost:1.7-1"
        );
        let channels: Vec<(&str, &str)> = definition
            .channels
            .iter()
            .map(|c| (c.name.as_str(), c.s3_uri.as_str()))
            .collect();
        assert_eq!(
            channels,
            vec![
                ("train", "s3://ml-bucket/xgboost-iris/train/"),
                ("validation", "s3://ml-bucket/xgboost-iris/validation/"),
            ]
        );
        assert_eq!(definition.output_path, "s3://ml-bucket/xgboost-iris/output");
        assert_eq!(definition.static_hyperparameters["objective"], "multi:softmax");
        assert_eq!(definition.max_runtime_seconds, 1800);
    }

    #[test]
    fn assemble_requires_role() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.role_arn.clear();
        let location = config.storage_location().unwrap();
        let name = TuningJobName::parse("xgb-iris-1").unwrap();

        assert!(matches!(
            assemble(&config, &location, name),
            Err(HtError::Config(_))
        ));
    }

    #[tokio::test]
    async fn launch_end_to_end_with_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = RemoteStore::memory(config.storage_location().unwrap());
        let service = RecordingTuningService::default();
        let name = job_name(&config, Some("xgb-iris-e2e"), fixed_now()).unwrap();

        let report = launch(&config, &store, &service, name.clone()).await.unwrap();

        assert_eq!(report.split_sizes, [120, 15, 15]);
        let keys: Vec<&str> = report.uploads.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["xgboost-iris/train/train.csv", "xgboost-iris/validation/validation.csv"]
        );
        assert_eq!(report.handle.name, name);

        let uploaded = store.download(PartitionKind::Train, "train.csv").await.unwrap();
        assert_eq!(read_records(&uploaded).unwrap().len(), 120);

        let submitted = service.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].config.limits.max_trials, 4);

        let summary = service.describe_tuning_job(&name).await.unwrap();
        assert_eq!(summary.status, TuningJobStatus::InProgress);
    }

    #[tokio::test]
    async fn relaunch_with_same_name_keeps_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = RemoteStore::memory(config.storage_location().unwrap());
        let service = RecordingTuningService::default();
        let name = TuningJobName::parse("xgb-iris-dup").unwrap();

        launch(&config, &store, &service, name.clone()).await.unwrap();
        let err = launch(&config, &store, &service, name).await.unwrap_err();

        assert!(matches!(err, HtError::Submit(SubmitError::NameCollision { .. })));
        assert!(store.download(PartitionKind::Validation, "validation.csv").await.is_ok());
    }

    #[tokio::test]
    async fn missing_role_fails_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.role_arn.clear();
        let store = RemoteStore::memory(config.storage_location().unwrap());
        let service = RecordingTuningService::default();
        let name = TuningJobName::parse("xgb-iris-norole").unwrap();

        let err = launch(&config, &store, &service, name).await.unwrap_err();

        assert!(matches!(err, HtError::Config(_)));
        assert!(store.download(PartitionKind::Train, "train.csv").await.is_err());
        assert!(service.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn upload_stops_on_missing_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = RemoteStore::memory(config.storage_location().unwrap());

        let staged = vec![(PartitionKind::Train, dir.path().join("nope.csv"))];
        let err = upload(&store, &staged).await.unwrap_err();
        assert!(matches!(err, HtError::Io(_)));
    }

    #[test]
    fn seed_changes_membership_not_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let first = prepare(&config).unwrap();
        config.split.seed = 7;
        let second = prepare(&config).unwrap();

        assert_eq!(first.split.train.len(), second.split.train.len());
        assert_ne!(first.split.validation.ids(), second.split.validation.ids());
    }
}
