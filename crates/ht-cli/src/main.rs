use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use ht_cli::{assemble, job_name, launch, prepare, ConfigOverrides, PipelineConfig};
use ht_data::{ambient_credentials, RemoteStore};
use ht_tuning::{
    create_request_body, RecordingTuningService, SageMakerClient, TuningJobName, TuningService,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hypertune",
    version,
    about = "Split a dataset, stage it in object storage and launch a hyperparameter tuning job"
)]
struct Cli {
    /// JSON config file; missing fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct OverrideArgs {
    #[arg(long, global = true)]
    bucket: Option<String>,
    #[arg(long, global = true)]
    prefix: Option<String>,
    #[arg(long, global = true)]
    region: Option<String>,
    #[arg(long, global = true)]
    role_arn: Option<String>,
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,
    /// Tuning API endpoint override
    #[arg(long, global = true)]
    endpoint: Option<String>,
    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            bucket: args.bucket,
            prefix: args.prefix,
            region: args.region,
            role_arn: args.role_arn,
            staging_dir: args.staging_dir,
            endpoint: args.endpoint,
            seed: args.seed,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Partition the dataset and write the CSV files to the staging directory
    Split,
    /// Print the tuning request body without sending it
    Render {
        #[arg(long)]
        job_name: Option<String>,
    },
    /// Run the whole pipeline and submit the tuning job
    Launch {
        #[arg(long)]
        job_name: Option<String>,
        /// Use in-memory storage and a recording service instead of AWS
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the state of a submitted tuning job
    Status { job_name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref(), &cli.overrides.into())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Split => {
            let prepared = prepare(&config)?;
            println!(
                "{}: {} rows -> train {}, validation {}, test {}",
                prepared.dataset.name,
                prepared.dataset.len(),
                prepared.split.train.len(),
                prepared.split.validation.len(),
                prepared.split.test.len()
            );
            for (kind, path) in &prepared.staged {
                println!("{:<10} {}", kind.as_str(), path.display());
            }
        }
        Command::Render { job_name: name } => {
            let location = config.storage_location()?;
            let name = job_name(&config, name.as_deref(), Utc::now())?;
            let request = assemble(&config, &location, name)?;
            println!("{}", serde_json::to_string_pretty(&create_request_body(&request)?)?);
        }
        Command::Launch {
            job_name: name,
            dry_run,
        } => {
            let location = config.storage_location()?;
            let name = job_name(&config, name.as_deref(), Utc::now())?;

            let (store, service): (RemoteStore, Box<dyn TuningService>) = if dry_run {
                tracing::info!("Dry run: nothing leaves this process");
                (
                    RemoteStore::memory(location),
                    Box::new(RecordingTuningService::new("000000000000", &config.region))
                        as Box<dyn TuningService>,
                )
            } else {
                let store = RemoteStore::s3(location, Some(&config.region))?;
                let credentials = store
                    .credentials()
                    .context("S3 store has no credential chain")?;
                let client = SageMakerClient::with_provider(&config.sagemaker(), credentials)
                    .context("failed to set up the tuning API client")?;
                (store, Box::new(client) as Box<dyn TuningService>)
            };

            let report = launch(&config, &store, service.as_ref(), name)
                .await
                .context("launch aborted")?;

            for receipt in &report.uploads {
                println!("uploaded {} ({} bytes)", receipt.uri, receipt.size);
            }
            println!("job  {}", report.handle.name);
            println!("arn  {}", report.handle.arn);
        }
        Command::Status { job_name: name } => {
            let name = TuningJobName::parse(&name)?;
            let credentials = ambient_credentials(&config.region)?;
            let client = SageMakerClient::with_provider(&config.sagemaker(), credentials)?;
            let summary = client.describe_tuning_job(&name).await?;

            println!("{} {:?}", summary.name, summary.status);
            let c = summary.counters;
            println!(
                "trials: {} completed, {} in progress, {} failed, {} stopped",
                c.completed,
                c.in_progress,
                c.retryable_error + c.non_retryable_error,
                c.stopped
            );
            if let Some(best) = &summary.best_trial {
                let metric = best.metric_name.as_deref().unwrap_or("objective");
                match best.objective {
                    Some(value) => {
                        println!("best: {} {}={}", best.training_job_name, metric, value)
                    }
                    None => println!("best: {}", best.training_job_name),
                }
                for (param, value) in &best.tuned_hyperparameters {
                    println!("  {} = {}", param, value);
                }
            }
            if let Some(reason) = &summary.failure_reason {
                println!("failure: {}", reason);
            }
        }
    }

    Ok(())
}
