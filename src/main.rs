//! vm-boot-agent - first-boot provisioning agent for cloud VMs
//!
//! Reads the install configuration from instance metadata, installs the
//! job's bundle, and reports `boot_status` back to the orchestrator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use vm_boot_agent::adapters::{GcloudCompute, GsutilStore, HostPlatform, Platform};
use vm_boot_agent::config::{ProvisioningConfig, REQUIRED_ATTRIBUTES};
use vm_boot_agent::metadata::gce::GCE_METADATA_URL;
use vm_boot_agent::metadata::{GceMetadata, MetadataSource, fetch_required};
use vm_boot_agent::pipeline::{Orchestrator, PipelineOptions};
use vm_boot_agent::report::StatusReporter;
use vm_boot_agent::state::paths::{LOG_PATH, WORK_DIR};
use vm_boot_agent::state::BootPaths;
use vm_boot_agent::{BootStatus, LogSink};

#[derive(Parser)]
#[command(name = "vm-boot-agent")]
#[command(author, version, about = "First-boot provisioning agent for cloud VMs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Metadata service base URL
    #[arg(long, env = "VM_BOOT_METADATA_URL", default_value = GCE_METADATA_URL)]
    metadata_url: String,

    /// Local setup log file
    #[arg(long, default_value = LOG_PATH)]
    log_file: PathBuf,

    /// Working directory for bundle download and extraction
    #[arg(long, default_value = WORK_DIR)]
    work_dir: PathBuf,

    /// Seconds between wait-gate polls
    #[arg(long, default_value_t = 1)]
    poll_interval: u64,

    /// Per-gate deadline in seconds
    #[arg(long, default_value_t = 300)]
    gate_deadline: u64,

    /// Total pipeline deadline in seconds
    #[arg(long, default_value_t = 1800)]
    deadline: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full boot pipeline (the default)
    Run,
    /// Print a single instance attribute
    Query {
        /// Attribute key (e.g., job_name, bundler_type)
        key: String,
    },
    /// Fetch, validate, and print the provisioning config as JSON
    PrintConfig,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Query { key }) => {
            let metadata = GceMetadata::with_base_url(&cli.metadata_url);
            match metadata.get_attribute(key).await {
                Ok(Some(value)) => {
                    println!("{value}");
                    ExitCode::SUCCESS
                }
                Ok(None) => {
                    eprintln!("attribute '{key}' is not set");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!("Metadata query failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Some(Commands::PrintConfig) => match print_config(&cli).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
        Some(Commands::Run) | None => run_pipeline(&cli).await,
    }
}

async fn print_config(cli: &Cli) -> anyhow::Result<()> {
    use anyhow::Context;

    let metadata = GceMetadata::with_base_url(&cli.metadata_url);
    let attrs = fetch_required(&metadata, &REQUIRED_ATTRIBUTES)
        .await
        .context("fetching required metadata")?;
    let config = ProvisioningConfig::from_attributes(&attrs)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn run_pipeline(cli: &Cli) -> ExitCode {
    info!("Starting boot pipeline");

    let log = match LogSink::open(&cli.log_file) {
        Ok(log) => log,
        Err(e) => {
            error!("Cannot open log file {}: {}", cli.log_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let platform: Arc<dyn Platform> = Arc::new(HostPlatform);
    let store = Arc::new(GsutilStore::new(platform.clone()));
    let compute = Arc::new(GcloudCompute::new(platform.clone()));
    let metadata = Arc::new(GceMetadata::with_base_url(&cli.metadata_url));
    let reporter = Arc::new(StatusReporter::new(compute, store.clone(), log.clone()));

    let orchestrator = Orchestrator::new(
        metadata,
        platform,
        store,
        reporter,
        BootPaths::with_dirs(&cli.work_dir, &cli.log_file),
        log,
        PipelineOptions {
            poll_interval: Duration::from_secs(cli.poll_interval),
            gate_deadline: Duration::from_secs(cli.gate_deadline),
            deadline: Duration::from_secs(cli.deadline),
        },
    );

    match orchestrator.run().await {
        BootStatus::Done => ExitCode::SUCCESS,
        BootStatus::Pending | BootStatus::Failed => ExitCode::FAILURE,
    }
}
