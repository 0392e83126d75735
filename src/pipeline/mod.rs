//! Boot pipeline orchestration
//!
//! The pipeline is a fixed linear sequence: fetch metadata, build the
//! config, install the bundle, report status. Any fatal error jumps
//! straight to reporting with a failed status; the terminal report runs
//! exactly once on every exit path, including deadline cancellation.

pub mod stage;
pub mod waitgate;

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::adapters::{ObjectStore, Platform};
use crate::bundle::BundleInstaller;
use crate::config::{self, ProvisioningConfig};
use crate::logsink::LogSink;
use crate::metadata::{self, MetadataSource};
use crate::report::Reporter;
use crate::state::BootPaths;
use crate::{BootStatus, ProvisionError};

/// Pipeline phases, entered in order. Failures skip ahead to Reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    MetadataFetched,
    BundleInstalling,
    /// Container kinds only: runtime authenticated against the registry
    RegistryConfigured,
    Reporting,
    Terminal,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::MetadataFetched => write!(f, "metadata-fetched"),
            Phase::BundleInstalling => write!(f, "bundle-installing"),
            Phase::RegistryConfigured => write!(f, "registry-configured"),
            Phase::Reporting => write!(f, "reporting"),
            Phase::Terminal => write!(f, "terminal"),
        }
    }
}

/// Timing knobs for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Interval between wait-gate polls
    pub poll_interval: Duration,
    /// Deadline for each individual wait gate
    pub gate_deadline: Duration,
    /// Total pipeline deadline; cancellation proceeds to failure reporting
    pub deadline: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            poll_interval: waitgate::DEFAULT_POLL_INTERVAL,
            gate_deadline: Duration::from_secs(300),
            deadline: Duration::from_secs(1800),
        }
    }
}

/// Drives the boot pipeline from metadata fetch to terminal report
pub struct Orchestrator {
    metadata: Arc<dyn MetadataSource>,
    platform: Arc<dyn Platform>,
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn Reporter>,
    paths: BootPaths,
    log: LogSink,
    opts: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn ObjectStore>,
        reporter: Arc<dyn Reporter>,
        paths: BootPaths,
        log: LogSink,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            metadata,
            platform,
            store,
            reporter,
            paths,
            log,
            opts,
        }
    }

    /// Run the pipeline to its terminal status.
    ///
    /// The provisioning flow runs under the total deadline; the terminal
    /// report and result summary always execute afterwards, whatever
    /// happened inside.
    pub async fn run(&self) -> BootStatus {
        let fetched_config: OnceLock<ProvisioningConfig> = OnceLock::new();

        let result = match tokio::time::timeout(self.opts.deadline, self.provision(&fetched_config))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let seconds = self.opts.deadline.as_secs();
                self.log
                    .append(&format!("pipeline deadline exceeded after {seconds}s"));
                Err(ProvisionError::DeadlineExceeded(seconds))
            }
        };

        let status = match &result {
            Ok(()) => BootStatus::Done,
            Err(e) => {
                error!("Provisioning failed: {}", e);
                self.log.append(&format!("error: {e}"));
                BootStatus::Failed
            }
        };

        self.enter(Phase::Reporting);
        let hostname = metadata::resolve_hostname(self.metadata.as_ref()).await;
        self.reporter
            .finalize(fetched_config.get(), &hostname, status)
            .await;
        self.write_result(status, result.err()).await;

        self.enter(Phase::Terminal);
        info!("Boot pipeline finished: {}", status);
        status
    }

    async fn provision(
        &self,
        fetched_config: &OnceLock<ProvisioningConfig>,
    ) -> Result<(), ProvisionError> {
        self.enter(Phase::Init);
        self.log.append("vm-boot-agent starting");

        let attrs =
            metadata::fetch_required(self.metadata.as_ref(), &config::REQUIRED_ATTRIBUTES).await?;
        let config = ProvisioningConfig::from_attributes(&attrs)?;
        self.enter(Phase::MetadataFetched);
        self.log.append(&format!(
            "config: job_name={} zone={} bucket={} bundler={}",
            config.job_name, config.zone, config.bucket, config.bundle_kind
        ));
        let _ = fetched_config.set(config.clone());

        self.enter(Phase::BundleInstalling);
        let installer = BundleInstaller::new(
            config.clone(),
            self.paths.clone(),
            self.platform.clone(),
            self.store.clone(),
            self.log.clone(),
            self.opts.clone(),
        );
        installer.install().await?;
        if config.bundle_kind.is_container() {
            self.enter(Phase::RegistryConfigured);
        }

        self.log.append("provisioning finished");
        Ok(())
    }

    fn enter(&self, phase: Phase) {
        info!("Entering phase: {}", phase);
        self.log.append(&format!("phase: {phase}"));
    }

    /// Best-effort machine-readable summary for post-mortem tooling.
    async fn write_result(&self, status: BootStatus, error: Option<ProvisionError>) {
        let summary = serde_json::json!({
            "status": status.as_str(),
            "error": error.map(|e| e.to_string()),
        });

        let path = self.paths.result_file();
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                debug!("Could not create result directory: {}", e);
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, summary.to_string()).await {
            warn!("Could not write result file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Init.to_string(), "init");
        assert_eq!(Phase::MetadataFetched.to_string(), "metadata-fetched");
        assert_eq!(Phase::BundleInstalling.to_string(), "bundle-installing");
        assert_eq!(Phase::RegistryConfigured.to_string(), "registry-configured");
        assert_eq!(Phase::Reporting.to_string(), "reporting");
        assert_eq!(Phase::Terminal.to_string(), "terminal");
    }

    #[test]
    fn test_default_options() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.poll_interval, Duration::from_secs(1));
        assert!(opts.deadline > opts.gate_deadline);
    }
}
