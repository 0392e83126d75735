//! Terminal status reporting
//!
//! On both success and failure the agent sets the instance's
//! `boot_status` label and uploads the setup log. Both are best-effort:
//! restricted VM types forbid label mutation, and a reporting failure
//! must never mask the original pipeline error or change the exit code.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::{ComputeApi, ObjectStore};
use crate::config::ProvisioningConfig;
use crate::logsink::LogSink;
use crate::{BootStatus, ProvisionError};

/// Instance label the orchestrator polls for the boot outcome
pub const BOOT_STATUS_LABEL: &str = "boot_status";

/// Terminal reporting seam, invoked exactly once per process run
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Report the terminal status and upload the log. `config` is None
    /// when the pipeline failed before the config was fetched; only
    /// local logging is possible then.
    async fn finalize(
        &self,
        config: Option<&ProvisioningConfig>,
        hostname: &str,
        status: BootStatus,
    );
}

/// Reports through the compute API and object store adapters
pub struct StatusReporter {
    compute: Arc<dyn ComputeApi>,
    store: Arc<dyn ObjectStore>,
    log: LogSink,
}

impl StatusReporter {
    pub fn new(compute: Arc<dyn ComputeApi>, store: Arc<dyn ObjectStore>, log: LogSink) -> Self {
        Self {
            compute,
            store,
            log,
        }
    }

    /// Set the boot_status label on the instance.
    pub async fn report(
        &self,
        job_name: &str,
        zone: &str,
        status: BootStatus,
    ) -> Result<(), ProvisionError> {
        self.compute
            .set_label(job_name, zone, BOOT_STATUS_LABEL, status.as_str())
            .await
    }

    /// Upload the local log file to its object storage destination.
    pub async fn upload_log(&self, destination: &str) -> Result<(), ProvisionError> {
        self.log.flush();
        self.store
            .upload(self.log.path(), destination)
            .await
            .map_err(|e| ProvisionError::Report(e.to_string()))
    }
}

#[async_trait]
impl Reporter for StatusReporter {
    async fn finalize(
        &self,
        config: Option<&ProvisioningConfig>,
        hostname: &str,
        status: BootStatus,
    ) {
        self.log.append(&format!("boot status: {status}"));

        let Some(config) = config else {
            warn!("No provisioning config available; skipping label and log upload");
            return;
        };

        match self.report(&config.job_name, &config.zone, status).await {
            Ok(()) => info!(
                "Set {}={} on instance {}",
                BOOT_STATUS_LABEL, status, config.job_name
            ),
            Err(e) => {
                warn!("Failed to set {} label: {}", BOOT_STATUS_LABEL, e);
                self.log
                    .append(&format!("failed to set boot status label: {e}"));
            }
        }

        let destination = config.log_uri(hostname);
        match self.upload_log(&destination).await {
            Ok(()) => info!("Uploaded setup log to {}", destination),
            Err(e) => warn!("Failed to upload log to {}: {}", destination, e),
        }
    }
}
