//! Thin adapters around external collaborators
//!
//! Package managers, the object store CLI, and the compute API are
//! invoked through these traits so the pipeline stays testable and their
//! internals stay out of scope.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::ProvisionError;

/// Outcome of an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Access to the host: process execution and filesystem probes
#[async_trait]
pub trait Platform: Send + Sync {
    /// Run a command to completion, capturing its output.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ProvisionError>;

    /// Whether a binary is resolvable on PATH.
    async fn binary_on_path(&self, name: &str) -> bool;

    /// Whether a path exists on the local filesystem.
    async fn path_exists(&self, path: &Path) -> bool;
}

/// Object storage operations (gs:// URIs)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, uri: &str, dest: &Path) -> Result<(), ProvisionError>;
    async fn upload(&self, src: &Path, uri: &str) -> Result<(), ProvisionError>;
}

/// Compute API operations against the VM resource
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn set_label(
        &self,
        instance: &str,
        zone: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProvisionError>;
}

/// Real host: tokio process execution
pub struct HostPlatform;

#[async_trait]
impl Platform for HostPlatform {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<CommandOutput, ProvisionError> {
        debug!("Running command: {} {:?}", program, args);

        let mut command = tokio::process::Command::new(program);
        command.args(args);
        for (key, value) in env {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProvisionError::Command(format!("{program}: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn binary_on_path(&self, name: &str) -> bool {
        tokio::process::Command::new("which")
            .arg(name)
            .output()
            .await
            .is_ok_and(|o| o.status.success())
    }

    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// Object store backed by the gsutil CLI
pub struct GsutilStore {
    platform: Arc<dyn Platform>,
}

impl GsutilStore {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), ProvisionError> {
        let args = vec!["cp".to_string(), from.to_string(), to.to_string()];
        let output = self.platform.run("gsutil", &args, &[]).await?;
        if output.success {
            Ok(())
        } else {
            Err(ProvisionError::Command(format!(
                "gsutil cp {} {} failed: {}",
                from,
                to,
                output.stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl ObjectStore for GsutilStore {
    async fn download(&self, uri: &str, dest: &Path) -> Result<(), ProvisionError> {
        self.copy(uri, &dest.to_string_lossy()).await
    }

    async fn upload(&self, src: &Path, uri: &str) -> Result<(), ProvisionError> {
        self.copy(&src.to_string_lossy(), uri).await
    }
}

/// Compute API backed by the gcloud CLI
pub struct GcloudCompute {
    platform: Arc<dyn Platform>,
}

impl GcloudCompute {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl ComputeApi for GcloudCompute {
    async fn set_label(
        &self,
        instance: &str,
        zone: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProvisionError> {
        let args = vec![
            "compute".to_string(),
            "instances".to_string(),
            "add-labels".to_string(),
            instance.to_string(),
            format!("--zone={zone}"),
            format!("--labels={key}={value}"),
            "--quiet".to_string(),
        ];
        let output = self.platform.run("gcloud", &args, &[]).await?;
        if output.success {
            Ok(())
        } else {
            Err(ProvisionError::Report(format!(
                "add-labels on {instance} failed: {}",
                output.stderr.trim()
            )))
        }
    }
}
