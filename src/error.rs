//! Error types for vm-boot-agent

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Required metadata key '{0}' is missing or empty")]
    MissingMetadata(String),

    #[error("Unrecognized bundler type '{0}'")]
    InvalidBundleKind(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Timed out after {seconds}s waiting for {what}")]
    WaitTimeout { what: String, seconds: u64 },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Install error: {0}")]
    Install(String),

    #[error("Reporting error: {0}")]
    Report(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("Pipeline deadline exceeded after {0}s")]
    DeadlineExceeded(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProvisionError {
    /// Create a stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
