//! vm-boot-agent library
//!
//! First-boot provisioning agent for cloud VMs. Reads the install
//! configuration from the instance metadata service, fetches and installs
//! the job's bundle (source tarball or container image), and reports the
//! outcome back to the orchestrator through the instance's `boot_status`
//! label.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Fail fast, report always**: config errors surface before any side
//!   effect; the terminal status report runs on every exit path
//! - **Bounded waits**: every external condition is polled against an
//!   explicit deadline, never forever

pub mod adapters;
pub mod bundle;
pub mod config;
pub mod logsink;
pub mod metadata;
pub mod pipeline;
pub mod report;
pub mod state;

mod error;

pub use error::ProvisionError;
pub use logsink::LogSink;

use serde::Serialize;

/// Terminal outcome of the boot pipeline, written once to the instance's
/// `boot_status` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootStatus {
    /// Provisioning has not reached a terminal state yet
    Pending,
    /// All stages completed
    Done,
    /// A stage, the config, or the deadline failed the pipeline
    Failed,
}

impl BootStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BootStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
