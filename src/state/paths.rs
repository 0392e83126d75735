//! Standard boot-agent paths
//!
//! Defines the local directory layout the agent works in.

use std::path::{Path, PathBuf};

/// Base working directory for bundle download and extraction
pub const WORK_DIR: &str = "/var/lib/vm-boot-agent";

/// Durable setup log, kept for post-mortem even after upload
pub const LOG_PATH: &str = "/var/log/vm-boot-agent.log";

/// Local paths used by the agent
#[derive(Debug, Clone)]
pub struct BootPaths {
    /// Working directory (default: /var/lib/vm-boot-agent)
    pub work: PathBuf,
    /// Setup log file (default: /var/log/vm-boot-agent.log)
    pub log: PathBuf,
}

impl Default for BootPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl BootPaths {
    /// Create with default paths
    pub fn new() -> Self {
        Self {
            work: PathBuf::from(WORK_DIR),
            log: PathBuf::from(LOG_PATH),
        }
    }

    /// Create with custom work and log locations (useful for testing)
    pub fn with_dirs(work: impl AsRef<Path>, log: impl AsRef<Path>) -> Self {
        Self {
            work: work.as_ref().to_path_buf(),
            log: log.as_ref().to_path_buf(),
        }
    }

    /// Downloaded bundle archive
    pub fn bundle_archive(&self) -> PathBuf {
        self.work.join("axlearn.tar.gz")
    }

    /// Extraction target for the bundle
    pub fn bundle_dir(&self) -> PathBuf {
        self.work.join("bundle")
    }

    /// Isolated Python environment for the bundle's dependencies
    pub fn venv_dir(&self) -> PathBuf {
        self.work.join("venv")
    }

    /// Machine-readable boot result summary
    pub fn result_file(&self) -> PathBuf {
        self.work.join("result.json")
    }
}
