//! Bundle installation
//!
//! Installs the job's bundle onto the VM, branching on how it was
//! packaged: source tarballs get downloaded, extracted, and installed
//! into an isolated Python environment; container images get a runtime
//! and registry credentials. Unknown kinds never reach this module;
//! they are rejected at config validation.

mod container;
mod tarball;

use std::sync::Arc;

use crate::ProvisionError;
use crate::adapters::{ObjectStore, Platform};
use crate::config::ProvisioningConfig;
use crate::logsink::LogSink;
use crate::pipeline::PipelineOptions;
use crate::pipeline::stage::StageRunner;
use crate::state::BootPaths;

pub struct BundleInstaller {
    pub(crate) config: ProvisioningConfig,
    pub(crate) paths: BootPaths,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) log: LogSink,
    pub(crate) runner: StageRunner,
    pub(crate) opts: PipelineOptions,
}

impl BundleInstaller {
    pub fn new(
        config: ProvisioningConfig,
        paths: BootPaths,
        platform: Arc<dyn Platform>,
        store: Arc<dyn ObjectStore>,
        log: LogSink,
        opts: PipelineOptions,
    ) -> Self {
        let runner = StageRunner::new(log.clone());
        Self {
            config,
            paths,
            platform,
            store,
            log,
            runner,
            opts,
        }
    }

    pub async fn install(&self) -> Result<(), ProvisionError> {
        if self.config.bundle_kind.is_container() {
            container::install(self).await
        } else {
            tarball::install(self).await
        }
    }
}
