//! Provisioning stages
//!
//! A stage is one named unit of work with a retry policy and a per-attempt
//! timeout. The runner executes stages sequentially, appending everything
//! they print to the setup log.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::ProvisionError;
use crate::adapters::Platform;
use crate::logsink::LogSink;

/// Reference backoff between retry attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How a failed stage attempt is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Fail on the first error. For non-idempotent actions.
    Never,
    /// Retry forever with a fixed backoff. For idempotent installs that
    /// fail transiently on lock contention.
    Unlimited { backoff: Duration },
    /// Retry up to `attempts` total tries.
    Limited { attempts: u32, backoff: Duration },
}

impl RetryPolicy {
    /// Backoff before the next attempt, or None when retries are exhausted.
    fn delay_after(&self, attempts_so_far: u32) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::Unlimited { backoff } => Some(*backoff),
            Self::Limited { attempts, backoff } => {
                if attempts_so_far < *attempts {
                    Some(*backoff)
                } else {
                    None
                }
            }
        }
    }
}

/// The work a stage performs
#[async_trait]
pub trait StageAction: Send + Sync {
    async fn execute(&self, log: &LogSink) -> Result<(), ProvisionError>;
}

/// One named unit of the provisioning pipeline
pub struct Stage {
    pub id: String,
    pub action: Arc<dyn StageAction>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl Stage {
    pub fn new(
        id: impl Into<String>,
        action: Arc<dyn StageAction>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            action,
            retry,
            timeout,
        }
    }

    /// Stage that runs a system command through the platform adapter.
    pub fn command(
        id: impl Into<String>,
        platform: Arc<dyn Platform>,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let action = CommandAction {
            platform,
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        Self::new(id, Arc::new(action), retry, timeout)
    }
}

/// Runs a system command and appends its output to the setup log
struct CommandAction {
    platform: Arc<dyn Platform>,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

#[async_trait]
impl StageAction for CommandAction {
    async fn execute(&self, log: &LogSink) -> Result<(), ProvisionError> {
        let output = self.platform.run(&self.program, &self.args, &self.env).await?;

        for line in output.stdout.lines() {
            log.append(line);
        }
        for line in output.stderr.lines() {
            log.append(line);
        }

        if output.success {
            Ok(())
        } else {
            Err(ProvisionError::Command(format!(
                "{} exited with status {}: {}",
                self.program,
                output.code.unwrap_or(-1),
                output.stderr.trim()
            )))
        }
    }
}

/// Executes stages with bounded retry and logging
pub struct StageRunner {
    log: LogSink,
}

impl StageRunner {
    pub fn new(log: LogSink) -> Self {
        Self { log }
    }

    /// Run one stage to completion, retrying per its policy.
    ///
    /// Each attempt is bounded by the stage timeout. Exhausted retries
    /// surface a stage error, which is fatal for the pipeline.
    pub async fn run(&self, stage: &Stage) -> Result<(), ProvisionError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!("Stage '{}': attempt {}", stage.id, attempt);
            self.log
                .append(&format!("stage {}: attempt {}", stage.id, attempt));

            let error = match timeout(stage.timeout, stage.action.execute(&self.log)).await {
                Ok(Ok(())) => {
                    info!("Stage '{}' completed", stage.id);
                    self.log.append(&format!("stage {}: ok", stage.id));
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_) => ProvisionError::Command(format!(
                    "attempt timed out after {}s",
                    stage.timeout.as_secs()
                )),
            };

            warn!("Stage '{}' attempt {} failed: {}", stage.id, attempt, error);
            self.log
                .append(&format!("stage {}: attempt {} failed: {}", stage.id, attempt, error));

            match stage.retry.delay_after(attempt) {
                Some(backoff) => sleep(backoff).await,
                None => return Err(ProvisionError::stage(&stage.id, error.to_string())),
            }
        }
    }
}
