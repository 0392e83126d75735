//! Container image installation
//!
//! Container bundles need a running container runtime and credentials
//! for the job's registry. The runtime may still be mid-install by a
//! concurrent provisioning process, so we first wait for the binary to
//! appear, install it ourselves only if the wait times out, and then
//! authenticate against the registry exactly once.

use std::time::Duration;
use tracing::info;

use super::BundleInstaller;
use crate::ProvisionError;
use crate::pipeline::stage::{DEFAULT_BACKOFF, RetryPolicy, Stage};
use crate::pipeline::waitgate::{WaitOutcome, wait_for};

const APT_TIMEOUT: Duration = Duration::from_secs(600);
const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

pub(super) async fn install(ctx: &BundleInstaller) -> Result<(), ProvisionError> {
    info!(
        "Preparing container runtime for registry {}",
        ctx.config.docker_registry
    );

    let outcome = wait_for_docker(ctx).await;
    if outcome == WaitOutcome::Timeout {
        ctx.log
            .append("docker binary not found; installing container runtime");
        install_docker(ctx).await?;
        wait_for_docker(ctx)
            .await
            .ok_or_timeout("docker binary", ctx.opts.gate_deadline)?;
    }

    configure_registry_auth(ctx).await?;

    info!("Container runtime ready");
    Ok(())
}

async fn wait_for_docker(ctx: &BundleInstaller) -> WaitOutcome {
    let platform = ctx.platform.clone();
    wait_for(
        "docker binary",
        move || {
            let platform = platform.clone();
            async move { platform.binary_on_path("docker").await }
        },
        ctx.opts.poll_interval,
        ctx.opts.gate_deadline,
    )
    .await
}

async fn install_docker(ctx: &BundleInstaller) -> Result<(), ProvisionError> {
    let unlimited = RetryPolicy::Unlimited {
        backoff: DEFAULT_BACKOFF,
    };

    ctx.runner
        .run(&Stage::command(
            "apt-update",
            ctx.platform.clone(),
            "apt-get",
            &["update"],
            &[("DEBIAN_FRONTEND", "noninteractive")],
            unlimited,
            APT_TIMEOUT,
        ))
        .await?;

    ctx.runner
        .run(&Stage::command(
            "apt-install-docker",
            ctx.platform.clone(),
            "apt-get",
            &["install", "-y", "docker.io"],
            &[("DEBIAN_FRONTEND", "noninteractive")],
            unlimited,
            APT_TIMEOUT,
        ))
        .await?;

    Ok(())
}

/// Authenticate the container runtime against the job's registry.
///
/// Mutates the runtime's credential store; runs once, no retry.
async fn configure_registry_auth(ctx: &BundleInstaller) -> Result<(), ProvisionError> {
    ctx.runner
        .run(&Stage::command(
            "configure-docker-auth",
            ctx.platform.clone(),
            "gcloud",
            &[
                "auth",
                "configure-docker",
                &ctx.config.docker_registry,
                "--quiet",
            ],
            &[],
            RetryPolicy::Never,
            AUTH_TIMEOUT,
        ))
        .await
}
