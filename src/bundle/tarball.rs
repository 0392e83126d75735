//! Source tarball installation
//!
//! Downloads the bundle from object storage, extracts it, and installs
//! its declared dependencies into an isolated Python environment.
//! Package-manager stages retry without bound: concurrent background
//! provisioning can transiently corrupt apt/pip state, and retrying
//! converges once that settles.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::BundleInstaller;
use crate::ProvisionError;
use crate::adapters::Platform;
use crate::pipeline::stage::{DEFAULT_BACKOFF, RetryPolicy, Stage};
use crate::pipeline::waitgate::wait_for;

/// Lock files the system package manager holds during its own runs
const DPKG_LOCKS: [&str; 3] = [
    "/var/lib/dpkg/lock",
    "/var/lib/dpkg/lock-frontend",
    "/var/lib/apt/lists/lock",
];

const APT_TIMEOUT: Duration = Duration::from_secs(600);
const VENV_TIMEOUT: Duration = Duration::from_secs(120);
const PIP_TIMEOUT: Duration = Duration::from_secs(1800);

pub(super) async fn install(ctx: &BundleInstaller) -> Result<(), ProvisionError> {
    info!("Installing source bundle from {}", ctx.config.bundle_uri());

    // A background apt run (unattended-upgrades, concurrent provisioning)
    // holds the dpkg locks; the package manager cannot run until they clear.
    wait_for(
        "package manager lock",
        || apt_lock_free(ctx.platform.as_ref()),
        ctx.opts.poll_interval,
        ctx.opts.gate_deadline,
    )
    .await
    .ok_or_timeout("package manager lock", ctx.opts.gate_deadline)?;

    tokio::fs::create_dir_all(&ctx.paths.work).await?;

    let archive = ctx.paths.bundle_archive();
    ctx.log
        .append(&format!("downloading bundle {}", ctx.config.bundle_uri()));
    ctx.store
        .download(&ctx.config.bundle_uri(), &archive)
        .await?;

    let bundle_dir = ctx.paths.bundle_dir();
    ctx.log
        .append(&format!("extracting bundle to {}", bundle_dir.display()));
    extract_archive(archive, bundle_dir.clone()).await?;

    install_runtime(ctx).await?;
    install_dependencies(ctx, &bundle_dir).await?;

    info!("Source bundle installed");
    Ok(())
}

/// True when no process holds any of the dpkg lock files.
async fn apt_lock_free(platform: &dyn Platform) -> bool {
    let args: Vec<String> = DPKG_LOCKS.iter().map(|s| s.to_string()).collect();
    match platform.run("fuser", &args, &[]).await {
        // fuser exits zero when some process holds one of the files
        Ok(output) => !output.success,
        // No fuser on the image: nothing else is managing packages
        Err(_) => true,
    }
}

/// Unpack the gzipped tarball on the blocking pool.
async fn extract_archive(archive: PathBuf, dest: PathBuf) -> Result<(), ProvisionError> {
    tokio::task::spawn_blocking(move || -> Result<(), ProvisionError> {
        std::fs::create_dir_all(&dest)?;
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tarball = tar::Archive::new(decoder);
        tarball.unpack(&dest)?;
        Ok(())
    })
    .await
    .map_err(|e| ProvisionError::Install(format!("extraction task failed: {e}")))?
}

/// Provision the isolated Python runtime.
async fn install_runtime(ctx: &BundleInstaller) -> Result<(), ProvisionError> {
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
            "apt-install-python",
            ctx.platform.clone(),
            "apt-get",
            &["install", "-y", "python3-venv", "python3-pip"],
            &[("DEBIAN_FRONTEND", "noninteractive")],
            unlimited,
            APT_TIMEOUT,
        ))
        .await?;

    // Venv creation is not retried: a half-created environment from a
    // failed attempt would poison the next one.
    let venv = ctx.paths.venv_dir();
    let venv_str = venv.to_string_lossy();
    ctx.runner
        .run(&Stage::command(
            "create-venv",
            ctx.platform.clone(),
            "python3",
            &["-m", "venv", venv_str.as_ref()],
            &[],
            RetryPolicy::Never,
            VENV_TIMEOUT,
        ))
        .await?;

    Ok(())
}

/// Install the bundle's declared dependencies into the venv.
async fn install_dependencies(
    ctx: &BundleInstaller,
    bundle_dir: &Path,
) -> Result<(), ProvisionError> {
    let unlimited = RetryPolicy::Unlimited {
        backoff: DEFAULT_BACKOFF,
    };
    let pip = ctx.paths.venv_dir().join("bin/pip");
    let pip_str = pip.to_string_lossy();
    let bundle_str = bundle_dir.to_string_lossy();

    ctx.runner
        .run(&Stage::command(
            "pip-upgrade",
            ctx.platform.clone(),
            pip_str.as_ref(),
            &["install", "--upgrade", "pip"],
            &[],
            unlimited,
            PIP_TIMEOUT,
        ))
        .await?;

    ctx.runner
        .run(&Stage::command(
            "pip-install-bundle",
            ctx.platform.clone(),
            pip_str.as_ref(),
            &["install", bundle_str.as_ref()],
            &[],
            unlimited,
            PIP_TIMEOUT,
        ))
        .await?;

    Ok(())
}
