//! Instance metadata sources
//!
//! Metadata sources provide the instance attributes that drive
//! provisioning, in a consistent way per cloud provider.

pub mod gce;

pub use gce::GceMetadata;

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::ProvisionError;

/// Trait for instance metadata sources
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of this source (e.g., "GCE")
    fn name(&self) -> &'static str;

    /// Fetch a single instance attribute. `Ok(None)` when the attribute is
    /// not set on the instance.
    async fn get_attribute(&self, key: &str) -> Result<Option<String>, ProvisionError>;

    /// Instance hostname, if the source knows it.
    async fn hostname(&self) -> Option<String>;
}

/// Fetch every required key, failing fast on the first missing or empty one.
///
/// Each key is requested independently; transport errors propagate as-is
/// (metadata service availability is assumed during the fetch window).
pub async fn fetch_required(
    source: &dyn MetadataSource,
    keys: &[&str],
) -> Result<HashMap<String, String>, ProvisionError> {
    let mut values = HashMap::new();
    for key in keys {
        debug!("Fetching required attribute '{}' from {}", key, source.name());
        match source.get_attribute(key).await? {
            Some(value) if !value.trim().is_empty() => {
                values.insert((*key).to_string(), value);
            }
            _ => return Err(ProvisionError::MissingMetadata((*key).to_string())),
        }
    }
    Ok(values)
}

/// Resolve the short hostname used to name the uploaded log.
///
/// Prefers the metadata service, falls back to /etc/hostname; the upload
/// must not fail for want of a name.
pub async fn resolve_hostname(source: &dyn MetadataSource) -> String {
    if let Some(name) = source.hostname().await {
        if let Some(short) = name.split('.').next() {
            if !short.is_empty() {
                return short.to_string();
            }
        }
    }

    if let Ok(contents) = tokio::fs::read_to_string("/etc/hostname").await {
        let name = contents.trim();
        if !name.is_empty() {
            return name.split('.').next().unwrap_or(name).to_string();
        }
    }

    "unknown-host".to_string()
}
