//! GCE (Google Compute Engine) metadata source
//!
//! Fetches instance attributes from the GCE metadata server.
//! <https://cloud.google.com/compute/docs/metadata/overview>

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::MetadataSource;
use crate::ProvisionError;

/// GCE metadata service base URL
pub const GCE_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Required header for GCE metadata requests
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// GCE metadata source
pub struct GceMetadata {
    client: Client,
    base_url: String,
}

impl GceMetadata {
    pub fn new() -> Self {
        Self::with_base_url(GCE_METADATA_URL)
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch a metadata path with the required Metadata-Flavor header.
    ///
    /// `Ok(None)` on 404: the attribute is simply not set.
    async fn fetch_path(&self, path: &str) -> Result<Option<String>, ProvisionError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Fetching GCE metadata: {}", url);

        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(Some(response.text().await?))
        } else if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(ProvisionError::Metadata(format!(
                "Failed to fetch {}: {}",
                path,
                response.status()
            )))
        }
    }
}

impl Default for GceMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataSource for GceMetadata {
    fn name(&self) -> &'static str {
        "GCE"
    }

    async fn get_attribute(&self, key: &str) -> Result<Option<String>, ProvisionError> {
        self.fetch_path(&format!("instance/attributes/{key}")).await
    }

    async fn hostname(&self) -> Option<String> {
        self.fetch_path("instance/hostname").await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gce_default() {
        let gce = GceMetadata::new();
        assert_eq!(gce.name(), "GCE");
        assert_eq!(gce.base_url, GCE_METADATA_URL);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let gce = GceMetadata::with_base_url("http://127.0.0.1:8080/");
        assert_eq!(gce.base_url, "http://127.0.0.1:8080");
    }
}
