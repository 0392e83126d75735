//! Provisioning configuration
//!
//! The immutable record driving the whole pipeline, built once from
//! instance metadata at startup and read-only thereafter. Validation is
//! fail-fast: a bad bundler type is rejected here, before any network or
//! filesystem side effect.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::ProvisionError;

/// Instance attribute keys consumed by the agent. All are required.
pub const ATTR_BUNDLE_BUCKET: &str = "bundle_bucket";
pub const ATTR_JOB_NAME: &str = "job_name";
pub const ATTR_ZONE: &str = "zone";
pub const ATTR_DOCKER_REGISTRY: &str = "docker_registry";
pub const ATTR_BUNDLER_TYPE: &str = "bundler_type";

pub const REQUIRED_ATTRIBUTES: [&str; 5] = [
    ATTR_BUNDLE_BUCKET,
    ATTR_JOB_NAME,
    ATTR_ZONE,
    ATTR_DOCKER_REGISTRY,
    ATTR_BUNDLER_TYPE,
];

/// How the job's install bundle was packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    /// Source tarball in object storage
    Tar,
    /// Source tarball in object storage (legacy alias)
    Gcs,
    /// Container image in a docker registry
    Docker,
    /// Container image in Artifact Registry
    ArtifactRegistry,
    /// Container image built by Cloud Build
    CloudBuild,
}

impl BundleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Gcs => "gcs",
            Self::Docker => "docker",
            Self::ArtifactRegistry => "artifactregistry",
            Self::CloudBuild => "cloudbuild",
        }
    }

    /// Container kinds need a runtime and registry credentials instead of a
    /// source checkout.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Docker | Self::ArtifactRegistry | Self::CloudBuild)
    }
}

impl FromStr for BundleKind {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(Self::Tar),
            "gcs" => Ok(Self::Gcs),
            "docker" => Ok(Self::Docker),
            "artifactregistry" => Ok(Self::ArtifactRegistry),
            "cloudbuild" => Ok(Self::CloudBuild),
            other => Err(ProvisionError::InvalidBundleKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for BundleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable provisioning configuration for this boot
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningConfig {
    /// Object storage bucket holding the job's bundle and logs
    pub bucket: String,
    /// Job name; also the instance name carrying the boot_status label
    pub job_name: String,
    /// Compute zone of the instance
    pub zone: String,
    /// Registry the container runtime authenticates against
    pub docker_registry: String,
    /// How the bundle was packaged
    pub bundle_kind: BundleKind,
}

impl ProvisioningConfig {
    /// Build and validate the config from fetched instance attributes.
    ///
    /// Every required key must be present and non-empty; the bundler type
    /// must be one of the known kinds.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Result<Self, ProvisionError> {
        let get = |key: &str| -> Result<String, ProvisionError> {
            match attrs.get(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(ProvisionError::MissingMetadata(key.to_string())),
            }
        };

        let bundle_kind = get(ATTR_BUNDLER_TYPE)?.parse()?;

        Ok(Self {
            bucket: get(ATTR_BUNDLE_BUCKET)?,
            job_name: get(ATTR_JOB_NAME)?,
            zone: get(ATTR_ZONE)?,
            docker_registry: get(ATTR_DOCKER_REGISTRY)?,
            bundle_kind,
        })
    }

    /// Object storage URI of the job's bundle tarball
    pub fn bundle_uri(&self) -> String {
        format!(
            "gs://{}/axlearn/jobs/{}/axlearn.tar.gz",
            self.bucket, self.job_name
        )
    }

    /// Object storage URI the setup log is uploaded to
    pub fn log_uri(&self, hostname: &str) -> String {
        format!(
            "gs://{}/axlearn/jobs/{}/logs/setup_log-{}",
            self.bucket, self.job_name, hostname
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(bundler: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(ATTR_BUNDLE_BUCKET.to_string(), "b".to_string());
        map.insert(ATTR_JOB_NAME.to_string(), "j1".to_string());
        map.insert(ATTR_ZONE.to_string(), "z1".to_string());
        map.insert(ATTR_DOCKER_REGISTRY.to_string(), "r".to_string());
        map.insert(ATTR_BUNDLER_TYPE.to_string(), bundler.to_string());
        map
    }

    #[test]
    fn test_bundle_kind_parsing() {
        assert_eq!("tar".parse::<BundleKind>().unwrap(), BundleKind::Tar);
        assert_eq!("gcs".parse::<BundleKind>().unwrap(), BundleKind::Gcs);
        assert_eq!("docker".parse::<BundleKind>().unwrap(), BundleKind::Docker);
        assert_eq!(
            "artifactregistry".parse::<BundleKind>().unwrap(),
            BundleKind::ArtifactRegistry
        );
        assert_eq!(
            "cloudbuild".parse::<BundleKind>().unwrap(),
            BundleKind::CloudBuild
        );
    }

    #[test]
    fn test_unknown_bundle_kind_rejected() {
        let err = "unknown".parse::<BundleKind>().unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidBundleKind(ref s) if s == "unknown"));
    }

    #[test]
    fn test_container_kinds() {
        assert!(!BundleKind::Tar.is_container());
        assert!(!BundleKind::Gcs.is_container());
        assert!(BundleKind::Docker.is_container());
        assert!(BundleKind::ArtifactRegistry.is_container());
        assert!(BundleKind::CloudBuild.is_container());
    }

    #[test]
    fn test_config_from_attributes() {
        let config = ProvisioningConfig::from_attributes(&attrs("tar")).unwrap();
        assert_eq!(config.bucket, "b");
        assert_eq!(config.job_name, "j1");
        assert_eq!(config.zone, "z1");
        assert_eq!(config.docker_registry, "r");
        assert_eq!(config.bundle_kind, BundleKind::Tar);
    }

    #[test]
    fn test_config_missing_key() {
        let mut map = attrs("tar");
        map.remove(ATTR_ZONE);
        let err = ProvisioningConfig::from_attributes(&map).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingMetadata(ref k) if k == ATTR_ZONE));
    }

    #[test]
    fn test_config_empty_value_is_missing() {
        let mut map = attrs("tar");
        map.insert(ATTR_JOB_NAME.to_string(), "   ".to_string());
        let err = ProvisioningConfig::from_attributes(&map).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingMetadata(ref k) if k == ATTR_JOB_NAME));
    }

    #[test]
    fn test_config_invalid_bundler_rejected_at_validation() {
        let err = ProvisioningConfig::from_attributes(&attrs("unknown")).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidBundleKind(_)));
    }

    #[test]
    fn test_storage_layout() {
        let config = ProvisioningConfig::from_attributes(&attrs("tar")).unwrap();
        assert_eq!(config.bundle_uri(), "gs://b/axlearn/jobs/j1/axlearn.tar.gz");
        assert_eq!(
            config.log_uri("host-0"),
            "gs://b/axlearn/jobs/j1/logs/setup_log-host-0"
        );
    }
}
