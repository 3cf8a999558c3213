//! AWS resource clients for dwhflow
//!
//! This crate implements the `RoleAdmin`, `NetworkAdmin` and `ClusterAdmin`
//! traits of `dwhflow-cloud` on top of the AWS SDK (IAM, EC2 and Redshift),
//! and maps AWS error codes onto the remote error kinds the idempotent layer
//! classifies.
//!
//! # Credentials
//!
//! Static keys from the configuration file are used when given; otherwise
//! the default AWS credential chain (environment, profile, instance role)
//! applies.
//!
//! # Example
//!
//! ```ignore
//! use dwhflow_cloud_aws::{AwsSettings, connect};
//!
//! let plane = connect(&AwsSettings::new("us-west-2")).await;
//! let orchestrator = Orchestrator::new(plane, store, environment);
//! ```

pub mod ec2;
pub mod error;
pub mod iam;
pub mod redshift;

pub use ec2::Ec2NetworkAdmin;
pub use error::kind_for_code;
pub use iam::IamRoleAdmin;
pub use redshift::RedshiftClusterAdmin;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::config::Credentials;
use dwhflow_cloud::ControlPlane;
use std::sync::Arc;

const CREDENTIALS_SOURCE: &str = "dwhflow-config";

/// Region and optional static credentials
#[derive(Clone, Default)]
pub struct AwsSettings {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }

    pub fn with_static_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => Some(
                Credentials::new(key, secret, None, None, CREDENTIALS_SOURCE),
            ),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "********"),
            )
            .finish()
    }
}

/// Load the shared SDK configuration
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()));

    match settings.static_credentials() {
        Some(credentials) => {
            tracing::debug!(region = %settings.region, "Using static credentials");
            loader = loader.credentials_provider(credentials);
        }
        None => {
            tracing::debug!(region = %settings.region, "Using the default credential chain");
        }
    }

    loader.load().await
}

/// Build the three resource clients from an SDK configuration
pub fn control_plane(config: &SdkConfig) -> ControlPlane {
    ControlPlane::new(
        Arc::new(IamRoleAdmin::new(aws_sdk_iam::Client::new(config))),
        Arc::new(Ec2NetworkAdmin::new(aws_sdk_ec2::Client::new(config))),
        Arc::new(RedshiftClusterAdmin::new(aws_sdk_redshift::Client::new(
            config,
        ))),
    )
}

/// Load the SDK configuration and build the control plane
pub async fn connect(settings: &AwsSettings) -> ControlPlane {
    let config = load_sdk_config(settings).await;
    control_plane(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_require_both_halves() {
        assert!(AwsSettings::new("us-west-2").static_credentials().is_none());

        let mut half = AwsSettings::new("us-west-2");
        half.access_key_id = Some("AKIAEXAMPLE".to_string());
        assert!(half.static_credentials().is_none());

        let full = AwsSettings::new("us-west-2").with_static_credentials("AKIAEXAMPLE", "secret");
        let credentials = full.static_credentials().unwrap();
        assert_eq!(credentials.access_key_id(), "AKIAEXAMPLE");
    }

    #[test]
    fn test_debug_masks_secret() {
        let settings =
            AwsSettings::new("us-west-2").with_static_credentials("AKIAEXAMPLE", "topsecret");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("us-west-2"));
    }

    #[tokio::test]
    async fn test_sdk_config_uses_configured_region() {
        let config = load_sdk_config(&AwsSettings::new("us-west-2")).await;
        assert_eq!(config.region().map(|r| r.as_ref()), Some("us-west-2"));
    }
}
