//! Resource Client traits
//!
//! Thin capability-scoped handles to the three control planes the orchestrator
//! drives. Implementations do I/O and error-code mapping only; idempotency and
//! retries live in [`crate::idempotent`].

use crate::error::RemoteError;
use crate::model::{AccessRole, ClusterDescription, CreateClusterRequest, IngressRule, SecurityGroup};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Identity/role management
#[async_trait]
pub trait RoleAdmin: Send + Sync {
    /// Create the role and return its ARN
    async fn create_role(&self, role: &AccessRole) -> RemoteResult<String>;

    async fn delete_role(&self, role_name: &str) -> RemoteResult<()>;

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()>;

    /// Resolve the ARN of an existing role
    async fn get_role(&self, role_name: &str) -> RemoteResult<String>;
}

/// Network security-group management
#[async_trait]
pub trait NetworkAdmin: Send + Sync {
    /// The default security group of a VPC
    async fn describe_default_security_group(&self, vpc_id: &str) -> RemoteResult<SecurityGroup>;

    async fn authorize_ingress(&self, rule: &IngressRule) -> RemoteResult<()>;

    async fn revoke_ingress(&self, rule: &IngressRule) -> RemoteResult<()>;
}

/// Cluster management
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    async fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> RemoteResult<()>;

    async fn delete_cluster(&self, identifier: &str, skip_final_snapshot: bool)
    -> RemoteResult<()>;

    /// Describe the cluster; a missing cluster is a `NotFound` error
    async fn describe_cluster(&self, identifier: &str) -> RemoteResult<ClusterDescription>;
}

/// The three Resource Clients the orchestrator needs
#[derive(Clone)]
pub struct ControlPlane {
    pub roles: Arc<dyn RoleAdmin>,
    pub network: Arc<dyn NetworkAdmin>,
    pub clusters: Arc<dyn ClusterAdmin>,
}

impl ControlPlane {
    pub fn new(
        roles: Arc<dyn RoleAdmin>,
        network: Arc<dyn NetworkAdmin>,
        clusters: Arc<dyn ClusterAdmin>,
    ) -> Self {
        Self {
            roles,
            network,
            clusters,
        }
    }
}

/// Retry configuration for single-shot remote calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before the retry following `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}
