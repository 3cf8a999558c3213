//! dwhflow cluster provisioning
//!
//! This crate stands up, resumes and tears down a managed analytical-cluster
//! environment: an access role, a compute cluster and a network ingress rule.
//! It is independent of any cloud SDK; adapters implement the Resource Client
//! traits in [`provider`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    dwh CLI                       │
//! │                (dwh up / down)                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                dwhflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │      Cluster Lifecycle Orchestrator      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │ Idempotent │ │  Polling   │ │   State    │   │
//! │  │    Ops     │ │   Waiter   │ │   Store    │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait RoleAdmin / NetworkAdmin /        │   │
//! │  │        ClusterAdmin                      │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────┐
//! │ dwhflow-cloud-aws │
//! │ IAM/EC2/Redshift  │
//! └───────────────────┘
//! ```

pub mod error;
pub mod idempotent;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod state;
pub mod waiter;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use error::{ErrorClass, ErrorKind, ProvisionError, RemoteError, RemoteErrorKind, Result};
pub use idempotent::{Ensured, Operation, ResourceOps, classify};
pub use model::{
    AccessRole, ClusterDescription, ClusterSpec, ClusterStatus, ClusterType, CreateClusterRequest,
    Endpoint, IngressRule, S3_READ_ONLY_POLICY_ARN, SecurityGroup,
};
pub use orchestrator::{
    EnvironmentSpec, EnvironmentStatus, Orchestrator, ProvisionPhase, TeardownOptions,
};
pub use provider::{
    ClusterAdmin, ControlPlane, NetworkAdmin, RemoteResult, RetryConfig, RoleAdmin,
};
pub use report::{
    ProvisionReport, Step, StepOutcome, StepRecord, TeardownReport, TeardownSummary,
};
pub use state::{FileStateStore, MemoryStateStore, ProvisioningState, StateStore};
pub use waiter::{Probe, WaitConfig, WaitGoal, WaitOutcome, Waiter};
