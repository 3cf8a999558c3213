//! Idempotent resource operations
//!
//! Every wrapper classifies a remote failure into exactly one [`ErrorClass`]:
//! already-in-desired-state failures are absorbed here and never reach the
//! orchestrator, transient ones are retried with backoff, fatal ones surface
//! as a [`ProvisionError`] tagged with the failing step.

use crate::error::{ErrorClass, ProvisionError, RemoteError, RemoteErrorKind, Result};
use crate::model::{
    AccessRole, ClusterDescription, ClusterSpec, ClusterStatus, CreateClusterRequest, IngressRule,
    SecurityGroup,
};
use crate::provider::{ControlPlane, RemoteResult, RetryConfig};
use crate::report::Step;
use std::future::Future;

/// Kind of remote call, for classification purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create a resource (role, cluster)
    Create,
    /// Attach or authorize something onto an existing resource
    Attach,
    /// Delete, detach or revoke
    Delete,
    /// Read-only describe/get
    Describe,
}

/// Classify a remote failure relative to the operation that produced it
pub fn classify(operation: Operation, err: &RemoteError) -> ErrorClass {
    use RemoteErrorKind::*;

    match (operation, err.kind) {
        (_, Throttled | Unavailable) => ErrorClass::Transient,
        (Operation::Create, AlreadyExists) => ErrorClass::AlreadyInDesiredState,
        (Operation::Attach, AlreadyExists | Duplicate) => ErrorClass::AlreadyInDesiredState,
        (Operation::Delete, NotFound) => ErrorClass::AlreadyInDesiredState,
        _ => ErrorClass::Fatal,
    }
}

/// Whether a wrapper had to change anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Applied,
    AlreadyInDesiredState,
}

/// Result of a remote call after classification
enum Converged<T> {
    Applied(T),
    AlreadyInDesiredState,
}

/// Conflict-aware wrappers around the Resource Clients
pub struct ResourceOps<'a> {
    plane: &'a ControlPlane,
    retry: RetryConfig,
}

impl<'a> ResourceOps<'a> {
    pub fn new(plane: &'a ControlPlane, retry: RetryConfig) -> Self {
        Self { plane, retry }
    }

    /// Run a remote call, absorbing desired-state failures and retrying transient ones
    async fn call<T, F, Fut>(
        &self,
        step: Step,
        operation: Operation,
        mut call: F,
    ) -> Result<Converged<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match call().await {
                Ok(value) => return Ok(Converged::Applied(value)),
                Err(err) => err,
            };

            match classify(operation, &err) {
                ErrorClass::AlreadyInDesiredState => {
                    tracing::debug!(step = %step, error = %err, "Already in desired state");
                    return Ok(Converged::AlreadyInDesiredState);
                }
                ErrorClass::Transient if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        step = %step,
                        attempt = attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                class => {
                    tracing::error!(
                        step = %step,
                        attempt = attempt,
                        error = %err,
                        "Remote call failed"
                    );
                    return Err(ProvisionError::remote(step, class, err));
                }
            }
        }
    }

    /// Create the role, or resolve the ARN of the existing one
    pub async fn ensure_role(&self, role: &AccessRole) -> Result<(String, Ensured)> {
        let roles = self.plane.roles.as_ref();

        match self
            .call(Step::CreateRole, Operation::Create, move || roles.create_role(role))
            .await?
        {
            Converged::Applied(arn) => {
                tracing::info!(role = %role.name, arn = %arn, "Created role");
                Ok((arn, Ensured::Applied))
            }
            Converged::AlreadyInDesiredState => {
                tracing::info!(role = %role.name, "Role already exists");
                let arn = self.resolve_role_arn(&role.name).await?;
                Ok((arn, Ensured::AlreadyInDesiredState))
            }
        }
    }

    /// Read the ARN of an existing role
    pub async fn resolve_role_arn(&self, role_name: &str) -> Result<String> {
        let roles = self.plane.roles.as_ref();

        match self
            .call(Step::ResolveRole, Operation::Describe, move || roles.get_role(role_name))
            .await?
        {
            Converged::Applied(arn) => Ok(arn),
            // Describe failures never classify as desired state
            Converged::AlreadyInDesiredState => Err(ProvisionError::FatalRemote {
                step: Step::ResolveRole,
                source: RemoteError::not_found(format!("role {} has no ARN", role_name)),
            }),
        }
    }

    /// ARN of the role; `None` when it does not exist
    pub async fn find_role(&self, role_name: &str) -> Result<Option<String>> {
        let roles = self.plane.roles.as_ref();

        match self
            .call(Step::ResolveRole, Operation::Describe, move || async move {
                match roles.get_role(role_name).await {
                    Ok(arn) => Ok(Some(arn)),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .await?
        {
            Converged::Applied(arn) => Ok(arn),
            Converged::AlreadyInDesiredState => Ok(None),
        }
    }

    /// The default security group of the cluster's VPC
    pub async fn default_security_group(&self, vpc_id: &str) -> Result<SecurityGroup> {
        let network = self.plane.network.as_ref();

        match self
            .call(Step::DescribeNetwork, Operation::Describe, move || {
                network.describe_default_security_group(vpc_id)
            })
            .await?
        {
            Converged::Applied(group) => Ok(group),
            Converged::AlreadyInDesiredState => Err(ProvisionError::FatalRemote {
                step: Step::DescribeNetwork,
                source: RemoteError::not_found(format!(
                    "VPC {} has no default security group",
                    vpc_id
                )),
            }),
        }
    }

    /// Attach the policy; attaching an attached policy is a no-op
    pub async fn ensure_policy_attached(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<Ensured> {
        let roles = self.plane.roles.as_ref();

        let converged = self
            .call(Step::AttachPolicy, Operation::Attach, move || {
                roles.attach_policy(role_name, policy_arn)
            })
            .await?;
        Ok(ensured(converged))
    }

    /// Authorize the ingress rule; a duplicate permission is a no-op
    pub async fn ensure_ingress_rule(&self, rule: &IngressRule) -> Result<Ensured> {
        let network = self.plane.network.as_ref();

        let converged = self
            .call(Step::AuthorizeIngress, Operation::Attach, move || {
                network.authorize_ingress(rule)
            })
            .await?;
        Ok(ensured(converged))
    }

    /// Make sure the cluster exists, without issuing a second create for a
    /// cluster that is still coming up.
    pub async fn ensure_cluster(&self, spec: &ClusterSpec, iam_role_arn: &str) -> Result<Ensured> {
        if let Some(existing) = self.describe_cluster(&spec.identifier).await? {
            return match existing.status {
                ClusterStatus::Creating | ClusterStatus::Available => {
                    tracing::info!(
                        cluster = %spec.identifier,
                        status = %existing.raw_status,
                        "Cluster already exists"
                    );
                    Ok(Ensured::AlreadyInDesiredState)
                }
                ClusterStatus::Deleting | ClusterStatus::Failed | ClusterStatus::Absent => {
                    Err(ProvisionError::TerminalStatus {
                        step: Step::CreateCluster,
                        status: existing.raw_status,
                    })
                }
            };
        }

        let clusters = self.plane.clusters.as_ref();
        let request = CreateClusterRequest { spec, iam_role_arn };
        let request = &request;

        match self
            .call(Step::CreateCluster, Operation::Create, move || {
                clusters.create_cluster(request)
            })
            .await?
        {
            Converged::Applied(()) => {
                tracing::info!(
                    cluster = %spec.identifier,
                    node_type = %spec.node_type,
                    nodes = spec.node_count,
                    "Requested cluster creation"
                );
                Ok(Ensured::Applied)
            }
            Converged::AlreadyInDesiredState => {
                tracing::info!(cluster = %spec.identifier, "Cluster already exists");
                Ok(Ensured::AlreadyInDesiredState)
            }
        }
    }

    /// Describe the cluster; `None` when it does not exist
    pub async fn describe_cluster(&self, identifier: &str) -> Result<Option<ClusterDescription>> {
        let clusters = self.plane.clusters.as_ref();

        match self
            .call(Step::DescribeCluster, Operation::Describe, move || async move {
                match clusters.describe_cluster(identifier).await {
                    Ok(description) => Ok(Some(description)),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .await?
        {
            Converged::Applied(description) => Ok(description),
            Converged::AlreadyInDesiredState => Ok(None),
        }
    }

    pub async fn delete_cluster(&self, identifier: &str) -> Result<Ensured> {
        let clusters = self.plane.clusters.as_ref();

        let converged = self
            .call(Step::DeleteCluster, Operation::Delete, move || {
                clusters.delete_cluster(identifier, true)
            })
            .await?;
        Ok(ensured(converged))
    }

    pub async fn revoke_ingress_rule(&self, rule: &IngressRule) -> Result<Ensured> {
        let network = self.plane.network.as_ref();

        let converged = self
            .call(Step::RevokeIngress, Operation::Delete, move || {
                network.revoke_ingress(rule)
            })
            .await?;
        Ok(ensured(converged))
    }

    pub async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<Ensured> {
        let roles = self.plane.roles.as_ref();

        let converged = self
            .call(Step::DetachPolicy, Operation::Delete, move || {
                roles.detach_policy(role_name, policy_arn)
            })
            .await?;
        Ok(ensured(converged))
    }

    pub async fn delete_role(&self, role_name: &str) -> Result<Ensured> {
        let roles = self.plane.roles.as_ref();

        let converged = self
            .call(Step::DeleteRole, Operation::Delete, move || roles.delete_role(role_name))
            .await?;
        Ok(ensured(converged))
    }
}

fn ensured(converged: Converged<()>) -> Ensured {
    match converged {
        Converged::Applied(()) => Ensured::Applied,
        Converged::AlreadyInDesiredState => Ensured::AlreadyInDesiredState,
    }
}
