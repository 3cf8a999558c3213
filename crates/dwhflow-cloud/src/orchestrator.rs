//! Cluster lifecycle orchestrator
//!
//! Sequences the idempotent resource operations into the provisioning
//! protocol
//!
//! ```text
//! Absent → RoleReady → PolicyAttached → ClusterCreating → ClusterAvailable → NetworkOpen
//! ```
//!
//! and the inverse, best-effort teardown protocol. Every step is safe to
//! repeat, so both protocols can be re-run from any partially applied state.
//! Discovered identifiers are committed through a [`StateStore`] right after
//! the remote operation that produced them is confirmed.

use crate::error::{ProvisionError, RemoteError, RemoteErrorKind, Result};
use crate::idempotent::{Ensured, ResourceOps};
use crate::model::{
    AccessRole, ClusterDescription, ClusterSpec, ClusterStatus, ClusterType, IngressRule,
};
use crate::provider::{ControlPlane, RetryConfig};
use crate::report::{ProvisionReport, Step, StepOutcome, StepRecord, TeardownReport};
use crate::state::{ProvisioningState, StateStore};
use crate::waiter::{Probe, WaitConfig, WaitGoal, WaitOutcome, Waiter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Provisioning state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    Absent,
    RoleReady,
    PolicyAttached,
    ClusterCreating,
    ClusterAvailable,
    NetworkOpen,
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionPhase::Absent => write!(f, "absent"),
            ProvisionPhase::RoleReady => write!(f, "role ready"),
            ProvisionPhase::PolicyAttached => write!(f, "policy attached"),
            ProvisionPhase::ClusterCreating => write!(f, "cluster creating"),
            ProvisionPhase::ClusterAvailable => write!(f, "cluster available"),
            ProvisionPhase::NetworkOpen => write!(f, "network open"),
        }
    }
}

/// Immutable description of the environment to provision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub role: AccessRole,
    pub cluster: ClusterSpec,

    /// Source range allowed to reach the cluster port
    pub ingress_cidr: String,
}

impl EnvironmentSpec {
    /// Check every required parameter before any remote call is made
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("role name", &self.role.name),
            ("role policy ARN", &self.role.policy_arn),
            ("cluster identifier", &self.cluster.identifier),
            ("node type", &self.cluster.node_type),
            ("database name", &self.cluster.db_name),
            ("master user", &self.cluster.master_username),
            ("master password", &self.cluster.master_password),
            ("ingress CIDR", &self.ingress_cidr),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ProvisionError::Configuration(format!(
                "missing parameters: {}",
                missing.join(", ")
            )));
        }

        if self.cluster.port == 0 {
            return Err(ProvisionError::Configuration(
                "cluster port must be between 1 and 65535".to_string(),
            ));
        }
        if self.cluster.cluster_type == ClusterType::MultiNode && self.cluster.node_count < 2 {
            return Err(ProvisionError::Configuration(format!(
                "multi-node clusters need at least 2 nodes, got {}",
                self.cluster.node_count
            )));
        }
        if self.cluster.node_count == 0 {
            return Err(ProvisionError::Configuration(
                "node count must be at least 1".to_string(),
            ));
        }
        if !self.ingress_cidr.contains('/') {
            return Err(ProvisionError::Configuration(format!(
                "ingress CIDR '{}' is not in address/prefix form",
                self.ingress_cidr
            )));
        }

        Ok(())
    }
}

/// Teardown options
#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownOptions {
    /// Poll until the cluster is gone before removing the role
    pub wait_for_deletion: bool,
}

/// Persisted state next to what the control plane reports right now
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub state: ProvisioningState,

    /// Live role ARN, `None` when the role does not exist
    pub role_arn: Option<String>,

    /// Live cluster description, `None` when the cluster does not exist
    pub cluster: Option<ClusterDescription>,
}

impl EnvironmentStatus {
    pub fn cluster_status(&self) -> ClusterStatus {
        self.cluster
            .as_ref()
            .map(|c| c.status)
            .unwrap_or(ClusterStatus::Absent)
    }

    /// Best estimate of the phase reached.
    ///
    /// Policy attachments are not read back, so an existing role without a
    /// cluster reports `RoleReady`.
    pub fn phase(&self) -> ProvisionPhase {
        match (self.role_arn.is_some(), self.cluster_status()) {
            (_, ClusterStatus::Available) if self.state.security_group_id().is_some() => {
                ProvisionPhase::NetworkOpen
            }
            (_, ClusterStatus::Available) => ProvisionPhase::ClusterAvailable,
            (_, ClusterStatus::Creating) => ProvisionPhase::ClusterCreating,
            (true, _) => ProvisionPhase::RoleReady,
            (false, _) => ProvisionPhase::Absent,
        }
    }
}

/// Step log shared by both protocols
struct Recorder<'a> {
    cluster: &'a str,
    role: &'a str,
    steps: Vec<StepRecord>,
}

impl<'a> Recorder<'a> {
    fn new(env: &'a EnvironmentSpec) -> Self {
        Self {
            cluster: &env.cluster.identifier,
            role: &env.role.name,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Failed(_) => tracing::warn!(
                step = %step,
                cluster = %self.cluster,
                role = %self.role,
                outcome = %outcome,
                "Step failed"
            ),
            _ => tracing::info!(
                step = %step,
                cluster = %self.cluster,
                role = %self.role,
                outcome = %outcome,
                "Step finished"
            ),
        }
        self.steps.push(StepRecord { step, outcome });
    }

    fn ensured(&mut self, step: Step, ensured: Ensured) {
        self.record(step, outcome_of(ensured));
    }

    /// Record a best-effort step, turning an error into a `Failed` outcome
    fn attempt(&mut self, step: Step, result: Result<Ensured>) -> bool {
        match result {
            Ok(ensured) => {
                self.ensured(step, ensured);
                true
            }
            Err(err) => {
                self.record(step, StepOutcome::Failed(err.to_string()));
                false
            }
        }
    }
}

fn outcome_of(ensured: Ensured) -> StepOutcome {
    match ensured {
        Ensured::Applied => StepOutcome::Applied,
        Ensured::AlreadyInDesiredState => StepOutcome::AlreadyInDesiredState,
    }
}

fn changed(applied: bool) -> Ensured {
    if applied {
        Ensured::Applied
    } else {
        Ensured::AlreadyInDesiredState
    }
}

/// Drives one cluster environment through its lifecycle
pub struct Orchestrator {
    plane: ControlPlane,
    store: Arc<dyn StateStore>,
    env: EnvironmentSpec,
    wait: WaitConfig,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(plane: ControlPlane, store: Arc<dyn StateStore>, env: EnvironmentSpec) -> Self {
        Self {
            plane,
            store,
            env,
            wait: WaitConfig::default(),
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Token observed between polls of every wait
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn environment(&self) -> &EnvironmentSpec {
        &self.env
    }

    fn ops(&self) -> ResourceOps<'_> {
        ResourceOps::new(&self.plane, self.retry.clone())
    }

    fn waiter(&self) -> Waiter {
        Waiter::new(self.wait.clone(), self.cancel.clone())
    }

    /// Run the provisioning protocol.
    ///
    /// Stops at the first fatal error without rolling back; everything
    /// confirmed so far stays persisted and the next run resumes from it.
    pub async fn provision(&self) -> Result<ProvisionReport> {
        let started = Instant::now();
        let env = &self.env;

        if let Err(err) = env.validate() {
            tracing::error!(step = %Step::ValidateConfig, error = %err, "Invalid configuration");
            return Err(err);
        }

        let ops = self.ops();
        let mut rec = Recorder::new(env);
        let mut state = self.store.load().await?;
        state.cluster_identifier = env.cluster.identifier.clone();

        tracing::info!(
            cluster = %env.cluster.identifier,
            role = %env.role.name,
            "Provisioning cluster environment"
        );

        // Access role
        let (role_arn, ensured) = ops.ensure_role(&env.role).await?;
        rec.ensured(Step::CreateRole, ensured);

        let ensured = ops
            .ensure_policy_attached(&env.role.name, &env.role.policy_arn)
            .await?;
        rec.ensured(Step::AttachPolicy, ensured);

        let stale = state.role_arn() != Some(role_arn.as_str());
        if stale {
            if let Some(previous) = state.role_arn() {
                tracing::debug!(
                    previous = %previous,
                    current = %role_arn,
                    "Replacing stale role ARN"
                );
            }
            state.set_role_arn(&role_arn);
            self.store.save(&state).await?;
        }
        rec.ensured(Step::PersistRoleArn, changed(stale));

        // Cluster
        let ensured = ops.ensure_cluster(&env.cluster, &role_arn).await?;
        rec.ensured(Step::CreateCluster, ensured);
        if ensured == Ensured::Applied {
            state.set_status(ClusterStatus::Creating);
            self.store.save(&state).await?;
        }

        let (cluster, polls) = self.wait_available(&ops, &mut state).await?;
        rec.ensured(Step::WaitAvailable, changed(polls > 1));

        let endpoint = cluster
            .endpoint()
            .cloned()
            .ok_or_else(|| ProvisionError::FatalRemote {
                step: Step::PersistEndpoint,
                source: RemoteError::new(
                    RemoteErrorKind::Other,
                    format!(
                        "cluster {} is available but reports no endpoint",
                        cluster.identifier
                    ),
                ),
            })?;
        let stale = state.endpoint() != Some(endpoint.address.as_str())
            || state.port != Some(endpoint.port)
            || state.last_status != Some(ClusterStatus::Available);
        if stale {
            state.set_endpoint(&endpoint.address, endpoint.port);
            state.set_status(ClusterStatus::Available);
            self.store.save(&state).await?;
        }
        rec.ensured(Step::PersistEndpoint, changed(stale));

        // Network ingress, against the group of the VPC the cluster reports
        let vpc_id = cluster.vpc_id.clone().ok_or_else(|| ProvisionError::FatalRemote {
            step: Step::DescribeNetwork,
            source: RemoteError::not_found(format!(
                "cluster {} reports no VPC",
                cluster.identifier
            )),
        })?;
        let group = ops.default_security_group(&vpc_id).await?;
        let rule = IngressRule::tcp(&group.group_id, endpoint.port, &env.ingress_cidr);

        match ops.ensure_ingress_rule(&rule).await? {
            Ensured::Applied => rec.record(Step::AuthorizeIngress, StepOutcome::Applied),
            Ensured::AlreadyInDesiredState => rec.record(
                Step::AuthorizeIngress,
                StepOutcome::Warning(format!("ingress rule {} already authorized", rule)),
            ),
        }

        if state.vpc_id() != Some(vpc_id.as_str())
            || state.security_group_id() != Some(group.group_id.as_str())
        {
            state.set_network(&vpc_id, &group.group_id);
            self.store.save(&state).await?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            cluster = %env.cluster.identifier,
            endpoint = %endpoint.address,
            port = endpoint.port,
            duration_ms = duration_ms,
            "Cluster environment ready"
        );

        Ok(ProvisionReport {
            steps: rec.steps,
            phase: ProvisionPhase::NetworkOpen,
            state,
            duration_ms,
        })
    }

    /// Wait for the cluster to become available; returns it with the poll count
    async fn wait_available(
        &self,
        ops: &ResourceOps<'_>,
        state: &mut ProvisioningState,
    ) -> Result<(ClusterDescription, u32)> {
        let identifier = self.env.cluster.identifier.as_str();
        let clusters = self.plane.clusters.as_ref();

        let outcome = self
            .waiter()
            .wait_until(identifier, WaitGoal::Condition, move || async move {
                clusters
                    .describe_cluster(identifier)
                    .await
                    .map(|cluster| match cluster.status {
                        ClusterStatus::Available => Probe::Ready(cluster),
                        ClusterStatus::Creating => Probe::Pending(cluster),
                        ClusterStatus::Deleting | ClusterStatus::Failed | ClusterStatus::Absent => {
                            Probe::Failed(cluster)
                        }
                    })
            })
            .await;

        match outcome {
            WaitOutcome::Ready {
                status: Some(cluster),
                polls,
                ..
            } => Ok((cluster, polls)),
            WaitOutcome::Ready { status: None, .. } => Err(ProvisionError::TerminalStatus {
                step: Step::WaitAvailable,
                status: ClusterStatus::Absent.to_string(),
            }),
            WaitOutcome::TimedOut {
                last_status,
                elapsed,
                ..
            } => {
                // Without an observed status the stored one is still the best record
                let last = match last_status {
                    Some(cluster) => {
                        state.set_status(cluster.status);
                        self.store.save(state).await?;
                        cluster.raw_status
                    }
                    None => "unknown".to_string(),
                };
                Err(ProvisionError::TimedOut {
                    step: Step::WaitAvailable,
                    waited: elapsed,
                    last_status: last,
                })
            }
            WaitOutcome::ObservedTerminalFailure { status, .. } => {
                // Record where the cluster ended up, if it can still be read
                if let Ok(Some(cluster)) = ops.describe_cluster(identifier).await {
                    state.set_status(cluster.status);
                    self.store.save(state).await?;
                }
                Err(ProvisionError::TerminalStatus {
                    step: Step::WaitAvailable,
                    status,
                })
            }
            WaitOutcome::Cancelled { .. } => {
                self.store.save(state).await?;
                Err(ProvisionError::Cancelled {
                    step: Step::WaitAvailable,
                })
            }
        }
    }

    /// Run the teardown protocol.
    ///
    /// Best-effort: a failing step is recorded and the remaining steps still
    /// run. Only a state file that cannot be read aborts the run.
    pub async fn teardown(&self, options: TeardownOptions) -> Result<TeardownReport> {
        let started = Instant::now();
        let env = &self.env;
        let identifier = env.cluster.identifier.as_str();
        let ops = self.ops();
        let mut rec = Recorder::new(env);
        let mut state = self.store.load().await?;

        tracing::info!(
            cluster = %identifier,
            role = %env.role.name,
            "Tearing down cluster environment"
        );

        // Stored identifiers are hints; the live description wins when readable
        let cluster = match ops.describe_cluster(identifier).await {
            Ok(cluster) => Some(cluster),
            Err(err) => {
                rec.record(Step::DescribeCluster, StepOutcome::Failed(err.to_string()));
                None
            }
        };

        // Ingress rule: the live default group of the cluster's VPC, plus any stored one
        let mut groups: Vec<String> = Vec::new();
        // The stored record is only dropped once the live group was checked too
        let mut live_checked = cluster.is_some();
        let vpc_id = cluster
            .as_ref()
            .and_then(|c| c.as_ref())
            .and_then(|c| c.vpc_id.clone());
        if let Some(vpc_id) = vpc_id {
            match ops.default_security_group(&vpc_id).await {
                Ok(group) => groups.push(group.group_id),
                Err(err) => {
                    live_checked = false;
                    rec.record(Step::DescribeNetwork, StepOutcome::Failed(err.to_string()));
                }
            }
        }
        if let Some(stored) = state.security_group_id()
            && !groups.iter().any(|g| g == stored)
        {
            groups.push(stored.to_string());
        }

        if groups.is_empty() {
            rec.record(
                Step::RevokeIngress,
                StepOutcome::Skipped("no security group known".to_string()),
            );
        } else {
            let port = state.port.unwrap_or(env.cluster.port);
            let mut revoked = live_checked;
            for group_id in groups {
                let rule = IngressRule::tcp(group_id, port, &env.ingress_cidr);
                revoked &= rec.attempt(Step::RevokeIngress, ops.revoke_ingress_rule(&rule).await);
            }
            if revoked && state.security_group_id().is_some() {
                state.clear_network();
                self.save_best_effort(&mut rec, Step::RevokeIngress, &state).await;
            }
        }

        // Cluster
        let (deleted, gone) = match &cluster {
            Some(None) => {
                rec.record(Step::DeleteCluster, StepOutcome::AlreadyInDesiredState);
                (true, true)
            }
            Some(Some(c)) if c.status == ClusterStatus::Deleting => {
                rec.record(Step::DeleteCluster, StepOutcome::AlreadyInDesiredState);
                (true, false)
            }
            _ => (
                rec.attempt(Step::DeleteCluster, ops.delete_cluster(identifier).await),
                false,
            ),
        };

        // The endpoint record stays valid while the cluster still runs
        if deleted {
            let had_endpoint = state.endpoint().is_some() || state.port.is_some();
            if had_endpoint {
                state.clear_endpoint();
            }
            let next_status = if gone {
                ClusterStatus::Absent
            } else {
                ClusterStatus::Deleting
            };
            let status_changed = state.last_status != Some(next_status);
            if status_changed {
                state.set_status(next_status);
            }
            if had_endpoint || status_changed {
                if self.save_best_effort(&mut rec, Step::ClearEndpoint, &state).await {
                    rec.ensured(Step::ClearEndpoint, changed(had_endpoint));
                }
            } else {
                rec.ensured(Step::ClearEndpoint, Ensured::AlreadyInDesiredState);
            }
        } else {
            rec.record(
                Step::ClearEndpoint,
                StepOutcome::Skipped("cluster was not deleted".to_string()),
            );
        }

        if options.wait_for_deletion && deleted && !gone {
            let outcome = self.wait_deleted(identifier).await;
            let completed = outcome == StepOutcome::Applied;
            rec.record(Step::WaitDeleted, outcome);
            if completed {
                state.set_status(ClusterStatus::Absent);
                self.save_best_effort(&mut rec, Step::WaitDeleted, &state).await;
            }
        }

        // Role
        rec.attempt(
            Step::DetachPolicy,
            ops.detach_policy(&env.role.name, &env.role.policy_arn).await,
        );
        let role_deleted = rec.attempt(Step::DeleteRole, ops.delete_role(&env.role.name).await);

        if role_deleted {
            let had_arn = state.role_arn().is_some();
            if had_arn {
                state.clear_role_arn();
                if self.save_best_effort(&mut rec, Step::ClearRoleArn, &state).await {
                    rec.ensured(Step::ClearRoleArn, Ensured::Applied);
                }
            } else {
                rec.ensured(Step::ClearRoleArn, Ensured::AlreadyInDesiredState);
            }
        } else {
            rec.record(
                Step::ClearRoleArn,
                StepOutcome::Skipped("role still exists".to_string()),
            );
        }

        let report = TeardownReport {
            steps: rec.steps,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            cluster = %identifier,
            summary = %report.summary(),
            duration_ms = report.duration_ms,
            "Teardown finished"
        );
        Ok(report)
    }

    async fn wait_deleted(&self, identifier: &str) -> StepOutcome {
        let clusters = self.plane.clusters.as_ref();

        let outcome = self
            .waiter()
            .wait_until(identifier, WaitGoal::Deletion, move || async move {
                clusters
                    .describe_cluster(identifier)
                    .await
                    .map(|cluster| Probe::Pending(cluster.raw_status))
            })
            .await;

        match outcome {
            WaitOutcome::Ready { .. } => StepOutcome::Applied,
            WaitOutcome::TimedOut {
                last_status,
                elapsed,
                ..
            } => StepOutcome::Failed(format!(
                "still {} after {}s",
                last_status.unwrap_or_else(|| "unknown".to_string()),
                elapsed.as_secs()
            )),
            WaitOutcome::ObservedTerminalFailure { status, .. } => StepOutcome::Failed(status),
            WaitOutcome::Cancelled { .. } => StepOutcome::Failed("cancelled".to_string()),
        }
    }

    /// Save during teardown; a failure is recorded against `step`
    async fn save_best_effort(
        &self,
        rec: &mut Recorder<'_>,
        step: Step,
        state: &ProvisioningState,
    ) -> bool {
        match self.store.save(state).await {
            Ok(()) => true,
            Err(err) => {
                rec.record(step, StepOutcome::Failed(err.to_string()));
                false
            }
        }
    }

    /// Persisted state plus a live read of the role and the cluster
    pub async fn status(&self) -> Result<EnvironmentStatus> {
        let ops = self.ops();
        let state = self.store.load().await?;
        let role_arn = ops.find_role(&self.env.role.name).await?;
        let cluster = ops.describe_cluster(&self.env.cluster.identifier).await?;

        Ok(EnvironmentStatus {
            state,
            role_arn,
            cluster,
        })
    }
}
