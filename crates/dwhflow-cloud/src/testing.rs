//! In-memory control plane for tests
//!
//! `FakeCloud` implements all three Resource Client traits against a single
//! in-process account. It reports the same error kinds a real adapter would
//! (already-exists on re-create, not-found on missing deletes, duplicate on a
//! repeated ingress grant), records every call, and can be scripted to fail
//! the next call of a given method.

use crate::error::{RemoteError, RemoteErrorKind};
use crate::model::{
    AccessRole, ClusterDescription, ClusterSpec, ClusterType, CreateClusterRequest, Endpoint,
    IngressRule, SecurityGroup,
};
use crate::provider::{ClusterAdmin, ControlPlane, NetworkAdmin, RemoteResult, RoleAdmin};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const FAKE_ACCOUNT: &str = "123456789012";
pub const FAKE_VPC: &str = "vpc-0fake";
pub const FAKE_SECURITY_GROUP: &str = "sg-0fake";

/// Remote method, used for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    CreateRole,
    DeleteRole,
    AttachPolicy,
    DetachPolicy,
    GetRole,
    DescribeSecurityGroup,
    AuthorizeIngress,
    RevokeIngress,
    CreateCluster,
    DeleteCluster,
    DescribeCluster,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: Method,
    /// Role name, cluster identifier, rule or VPC the call targeted
    pub target: String,
}

/// A create-cluster request exactly as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCluster {
    pub spec: ClusterSpec,
    pub iam_role_arn: String,
}

struct FakeCluster {
    spec: ClusterSpec,
    iam_role_arn: String,
    raw_status: String,
    /// Describes left before the current transitional status settles
    remaining: u32,
}

struct Account {
    roles: HashMap<String, String>,
    attached: HashMap<String, Vec<String>>,
    rules: Vec<IngressRule>,
    clusters: HashMap<String, FakeCluster>,
    created: Vec<CreatedCluster>,
    calls: Vec<Call>,
    failures: HashMap<Method, VecDeque<RemoteError>>,
    creation_polls: u32,
    deletion_polls: u32,
    settles_as: String,
}

/// In-memory account implementing every Resource Client
pub struct FakeCloud {
    account: Mutex<Account>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            account: Mutex::new(Account {
                roles: HashMap::new(),
                attached: HashMap::new(),
                rules: Vec::new(),
                clusters: HashMap::new(),
                created: Vec::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                creation_polls: 2,
                deletion_polls: 1,
                settles_as: "available".to_string(),
            }),
        })
    }

    /// Control plane whose three clients all point at this account
    pub fn control_plane(self: &Arc<Self>) -> ControlPlane {
        ControlPlane::new(self.clone(), self.clone(), self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Account> {
        self.account.lock().unwrap()
    }

    /// Fail the next call of `method` with `err`; repeated calls queue up
    pub fn fail_next(&self, method: Method, err: RemoteError) {
        self.lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(err);
    }

    /// Number of describes that report `creating` before a new cluster is available
    pub fn set_creation_polls(&self, polls: u32) {
        self.lock().creation_polls = polls;
    }

    /// Raw status a creating cluster reports once its creating polls run out
    pub fn set_creation_outcome(&self, raw_status: &str) {
        self.lock().settles_as = raw_status.to_string();
    }

    /// Number of describes that report `deleting` before a cluster disappears
    pub fn set_deletion_polls(&self, polls: u32) {
        self.lock().deletion_polls = polls;
    }

    /// Put a cluster in the account with a fixed raw status
    pub fn seed_cluster(&self, spec: &ClusterSpec, raw_status: &str) {
        let mut account = self.lock();
        let remaining = match raw_status {
            "creating" => account.creation_polls,
            "deleting" => account.deletion_polls,
            _ => 0,
        };
        account.clusters.insert(
            spec.identifier.clone(),
            FakeCluster {
                spec: spec.clone(),
                iam_role_arn: String::new(),
                raw_status: raw_status.to_string(),
                remaining,
            },
        );
    }

    /// Put a role in the account, returning its ARN
    pub fn seed_role(&self, name: &str) -> String {
        let arn = role_arn(name);
        self.lock().roles.insert(name.to_string(), arn.clone());
        arn
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Index of the first call of `method`
    pub fn first_call(&self, method: Method) -> Option<usize> {
        self.lock().calls.iter().position(|c| c.method == method)
    }

    /// Index of the last call of `method`
    pub fn last_call(&self, method: Method) -> Option<usize> {
        self.lock().calls.iter().rposition(|c| c.method == method)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.lock().roles.contains_key(name)
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
        self.lock()
            .attached
            .get(role_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ingress_rules(&self) -> Vec<IngressRule> {
        self.lock().rules.clone()
    }

    pub fn cluster_status(&self, identifier: &str) -> Option<String> {
        self.lock()
            .clusters
            .get(identifier)
            .map(|c| c.raw_status.clone())
    }

    pub fn created_clusters(&self) -> Vec<CreatedCluster> {
        self.lock().created.clone()
    }

    /// Record the call and pop a scripted failure, if any
    fn enter(
        &self,
        method: Method,
        target: impl Into<String>,
    ) -> RemoteResult<MutexGuard<'_, Account>> {
        let mut account = self.lock();
        account.calls.push(Call {
            method,
            target: target.into(),
        });
        if let Some(err) = account
            .failures
            .get_mut(&method)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }
        Ok(account)
    }
}

fn role_arn(name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", FAKE_ACCOUNT, name)
}

fn no_such_entity(what: &str) -> RemoteError {
    RemoteError::not_found(format!("The {} cannot be found.", what)).with_code("NoSuchEntity")
}

#[async_trait]
impl RoleAdmin for FakeCloud {
    async fn create_role(&self, role: &AccessRole) -> RemoteResult<String> {
        let mut account = self.enter(Method::CreateRole, &role.name)?;
        if account.roles.contains_key(&role.name) {
            return Err(RemoteError::already_exists(format!(
                "Role with name {} already exists.",
                role.name
            ))
            .with_code("EntityAlreadyExists"));
        }
        let arn = role_arn(&role.name);
        account.roles.insert(role.name.clone(), arn.clone());
        Ok(arn)
    }

    async fn delete_role(&self, role_name: &str) -> RemoteResult<()> {
        let mut account = self.enter(Method::DeleteRole, role_name)?;
        if !account.roles.contains_key(role_name) {
            return Err(no_such_entity(&format!("role with name {}", role_name)));
        }
        if account
            .attached
            .get(role_name)
            .is_some_and(|policies| !policies.is_empty())
        {
            return Err(RemoteError::new(
                RemoteErrorKind::InvalidState,
                "Cannot delete entity, must detach all policies first.",
            )
            .with_code("DeleteConflict"));
        }
        account.roles.remove(role_name);
        account.attached.remove(role_name);
        Ok(())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        let mut account = self.enter(Method::AttachPolicy, role_name)?;
        if !account.roles.contains_key(role_name) {
            return Err(no_such_entity(&format!("role with name {}", role_name)));
        }
        let policies = account.attached.entry(role_name.to_string()).or_default();
        if !policies.iter().any(|p| p == policy_arn) {
            policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        let mut account = self.enter(Method::DetachPolicy, role_name)?;
        let policies = account
            .attached
            .get_mut(role_name)
            .ok_or_else(|| no_such_entity(&format!("role with name {}", role_name)))?;
        let before = policies.len();
        policies.retain(|p| p != policy_arn);
        if policies.len() == before {
            return Err(no_such_entity(&format!("policy {}", policy_arn)));
        }
        Ok(())
    }

    async fn get_role(&self, role_name: &str) -> RemoteResult<String> {
        let account = self.enter(Method::GetRole, role_name)?;
        account
            .roles
            .get(role_name)
            .cloned()
            .ok_or_else(|| no_such_entity(&format!("role with name {}", role_name)))
    }
}

#[async_trait]
impl NetworkAdmin for FakeCloud {
    async fn describe_default_security_group(&self, vpc_id: &str) -> RemoteResult<SecurityGroup> {
        let _account = self.enter(Method::DescribeSecurityGroup, vpc_id)?;
        if vpc_id != FAKE_VPC {
            return Err(RemoteError::not_found(format!(
                "The vpc ID '{}' does not exist",
                vpc_id
            ))
            .with_code("InvalidVpcID.NotFound"));
        }
        Ok(SecurityGroup {
            group_id: FAKE_SECURITY_GROUP.to_string(),
            group_name: "default".to_string(),
            vpc_id: FAKE_VPC.to_string(),
        })
    }

    async fn authorize_ingress(&self, rule: &IngressRule) -> RemoteResult<()> {
        let mut account = self.enter(Method::AuthorizeIngress, rule.to_string())?;
        if account.rules.contains(rule) {
            return Err(RemoteError::new(
                RemoteErrorKind::Duplicate,
                format!("the specified rule \"{}\" already exists", rule),
            )
            .with_code("InvalidPermission.Duplicate"));
        }
        account.rules.push(rule.clone());
        Ok(())
    }

    async fn revoke_ingress(&self, rule: &IngressRule) -> RemoteResult<()> {
        let mut account = self.enter(Method::RevokeIngress, rule.to_string())?;
        let before = account.rules.len();
        account.rules.retain(|r| r != rule);
        if account.rules.len() == before {
            return Err(RemoteError::not_found(format!(
                "The specified rule does not exist in this security group: {}",
                rule
            ))
            .with_code("InvalidPermission.NotFound"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterAdmin for FakeCloud {
    async fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> RemoteResult<()> {
        let mut account = self.enter(Method::CreateCluster, &request.spec.identifier)?;
        if account.clusters.contains_key(&request.spec.identifier) {
            return Err(RemoteError::already_exists("Cluster already exists")
                .with_code("ClusterAlreadyExists"));
        }
        let remaining = account.creation_polls;
        account.created.push(CreatedCluster {
            spec: request.spec.clone(),
            iam_role_arn: request.iam_role_arn.to_string(),
        });
        account.clusters.insert(
            request.spec.identifier.clone(),
            FakeCluster {
                spec: request.spec.clone(),
                iam_role_arn: request.iam_role_arn.to_string(),
                raw_status: "creating".to_string(),
                remaining,
            },
        );
        Ok(())
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        _skip_final_snapshot: bool,
    ) -> RemoteResult<()> {
        let mut account = self.enter(Method::DeleteCluster, identifier)?;
        let deletion_polls = account.deletion_polls;
        let cluster = account.clusters.get_mut(identifier).ok_or_else(|| {
            RemoteError::not_found(format!("Cluster {} not found.", identifier))
                .with_code("ClusterNotFound")
        })?;
        if cluster.raw_status == "deleting" {
            return Err(RemoteError::new(
                RemoteErrorKind::InvalidState,
                format!("There is an operation running on the Cluster {}.", identifier),
            )
            .with_code("InvalidClusterState"));
        }
        cluster.raw_status = "deleting".to_string();
        cluster.remaining = deletion_polls;
        Ok(())
    }

    async fn describe_cluster(&self, identifier: &str) -> RemoteResult<ClusterDescription> {
        let mut account = self.enter(Method::DescribeCluster, identifier)?;
        let not_found = || {
            RemoteError::not_found(format!("Cluster {} not found.", identifier))
                .with_code("ClusterNotFound")
        };

        let settles_as = account.settles_as.clone();
        let cluster = account.clusters.get_mut(identifier).ok_or_else(not_found)?;
        let status = cluster.raw_status.clone();
        match (status.as_str(), cluster.remaining) {
            ("creating", 0) => cluster.raw_status = settles_as,
            ("deleting", 0) => {
                account.clusters.remove(identifier);
                return Err(not_found());
            }
            ("creating" | "deleting", _) => cluster.remaining -= 1,
            _ => {}
        }

        let mut description = ClusterDescription::new(identifier, cluster.raw_status.clone())
            .with_vpc(FAKE_VPC)
            .with_endpoint(Endpoint {
                address: format!("{}.cfake.us-west-2.redshift.amazonaws.com", identifier),
                port: cluster.spec.port,
            });
        description.node_type = cluster.spec.node_type.clone();
        description.node_count = cluster.spec.node_count;
        description.db_name = cluster.spec.db_name.clone();
        description.master_username = cluster.spec.master_username.clone();
        if !cluster.iam_role_arn.is_empty() {
            description.iam_role_arns = vec![cluster.iam_role_arn.clone()];
        }
        Ok(description)
    }
}

/// Four-node dc2.large cluster listening on 5439
pub fn sample_cluster_spec() -> ClusterSpec {
    ClusterSpec {
        identifier: "dwhcluster".to_string(),
        cluster_type: ClusterType::MultiNode,
        node_type: "dc2.large".to_string(),
        node_count: 4,
        db_name: "dwh".to_string(),
        master_username: "dwhuser".to_string(),
        master_password: "Passw0rd".to_string(),
        port: 5439,
    }
}

/// The sample cluster behind the `dwhRole` role, open to the world
pub fn sample_environment() -> crate::orchestrator::EnvironmentSpec {
    crate::orchestrator::EnvironmentSpec {
        role: AccessRole::for_redshift("dwhRole"),
        cluster: sample_cluster_spec(),
        ingress_cidr: "0.0.0.0/0".to_string(),
    }
}
