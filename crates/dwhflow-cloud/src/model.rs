//! Resource model: access role, ingress rule and cluster

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};

/// Managed policy granting the cluster read access to S3
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the access role
pub const REDSHIFT_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// Identity granted to the cluster to reach external storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRole {
    /// Role name, unique per account
    pub name: String,

    pub path: String,

    pub description: String,

    /// Service principal trusted to assume this role
    pub trusted_service: String,

    /// Managed policy attached after creation
    pub policy_arn: String,
}

impl AccessRole {
    /// Role assumable by Redshift with S3 read-only access
    pub fn for_redshift(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
            description: ROLE_DESCRIPTION.to_string(),
            trusted_service: REDSHIFT_SERVICE_PRINCIPAL.to_string(),
            policy_arn: S3_READ_ONLY_POLICY_ARN.to_string(),
        }
    }

    pub fn with_policy(mut self, policy_arn: impl Into<String>) -> Self {
        self.policy_arn = policy_arn.into();
        self
    }

    /// The single trust policy document of the role
    pub fn trust_policy_document(&self) -> String {
        serde_json::json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": self.trusted_service },
            }],
            "Version": "2012-10-17",
        })
        .to_string()
    }
}

/// Network rule allowing client traffic to reach the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    /// Owning security group
    pub group_id: String,
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl IngressRule {
    /// Single-port TCP rule
    pub fn tcp(group_id: impl Into<String>, port: u16, cidr: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr: cidr.into(),
        }
    }
}

impl std::fmt::Display for IngressRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}-{} from {}",
            self.group_id, self.protocol, self.from_port, self.to_port, self.cidr
        )
    }
}

/// Security group owning the ingress rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterType {
    SingleNode,
    MultiNode,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::SingleNode => "single-node",
            ClusterType::MultiNode => "multi-node",
        }
    }
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-node" => Ok(ClusterType::SingleNode),
            "multi-node" => Ok(ClusterType::MultiNode),
            other => Err(ProvisionError::Configuration(format!(
                "unknown cluster type '{}' (expected single-node or multi-node)",
                other
            ))),
        }
    }
}

/// Desired shape of the compute cluster
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Unique per account/region
    pub identifier: String,
    pub cluster_type: ClusterType,
    pub node_type: String,
    pub node_count: u32,
    pub db_name: String,
    pub master_username: String,
    pub master_password: String,
    pub port: u16,
}

impl std::fmt::Debug for ClusterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSpec")
            .field("identifier", &self.identifier)
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("node_count", &self.node_count)
            .field("db_name", &self.db_name)
            .field("master_username", &self.master_username)
            .field("master_password", &"********")
            .field("port", &self.port)
            .finish()
    }
}

/// Cluster creation request: the cluster definition plus the resolved role ARN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateClusterRequest<'a> {
    pub spec: &'a ClusterSpec,
    pub iam_role_arn: &'a str,
}

/// Lifecycle status of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Creating,
    Available,
    Deleting,
    Failed,
    Absent,
}

impl ClusterStatus {
    /// Map a raw control-plane status string.
    ///
    /// Intermediate states that are neither usable nor terminal (modifying,
    /// rebooting, resizing, ...) map to `Creating`: the cluster exists but is
    /// not ready yet.
    pub fn from_remote(raw: &str) -> Self {
        match raw {
            "available" => ClusterStatus::Available,
            "deleting" | "final-snapshot" => ClusterStatus::Deleting,
            "hardware-failure"
            | "incompatible-hsm"
            | "incompatible-network"
            | "incompatible-parameters"
            | "incompatible-restore"
            | "storage-full"
            | "failed" => ClusterStatus::Failed,
            _ => ClusterStatus::Creating,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Creating => "creating",
            ClusterStatus::Available => "available",
            ClusterStatus::Deleting => "deleting",
            ClusterStatus::Failed => "failed",
            ClusterStatus::Absent => "absent",
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Cluster as reported by a describe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub identifier: String,
    pub status: ClusterStatus,

    /// Status string exactly as the control plane reported it
    pub raw_status: String,

    pub node_type: String,
    pub node_count: u32,
    pub db_name: String,
    pub master_username: String,
    pub vpc_id: Option<String>,
    pub iam_role_arns: Vec<String>,

    endpoint: Option<Endpoint>,
}

impl ClusterDescription {
    pub fn new(identifier: impl Into<String>, raw_status: impl Into<String>) -> Self {
        let raw_status = raw_status.into();
        Self {
            identifier: identifier.into(),
            status: ClusterStatus::from_remote(&raw_status),
            raw_status,
            node_type: String::new(),
            node_count: 0,
            db_name: String::new(),
            master_username: String::new(),
            vpc_id: None,
            iam_role_arns: Vec::new(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_vpc(mut self, vpc_id: impl Into<String>) -> Self {
        self.vpc_id = Some(vpc_id.into());
        self
    }

    /// Endpoint of the cluster; undefined unless the cluster is available
    pub fn endpoint(&self) -> Option<&Endpoint> {
        if self.status == ClusterStatus::Available {
            self.endpoint.as_ref()
        } else {
            None
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ClusterStatus::Available
    }
}

impl std::fmt::Display for ClusterDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.identifier, self.raw_status)
    }
}
