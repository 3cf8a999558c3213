//! Redshift cluster management

use crate::error::remote_error;
use async_trait::async_trait;
use aws_sdk_redshift::types::Cluster;
use dwhflow_cloud::{
    ClusterAdmin, ClusterDescription, ClusterSpec, ClusterType, CreateClusterRequest, Endpoint,
    RemoteError, RemoteResult,
};

/// Cluster administration through the Redshift API
#[derive(Clone)]
pub struct RedshiftClusterAdmin {
    client: aws_sdk_redshift::Client,
}

impl RedshiftClusterAdmin {
    pub fn new(client: aws_sdk_redshift::Client) -> Self {
        Self { client }
    }
}

/// `NumberOfNodes` is only accepted for multi-node clusters
pub(crate) fn number_of_nodes(spec: &ClusterSpec) -> Option<i32> {
    match spec.cluster_type {
        ClusterType::MultiNode => Some(i32::try_from(spec.node_count).unwrap_or(i32::MAX)),
        ClusterType::SingleNode => None,
    }
}

/// Translate a Redshift cluster into the control-plane neutral description
pub(crate) fn describe_from_cluster(identifier: &str, cluster: &Cluster) -> ClusterDescription {
    let raw_status = cluster.cluster_status().unwrap_or("unknown");
    let mut description = ClusterDescription::new(
        cluster.cluster_identifier().unwrap_or(identifier),
        raw_status,
    );

    description.node_type = cluster.node_type().unwrap_or_default().to_string();
    description.node_count = cluster
        .number_of_nodes()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    description.db_name = cluster.db_name().unwrap_or_default().to_string();
    description.master_username = cluster.master_username().unwrap_or_default().to_string();
    description.iam_role_arns = cluster
        .iam_roles()
        .iter()
        .filter_map(|r| r.iam_role_arn().map(str::to_string))
        .collect();

    if let Some(vpc_id) = cluster.vpc_id() {
        description = description.with_vpc(vpc_id);
    }

    let endpoint = cluster.endpoint().and_then(|e| {
        let address = e.address()?;
        let port = u16::try_from(e.port()?).ok()?;
        Some(Endpoint {
            address: address.to_string(),
            port,
        })
    });
    if let Some(endpoint) = endpoint {
        description = description.with_endpoint(endpoint);
    }

    description
}

#[async_trait]
impl ClusterAdmin for RedshiftClusterAdmin {
    async fn create_cluster(&self, request: &CreateClusterRequest<'_>) -> RemoteResult<()> {
        let spec = request.spec;
        tracing::debug!(
            cluster = %spec.identifier,
            node_type = %spec.node_type,
            nodes = spec.node_count,
            "redshift:CreateCluster"
        );

        self.client
            .create_cluster()
            .cluster_identifier(&spec.identifier)
            .cluster_type(spec.cluster_type.as_str())
            .node_type(&spec.node_type)
            .set_number_of_nodes(number_of_nodes(spec))
            .db_name(&spec.db_name)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .port(i32::from(spec.port))
            .iam_roles(request.iam_role_arn)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> RemoteResult<()> {
        tracing::debug!(cluster = %identifier, skip_final_snapshot, "redshift:DeleteCluster");

        self.client
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn describe_cluster(&self, identifier: &str) -> RemoteResult<ClusterDescription> {
        let output = self
            .client
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
            .map_err(remote_error)?;

        output
            .clusters()
            .first()
            .map(|cluster| describe_from_cluster(identifier, cluster))
            .ok_or_else(|| {
                RemoteError::not_found(format!("Cluster {} not found.", identifier))
                    .with_code("ClusterNotFound")
            })
    }
}
