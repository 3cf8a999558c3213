//! EC2 security-group ingress

use crate::error::remote_error;
use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, IpPermission, IpRange};
use dwhflow_cloud::{IngressRule, NetworkAdmin, RemoteError, RemoteResult, SecurityGroup};

const DEFAULT_GROUP_NAME: &str = "default";

/// Security-group administration through the EC2 API
#[derive(Clone)]
pub struct Ec2NetworkAdmin {
    client: aws_sdk_ec2::Client,
}

impl Ec2NetworkAdmin {
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }
}

/// The single permission described by an ingress rule
pub(crate) fn ip_permission(rule: &IngressRule) -> IpPermission {
    IpPermission::builder()
        .ip_protocol(&rule.protocol)
        .from_port(i32::from(rule.from_port))
        .to_port(i32::from(rule.to_port))
        .ip_ranges(IpRange::builder().cidr_ip(&rule.cidr).build())
        .build()
}

#[async_trait]
impl NetworkAdmin for Ec2NetworkAdmin {
    async fn describe_default_security_group(&self, vpc_id: &str) -> RemoteResult<SecurityGroup> {
        let output = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .filters(
                Filter::builder()
                    .name("group-name")
                    .values(DEFAULT_GROUP_NAME)
                    .build(),
            )
            .send()
            .await
            .map_err(remote_error)?;

        let group = output
            .security_groups()
            .iter()
            .find_map(|g| {
                g.group_id().map(|id| SecurityGroup {
                    group_id: id.to_string(),
                    group_name: g.group_name().unwrap_or(DEFAULT_GROUP_NAME).to_string(),
                    vpc_id: g.vpc_id().unwrap_or(vpc_id).to_string(),
                })
            })
            .ok_or_else(|| {
                RemoteError::not_found(format!("no default security group in {}", vpc_id))
                    .with_code("InvalidGroup.NotFound")
            })?;

        tracing::debug!(vpc = %vpc_id, group = %group.group_id, "Resolved default security group");
        Ok(group)
    }

    async fn authorize_ingress(&self, rule: &IngressRule) -> RemoteResult<()> {
        tracing::debug!(rule = %rule, "ec2:AuthorizeSecurityGroupIngress");

        self.client
            .authorize_security_group_ingress()
            .group_id(&rule.group_id)
            .ip_permissions(ip_permission(rule))
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn revoke_ingress(&self, rule: &IngressRule) -> RemoteResult<()> {
        tracing::debug!(rule = %rule, "ec2:RevokeSecurityGroupIngress");

        let output = self
            .client
            .revoke_security_group_ingress()
            .group_id(&rule.group_id)
            .ip_permissions(ip_permission(rule))
            .send()
            .await
            .map_err(remote_error)?;

        // VPC groups answer success and list the permissions they did not know
        if !output.unknown_ip_permissions().is_empty() {
            return Err(RemoteError::not_found(format!(
                "rule {} is not present in {}",
                rule, rule.group_id
            ))
            .with_code("InvalidPermission.NotFound"));
        }
        Ok(())
    }
}
