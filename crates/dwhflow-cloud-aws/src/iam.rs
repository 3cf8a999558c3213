//! IAM role management

use crate::error::remote_error;
use async_trait::async_trait;
use dwhflow_cloud::{AccessRole, RemoteError, RemoteErrorKind, RemoteResult, RoleAdmin};

/// Role administration through the IAM API
#[derive(Clone)]
pub struct IamRoleAdmin {
    client: aws_sdk_iam::Client,
}

impl IamRoleAdmin {
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

fn missing_role(role_name: &str) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::Other,
        format!("IAM returned no role for {}", role_name),
    )
}

#[async_trait]
impl RoleAdmin for IamRoleAdmin {
    async fn create_role(&self, role: &AccessRole) -> RemoteResult<String> {
        tracing::debug!(role = %role.name, "iam:CreateRole");

        let output = self
            .client
            .create_role()
            .role_name(&role.name)
            .path(&role.path)
            .description(&role.description)
            .assume_role_policy_document(role.trust_policy_document())
            .send()
            .await
            .map_err(remote_error)?;

        output
            .role()
            .map(|r| r.arn().to_string())
            .ok_or_else(|| missing_role(&role.name))
    }

    async fn delete_role(&self, role_name: &str) -> RemoteResult<()> {
        tracing::debug!(role = %role_name, "iam:DeleteRole");

        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        tracing::debug!(role = %role_name, policy = %policy_arn, "iam:AttachRolePolicy");

        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        tracing::debug!(role = %role_name, policy = %policy_arn, "iam:DetachRolePolicy");

        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn get_role(&self, role_name: &str) -> RemoteResult<String> {
        let output = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(remote_error)?;

        output
            .role()
            .map(|r| r.arn().to_string())
            .ok_or_else(|| missing_role(role_name))
    }
}
