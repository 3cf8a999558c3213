//! Step records produced by the provisioning and teardown protocols

use crate::orchestrator::ProvisionPhase;
use crate::state::ProvisioningState;
use serde::{Deserialize, Serialize};

/// A single step of the provisioning or teardown protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ValidateConfig,
    CreateRole,
    AttachPolicy,
    ResolveRole,
    PersistRoleArn,
    CreateCluster,
    WaitAvailable,
    PersistEndpoint,
    DescribeNetwork,
    AuthorizeIngress,
    RevokeIngress,
    DeleteCluster,
    ClearEndpoint,
    WaitDeleted,
    DetachPolicy,
    DeleteRole,
    ClearRoleArn,
    DescribeCluster,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ValidateConfig => "validate-config",
            Step::CreateRole => "create-role",
            Step::AttachPolicy => "attach-policy",
            Step::ResolveRole => "resolve-role",
            Step::PersistRoleArn => "persist-role-arn",
            Step::CreateCluster => "create-cluster",
            Step::WaitAvailable => "wait-available",
            Step::PersistEndpoint => "persist-endpoint",
            Step::DescribeNetwork => "describe-network",
            Step::AuthorizeIngress => "authorize-ingress",
            Step::RevokeIngress => "revoke-ingress",
            Step::DeleteCluster => "delete-cluster",
            Step::ClearEndpoint => "clear-endpoint",
            Step::WaitDeleted => "wait-deleted",
            Step::DetachPolicy => "detach-policy",
            Step::DeleteRole => "delete-role",
            Step::ClearRoleArn => "clear-role-arn",
            Step::DescribeCluster => "describe-cluster",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum StepOutcome {
    /// The remote call changed something
    Applied,
    /// Nothing to do; the remote side was already in the desired state
    AlreadyInDesiredState,
    /// Completed, but with a non-fatal warning
    Warning(String),
    /// Not attempted
    Skipped(String),
    /// Failed; teardown records this and keeps going
    Failed(String),
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::AlreadyInDesiredState => write!(f, "already in desired state"),
            StepOutcome::Warning(msg) => write!(f, "warning: {}", msg),
            StepOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            StepOutcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

/// Result of a provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Steps in the order they ran
    pub steps: Vec<StepRecord>,

    /// Phase reached
    pub phase: ProvisionPhase,

    /// Persisted state after the run
    pub state: ProvisioningState,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ProvisionReport {
    pub fn outcome_of(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    /// Steps that changed something remotely
    pub fn applied(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|r| r.outcome == StepOutcome::Applied)
            .map(|r| r.step)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&StepRecord> {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Warning(_)))
            .collect()
    }
}

/// Result of a teardown run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    pub steps: Vec<StepRecord>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Step, outcome: StepOutcome) {
        self.steps.push(StepRecord { step, outcome });
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<&StepRecord> {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Failed(_)))
            .collect()
    }

    pub fn outcome_of(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    /// Summary of the teardown
    pub fn summary(&self) -> TeardownSummary {
        let count = |pred: fn(&StepOutcome) -> bool| {
            self.steps.iter().filter(|r| pred(&r.outcome)).count()
        };
        TeardownSummary {
            applied: count(|o| matches!(o, StepOutcome::Applied | StepOutcome::Warning(_))),
            unchanged: count(|o| matches!(o, StepOutcome::AlreadyInDesiredState)),
            skipped: count(|o| matches!(o, StepOutcome::Skipped(_))),
            failed: count(|o| matches!(o, StepOutcome::Failed(_))),
        }
    }
}

/// Summary of a teardown run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownSummary {
    pub applied: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for TeardownSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} applied, {} already absent, {} skipped, {} failed",
            self.applied, self.unchanged, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_summary() {
        let mut report = TeardownReport::new();
        report.record(Step::RevokeIngress, StepOutcome::Skipped("no security group".into()));
        report.record(Step::DeleteCluster, StepOutcome::Applied);
        report.record(Step::ClearEndpoint, StepOutcome::Applied);
        report.record(Step::DetachPolicy, StepOutcome::AlreadyInDesiredState);
        report.record(Step::DeleteRole, StepOutcome::Failed("DeleteConflict".into()));

        assert!(!report.is_success());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(
            report.summary().to_string(),
            "2 applied, 1 already absent, 1 skipped, 1 failed"
        );
        assert_eq!(
            report.outcome_of(Step::DetachPolicy),
            Some(&StepOutcome::AlreadyInDesiredState)
        );
    }

    #[test]
    fn test_step_serializes_kebab_case() {
        let json = serde_json::to_string(&Step::AuthorizeIngress).unwrap();
        assert_eq!(json, "\"authorize-ingress\"");
        assert_eq!(Step::WaitAvailable.to_string(), "wait-available");
    }
}
