//! Per-resource convergence predicates.

use super::snapshots::{
    CustomDomainState, JobState, NodeState, PeeringState, PluginState, ReadyState,
    VpcFeatureState,
};
use crate::predicate::{ConvergencePredicate, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instance / VPC creation: `ready == true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

impl ConvergencePredicate<ReadyState> for Ready {
    fn evaluate(&self, snapshot: &ReadyState) -> Verdict {
        Verdict::from_bool(snapshot.ready)
    }
}

/// Actions that can be requested on a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Start,
    Stop,
    Restart,
    Reboot,
}

impl NodeAction {
    /// Whether the node should be running once the action has taken.
    pub fn expects_running(&self) -> bool {
        !matches!(self, NodeAction::Stop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeAction::Start => "start",
            NodeAction::Stop => "stop",
            NodeAction::Restart => "restart",
            NodeAction::Reboot => "reboot",
        }
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node action: `running == expected`.
#[derive(Debug, Clone, Copy)]
pub struct NodeRunning {
    pub expected: bool,
}

impl NodeRunning {
    pub fn for_action(action: NodeAction) -> Self {
        Self {
            expected: action.expects_running(),
        }
    }
}

impl ConvergencePredicate<NodeState> for NodeRunning {
    fn evaluate(&self, snapshot: &NodeState) -> Verdict {
        Verdict::from_bool(snapshot.running == self.expected)
    }
}

/// Custom domain toggle: `configured == expected`.
///
/// When waiting for removal a 404 is accepted as "not configured".
#[derive(Debug, Clone, Copy)]
pub struct DomainConfigured {
    pub expected: bool,
}

impl ConvergencePredicate<CustomDomainState> for DomainConfigured {
    fn evaluate(&self, snapshot: &CustomDomainState) -> Verdict {
        Verdict::from_bool(snapshot.configured == self.expected)
    }

    fn absent_state(&self) -> Option<CustomDomainState> {
        if self.expected {
            None
        } else {
            Some(CustomDomainState::default())
        }
    }
}

/// PrivateLink / VPC-Connect enablement.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEnabled;

impl ConvergencePredicate<VpcFeatureState> for FeatureEnabled {
    fn evaluate(&self, snapshot: &VpcFeatureState) -> Verdict {
        match snapshot.status.as_str() {
            "enabled" => Verdict::Converged,
            "pending" => Verdict::Pending,
            other => Verdict::Unexpected(format!("unexpected status: {}", other)),
        }
    }
}

/// Peering acceptance. Anything not yet active or awaiting acceptance keeps polling.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeeringAccepted;

impl ConvergencePredicate<PeeringState> for PeeringAccepted {
    fn evaluate(&self, snapshot: &PeeringState) -> Verdict {
        Verdict::from_bool(matches!(
            snapshot.status.as_str(),
            "active" | "pending-acceptance"
        ))
    }
}

/// Asynchronous job completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFinished;

impl ConvergencePredicate<JobState> for JobFinished {
    fn evaluate(&self, snapshot: &JobState) -> Verdict {
        match snapshot.status.as_str() {
            "completed" => Verdict::Converged,
            "failed" => Verdict::BusinessFailure(
                snapshot
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "job failed".to_string()),
            ),
            _ => Verdict::Pending,
        }
    }
}

/// Plugin uninstall: the observed list is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListEmpty;

impl<T: Send + Sync> ConvergencePredicate<Vec<T>> for ListEmpty {
    fn evaluate(&self, snapshot: &Vec<T>) -> Verdict {
        Verdict::from_bool(snapshot.is_empty())
    }
}

/// Plugin install: the named plugin is listed and enabled.
#[derive(Debug, Clone)]
pub struct PluginEnabled {
    pub name: String,
}

impl ConvergencePredicate<Vec<PluginState>> for PluginEnabled {
    fn evaluate(&self, snapshot: &Vec<PluginState>) -> Verdict {
        Verdict::from_bool(
            snapshot
                .iter()
                .any(|p| p.name == self.name && p.enabled),
        )
    }
}

/// Fleet-wide upgrade or disk resize: every node reports `configured`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllNodesConfigured;

impl ConvergencePredicate<Vec<NodeState>> for AllNodesConfigured {
    fn evaluate(&self, snapshot: &Vec<NodeState>) -> Verdict {
        Verdict::from_bool(snapshot.iter().all(|n| n.configured))
    }
}
