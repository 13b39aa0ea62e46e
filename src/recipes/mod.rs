//! 收敛配方：按资源类型预先组装的分类器、谓词与预算。
//!
//! # Convergence Recipes
//!
//! One preconfigured recipe per resource kind, so lifecycle code never
//! hand-assembles a classifier, predicate and budget.
//!
//! | Recipe | Snapshot | Converged when | Default budget |
//! |--------|----------|----------------|----------------|
//! | [`instance_ready`] | [`ReadyState`] | `ready` | deadline 30 min / 10 s |
//! | [`vpc_ready`] | [`ReadyState`] | `ready` | deadline 30 min / 10 s |
//! | [`node_action`] | [`NodeState`] | `running` matches the action | deadline 20 min / 10 s |
//! | [`custom_domain`] | [`CustomDomainState`] | `configured` matches (404 = removed) | deadline 10 min / 10 s |
//! | [`private_link`], [`vpc_connect`] | [`VpcFeatureState`] | `status == "enabled"` | deadline 30 min / 10 s |
//! | [`peering_accepted`] | [`PeeringState`] | active or pending acceptance | deadline 10 min / 10 s |
//! | [`job`] | [`JobState`] | `completed` (`failed` is a business failure) | deadline 60 min / 10 s, deadline required |
//! | [`plugins_removed`] | `Vec<PluginState>` | list empty | deadline 10 min / 10 s |
//! | [`plugin_enabled`] | `Vec<PluginState>` | plugin listed and enabled | deadline 10 min / 10 s |
//! | [`rabbitmq_upgrade`], [`lavinmq_upgrade`] | `Vec<NodeState>` | all nodes configured | deadline 60 min / 10 s |
//! | [`disk_resize`] | `Vec<NodeState>` | all nodes configured; 400/40002 on trigger is fatal | deadline 30 min / 30 s |
//! | [`configuration_read`] | caller's type | any successful read | 5 attempts, 20 s doubling |
//!
//! ```rust,no_run
//! use control_plane_converge::operation::{OperationRequest, TransportOperation};
//! use control_plane_converge::poller::Poller;
//! use control_plane_converge::recipes;
//! use control_plane_converge::transport::HttpTransport;
//! use std::sync::Arc;
//!
//! # async fn run() -> control_plane_converge::Result<()> {
//! let transport = Arc::new(HttpTransport::new("https://customer.cloudamqp.com/api")?);
//! let read = TransportOperation::new(transport, OperationRequest::get("/instances/42"));
//! let state = Poller::new().run(&recipes::instance_ready(), &read).await?;
//! assert!(state.ready);
//! # Ok(())
//! # }
//! ```

pub mod predicates;
pub mod registry;
pub mod snapshots;

pub use predicates::{
    AllNodesConfigured, DomainConfigured, FeatureEnabled, JobFinished, ListEmpty, NodeAction,
    NodeRunning, PeeringAccepted, PluginEnabled, Ready,
};
pub use registry::RecipeRegistry;
pub use snapshots::{
    CustomDomainState, JobState, NodeState, PeeringState, PluginState, ReadyState,
    VpcFeatureState,
};

use crate::budget::{Budget, BudgetConfig};
use crate::classify::{RuleClassifier, RESIZE_REJECTED_CODE};
use crate::predicate::Observed;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

/// Every resource kind with a preconfigured recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    InstanceReady,
    VpcReady,
    NodeAction,
    CustomDomain,
    PrivateLink,
    VpcConnect,
    PeeringAccepted,
    Job,
    PluginsRemoved,
    PluginEnabled,
    RabbitmqUpgrade,
    LavinmqUpgrade,
    DiskResize,
    ConfigurationRead,
}

impl RecipeKind {
    pub const ALL: [RecipeKind; 14] = [
        RecipeKind::InstanceReady,
        RecipeKind::VpcReady,
        RecipeKind::NodeAction,
        RecipeKind::CustomDomain,
        RecipeKind::PrivateLink,
        RecipeKind::VpcConnect,
        RecipeKind::PeeringAccepted,
        RecipeKind::Job,
        RecipeKind::PluginsRemoved,
        RecipeKind::PluginEnabled,
        RecipeKind::RabbitmqUpgrade,
        RecipeKind::LavinmqUpgrade,
        RecipeKind::DiskResize,
        RecipeKind::ConfigurationRead,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RecipeKind::InstanceReady => "instance_ready",
            RecipeKind::VpcReady => "vpc_ready",
            RecipeKind::NodeAction => "node_action",
            RecipeKind::CustomDomain => "custom_domain",
            RecipeKind::PrivateLink => "private_link",
            RecipeKind::VpcConnect => "vpc_connect",
            RecipeKind::PeeringAccepted => "peering_accepted",
            RecipeKind::Job => "job",
            RecipeKind::PluginsRemoved => "plugins_removed",
            RecipeKind::PluginEnabled => "plugin_enabled",
            RecipeKind::RabbitmqUpgrade => "rabbitmq_upgrade",
            RecipeKind::LavinmqUpgrade => "lavinmq_upgrade",
            RecipeKind::DiskResize => "disk_resize",
            RecipeKind::ConfigurationRead => "configuration_read",
        }
    }

    /// Jobs carry no bound of their own, so they may only run under a deadline.
    pub fn requires_deadline(&self) -> bool {
        matches!(self, RecipeKind::Job)
    }

    pub fn default_budget(&self) -> BudgetConfig {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        let interval = Duration::from_secs(10);
        match self {
            RecipeKind::InstanceReady
            | RecipeKind::VpcReady
            | RecipeKind::PrivateLink
            | RecipeKind::VpcConnect => BudgetConfig::deadline(minutes(30), interval),
            RecipeKind::NodeAction => BudgetConfig::deadline(minutes(20), interval),
            RecipeKind::CustomDomain
            | RecipeKind::PeeringAccepted
            | RecipeKind::PluginsRemoved
            | RecipeKind::PluginEnabled => BudgetConfig::deadline(minutes(10), interval),
            RecipeKind::Job | RecipeKind::RabbitmqUpgrade | RecipeKind::LavinmqUpgrade => {
                BudgetConfig::deadline(minutes(60), interval)
            }
            RecipeKind::DiskResize => {
                BudgetConfig::deadline(minutes(30), Duration::from_secs(30))
            }
            RecipeKind::ConfigurationRead => BudgetConfig::attempts(5, Duration::from_secs(20)),
        }
    }

    /// Reject budgets this kind cannot run under.
    pub fn check_budget(&self, budget: &BudgetConfig) -> Result<()> {
        budget.validate()?;
        if self.requires_deadline() && !budget.is_deadline() {
            return Err(Error::configuration_with_context(
                format!("{} recipe must run under a deadline budget", self.name()),
                ErrorContext::new()
                    .with_field_path(format!("{}.kind", self.name()))
                    .with_details("attempts")
                    .with_source("recipe"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecipeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RecipeKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!("unknown recipe: {}", s),
                    ErrorContext::new().with_source("recipe"),
                )
            })
    }
}

/// Classifier + predicate + budget for one resource kind.
pub struct Recipe<S, P> {
    kind: RecipeKind,
    classifier: RuleClassifier,
    predicate: P,
    budget: BudgetConfig,
    _snapshot: PhantomData<fn() -> S>,
}

impl<S, P> Recipe<S, P> {
    pub fn new(kind: RecipeKind, classifier: RuleClassifier, predicate: P) -> Self {
        Self {
            kind,
            classifier,
            predicate,
            budget: kind.default_budget(),
            _snapshot: PhantomData,
        }
    }

    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn classifier(&self) -> &RuleClassifier {
        &self.classifier
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }

    pub fn budget(&self) -> &BudgetConfig {
        &self.budget
    }

    /// Override the default budget. Checked when the recipe runs.
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_classifier(mut self, classifier: RuleClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Validate the budget against this kind and start it.
    pub fn start_budget(&self) -> Result<Box<dyn Budget>> {
        self.kind.check_budget(&self.budget)?;
        self.budget.build()
    }
}

pub fn instance_ready() -> Recipe<ReadyState, Ready> {
    Recipe::new(RecipeKind::InstanceReady, RuleClassifier::default(), Ready)
}

pub fn vpc_ready() -> Recipe<ReadyState, Ready> {
    Recipe::new(RecipeKind::VpcReady, RuleClassifier::default(), Ready)
}

pub fn node_action(action: NodeAction) -> Recipe<NodeState, NodeRunning> {
    Recipe::new(
        RecipeKind::NodeAction,
        RuleClassifier::default(),
        NodeRunning::for_action(action),
    )
}

/// `configured = true` waits for the domain to be set up; `false` waits for removal.
pub fn custom_domain(configured: bool) -> Recipe<CustomDomainState, DomainConfigured> {
    Recipe::new(
        RecipeKind::CustomDomain,
        RuleClassifier::default().absent_on_not_found(!configured),
        DomainConfigured {
            expected: configured,
        },
    )
}

pub fn private_link() -> Recipe<VpcFeatureState, FeatureEnabled> {
    Recipe::new(RecipeKind::PrivateLink, RuleClassifier::default(), FeatureEnabled)
}

pub fn vpc_connect() -> Recipe<VpcFeatureState, FeatureEnabled> {
    Recipe::new(RecipeKind::VpcConnect, RuleClassifier::default(), FeatureEnabled)
}

pub fn peering_accepted() -> Recipe<PeeringState, PeeringAccepted> {
    Recipe::new(
        RecipeKind::PeeringAccepted,
        RuleClassifier::default(),
        PeeringAccepted,
    )
}

pub fn job() -> Recipe<JobState, JobFinished> {
    Recipe::new(RecipeKind::Job, RuleClassifier::default(), JobFinished)
}

pub fn plugins_removed() -> Recipe<Vec<PluginState>, ListEmpty> {
    Recipe::new(RecipeKind::PluginsRemoved, RuleClassifier::default(), ListEmpty)
}

pub fn plugin_enabled(name: impl Into<String>) -> Recipe<Vec<PluginState>, PluginEnabled> {
    Recipe::new(
        RecipeKind::PluginEnabled,
        RuleClassifier::default(),
        PluginEnabled { name: name.into() },
    )
}

pub fn rabbitmq_upgrade() -> Recipe<Vec<NodeState>, AllNodesConfigured> {
    Recipe::new(
        RecipeKind::RabbitmqUpgrade,
        RuleClassifier::default(),
        AllNodesConfigured,
    )
}

pub fn lavinmq_upgrade() -> Recipe<Vec<NodeState>, AllNodesConfigured> {
    Recipe::new(
        RecipeKind::LavinmqUpgrade,
        RuleClassifier::default(),
        AllNodesConfigured,
    )
}

pub fn disk_resize() -> Recipe<Vec<NodeState>, AllNodesConfigured> {
    Recipe::new(
        RecipeKind::DiskResize,
        RuleClassifier::default().with_business_code(RESIZE_REJECTED_CODE),
        AllNodesConfigured,
    )
}

/// Plain read retried through backend timeouts; converges on the first success.
pub fn configuration_read<S>() -> Recipe<S, Observed> {
    Recipe::new(
        RecipeKind::ConfigurationRead,
        RuleClassifier::default(),
        Observed,
    )
}
