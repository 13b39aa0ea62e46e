//! # control-plane-converge
//!
//! 托管服务控制面客户端的收敛轮询引擎。
//!
//! Convergence polling engine for managed-service control plane clients.
//!
//! ## Overview
//!
//! Almost every mutating call against the control plane (create, update,
//! delete, upgrade, enable) starts an asynchronous change on the remote side.
//! The caller then has to wait until the change has taken, riding out
//! transient backend errors, bounding the wait, and telling "still pending"
//! apart from "permanently failed". This crate does that once, for every
//! resource kind, instead of one hand-written wait loop per resource.
//!
//! ## Core Philosophy
//!
//! - **One loop**: a single [`poller::Poller`] parameterised by a classifier, a predicate and a budget
//! - **Typed snapshots**: responses are decoded once with serde; predicates read typed fields
//! - **Bounded**: every session runs under a positive [`budget::Budget`]; there is no unbounded wait
//! - **Cancellable**: any session accepts an external [`poller::CancelSignal`]
//! - **Explicit transport**: the HTTP client is passed in, never global
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use control_plane_converge::operation::{OperationRequest, TransportOperation};
//! use control_plane_converge::poller::Poller;
//! use control_plane_converge::recipes;
//! use control_plane_converge::transport::HttpTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> control_plane_converge::Result<()> {
//!     let transport = Arc::new(HttpTransport::new("https://customer.cloudamqp.com/api")?);
//!
//!     let resize = TransportOperation::new(
//!         transport.clone(),
//!         OperationRequest::put("/instances/42/disk", json!({"extra_disk_size": 100})),
//!     );
//!     let nodes = TransportOperation::new(transport, OperationRequest::get("/instances/42/nodes"));
//!
//!     let fleet = Poller::new()
//!         .trigger_and_run(&recipes::disk_resize(), &resize, &nodes)
//!         .await?;
//!     println!("{} nodes configured", fleet.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`poller`] | The convergence loop and cancellation |
//! | [`classify`] | Status/body classification rules |
//! | [`budget`] | Attempt-count and deadline budgets |
//! | [`predicate`] | Predicate trait and generic predicates |
//! | [`recipes`] | Per-resource predicates, snapshots, recipes and registry |
//! | [`operation`] | Remote operations and requests |
//! | [`transport`] | Transport seam and the `reqwest` implementation |

pub mod budget;
pub mod classify;
pub mod operation;
pub mod poller;
pub mod predicate;
pub mod recipes;
pub mod transport;

// Re-export main types for convenience
pub use budget::{AttemptBudget, Budget, BudgetConfig, DeadlineBudget};
pub use classify::{Classification, Classifier, RuleClassifier};
pub use operation::{Operation, OperationRequest, TransportOperation, Verb};
pub use poller::{poll_until_converged, CancelSignal, PollStats, Poller};
pub use predicate::{ConvergencePredicate, Verdict};
pub use recipes::{Recipe, RecipeKind, RecipeRegistry};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
