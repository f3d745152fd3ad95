//! Decision-making core of the Vigil pipeline: directive bookkeeping,
//! per-camera baseline memory, the layered alert policy, and summary-window
//! aggregation. Everything here is synchronous and free of I/O — the async
//! orchestration that drives these components on a schedule lives in
//! `vigil-worker`.

pub mod baseline_tracker;
pub mod decision_engine;
pub mod directive_registry;
pub mod summary_aggregator;

pub use baseline_tracker::{BaselineTracker, BaselineUpdate};
pub use decision_engine::{Decision, DecisionEngine, DecisionEngineConfig, DecisionKind, OverrideReason};
pub use directive_registry::DirectiveRegistry;
pub use summary_aggregator::SummaryAggregator;
