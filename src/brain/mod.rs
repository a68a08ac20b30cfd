//! Decision pipeline: context assembly, advisor consultation, orchestration.

pub mod advisor;
pub mod context;
pub mod decision;
pub mod orchestrator;

pub use decision::{Urgency, Verdict};
pub use orchestrator::DecisionEngine;
