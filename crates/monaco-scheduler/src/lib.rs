//! Run scheduling for monaco deployments.
//!
//! Builds the dependency graph of each environment and deploys its configs
//! in topological order, applying the run's error policy.

pub mod graph;
pub mod orchestrator;

pub use graph::{DependencyGraph, Schedule};
pub use orchestrator::{ConfigState, RunController, RunResult};
