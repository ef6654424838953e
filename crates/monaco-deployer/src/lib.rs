//! Deployment engine for monaco.
//!
//! Deploys one config at a time:
//! - resolve parameters against the entities deployed so far
//! - render the template into a payload
//! - dispatch by config kind to an upsert strategy
//! - retry known platform timing issues

pub mod classic;
pub mod dry_run;
pub mod engine;
pub mod platform;
pub mod retry;

pub use dry_run::{DryRunCall, DryRunClient};
pub use engine::{Deployment, DeploymentEngine};
pub use retry::{Classification, RetryPolicy, RetryRule};
