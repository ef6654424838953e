//! Core domain types and traits for the monaco deployment engine.
//!
//! This crate contains:
//! - Config coordinates and resolved parameter values
//! - Resolved entities and the run-scoped entity map
//! - Capability traits for the remote platform clients
//! - Deterministic identifier generation
//! - Cancellation signal and the error taxonomy

pub mod cancel;
pub mod client;
pub mod coordinate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value;

pub use cancel::Cancellation;
pub use coordinate::Coordinate;
pub use entity::{EntityMap, Properties, ResolvedEntity};
pub use error::{DeployError, DeployWarning, Result};
pub use value::Value;
