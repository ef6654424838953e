//! Config model for monaco deployments.
//!
//! This crate handles:
//! - Config and config type definitions
//! - Parameters, their references and resolution
//! - Template rendering
//! - Explicit run settings (environment lookup, error policy, retry budgets)

pub mod config;
pub mod error;
pub mod parameter;
pub mod settings;
pub mod template;

pub use config::{Config, ConfigType, Template};
pub use error::{ConfigError, ConfigResult};
pub use parameter::{
    CompoundReference, Parameter, ParameterReference, ResolveContext, resolve_parameters,
};
pub use settings::{
    EnvironmentLookup, ErrorPolicy, RetrySetting, RetrySettings, RetryTier, RunSettings,
};
