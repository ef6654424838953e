//! Run settings.
//!
//! Everything that would otherwise be read from process-wide state is captured
//! here once and passed down explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of environment variables available to parameters.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLookup {
    vars: HashMap<String, String>,
}

impl EnvironmentLookup {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

/// What happens to the rest of an environment's run after a config fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Abort the environment on the first error.
    #[default]
    StopOnError,
    /// Keep deploying everything that does not depend on a failed config.
    ContinueOnError,
}

/// Retry budgets, ordered by how long the platform may take to become consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RetryTier {
    Short,
    Normal,
    Long,
    VeryLong,
}

/// Wait between attempts and number of retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySetting {
    pub wait: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub short: RetrySetting,
    pub normal: RetrySetting,
    pub long: RetrySetting,
    pub very_long: RetrySetting,
}

impl RetrySettings {
    pub fn for_tier(&self, tier: RetryTier) -> RetrySetting {
        match tier {
            RetryTier::Short => self.short,
            RetryTier::Normal => self.normal,
            RetryTier::Long => self.long,
            RetryTier::VeryLong => self.very_long,
        }
    }

    /// Same retry counts with no waiting in between.
    pub fn without_waits(self) -> Self {
        let zero = |s: RetrySetting| RetrySetting {
            wait: Duration::ZERO,
            ..s
        };
        Self {
            short: zero(self.short),
            normal: zero(self.normal),
            long: zero(self.long),
            very_long: zero(self.very_long),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            short: RetrySetting {
                wait: Duration::from_secs(5),
                max_retries: 3,
            },
            normal: RetrySetting {
                wait: Duration::from_secs(15),
                max_retries: 20,
            },
            long: RetrySetting {
                wait: Duration::from_secs(15),
                max_retries: 30,
            },
            very_long: RetrySetting {
                wait: Duration::from_secs(15),
                max_retries: 60,
            },
        }
    }
}

/// Settings for one deployment run, constructed once and shared by all environments.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub env: EnvironmentLookup,
    pub error_policy: ErrorPolicy,
    pub retry: RetrySettings,
    /// Deploy independent environments concurrently.
    pub parallel_environments: bool,
}

impl RunSettings {
    pub fn new(env: EnvironmentLookup) -> Self {
        Self {
            env,
            error_policy: ErrorPolicy::default(),
            retry: RetrySettings::default(),
            parallel_environments: true,
        }
    }

    pub fn from_process() -> Self {
        Self::new(EnvironmentLookup::from_process())
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn continue_on_error(self) -> Self {
        self.with_error_policy(ErrorPolicy::ContinueOnError)
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_parallel_environments(mut self, parallel: bool) -> Self {
        self.parallel_environments = parallel;
        self
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::new(EnvironmentLookup::default())
    }
}
