//! Retries for known eventual-consistency windows of the platform.
//!
//! Objects created moments ago are not always visible to validation of the
//! next request yet. Responses matching a known rule are retried with the
//! budget of the rule's tier; everything else fails immediately.

use monaco_config::{ConfigType, RetrySettings, RetryTier};
use monaco_core::client::{ApiResponse, ClientError, ClientResult};
use monaco_core::{Cancellation, Coordinate, DeployError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

type Predicate = dyn Fn(&ApiResponse, &ConfigType) -> bool + Send + Sync;

/// A response pattern that indicates a transient condition.
#[derive(Clone)]
pub struct RetryRule {
    pub name: &'static str,
    pub tier: RetryTier,
    matches: Arc<Predicate>,
}

impl RetryRule {
    pub fn new(
        name: &'static str,
        tier: RetryTier,
        matches: impl Fn(&ApiResponse, &ConfigType) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            tier,
            matches: Arc::new(matches),
        }
    }

    pub fn matches(&self, response: &ApiResponse, config_type: &ConfigType) -> bool {
        (self.matches)(response, config_type)
    }
}

impl fmt::Debug for RetryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryRule")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .finish()
    }
}

/// How a failed response is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Known timing issue; retry within the tier's budget.
    Transient {
        tier: RetryTier,
        rule: &'static str,
    },
    Permanent,
}

fn classic_api_id(config_type: &ConfigType) -> Option<&str> {
    match config_type {
        ConfigType::ClassicApi { api } => Some(api.id.as_str()),
        _ => None,
    }
}

/// Rules for the timing issues the platform is known to have.
pub fn default_rules() -> Vec<RetryRule> {
    vec![
        RetryRule::new("concurrent-modification", RetryTier::Short, |r, _| {
            r.status == 409
        }),
        RetryRule::new("service-unavailable", RetryTier::Normal, |r, _| {
            r.status == 503
        }),
        RetryRule::new("calculated-metric-not-ready", RetryTier::Long, |r, _| {
            r.body_contains("Metric selector") && r.body_contains("invalid")
        }),
        RetryRule::new("management-zone-not-ready", RetryTier::Long, |r, _| {
            r.body_contains("Management-Zone not found") || r.body_contains("Entity selector is invalid")
        }),
        RetryRule::new("credential-not-ready", RetryTier::Long, |r, _| {
            r.body_contains("credential-vault") && r.body_contains("was not available")
        }),
        // Propagation across cluster nodes shows up as a bogus uniqueness violation.
        RetryRule::new("dependency-not-propagated", RetryTier::Long, |r, _| {
            r.body_contains("must have a unique name")
        }),
        RetryRule::new("synthetic-api-error", RetryTier::Long, |r, t| {
            let synthetic = matches!(t, ConfigType::ClassicApi { api } if api.is_synthetic());
            synthetic && (r.is_5xx() || r.body_contains("Could not update"))
        }),
        RetryRule::new("network-zones-not-enabled", RetryTier::Long, |r, t| {
            classic_api_id(t) == Some("network-zone")
                && r.is_4xx()
                && r.body_contains("network zones are disabled")
        }),
        RetryRule::new("request-attribute-not-ready", RetryTier::VeryLong, |r, _| {
            r.body_contains("must specify a known request attribute")
        }),
        RetryRule::new("application-not-ready", RetryTier::VeryLong, |r, _| {
            r.body_contains("Unknown application(s)")
        }),
    ]
}

/// Ordered set of retry rules plus the budgets of each tier.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    rules: Vec<RetryRule>,
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            rules: default_rules(),
            settings,
        }
    }

    /// A policy that never retries until rules are added.
    pub fn without_rules(settings: RetrySettings) -> Self {
        Self {
            rules: Vec::new(),
            settings,
        }
    }

    pub fn with_rule(mut self, rule: RetryRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RetryRule] {
        &self.rules
    }

    /// The highest tier among all matching rules wins. On equal tiers the first rule is reported.
    pub fn classify(&self, response: &ApiResponse, config_type: &ConfigType) -> Classification {
        let mut best: Option<&RetryRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(response, config_type)) {
            if best.is_none_or(|b| rule.tier > b.tier) {
                best = Some(rule);
            }
        }
        match best {
            Some(rule) => Classification::Transient {
                tier: rule.tier,
                rule: rule.name,
            },
            None => Classification::Permanent,
        }
    }

    /// Issue `op` once and retry it while the failure is a known timing issue.
    pub async fn call<T, F, Fut>(
        &self,
        coordinate: &Coordinate,
        config_type: &ConfigType,
        cancel: &Cancellation,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled {
                coordinate: coordinate.clone(),
            });
        }

        let response = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => into_response(coordinate, err)?,
        };

        let (tier, rule) = match self.classify(&response, config_type) {
            Classification::Transient { tier, rule } => (tier, rule),
            Classification::Permanent => {
                debug!(config = %coordinate, status = response.status, "Request failed permanently");
                return Err(permanent(coordinate, response, 1));
            }
        };

        let setting = self.settings.for_tier(tier);
        let mut last = response;
        for attempt in 1..=setting.max_retries {
            warn!(
                config = %coordinate,
                rule,
                ?tier,
                attempt,
                max_retries = setting.max_retries,
                status = last.status,
                "Known timing issue, retrying"
            );
            if !cancel.sleep(setting.wait).await {
                return Err(DeployError::Cancelled {
                    coordinate: coordinate.clone(),
                });
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => last = into_response(coordinate, err)?,
            }
        }

        Err(permanent(coordinate, last, setting.max_retries + 1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}

/// Map a client error from a call that is not retried.
pub fn client_error(coordinate: &Coordinate, err: ClientError) -> DeployError {
    match err {
        ClientError::Api(response) => permanent(coordinate, response, 1),
        ClientError::Transport(message) => DeployError::Transport {
            coordinate: coordinate.clone(),
            message,
        },
    }
}

fn into_response(coordinate: &Coordinate, err: ClientError) -> Result<ApiResponse> {
    match err {
        ClientError::Api(response) => Ok(response),
        ClientError::Transport(message) => Err(DeployError::Transport {
            coordinate: coordinate.clone(),
            message,
        }),
    }
}

fn permanent(coordinate: &Coordinate, response: ApiResponse, attempts: u32) -> DeployError {
    DeployError::PermanentApi {
        coordinate: coordinate.clone(),
        status: response.status,
        body: response.body,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monaco_config::RetrySetting;
    use monaco_core::client::ClassicApi;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn classic(id: &str) -> ConfigType {
        ConfigType::ClassicApi {
            api: ClassicApi::unique(id),
        }
    }

    fn fast() -> RetrySettings {
        RetrySettings::default().without_waits()
    }

    #[test]
    fn test_unmatched_is_permanent() {
        let policy = RetryPolicy::default();
        let r = ApiResponse::new(400, "invalid payload");
        assert_eq!(policy.classify(&r, &classic("slo")), Classification::Permanent);
    }

    #[test]
    fn test_management_zone_is_long() {
        let policy = RetryPolicy::default();
        let r = ApiResponse::new(400, "SLO validation failed: Management-Zone not found");
        assert_eq!(
            policy.classify(&r, &classic("slo")),
            Classification::Transient {
                tier: RetryTier::Long,
                rule: "management-zone-not-ready"
            }
        );
    }

    #[test]
    fn test_highest_tier_wins() {
        let policy = RetryPolicy::default();
        let r = ApiResponse::new(
            400,
            "Management-Zone not found; Unknown application(s) APPLICATION-1",
        );
        assert!(matches!(
            policy.classify(&r, &classic("calculated-metrics-web")),
            Classification::Transient {
                tier: RetryTier::VeryLong,
                ..
            }
        ));
    }

    #[test]
    fn test_synthetic_rule_depends_on_api() {
        let policy = RetryPolicy::default();
        let r = ApiResponse::new(500, "internal error");
        assert!(matches!(
            policy.classify(&r, &classic("synthetic-monitor")),
            Classification::Transient { .. }
        ));
        assert_eq!(policy.classify(&r, &classic("slo")), Classification::Permanent);
    }

    #[test]
    fn test_custom_rule() {
        let policy = RetryPolicy::without_rules(fast()).with_rule(RetryRule::new(
            "teapot",
            RetryTier::Short,
            |r, _| r.status == 418,
        ));
        assert_eq!(policy.rules().len(), 1);
        assert!(matches!(
            policy.classify(&ApiResponse::new(418, ""), &ConfigType::Bucket),
            Classification::Transient { rule: "teapot", .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let policy = RetryPolicy::new(fast());
        let calls = AtomicU32::new(0);
        let c = Coordinate::new("p", "slo", "a");

        let result = policy
            .call(&c, &classic("slo"), &Cancellation::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ClientError::Api(ApiResponse::new(400, "Management-Zone not found")))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let mut settings = fast();
        settings.long = RetrySetting {
            wait: Duration::ZERO,
            max_retries: 4,
        };
        let policy = RetryPolicy::new(settings);
        let calls = AtomicU32::new(0);
        let c = Coordinate::new("p", "slo", "a");

        let err = policy
            .call(&c, &classic("slo"), &Cancellation::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(ClientError::Api(ApiResponse::new(
                        400,
                        "Management-Zone not found",
                    )))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(
            err,
            DeployError::PermanentApi {
                status: 400,
                attempts: 5,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(fast());
        let calls = AtomicU32::new(0);
        let c = Coordinate::new("p", "slo", "a");

        let err = policy
            .call(&c, &classic("slo"), &Cancellation::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ClientError::Api(ApiResponse::new(400, "bad request"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, DeployError::PermanentApi { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let mut settings = fast();
        settings.long.wait = Duration::from_secs(3600);
        let policy = RetryPolicy::new(settings);
        let cancel = Cancellation::new();
        cancel.cancel_after(Duration::from_millis(10));
        let c = Coordinate::new("p", "slo", "a");

        let err = policy
            .call(&c, &classic("slo"), &cancel, || async {
                Err::<(), _>(ClientError::Api(ApiResponse::new(
                    400,
                    "Management-Zone not found",
                )))
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let policy = RetryPolicy::new(fast());
        let cancel = Cancellation::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let c = Coordinate::new("p", "slo", "a");

        let err = policy
            .call(&c, &classic("slo"), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
