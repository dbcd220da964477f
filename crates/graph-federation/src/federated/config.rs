use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const FAILURE_POLICY_ENV: &str = "FEDERATION_FAILURE_POLICY";
pub const DELEGATE_TIMEOUT_ENV: &str = "FEDERATION_DELEGATE_TIMEOUT_MS";

/// What a federated request does when one delegate fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The whole request fails with the delegate's error.
    #[default]
    FailFast,
    /// The delegate's contribution is dropped and recorded in the
    /// federation report.
    SkipOnError,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "skip_on_error" | "skiponerror" => Ok(FailurePolicy::SkipOnError),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedStoreConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Upper bound on one delegate dispatch. Iteration of the returned
    /// stream is not covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_timeout_ms: Option<u64>,
}

impl FederatedStoreConfig {
    /// Reads the policy and timeout from the environment, falling back to
    /// fail-fast with no timeout. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let failure_policy = std::env::var(FAILURE_POLICY_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let delegate_timeout_ms = std::env::var(DELEGATE_TIMEOUT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|ms| *ms > 0);

        Self {
            failure_policy,
            delegate_timeout_ms,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_delegate_timeout(mut self, timeout: Duration) -> Self {
        self.delegate_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn delegate_timeout(&self) -> Option<Duration> {
        self.delegate_timeout_ms.map(Duration::from_millis)
    }
}
