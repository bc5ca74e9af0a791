//! Timing sections of the deployment configuration
//!
//! Durations are written the humantime way (`5s`, `10m`, `1h 30m`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contention::LockSettings;
use crate::error::{DeployError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Retry budget for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryTiming {
    pub attempts: usize,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub backoff: BackoffKind,
    /// Cap for exponential backoff
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryTiming {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
            backoff: BackoffKind::Fixed,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryTiming {
    pub fn policy(&self) -> RetryPolicy {
        match self.backoff {
            BackoffKind::Fixed => RetryPolicy::fixed(self.attempts, self.delay),
            BackoffKind::Exponential => {
                RetryPolicy::exponential(self.attempts, self.delay, self.max_delay)
            }
        }
    }
}

/// Package-manager lock waiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockTiming {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    pub stagnation_threshold: usize,
}

impl Default for LockTiming {
    fn default() -> Self {
        let settings = LockSettings::default();
        Self {
            poll_interval: settings.poll_interval,
            max_wait: settings.max_wait,
            stagnation_threshold: settings.stagnation_threshold,
        }
    }
}

impl LockTiming {
    pub fn settings(&self) -> LockSettings {
        LockSettings {
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
            stagnation_threshold: self.stagnation_threshold,
        }
    }
}

/// Budgets of the health-polled waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthTiming {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Local daemons (snapd, docker) coming up
    #[serde(with = "humantime_serde")]
    pub daemon_timeout: Duration,
    /// The homeserver container answering locally
    #[serde(with = "humantime_serde")]
    pub service_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub account_timeout: Duration,
    /// The homeserver answering on its public domain
    #[serde(with = "humantime_serde")]
    pub reachability_timeout: Duration,
}

impl Default for HealthTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            daemon_timeout: Duration::from_secs(120),
            service_timeout: Duration::from_secs(300),
            account_timeout: Duration::from_secs(60),
            reachability_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub retry: RetryTiming,
    pub lock: LockTiming,
    pub health: HealthTiming,
}

impl Timing {
    /// Reject budgets that would make a wait or retry loop meaningless
    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| DeployError::ConfigInvalid {
            message: format!("{name} must be greater than zero"),
        };
        if self.retry.attempts == 0 {
            return Err(zero("retry.attempts"));
        }
        if self.lock.stagnation_threshold == 0 {
            return Err(zero("lock.stagnation_threshold"));
        }
        let durations = [
            ("lock.poll_interval", self.lock.poll_interval),
            ("lock.max_wait", self.lock.max_wait),
            ("health.poll_interval", self.health.poll_interval),
            ("health.daemon_timeout", self.health.daemon_timeout),
            ("health.service_timeout", self.health.service_timeout),
            ("health.account_timeout", self.health.account_timeout),
            ("health.reachability_timeout", self.health.reachability_timeout),
        ];
        match durations.iter().find(|(_, d)| d.is_zero()) {
            Some((name, _)) => Err(zero(name)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    #[test]
    fn test_defaults_match_installer_budgets() {
        let timing = Timing::default();
        assert_eq!(timing.retry.policy(), RetryPolicy::fixed(3, Duration::from_secs(5)));
        assert_eq!(timing.lock.settings(), LockSettings::default());
        assert_eq!(timing.lock.max_wait, Duration::from_secs(600));
        assert!(timing.validate().is_ok());
    }

    #[test]
    fn test_parse_humantime_sections() {
        let yaml = "
retry:
  attempts: 5
  delay: 2s
  backoff: exponential
  max_delay: 30s
lock:
  max_wait: 15m
health:
  service_timeout: 4m 30s
";
        let timing: Timing = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(timing.retry.attempts, 5);
        assert_eq!(
            timing.retry.policy().backoff,
            Backoff::Exponential {
                max_delay: Duration::from_secs(30)
            }
        );
        assert_eq!(timing.lock.max_wait, Duration::from_secs(900));
        assert_eq!(timing.lock.poll_interval, Duration::from_secs(5));
        assert_eq!(timing.health.service_timeout, Duration::from_secs(270));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut timing = Timing::default();
        timing.retry.attempts = 0;
        assert!(matches!(
            timing.validate(),
            Err(DeployError::ConfigInvalid { message }) if message.contains("retry.attempts")
        ));

        let mut timing = Timing::default();
        timing.health.service_timeout = Duration::ZERO;
        assert!(timing.validate().is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(serde_yaml::from_str::<Timing>("retry:\n  tries: 3\n").is_err());
    }
}
