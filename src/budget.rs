//! 重试预算：限定轮询会话可以重试的次数或时长。
//!
//! Retry budgets for poll sessions.
//!
//! A [`Budget`] answers three questions for the poller after every
//! non-terminal attempt: may I try again ([`Budget::remaining`]), how long do I
//! wait first ([`Budget::next_delay`]), and what happened
//! ([`Budget::record_attempt`]). Pending observations and transient failures
//! consume the same budget, but only transient failures grow the delay.
//!
//! | Budget | Exhausted when | Delay |
//! |--------|----------------|-------|
//! | [`AttemptBudget`] | N attempts consumed | `initial_delay` while pending; backoff multiplied after each transient failure |
//! | [`DeadlineBudget`] | clock passes the deadline | fixed `interval`, cut short at the deadline |
//!
//! ```rust
//! use control_plane_converge::budget::{AttemptBudget, AttemptKind, Budget};
//! use std::time::Duration;
//!
//! let mut budget = AttemptBudget::new(3, Duration::from_secs(20)).unwrap();
//! budget.record_attempt(AttemptKind::Transient);
//! assert!(budget.remaining());
//! assert_eq!(budget.next_delay(), Duration::from_secs(20));
//! budget.record_attempt(AttemptKind::Transient);
//! assert_eq!(budget.next_delay(), Duration::from_secs(40));
//! ```

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tokio::time::Instant;

/// Why an attempt did not finish the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// The backend reported a retryable failure.
    Transient,
    /// The call succeeded but the resource has not converged yet.
    Pending,
}

pub trait Budget: Send {
    /// Whether another attempt is allowed.
    fn remaining(&self) -> bool;

    /// Delay before the next attempt.
    fn next_delay(&mut self) -> Duration;

    /// Account for one finished, non-terminal attempt.
    fn record_attempt(&mut self, kind: AttemptKind);

    /// Attempts left, for budgets that count them.
    fn attempts_left(&self) -> Option<u32> {
        None
    }
}

impl<B: Budget + ?Sized> Budget for Box<B> {
    fn remaining(&self) -> bool {
        (**self).remaining()
    }

    fn next_delay(&mut self) -> Duration {
        (**self).next_delay()
    }

    fn record_attempt(&mut self, kind: AttemptKind) {
        (**self).record_attempt(kind)
    }

    fn attempts_left(&self) -> Option<u32> {
        (**self).attempts_left()
    }
}

fn invalid(field: &str, msg: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("budget"),
    )
}

/// Fixed number of attempts with a sleep that grows after transient failures.
///
/// A pending observation always sleeps the initial delay. A transient failure
/// sleeps the backoff delay, which then grows by `growth_factor`; the backoff
/// is kept across pending observations, so consecutive backend timeouts keep
/// backing off even when a pending read sits between them.
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    attempts_left: u32,
    interval: Duration,
    backoff: Duration,
    growth_factor: f64,
    max_delay: Option<Duration>,
    last: Option<AttemptKind>,
}

impl AttemptBudget {
    pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

    pub fn new(max_attempts: u32, initial_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(invalid(
                "max_attempts",
                "attempt budget must allow at least one attempt",
                "0",
            ));
        }
        if initial_delay.is_zero() {
            return Err(invalid(
                "initial_delay",
                "attempt budget delay must be positive",
                "0s",
            ));
        }
        Ok(Self {
            attempts_left: max_attempts,
            interval: initial_delay,
            backoff: initial_delay,
            growth_factor: Self::DEFAULT_GROWTH_FACTOR,
            max_delay: None,
            last: None,
        })
    }

    /// Multiplier applied after each transient failure. Must be finite and >= 1.0.
    pub fn with_growth_factor(mut self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(invalid(
                "growth_factor",
                "growth factor must be finite and at least 1.0",
                factor.to_string(),
            ));
        }
        self.growth_factor = factor;
        Ok(self)
    }

    /// Cap for the grown delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    fn grow(&self, delay: Duration) -> Duration {
        let grown = Duration::try_from_secs_f64(delay.as_secs_f64() * self.growth_factor)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => grown.min(cap),
            None => grown,
        }
    }
}

impl Budget for AttemptBudget {
    fn remaining(&self) -> bool {
        self.attempts_left > 0
    }

    fn next_delay(&mut self) -> Duration {
        match self.last.take() {
            Some(AttemptKind::Transient) => {
                let delay = self.backoff;
                self.backoff = self.grow(delay);
                delay
            }
            _ => self.interval,
        }
    }

    fn record_attempt(&mut self, kind: AttemptKind) {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.last = Some(kind);
    }

    fn attempts_left(&self) -> Option<u32> {
        Some(self.attempts_left)
    }
}

/// Fixed poll interval until a wall-clock deadline.
///
/// The last sleep is cut short at the deadline, so no attempt starts after it.
#[derive(Debug, Clone)]
pub struct DeadlineBudget {
    deadline: Instant,
    interval: Duration,
}

impl DeadlineBudget {
    /// Deadline `timeout` from now.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(invalid("timeout", "deadline budget timeout must be positive", "0s"));
        }
        Self::until(Instant::now() + timeout, interval)
    }

    /// Absolute deadline, e.g. one derived from a caller's own deadline.
    pub fn until(deadline: Instant, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(invalid(
                "interval",
                "deadline budget interval must be positive",
                "0s",
            ));
        }
        if deadline <= Instant::now() {
            return Err(invalid(
                "deadline",
                "deadline budget must end in the future",
                format!("{:?}", deadline),
            ));
        }
        Ok(Self { deadline, interval })
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Budget for DeadlineBudget {
    fn remaining(&self) -> bool {
        Instant::now() < self.deadline
    }

    fn next_delay(&mut self) -> Duration {
        self.interval
            .min(self.deadline.saturating_duration_since(Instant::now()))
    }

    fn record_attempt(&mut self, _kind: AttemptKind) {}
}

/// Serializable budget description, used by recipes and configuration files.
///
/// ```yaml
/// kind: attempts
/// max_attempts: 5
/// initial_delay_secs: 20
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetConfig {
    Attempts {
        max_attempts: u32,
        initial_delay_secs: f64,
        #[serde(default = "default_growth_factor")]
        growth_factor: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_delay_secs: Option<f64>,
    },
    Deadline {
        timeout_secs: f64,
        interval_secs: f64,
    },
}

fn default_growth_factor() -> f64 {
    AttemptBudget::DEFAULT_GROWTH_FACTOR
}

fn positive_secs(field: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(field, "duration must be positive", secs.to_string()));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| invalid(field, "duration out of range", e.to_string()))
}

impl BudgetConfig {
    pub fn attempts(max_attempts: u32, initial_delay: Duration) -> Self {
        BudgetConfig::Attempts {
            max_attempts,
            initial_delay_secs: initial_delay.as_secs_f64(),
            growth_factor: AttemptBudget::DEFAULT_GROWTH_FACTOR,
            max_delay_secs: None,
        }
    }

    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        BudgetConfig::Deadline {
            timeout_secs: timeout.as_secs_f64(),
            interval_secs: interval.as_secs_f64(),
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, BudgetConfig::Deadline { .. })
    }

    /// Check the values without starting any clock.
    pub fn validate(&self) -> Result<()> {
        match *self {
            BudgetConfig::Attempts {
                max_attempts,
                initial_delay_secs,
                growth_factor,
                max_delay_secs,
            } => {
                let delay = positive_secs("initial_delay_secs", initial_delay_secs)?;
                AttemptBudget::new(max_attempts, delay)?.with_growth_factor(growth_factor)?;
                if let Some(max) = max_delay_secs {
                    positive_secs("max_delay_secs", max)?;
                }
                Ok(())
            }
            BudgetConfig::Deadline {
                timeout_secs,
                interval_secs,
            } => {
                positive_secs("timeout_secs", timeout_secs)?;
                positive_secs("interval_secs", interval_secs)?;
                Ok(())
            }
        }
    }

    /// Build a fresh budget. Deadline budgets start their clock now.
    pub fn build(&self) -> Result<Box<dyn Budget>> {
        match *self {
            BudgetConfig::Attempts {
                max_attempts,
                initial_delay_secs,
                growth_factor,
                max_delay_secs,
            } => {
                let delay = positive_secs("initial_delay_secs", initial_delay_secs)?;
                let mut budget =
                    AttemptBudget::new(max_attempts, delay)?.with_growth_factor(growth_factor)?;
                if let Some(max) = max_delay_secs {
                    budget = budget.with_max_delay(positive_secs("max_delay_secs", max)?);
                }
                Ok(Box::new(budget))
            }
            BudgetConfig::Deadline {
                timeout_secs,
                interval_secs,
            } => {
                let timeout = positive_secs("timeout_secs", timeout_secs)?;
                let interval = positive_secs("interval_secs", interval_secs)?;
                Ok(Box::new(DeadlineBudget::new(timeout, interval)?))
            }
        }
    }

    /// Read a budget from environment variables:
    /// - `<PREFIX>_ATTEMPTS` + `<PREFIX>_INITIAL_DELAY_SECS` (default 5) selects an attempt budget
    /// - otherwise `<PREFIX>_TIMEOUT_SECS` + `<PREFIX>_INTERVAL_SECS` (default 10) selects a deadline budget
    ///
    /// Unparseable values are ignored, matching how the transport reads its env knobs.
    pub fn from_env(prefix: &str) -> Option<Self> {
        let read = |name: &str| env::var(format!("{}_{}", prefix, name)).ok();

        if let Some(attempts) = read("ATTEMPTS").and_then(|s| s.parse::<u32>().ok()) {
            let delay = read("INITIAL_DELAY_SECS")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(5.0);
            return Some(BudgetConfig::Attempts {
                max_attempts: attempts,
                initial_delay_secs: delay,
                growth_factor: AttemptBudget::DEFAULT_GROWTH_FACTOR,
                max_delay_secs: None,
            });
        }

        let timeout = read("TIMEOUT_SECS").and_then(|s| s.parse::<f64>().ok())?;
        let interval = read("INTERVAL_SECS")
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(10.0);
        Some(BudgetConfig::Deadline {
            timeout_secs: timeout,
            interval_secs: interval,
        })
    }

    /// Replace `self` with the env-configured budget, if one is set.
    pub fn with_env_overrides(self, prefix: &str) -> Self {
        Self::from_env(prefix).unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_attempt_budget_doubles_only_after_transient() {
        let mut b = AttemptBudget::new(5, secs(20)).unwrap();
        let mut delays = Vec::new();
        loop {
            b.record_attempt(AttemptKind::Transient);
            if !b.remaining() {
                break;
            }
            delays.push(b.next_delay());
        }
        assert_eq!(delays, vec![secs(20), secs(40), secs(80), secs(160)]);
    }

    #[test]
    fn test_attempt_budget_pending_keeps_interval() {
        let mut b = AttemptBudget::new(3, secs(10)).unwrap();
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(10));
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(10));
        b.record_attempt(AttemptKind::Transient);
        assert_eq!(b.next_delay(), secs(10));
        assert!(!b.remaining());
        assert_eq!(b.attempts_left(), Some(0));
    }

    #[test]
    fn test_attempt_budget_pending_after_transient_keeps_base_interval() {
        let mut b = AttemptBudget::new(10, secs(10)).unwrap();
        b.record_attempt(AttemptKind::Transient);
        assert_eq!(b.next_delay(), secs(10));
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(10));
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(10));
        // backoff resumes where it left off
        b.record_attempt(AttemptKind::Transient);
        assert_eq!(b.next_delay(), secs(20));
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(10));
    }

    #[test]
    fn test_attempt_budget_growth_is_capped() {
        let mut b = AttemptBudget::new(10, secs(20))
            .unwrap()
            .with_max_delay(secs(50));
        let mut delays = Vec::new();
        for _ in 0..4 {
            b.record_attempt(AttemptKind::Transient);
            delays.push(b.next_delay());
        }
        assert_eq!(delays, vec![secs(20), secs(40), secs(50), secs(50)]);
    }

    #[test]
    fn test_attempt_budget_rejects_non_positive_values() {
        assert!(matches!(
            AttemptBudget::new(0, secs(1)),
            Err(Error::Configuration { .. })
        ));
        assert!(AttemptBudget::new(1, Duration::ZERO).is_err());
        assert!(AttemptBudget::new(1, secs(1))
            .unwrap()
            .with_growth_factor(0.5)
            .is_err());
        assert!(AttemptBudget::new(1, secs(1))
            .unwrap()
            .with_growth_factor(f64::NAN)
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_budget_exhausts_with_clock() {
        let mut b = DeadlineBudget::new(secs(25), secs(10)).unwrap();
        assert!(b.remaining());
        b.record_attempt(AttemptKind::Transient);
        assert_eq!(b.next_delay(), secs(10));
        tokio::time::advance(secs(24)).await;
        assert!(b.remaining());
        tokio::time::advance(secs(1)).await;
        assert!(!b.remaining());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_budget_last_delay_stops_at_deadline() {
        let mut b = DeadlineBudget::new(secs(25), secs(20)).unwrap();
        assert_eq!(b.next_delay(), secs(20));
        tokio::time::advance(secs(20)).await;
        assert!(b.remaining());
        assert_eq!(b.next_delay(), secs(5));
        tokio::time::advance(secs(5)).await;
        assert!(!b.remaining());
        assert_eq!(b.next_delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_budget_rejects_past_or_zero() {
        assert!(DeadlineBudget::new(Duration::ZERO, secs(1)).is_err());
        assert!(DeadlineBudget::new(secs(10), Duration::ZERO).is_err());
        assert!(DeadlineBudget::until(Instant::now(), secs(1)).is_err());
    }

    #[test]
    fn test_budget_config_yaml() {
        let cfg: BudgetConfig = serde_yaml::from_str(
            "kind: attempts\nmax_attempts: 5\ninitial_delay_secs: 20\n",
        )
        .unwrap();
        assert_eq!(cfg, BudgetConfig::attempts(5, secs(20)));

        let cfg: BudgetConfig =
            serde_yaml::from_str("kind: deadline\ntimeout_secs: 600\ninterval_secs: 10\n")
                .unwrap();
        assert!(cfg.is_deadline());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_budget_config_validation() {
        assert!(BudgetConfig::Attempts {
            max_attempts: 3,
            initial_delay_secs: 1.0,
            growth_factor: 2.0,
            max_delay_secs: Some(30.0),
        }
        .validate()
        .is_ok());
        assert!(BudgetConfig::attempts(0, secs(1)).validate().is_err());
        assert!(BudgetConfig::Deadline {
            timeout_secs: -1.0,
            interval_secs: 10.0
        }
        .validate()
        .is_err());
        assert!(BudgetConfig::Attempts {
            max_attempts: 3,
            initial_delay_secs: 1.0,
            growth_factor: 2.0,
            max_delay_secs: Some(0.0),
        }
        .validate()
        .is_err());
    }

    #[tokio::test]
    async fn test_budget_config_build() {
        let mut b = BudgetConfig::attempts(2, secs(3)).build().unwrap();
        assert_eq!(b.attempts_left(), Some(2));
        b.record_attempt(AttemptKind::Pending);
        assert_eq!(b.next_delay(), secs(3));

        let b = BudgetConfig::deadline(secs(60), secs(5)).build().unwrap();
        assert!(b.remaining());
        assert_eq!(b.attempts_left(), None);
    }

    #[test]
    fn test_budget_config_from_env() {
        env::set_var("CPC_TEST_BUDGET_A_ATTEMPTS", "7");
        env::set_var("CPC_TEST_BUDGET_A_INITIAL_DELAY_SECS", "2");
        assert_eq!(
            BudgetConfig::from_env("CPC_TEST_BUDGET_A"),
            Some(BudgetConfig::attempts(7, secs(2)))
        );

        env::set_var("CPC_TEST_BUDGET_B_TIMEOUT_SECS", "120");
        assert_eq!(
            BudgetConfig::from_env("CPC_TEST_BUDGET_B"),
            Some(BudgetConfig::deadline(secs(120), secs(10)))
        );

        let fallback = BudgetConfig::deadline(secs(30), secs(3));
        assert_eq!(
            fallback.clone().with_env_overrides("CPC_TEST_BUDGET_UNSET"),
            fallback
        );
    }
}
