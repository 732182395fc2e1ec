use std::time::Duration;

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,

    pub max_delay: Duration,

    /// Consecutive failures tolerated before giving up. 0 retries forever.
    pub max_attempts: u32,

    /// Escalate to an error log every this many consecutive failures. 0 disables.
    pub alert_after: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
            alert_after: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Pause before retrying after the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);

        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }

    pub fn should_alert(&self, failures: u32) -> bool {
        self.alert_after != 0 && failures % self.alert_after == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After(Duration),
    GiveUp,
}

/// Counts consecutive failures against a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failure(&mut self) -> Retry {
        self.failures = self.failures.saturating_add(1);

        if self.policy.is_exhausted(self.failures) {
            return Retry::GiveUp;
        }

        Retry::After(self.policy.delay_for(self.failures))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn should_alert(&self) -> bool {
        self.policy.should_alert(self.failures)
    }
}
