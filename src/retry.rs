use std::time::Duration;

use rand::Rng;

/// Production publishes a forecast hour every few minutes.
pub const DEFAULT_ABSENT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_FAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Delays between polls of a file that is not there yet.
///
/// Attempts are never capped: an acquisition only ends once it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after the remote reported the file as not yet produced.
    pub absent_interval: Duration,
    /// Wait after a network or disk fault.
    pub fault_interval: Duration,
    /// Upper bound of a random delay added to every wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            absent_interval: DEFAULT_ABSENT_INTERVAL,
            fault_interval: DEFAULT_FAULT_INTERVAL,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn absent_delay(&self) -> Duration {
        self.with_jitter(self.absent_interval)
    }

    pub fn fault_delay(&self) -> Duration {
        self.with_jitter(self.fault_interval)
    }

    fn with_jitter(&self, base: Duration) -> Duration {
        if self.jitter.is_zero() {
            return base;
        }

        let bound = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=bound);
        base.saturating_add(Duration::from_millis(extra))
    }
}
