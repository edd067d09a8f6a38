use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use crate::logging::{log, obj, v_str, Domain, Level};

/// Bounded wait policy shared by the library poll and the per-widget data wait.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(20, Duration::from_millis(500))
    }
}

/// Returned when a policy runs out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: interval.as_millis() as u64,
        }
    }

    /// A single wait of `window`, with no re-checks in between.
    pub fn single(window: Duration) -> Self {
        Self::fixed(1, window)
    }

    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case wall time for a full run.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(self.max_attempts as u64))
    }
}

/// Sleep-then-check until `ready` holds. Returns the attempt that succeeded.
pub async fn poll_until<F>(policy: &RetryPolicy, operation_name: &str, mut ready: F) -> Result<u32, Exhausted>
where
    F: FnMut() -> bool,
{
    for attempt in 0..policy.max_attempts {
        sleep(policy.delay_for_attempt(attempt)).await;
        if ready() {
            return Ok(attempt + 1);
        }
        log(
            Level::Trace,
            Domain::Library,
            "poll",
            obj(&[
                ("operation", v_str(operation_name)),
                ("attempt", json!(attempt + 1)),
                ("max_attempts", json!(policy.max_attempts)),
            ]),
        );
    }
    Err(Exhausted { attempts: policy.max_attempts })
}
