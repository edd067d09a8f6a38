use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_LOADER_SRC: &str = "https://cdn.jsdelivr.net/npm/apexcharts";
pub const DEFAULT_PASS_SCHEDULE_MS: [u64; 7] = [0, 500, 1000, 2000, 3000, 5000, 10_000];

/// Supervisor tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Per-widget deadline measured from first discovery.
    pub widget_timeout_ms: u64,
    /// Offsets from page readiness at which full passes run.
    pub pass_schedule_ms: Vec<u64>,
    pub library_poll_interval_ms: u64,
    pub library_poll_attempts: u32,
    pub loader_src: String,
    pub mutation_debounce_ms: u64,
    pub signal_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            widget_timeout_ms: 10_000,
            pass_schedule_ms: DEFAULT_PASS_SCHEDULE_MS.to_vec(),
            library_poll_interval_ms: 500,
            library_poll_attempts: 20,
            loader_src: DEFAULT_LOADER_SRC.to_string(),
            mutation_debounce_ms: 100,
            signal_capacity: 64,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_schedule(raw: &str) -> Option<Vec<u64>> {
    let parsed: Result<Vec<u64>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect();
    parsed.ok().filter(|v| !v.is_empty())
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            widget_timeout_ms: env_parse("WIDGET_TIMEOUT_MS", defaults.widget_timeout_ms),
            pass_schedule_ms: std::env::var("PASS_SCHEDULE_MS")
                .ok()
                .and_then(|v| parse_schedule(&v))
                .unwrap_or(defaults.pass_schedule_ms),
            library_poll_interval_ms: env_parse("LIBRARY_POLL_MS", defaults.library_poll_interval_ms),
            library_poll_attempts: env_parse("LIBRARY_POLL_ATTEMPTS", defaults.library_poll_attempts),
            loader_src: std::env::var("LIBRARY_LOADER_SRC").unwrap_or(defaults.loader_src),
            mutation_debounce_ms: env_parse("MUTATION_DEBOUNCE_MS", defaults.mutation_debounce_ms),
            signal_capacity: env_parse("SIGNAL_CAPACITY", defaults.signal_capacity),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.widget_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.pass_schedule_ms.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        if self.library_poll_attempts == 0 {
            return Err(ConfigError::ZeroPollAttempts);
        }
        if self.signal_capacity == 0 {
            return Err(ConfigError::ZeroSignalCapacity);
        }
        Url::parse(&self.loader_src).map_err(|source| ConfigError::LoaderSrc {
            src: self.loader_src.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn widget_timeout(&self) -> Duration {
        Duration::from_millis(self.widget_timeout_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    /// Schedule offsets, sorted and deduplicated.
    pub fn pass_schedule(&self) -> Vec<Duration> {
        let mut offsets = self.pass_schedule_ms.clone();
        offsets.sort_unstable();
        offsets.dedup();
        offsets.into_iter().map(Duration::from_millis).collect()
    }

    /// How long a widget may wait for its data. The dispatcher itself never retries.
    pub fn data_wait_policy(&self) -> RetryPolicy {
        RetryPolicy::single(self.widget_timeout())
    }

    /// Polling policy used while an already-injected loader initialises.
    pub fn library_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.library_poll_attempts,
            Duration::from_millis(self.library_poll_interval_ms),
        )
    }
}
