//! Bounded backoff for transient git failures.
//!
//! Local git can fail transiently when another process (an editor git
//! integration, a second hook invocation racing shutdown) briefly holds the
//! index or a ref lock. Those failures are worth a short retry; anything else
//! is surfaced to the caller immediately.

use std::time::Duration;

/// stderr fragments that mark a failure as transient.
///
/// "Not a directory" covers the stale-index case where a dying process left
/// the index mid-rewrite.
const TRANSIENT_PATTERNS: [&str; 4] = [
    "index file open failed",
    "index.lock",
    "cannot lock ref",
    "Not a directory",
];

/// Returns true when the stderr of a failed git command matches a
/// known-transient pattern.
pub fn is_transient(stderr: &str) -> bool {
    TRANSIENT_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
}

/// Configuration for bounded backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the exponential growth of the delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default configuration: 3 retries at 100ms, 200ms, 400ms.
    ///
    /// Lock contention on a local repository clears in milliseconds, so the
    /// delays are far shorter than one would use against a network service.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        backoff_multiplier: 2.0,
    };

    /// Computes the delay for the given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
