//! Bounded retry with exponential backoff around downloads.
//!
//! Backoff schedule with the defaults: 0.5s, 1s, 2s (four attempts total).

use std::time::Duration;

use conform_core::RetrySettings;

use crate::cancel::CancelToken;
use crate::error::DownloadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Retries without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `failed + 1`, after `failed` failures.
    pub fn delay_after(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T>(
        &self,
        label: &str,
        cancel: &CancelToken,
        mut op: impl FnMut(u32) -> Result<T, DownloadError>,
    ) -> Result<T, DownloadError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(target_file = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        target_file = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient download error, retrying"
                    );
                    if !cancel.sleep(delay) {
                        return Err(DownloadError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.delay_after(40), Duration::from_secs(3));
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let mut calls = Vec::new();
        let result = RetryPolicy::immediate(3).run("a.bin", &CancelToken::new(), |attempt| {
            calls.push(attempt);
            if attempt < 3 {
                Err(DownloadError::Transport(TransportError::Status(502)))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(5).run("a.bin", &CancelToken::new(), |_| {
            calls += 1;
            Err(DownloadError::Transport(TransportError::Status(404)))
        });
        assert!(matches!(
            result,
            Err(DownloadError::Transport(TransportError::Status(404)))
        ));
        assert_eq!(calls, 1);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(2).run("a.bin", &CancelToken::new(), |_| {
            calls += 1;
            Err(DownloadError::Transport(TransportError::Timeout("slow".into())))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn none_makes_a_single_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::none().run("a.bin", &CancelToken::new(), |_| {
            calls += 1;
            Err(DownloadError::Transport(TransportError::Status(503)))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn cancellation_during_backoff_stops_retrying() {
        let cancel = CancelToken::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
        };
        let result: Result<(), _> = policy.run("a.bin", &cancel, |_| {
            cancel.cancel();
            Err(DownloadError::Transport(TransportError::Status(503)))
        });
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }

    #[test]
    fn settings_convert() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 20,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }
}
