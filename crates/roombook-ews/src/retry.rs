//! Blocking retry with exponential backoff for read-only EWS calls
//! (FindItem, GetItem).
//!
//! Retries:
//! - `ErrorServerBusy` throttling responses (honouring the server's back-off hint)
//! - timeouts, connection failures, 5xx and 429 responses
//!
//! Everything else (missing items, auth failures, malformed requests) is
//! returned on the first attempt.

use std::time::Duration;

use crate::error::EwsError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Delay before retry number `attempt` (0-based): initial * 2^attempt, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    fn delay_for(&self, attempt: u32, error: &EwsError) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        match error {
            EwsError::ServerBusy { back_off_ms } => {
                computed.max(Duration::from_millis(*back_off_ms).min(self.max_delay))
            }
            _ => computed,
        }
    }
}

/// Run `operation`, retrying retryable failures on the calling thread.
pub fn with_retry<T, F>(config: &RetryConfig, mut operation: F) -> Result<T, EwsError>
where
    F: FnMut() -> Result<T, EwsError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("EWS request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::debug!("Non-retryable EWS error: {}", e);
                return Err(e);
            }
            Err(e) if attempt >= config.max_retries => {
                tracing::error!(
                    "All {} EWS attempts exhausted: {}",
                    config.max_retries + 1,
                    e
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt, &e);
                tracing::warn!(
                    "Retryable EWS error on attempt {} of {}: {} (waiting {:?})",
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
