//! Retry policy as an explicit state machine.
//!
//! [`RetryPolicy::next`] is a pure function from the outcome of one attempt to
//! the next [`RetryState`]; the fetcher only executes the states it returns.

use std::time::Duration;

/// HTTP status that carries a server-supplied wait hint.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// What happened on a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx with a body that decoded successfully.
    Success,
    /// Non-success HTTP status, with the parsed `Retry-After` hint if any.
    Status {
        code: u16,
        retry_after: Option<Duration>,
    },
    /// Timeout, connection failure, or a body that failed to decode.
    Network,
}

/// States of one logical fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Issue attempt number `attempt` (1-based).
    Attempting { attempt: u32 },
    /// Wait `delay`, then issue attempt `attempt + 1`.
    Backoff { attempt: u32, delay: Duration },
    /// Give up after `attempts` attempts.
    Failed { attempts: u32 },
    /// Done after `attempts` attempts.
    Succeeded { attempts: u32 },
}

/// Bounded retry with per-failure-class backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Wait after a 429 without a usable `Retry-After`.
    pub rate_limit_wait: Duration,
    /// Linear backoff step after a 5xx.
    pub server_error_step: Duration,
    /// Linear backoff step after a network-level failure.
    pub network_error_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_retries(6)
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            rate_limit_wait: Duration::from_secs(2),
            server_error_step: Duration::from_millis(1500),
            network_error_step: Duration::from_secs(1),
        }
    }

    /// The state every fetch starts in.
    pub fn start(&self) -> RetryState {
        RetryState::Attempting { attempt: 1 }
    }

    /// Transition after attempt number `attempt` finished with `outcome`.
    pub fn next(&self, attempt: u32, outcome: &AttemptOutcome) -> RetryState {
        let delay = match outcome {
            AttemptOutcome::Success => return RetryState::Succeeded { attempts: attempt },
            AttemptOutcome::Status { code, retry_after } => match classify_status(*code) {
                StatusClass::RateLimited => retry_after.unwrap_or(self.rate_limit_wait),
                StatusClass::ServerError => self.server_error_step * attempt,
                StatusClass::Fatal => return RetryState::Failed { attempts: attempt },
            },
            AttemptOutcome::Network => self.network_error_step * attempt,
        };

        // No point waiting when no attempt is left.
        if attempt >= self.max_retries {
            RetryState::Failed { attempts: attempt }
        } else {
            RetryState::Backoff { attempt, delay }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    RateLimited,
    ServerError,
    Fatal,
}

fn classify_status(code: u16) -> StatusClass {
    match code {
        TOO_MANY_REQUESTS => StatusClass::RateLimited,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Fatal,
    }
}

/// Parse a `Retry-After` value given in whole seconds.
///
/// HTTP-date values and anything else unparseable yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
