//! Retrying HTTP fetcher.
//!
//! This crate provides:
//! - [`policy`]: the retry state machine ([`RetryPolicy`], [`RetryState`])
//! - [`Fetcher`]: one logical GET with bounded retries and backoff
//! - [`Sleeper`]: the seam through which backoff waits are taken

pub mod policy;

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use tracing::{debug, instrument, warn};

use pokespin_shared::{FetchConfig, PokespinError, Result};

pub use policy::{AttemptOutcome, RetryPolicy, RetryState, parse_retry_after};

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Waits out a backoff delay.
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Failure of a single attempt, before the policy decides what to do with it.
#[derive(Debug)]
struct AttemptFailure {
    outcome: AttemptOutcome,
    reason: String,
}

impl AttemptFailure {
    fn network(reason: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Network,
            reason: reason.into(),
        }
    }
}

/// HTTP GET with bounded retries, driven by a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Fetcher<S = TokioSleeper> {
    client: Client,
    policy: RetryPolicy,
    sleeper: S,
}

impl Fetcher<TokioSleeper> {
    /// Create a fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| PokespinError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: RetryPolicy::with_max_retries(config.max_retries),
            sleeper: TokioSleeper,
        })
    }
}

impl<S: Sleeper> Fetcher<S> {
    /// Replace the sleeper used for backoff waits.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Fetcher<T> {
        Fetcher {
            client: self.client,
            policy: self.policy,
            sleeper,
        }
    }

    /// Fetch `url` and decode the body as JSON.
    ///
    /// A body that fails to decode counts as a network-level failure and is retried.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        self.fetch_with(url, Some("application/json"), |body| {
            serde_json::from_slice(body).map_err(|e| format!("malformed JSON body: {e}"))
        })
        .await
    }

    /// Fetch `url` and return the raw body.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_with(url, None, |body| Ok(body.to_vec())).await
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn fetch_with<T, D>(&self, url: &str, accept: Option<&str>, decode: D) -> Result<T>
    where
        D: Fn(&[u8]) -> std::result::Result<T, String>,
    {
        let mut state = self.policy.start();
        let mut decoded: Option<T> = None;
        let mut last_error = String::from("no attempt made");

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let outcome = match self.attempt(url, accept).await {
                        Ok(body) => match decode(&body) {
                            Ok(value) => {
                                decoded = Some(value);
                                AttemptOutcome::Success
                            }
                            Err(reason) => {
                                last_error = reason;
                                AttemptOutcome::Network
                            }
                        },
                        Err(failure) => {
                            last_error = failure.reason;
                            failure.outcome
                        }
                    };
                    self.policy.next(attempt, &outcome)
                }
                RetryState::Backoff { attempt, delay } => {
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "fetch attempt failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded { attempts } => {
                    debug!(attempts, "fetch succeeded");
                    return decoded.ok_or_else(|| PokespinError::Fetch {
                        url: url.to_string(),
                        attempts,
                        reason: "no body decoded".into(),
                    });
                }
                RetryState::Failed { attempts } => {
                    warn!(attempts, error = %last_error, "fetch failed");
                    return Err(PokespinError::Fetch {
                        url: url.to_string(),
                        attempts,
                        reason: last_error,
                    });
                }
            };
        }
    }

    /// Issue one request and read its body.
    async fn attempt(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> std::result::Result<Vec<u8>, AttemptFailure> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptFailure::network(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(AttemptFailure {
                outcome: AttemptOutcome::Status {
                    code: status.as_u16(),
                    retry_after,
                },
                reason: format!("HTTP {status}"),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptFailure::network(format!("body read failed: {e}")))?;
        Ok(body.to_vec())
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
