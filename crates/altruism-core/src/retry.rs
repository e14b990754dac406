//! Bounded retry around a single decision request.
//!
//! [`RetryPolicy::solicit`] calls [`DecisionSource::propose`] up to
//! `max_attempts` times, each under its own timeout, sleeping a linearly
//! growing backoff between attempts. Time spent in
//! [`DecisionSource::ready`] is not part of an attempt. The call never
//! fails: exhaustion is reported as [`Solicited::Exhausted`] and the caller
//! substitutes a default move.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::decision::{DecisionError, DecisionRequest, DecisionSource, Proposal};

/// Outcome of soliciting one move.
#[derive(Debug, Clone, PartialEq)]
pub enum Solicited {
    /// The source answered.
    Answered {
        /// The answer, not yet validated.
        proposal: Proposal,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed or timed out.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// The last error observed.
        error: DecisionError,
    },
}

/// Attempt count, per-attempt timeout and backoff for decision requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    timeout: Duration,
    backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, timeout: Duration, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            backoff,
        }
    }

    /// Maximum attempts per request.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Ask `source` for a move, retrying on failure or timeout.
    pub async fn solicit<D: DecisionSource>(
        &self,
        source: &mut D,
        request: &DecisionRequest,
    ) -> Solicited {
        let deadline_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            source.ready().await;
            let error = match tokio::time::timeout(self.timeout, source.propose(request)).await {
                Ok(Ok(proposal)) => {
                    debug!(
                        agent = %request.agent,
                        round = request.round,
                        attempt,
                        value = %proposal.value,
                        "Proposal received"
                    );
                    return Solicited::Answered {
                        proposal,
                        attempts: attempt,
                    };
                }
                Ok(Err(e)) => e,
                Err(_elapsed) => DecisionError::Timeout {
                    agent: request.agent.clone(),
                    deadline_ms,
                },
            };

            warn!(
                agent = %request.agent,
                round = request.round,
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Decision request failed"
            );

            if attempt >= self.max_attempts {
                return Solicited::Exhausted {
                    attempts: attempt,
                    error,
                };
            }
            tokio::time::sleep(self.backoff.saturating_mul(attempt)).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.timeout_ms),
            Duration::from_millis(config.backoff_ms),
        )
    }
}
