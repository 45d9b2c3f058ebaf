//! Retry policy
//!
//! A pure transition function over [`RetryState`]: given the attempt index
//! and its classified outcome it yields the next state, the recovery to apply
//! to the session, and how long to wait before the next attempt. Scheduling
//! is left to the caller.
//!
//! | Outcome            | Recovery        | Delay                 |
//! |--------------------|-----------------|-----------------------|
//! | 200                | -               | terminal success      |
//! | 403                | reset session   | fixed forbidden delay |
//! | 407                | rotate proxy    | none                  |
//! | 429, 503           | rotate proxy    | `base^attempt` units  |
//! | other status       | -               | terminal failure      |
//! | transport error    | -               | fixed transport delay |

use std::time::Duration;

use crate::config::RelayConfig;
use crate::models::AttemptOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded,
    PermanentFailure,
    ExhaustedFailure,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryState::Attempting(_))
    }
}

/// Session recovery requested before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    RotateProxy,
    ResetSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: RetryState,
    pub recovery: Recovery,
    pub delay: Duration,
}

impl Transition {
    fn terminal(next: RetryState) -> Self {
        Self {
            next,
            recovery: Recovery::None,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call
    pub max_retries: u32,
    pub backoff_base: u32,
    pub backoff_unit: Duration,
    pub forbidden_delay: Duration,
    pub transport_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 2,
            backoff_unit: Duration::from_secs(1),
            forbidden_delay: Duration::from_secs(5),
            transport_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            backoff_base: config.backoff_base,
            backoff_unit: config.backoff_unit,
            forbidden_delay: config.forbidden_delay,
            transport_delay: config.transport_delay,
        }
    }

    /// Exponential backoff for `attempt`: `unit * base^attempt`.
    ///
    /// Depends only on the attempt index, never on elapsed time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }

    pub fn transition(&self, attempt: u32, outcome: &AttemptOutcome) -> Transition {
        let (recovery, delay) = match outcome {
            AttemptOutcome::Success { .. } => {
                return Transition::terminal(RetryState::Succeeded);
            }
            AttemptOutcome::PermanentFailure { .. } => {
                return Transition::terminal(RetryState::PermanentFailure);
            }
            AttemptOutcome::RetryableFailure { status, .. } => match status {
                403 => (Recovery::ResetSession, self.forbidden_delay),
                407 => (Recovery::RotateProxy, Duration::ZERO),
                _ => (Recovery::RotateProxy, self.backoff(attempt)),
            },
            AttemptOutcome::TransportError { .. } => (Recovery::None, self.transport_delay),
        };

        let next_attempt = attempt + 1;
        if next_attempt >= self.max_retries {
            // Recovery still applies; no wait before a terminal state.
            return Transition {
                next: RetryState::ExhaustedFailure,
                recovery,
                delay: Duration::ZERO,
            };
        }

        Transition {
            next: RetryState::Attempting(next_attempt),
            recovery,
            delay,
        }
    }
}
