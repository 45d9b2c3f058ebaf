use bytes::Bytes;

use crate::error::RelayError;

/// Raw upstream reply as seen by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Classified result of one outbound attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 200
    Success { body: Bytes },
    /// 403, 407, 429 and 503
    RetryableFailure { status: u16, body: Bytes },
    /// Any other status
    PermanentFailure { status: u16, body: Bytes },
    /// DNS, connect, proxy or timeout failure
    TransportError { cause: String },
}

impl AttemptOutcome {
    /// Statuses recovered locally by the retry policy
    pub const RETRYABLE_STATUSES: [u16; 4] = [403, 407, 429, 503];

    pub fn from_response(response: UpstreamResponse) -> Self {
        let UpstreamResponse { status, body } = response;
        match status {
            200 => AttemptOutcome::Success { body },
            s if Self::RETRYABLE_STATUSES.contains(&s) => {
                AttemptOutcome::RetryableFailure { status, body }
            }
            _ => AttemptOutcome::PermanentFailure { status, body },
        }
    }

    pub fn from_result(result: std::result::Result<UpstreamResponse, RelayError>) -> Self {
        match result {
            Ok(response) => Self::from_response(response),
            Err(e) => AttemptOutcome::TransportError {
                cause: e.to_string(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptOutcome::Success { .. } => Some(200),
            AttemptOutcome::RetryableFailure { status, .. }
            | AttemptOutcome::PermanentFailure { status, .. } => Some(*status),
            AttemptOutcome::TransportError { .. } => None,
        }
    }

    /// One-line description used in logs and the exhausted envelope
    pub fn describe(&self) -> String {
        match self {
            AttemptOutcome::TransportError { cause } => cause.clone(),
            other => match other.status() {
                Some(status) => format!("upstream status {}", status),
                None => "unknown".to_string(),
            },
        }
    }
}

/// Terminal result of [`RequestExecutor::execute`](crate::relay::RequestExecutor::execute)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    Success {
        body: Bytes,
        attempts: u32,
    },
    PermanentFailure {
        status: u16,
        body: Bytes,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl RelayResult {
    /// Terminal result for the final attempt's outcome. Anything other than
    /// a success or a permanent failure means the attempts ran out.
    pub fn from_outcome(outcome: AttemptOutcome, attempts: u32) -> Self {
        match outcome {
            AttemptOutcome::Success { body } => RelayResult::Success { body, attempts },
            AttemptOutcome::PermanentFailure { status, body } => RelayResult::PermanentFailure {
                status,
                body,
                attempts,
            },
            other => RelayResult::Exhausted {
                attempts,
                last_error: Some(other.describe()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RelayResult::Success { attempts, .. }
            | RelayResult::PermanentFailure { attempts, .. }
            | RelayResult::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Success body, or the failure as a [`RelayError`]
    pub fn into_body(self) -> std::result::Result<Bytes, RelayError> {
        match self {
            RelayResult::Success { body, .. } => Ok(body),
            RelayResult::PermanentFailure { status, body, .. } => {
                Err(RelayError::UpstreamPermanent {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                })
            }
            RelayResult::Exhausted {
                attempts,
                last_error,
            } => Err(RelayError::RetriesExhausted {
                attempts,
                last_error,
            }),
        }
    }
}
