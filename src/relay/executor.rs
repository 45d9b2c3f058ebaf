//! Request executor
//!
//! Drives one call through the retry state machine. Bookkeeping (pacing,
//! proxy/session selection, counters) happens inside a single async mutex;
//! the network call itself runs outside it so concurrent callers only queue
//! on the bookkeeping.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::models::{AttemptOutcome, RelayResult, RelayStats, StatsSnapshot};
use crate::relay::identity::{Identity, IdentityGenerator};
use crate::relay::pool::ProxyPool;
use crate::relay::rate_limit::RateLimiter;
use crate::relay::retry::{Recovery, RetryPolicy, RetryState};
use crate::relay::session::{Session, SessionManager};
use crate::relay::transport::{Connector, ReqwestConnector};

/// State guarded by the executor's critical section
struct Gate {
    limiter: RateLimiter,
    sessions: SessionManager,
}

/// Composes pool, sessions, pacing, identity and retry policy per call
pub struct RequestExecutor {
    gate: Mutex<Gate>,
    policy: RetryPolicy,
    identity: IdentityGenerator,
    pool: Arc<ProxyPool>,
    stats: Arc<RelayStats>,
}

impl RequestExecutor {
    pub fn new(
        config: &RelayConfig,
        pool: Arc<ProxyPool>,
        connector: Arc<dyn Connector>,
        identity: IdentityGenerator,
    ) -> Result<Self> {
        let stats = Arc::new(RelayStats::new());
        let sessions = SessionManager::new(pool.clone(), connector, stats.clone())?;
        let limiter = RateLimiter::from_config(config, stats.clone());

        Ok(Self {
            gate: Mutex::new(Gate { limiter, sessions }),
            policy: RetryPolicy::from_config(config),
            identity,
            pool,
            stats,
        })
    }

    /// Build an executor with the reqwest transport and entropy-seeded identities
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let pool = Arc::new(ProxyPool::new(config.proxies.clone())?);
        let connector = Arc::new(ReqwestConnector::new(
            config.connect_timeout,
            config.request_timeout,
        ));
        let identity = IdentityGenerator::new(config.site_origin.clone());

        Self::new(config, pool, connector, identity)
    }

    /// Fetch `url` through the relay. Never fails: every path ends in one of
    /// the [`RelayResult`] shapes.
    #[instrument(skip(self))]
    pub async fn execute(&self, url: &str) -> RelayResult {
        let mut attempt = 0;

        loop {
            let (session, identity) = self.prepare_attempt().await;
            let proxy = session.proxy();

            debug!(
                attempt,
                session = session.id(),
                proxy = %proxy,
                platform = identity.platform.as_str(),
                "Sending upstream request"
            );

            let result = session.get(url, identity.headers()).await;
            let outcome = AttemptOutcome::from_result(result);
            let transition = self.policy.transition(attempt, &outcome);
            let attempts = attempt + 1;

            match transition.next {
                RetryState::Succeeded | RetryState::PermanentFailure => {
                    if transition.next == RetryState::PermanentFailure {
                        warn!(
                            status = ?outcome.status(),
                            proxy = %proxy,
                            "Upstream returned a non-retryable status"
                        );
                    } else {
                        debug!(attempts, "Upstream request succeeded");
                    }
                    return RelayResult::from_outcome(outcome, attempts);
                }
                RetryState::Attempting(next) => {
                    self.log_retry(&outcome, attempts, &proxy.name);
                    self.recover(transition.recovery).await;
                    if !transition.delay.is_zero() {
                        debug!("Backing off for {:?}", transition.delay);
                        sleep(transition.delay).await;
                    }
                    attempt = next;
                }
                RetryState::ExhaustedFailure => {
                    self.log_retry(&outcome, attempts, &proxy.name);
                    self.recover(transition.recovery).await;
                    error!(attempts, "Max retries exceeded");
                    return RelayResult::from_outcome(outcome, attempts);
                }
            }
        }
    }

    /// Pace, apply periodic rotation, and pick session and identity
    async fn prepare_attempt(&self) -> (Arc<Session>, Identity) {
        let mut gate = self.gate.lock().await;
        let Gate { limiter, sessions } = &mut *gate;

        limiter.before_request(sessions).await;
        (sessions.current(), self.identity.generate())
    }

    async fn recover(&self, recovery: Recovery) {
        if recovery == Recovery::None {
            return;
        }

        let mut gate = self.gate.lock().await;
        match recovery {
            Recovery::RotateProxy => {
                gate.sessions.rotate_proxy();
            }
            Recovery::ResetSession => {
                if let Err(e) = gate.sessions.reset_session() {
                    error!("Session reset failed: {}", e);
                }
            }
            Recovery::None => {}
        }
    }

    fn log_retry(&self, outcome: &AttemptOutcome, attempts: u32, proxy: &str) {
        match outcome {
            AttemptOutcome::TransportError { cause } => {
                error!(
                    "Request failed through {} (attempt {}/{}): {}",
                    proxy, attempts, self.policy.max_retries, cause
                );
            }
            other => {
                warn!(
                    "Retryable {} through {} (attempt {}/{})",
                    other.describe(),
                    proxy,
                    attempts,
                    self.policy.max_retries
                );
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            proxies: self.pool.size(),
            request_count: self.stats.request_count(),
            proxy_cursor: self.pool.cursor(),
            session_rotation_count: self.stats.session_rotation_count(),
            current_proxy: self.stats.current_proxy(),
        }
    }
}
