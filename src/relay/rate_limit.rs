//! Outbound pacing and periodic rotation
//!
//! Spacing applies to attempt starts process-wide. The pacer is a governor
//! GCRA limiter with a burst of one, read through [`TokioClock`] so a paused
//! runtime drives it deterministically.

use std::sync::Arc;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use tokio::time::sleep;
use tracing::{debug, error};

use crate::config::RelayConfig;
use crate::models::RelayStats;
use crate::relay::session::SessionManager;

type Pacer<C> = GovRateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Periodic action triggered by the request counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Steady,
    RotateProxy,
    ResetSession,
}

impl Cadence {
    /// Decide the action for the pre-increment request `count`.
    ///
    /// Count 0 never triggers; a reset subsumes a rotation. A cadence of 0
    /// disables that trigger.
    pub fn for_count(count: u64, rotate_every: u64, reset_every: u64) -> Self {
        if count == 0 {
            Cadence::Steady
        } else if reset_every > 0 && count % reset_every == 0 {
            Cadence::ResetSession
        } else if rotate_every > 0 && count % rotate_every == 0 {
            Cadence::RotateProxy
        } else {
            Cadence::Steady
        }
    }
}

/// governor clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Spaces attempt starts and drives periodic rotation
pub struct RateLimiter<C: Clock = TokioClock> {
    /// `None` when spacing is disabled
    pacer: Option<Pacer<C>>,
    clock: C,
    rotate_every: u64,
    reset_every: u64,
    stats: Arc<RelayStats>,
}

impl RateLimiter {
    pub fn new(
        min_interval: Duration,
        rotate_every: u64,
        reset_every: u64,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self::with_clock(min_interval, rotate_every, reset_every, stats, TokioClock)
    }

    pub fn from_config(config: &RelayConfig, stats: Arc<RelayStats>) -> Self {
        Self::new(
            config.min_interval,
            config.rotate_every,
            config.reset_every,
            stats,
        )
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(
        min_interval: Duration,
        rotate_every: u64,
        reset_every: u64,
        stats: Arc<RelayStats>,
        clock: C,
    ) -> Self {
        // One start per period, no burst.
        let pacer = Quota::with_period(min_interval)
            .map(|quota| GovRateLimiter::direct_with_clock(quota, &clock));

        Self {
            pacer,
            clock,
            rotate_every,
            reset_every,
            stats,
        }
    }

    /// Claim the next start slot, or report how long until one is free
    pub fn check_spacing(&self) -> std::result::Result<(), Duration> {
        match &self.pacer {
            None => Ok(()),
            Some(pacer) => pacer
                .check()
                .map_err(|not_until| not_until.wait_time_from(self.clock.now())),
        }
    }

    /// Wait until the next attempt may start, then apply the periodic
    /// rotation for the current count and increment it
    pub async fn before_request(&mut self, sessions: &mut SessionManager) -> Cadence {
        while let Err(wait) = self.check_spacing() {
            debug!("Pacing outbound request for {:?}", wait);
            sleep(wait).await;
        }

        let count = self.stats.request_count();
        let cadence = Cadence::for_count(count, self.rotate_every, self.reset_every);
        match cadence {
            Cadence::ResetSession => {
                if let Err(e) = sessions.reset_session() {
                    error!("Periodic session reset failed: {}", e);
                }
            }
            Cadence::RotateProxy => {
                sessions.rotate_proxy();
            }
            Cadence::Steady => {}
        }

        self.stats.record_request();
        cadence
    }
}
