//! Resilient outbound request core
//!
//! This module decides, for every outbound call, which egress proxy and
//! browser identity to use and how to recover when an attempt fails:
//! - Round-robin proxy pool
//! - Per-attempt identity generation
//! - Process-wide pacing with periodic rotation
//! - Single current session with rotate/reset
//! - Retry state machine and the executor that drives it

pub mod executor;
pub mod identity;
pub mod pool;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod transport;

pub use executor::RequestExecutor;
pub use identity::{Browser, Identity, IdentityGenerator, Platform};
pub use pool::ProxyPool;
pub use rate_limit::{Cadence, RateLimiter, TokioClock};
pub use retry::{Recovery, RetryPolicy, RetryState, Transition};
pub use session::{EgressRoute, Session, SessionManager};
pub use transport::{Connection, Connector, ReqwestConnector};
