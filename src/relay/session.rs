//! Session lifecycle
//!
//! Exactly one [`Session`] is current at any time. Rotation rebinds its
//! egress route in place; a reset discards it and builds a new one on the
//! next proxy. Callers that still hold the old session finish (or fail) on
//! it and recover through their own retry loop.

use std::sync::Arc;

use arc_swap::ArcSwap;
use reqwest::header::HeaderMap;
use tracing::info;

use crate::error::Result;
use crate::models::{ProxyEndpoint, RelayStats, UpstreamResponse};
use crate::relay::pool::ProxyPool;
use crate::relay::transport::{Connection, Connector};

/// The endpoint a session currently egresses through
#[derive(Debug)]
pub struct EgressRoute {
    current: ArcSwap<ProxyEndpoint>,
}

impl EgressRoute {
    pub fn new(endpoint: Arc<ProxyEndpoint>) -> Self {
        Self {
            current: ArcSwap::new(endpoint),
        }
    }

    pub fn current(&self) -> Arc<ProxyEndpoint> {
        self.current.load_full()
    }

    pub fn rebind(&self, endpoint: Arc<ProxyEndpoint>) {
        self.current.store(endpoint);
    }
}

/// Long-lived connection context bound to one egress route
pub struct Session {
    id: u64,
    route: Arc<EgressRoute>,
    connection: Arc<dyn Connection>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn proxy(&self) -> Arc<ProxyEndpoint> {
        self.route.current()
    }

    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<UpstreamResponse> {
        self.connection.get(url, headers).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("proxy", &self.route.current().name)
            .finish()
    }
}

/// Owns the current session.
///
/// Not synchronised on its own; the executor keeps it inside its critical
/// section together with the rate limiter.
pub struct SessionManager {
    pool: Arc<ProxyPool>,
    connector: Arc<dyn Connector>,
    stats: Arc<RelayStats>,
    current: Arc<Session>,
    next_id: u64,
}

impl SessionManager {
    /// Create the manager and bind the initial session to the first proxy
    pub fn new(
        pool: Arc<ProxyPool>,
        connector: Arc<dyn Connector>,
        stats: Arc<RelayStats>,
    ) -> Result<Self> {
        let current = Self::open(&pool, connector.as_ref(), &stats, 0)?;

        Ok(Self {
            pool,
            connector,
            stats,
            current,
            next_id: 1,
        })
    }

    fn open(
        pool: &ProxyPool,
        connector: &dyn Connector,
        stats: &RelayStats,
        id: u64,
    ) -> Result<Arc<Session>> {
        let endpoint = pool.next();
        let route = Arc::new(EgressRoute::new(endpoint.clone()));
        let connection = connector.connect(route.clone())?;
        stats.set_current_proxy(&endpoint.name);

        Ok(Arc::new(Session {
            id,
            route,
            connection,
        }))
    }

    pub fn current(&self) -> Arc<Session> {
        self.current.clone()
    }

    /// Rebind the current session to the next proxy of the pool
    pub fn rotate_proxy(&mut self) -> Arc<ProxyEndpoint> {
        let endpoint = self.pool.next();
        self.current.route.rebind(endpoint.clone());
        self.stats.set_current_proxy(&endpoint.name);

        info!(
            session = self.current.id,
            "Rotated proxy to {}", endpoint
        );
        endpoint
    }

    /// Discard the current session and open a new one on the next proxy.
    ///
    /// On failure the old session stays current; the pool cursor has still
    /// advanced.
    pub fn reset_session(&mut self) -> Result<Arc<ProxyEndpoint>> {
        let session = Self::open(&self.pool, self.connector.as_ref(), &self.stats, self.next_id)?;
        self.next_id += 1;
        self.stats.record_session_rotation();

        let endpoint = session.proxy();
        info!(
            old_session = self.current.id,
            new_session = session.id,
            rotations = self.stats.session_rotation_count(),
            "Reset session on {}",
            endpoint
        );

        self.current = session;
        Ok(endpoint)
    }
}
