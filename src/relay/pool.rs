//! Round-robin pool of egress endpoints

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::models::ProxyEndpoint;

/// Fixed, ordered set of egress endpoints.
///
/// The endpoint list never changes after construction; only the cursor moves.
/// Selection is deterministic round-robin so load is spread evenly across
/// providers.
#[derive(Debug)]
pub struct ProxyPool {
    endpoints: Vec<Arc<ProxyEndpoint>>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    /// Build a pool. Fails when `endpoints` is empty.
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(RelayError::NoProxiesConfigured);
        }

        Ok(Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Return the next endpoint and advance the cursor
    pub fn next(&self) -> Arc<ProxyEndpoint> {
        let len = self.endpoints.len();
        let idx = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c % len + 1))
            .map(|prev| prev % len)
            .unwrap_or(0);

        self.endpoints[idx].clone()
    }

    /// Raw cursor value; the next call returns `cursor % len`
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of configured endpoints, never zero
    pub fn size(&self) -> usize {
        self.endpoints.len()
    }
}
