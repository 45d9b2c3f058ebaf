use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Process-wide relay counters.
///
/// Written only from inside the executor's critical section, read lock-free
/// by the health endpoint. Counters are monotonic.
#[derive(Debug, Default)]
pub struct RelayStats {
    request_count: AtomicU64,
    session_rotation_count: AtomicU64,
    current_proxy: RwLock<String>,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Acquire)
    }

    /// Increment the request counter, returning the pre-increment value
    pub fn record_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::AcqRel)
    }

    pub fn session_rotation_count(&self) -> u64 {
        self.session_rotation_count.load(Ordering::Acquire)
    }

    pub fn record_session_rotation(&self) {
        self.session_rotation_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current_proxy(&self) -> String {
        self.current_proxy.read().clone()
    }

    pub fn set_current_proxy(&self, name: &str) {
        *self.current_proxy.write() = name.to_string();
    }
}

/// Point-in-time view of the relay state for the health endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub proxies: usize,
    pub request_count: u64,
    pub proxy_cursor: usize,
    pub session_rotation_count: u64,
    pub current_proxy: String,
}
