//! Catalog Relay - resilient upstream catalog proxy
//!
//! Relays vehicle catalog searches to an upstream marketplace API through a
//! pool of egress proxies.
//!
//! ## Features
//!
//! - Round-robin egress proxy pool with periodic rotation and session resets
//! - Randomized browser identity headers per attempt
//! - Process-wide request pacing
//! - Status-aware retry with exponential backoff
//! - Health endpoint exposing relay counters

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;

pub use config::Config;
pub use error::{RelayError, Result};
