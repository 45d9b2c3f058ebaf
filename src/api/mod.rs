//! Catalog API
//!
//! Thin HTTP surface over the relay core: the catalog endpoint, a banner and
//! a health check.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
