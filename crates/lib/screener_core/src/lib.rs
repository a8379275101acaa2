//! # screener_core
//!
//! Core authentication and session domain logic for Screener.

pub mod auth;
#[cfg(feature = "postgres")]
pub mod migrate;
pub mod models;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
