//! Service layer between handlers and `screener_core`.

pub mod auth;
