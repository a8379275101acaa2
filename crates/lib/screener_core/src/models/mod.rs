//! Domain and wire models.

pub mod auth;
pub mod wire;
