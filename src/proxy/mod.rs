//! Forward-proxy fixture
//!
//! This module provides the proxy gate: standard forward-proxy semantics
//! (CONNECT tunnels and absolute-form requests), either open or gated behind
//! a fixed `Proxy-Authorization: Basic` credential pair.

pub mod auth;
pub mod config;
pub mod server;

#[cfg(test)]
mod tests;

pub use auth::{ProxyCredentials, ProxyDecision, authorize};
pub use config::ProxyConfig;
pub use server::ProxyServer;
