//! Server-sent event stream fixture
//!
//! This module provides the event-stream driver: a periodically incrementing
//! counter event pushed to each streaming connection, with graceful
//! (client-driven), forced (server-driven transport reset) and shared-counter
//! termination scenarios.

pub mod config;
pub mod frame;
pub mod server;


pub use config::{SseConfig, SseMode};
pub use server::SseServer;
