//! Mutual-authentication gate fixture
//!
//! This module provides the certificate-gated listener: TLS with a requested
//! (but transport-optional) client certificate, where a three-way request
//! layer decision separates authorized, untrusted, and missing certificates.

pub mod config;
pub mod gate;
pub mod server;
pub mod verifier;


pub use config::TlsConfig;
pub use gate::{CertDecision, CertGate};
pub use server::TlsGateServer;
