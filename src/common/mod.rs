//! Shared infrastructure for the fixture servers
//!
//! This module contains the connection registry and the common trait
//! implemented by every scenario server.

pub mod request;
pub mod response;
pub mod session;
pub mod test_utils;
pub mod traits;

pub use request::{RequestHead, read_request_head};
pub use response::write_text_response;
pub use session::{ProtocolKind, Session, SessionId};
pub use traits::FixtureServer;
