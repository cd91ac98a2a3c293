use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

// Process-wide allocator for session identities. Identities are never reused.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one accepted connection
///
/// Assigned at accept time from a monotonically increasing process-wide
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol family a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Long-lived event stream (SSE)
    Stream,
    /// Bidirectional message socket (WebSocket)
    Socket,
    /// Forward-proxy request
    Proxy,
    /// Certificate-gated request
    Gated,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Stream => "stream",
            ProtocolKind::Socket => "socket",
            ProtocolKind::Proxy => "proxy",
            ProtocolKind::Gated => "gated",
        }
    }
}

/// Server-side state for one active client connection
///
/// Opening a session assigns a fresh identity and emits the "connection
/// opened" record; releasing it cancels the session's scheduled work and
/// emits "connection closed". This is the only place connection lifecycle
/// is logged, so drivers must release every session exactly once. Release
/// is idempotent, and dropping an unreleased session releases it.
///
/// The embedded [`CancellationToken`] is the teardown path for any timer or
/// task bound to the connection: it is cancelled on release, from either the
/// "client closed" or the "server decided to close" direction.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    kind: ProtocolKind,
    cancel: CancellationToken,
    released: AtomicBool,
}

impl Session {
    /// Registers a new session with a fresh unique identity
    pub fn open(kind: ProtocolKind) -> Self {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        info!(session = %id, kind = kind.as_str(), "Connection opened");
        Self {
            id,
            kind,
            cancel: CancellationToken::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    /// Whether the session has not yet been released
    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    /// Token to pass into scheduling primitives bound to this session
    ///
    /// Cancelled exactly once, on first release.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the session has been released from either direction
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Marks the session terminated; idempotent
    ///
    /// Only the first call cancels the scheduled-work token and emits the
    /// "connection closed" record.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
            info!(session = %self.id, kind = self.kind.as_str(), "Connection closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
