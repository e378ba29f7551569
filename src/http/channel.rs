//! Response channel abstraction.
//!
//! # Responsibilities
//! - Expose the outbound half of a request as a writable channel
//! - Stage headers until the status is committed
//! - Advertise optional capabilities (flush, hijack) up front
//!
//! # Design Decisions
//! - Capabilities are probed once through `capabilities()`; callers never
//!   discover a missing capability by trial
//! - Status commit is synchronous: it stages the head, it does no I/O
//! - Hijack hands out the raw connection; the channel is inert afterwards

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

/// Optional channel capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Explicitly push staged output to the client.
    Flush,
    /// Take exclusive ownership of the raw connection.
    Hijack,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Flush => write!(f, "flush"),
            Capability::Hijack => write!(f, "hijack"),
        }
    }
}

/// Result of a capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub flush: bool,
    pub hijack: bool,
}

impl Capabilities {
    /// All optional capabilities present.
    pub const ALL: Capabilities = Capabilities { flush: true, hijack: true };

    /// First required capability that is absent, if any.
    pub fn missing(&self) -> Option<Capability> {
        if !self.flush {
            Some(Capability::Flush)
        } else if !self.hijack {
            Some(Capability::Hijack)
        } else {
            None
        }
    }
}

/// Raw byte stream handed out by a hijack.
pub trait RawIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawIo for T {}

/// A hijacked connection.
pub struct Hijacked {
    /// The raw connection to the client.
    pub conn: Box<dyn RawIo>,
    /// Bytes already read from the client but not yet consumed.
    pub buffered: Bytes,
}

impl Hijacked {
    pub fn new(conn: impl RawIo + 'static) -> Self {
        Self {
            conn: Box::new(conn),
            buffered: Bytes::new(),
        }
    }

    pub fn with_buffered(mut self, buffered: Bytes) -> Self {
        self.buffered = buffered;
        self
    }
}

impl std::fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hijacked")
            .field("buffered", &self.buffered.len())
            .finish_non_exhaustive()
    }
}

/// Errors raised by response channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("response channel does not support {0}")]
    Unsupported(Capability),

    #[error("response head has not been committed")]
    NotCommitted,

    #[error("status {0} does not allow a response body")]
    BodyNotAllowed(StatusCode),

    #[error("client connection closed")]
    Closed,

    #[error("connection upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The outbound side of one request.
///
/// Mirrors the classic response-writer contract: headers are staged, a single
/// status commit freezes them, then either body writes follow or the raw
/// connection is taken over.
#[async_trait]
pub trait ResponseChannel: Send {
    /// Staged response headers.
    fn headers(&self) -> &HeaderMap;

    /// Mutable staged response headers. Changes after the commit are ignored.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status line together with the staged headers.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes, committing `200 OK` first if nothing was committed.
    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Which optional capabilities this channel supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported(Capability::Flush))
    }

    async fn hijack(&mut self) -> Result<Hijacked, ChannelError> {
        Err(ChannelError::Unsupported(Capability::Hijack))
    }
}
