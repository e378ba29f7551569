//! Recording response channel for unit tests.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use tokio::io::DuplexStream;

use crate::http::channel::{Capabilities, ChannelError, Hijacked, ResponseChannel};

/// Records every operation; headers are snapshotted at each status commit.
#[derive(Debug, Default)]
pub struct MockChannel {
    pub headers: HeaderMap,
    pub statuses: Vec<StatusCode>,
    pub committed_headers: Vec<HeaderMap>,
    pub body: Vec<u8>,
    pub flushes: usize,
    pub hijacks: usize,
    pub capabilities: Capabilities,
    /// Client side of the connection handed out on hijack.
    pub peer: Option<DuplexStream>,
    /// Drop the client side right after a hijack, as a client hanging up.
    pub hang_up_on_hijack: bool,
}

impl MockChannel {
    /// A channel with every capability.
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::ALL,
            ..Default::default()
        }
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ResponseChannel for MockChannel {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.statuses.push(status);
        self.committed_headers.push(self.headers.clone());
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        self.flushes += 1;
        Ok(())
    }

    async fn hijack(&mut self) -> Result<Hijacked, ChannelError> {
        self.hijacks += 1;
        let (ours, theirs) = tokio::io::duplex(1024);
        if !self.hang_up_on_hijack {
            self.peer = Some(theirs);
        }
        Ok(Hijacked::new(ours).with_buffered(Bytes::from_static(b"early bytes")))
    }
}
