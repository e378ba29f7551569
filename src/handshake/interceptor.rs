//! Response-side handshake completion.
//!
//! # Responsibilities
//! - Wrap the client's response channel for the lifetime of one tunnel request
//! - Turn the backend's "tunnel ready" status into `101 Switching Protocols`
//! - Attach the WebSocket handshake headers to that response
//! - Delegate every other channel operation untouched
//!
//! # State Machine
//! ```text
//! Created ──commit(200)──▶ Translated ──hijack──▶ Done
//!    │
//!    └──commit(other)───▶ PassThrough ─hijack──▶ Done
//! ```
//! Commits after the first one are forwarded as-is.

use async_trait::async_trait;
use axum::http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::Span;

use crate::handshake::accept::{accept_token, AcceptAlphabet};
use crate::http::channel::{Capabilities, ChannelError, Hijacked, ResponseChannel};

/// Filler header some tunnel backends attach to their success response.
pub const PADDING: HeaderName = HeaderName::from_static("padding");

/// Whether a backend status means the tunnel is established.
pub fn is_tunnel_ready_signal(status: StatusCode) -> bool {
    status == StatusCode::OK
}

/// Lifecycle of a [`HandshakeTranslator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No status committed yet.
    Created,
    /// The ready signal was rewritten into a handshake response.
    Translated,
    /// A non-ready status was forwarded unchanged.
    PassThrough,
    /// The raw connection was handed out.
    Done,
}

/// Response channel decorator completing the WebSocket handshake.
pub struct HandshakeTranslator<'a> {
    inner: &'a mut dyn ResponseChannel,
    key: String,
    alphabet: AcceptAlphabet,
    span: Span,
    state: HandshakeState,
}

impl<'a> HandshakeTranslator<'a> {
    pub fn new(
        inner: &'a mut dyn ResponseChannel,
        key: String,
        alphabet: AcceptAlphabet,
        span: Span,
    ) -> Self {
        Self {
            inner,
            key,
            alphabet,
            span,
            state: HandshakeState::Created,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn stage_handshake_headers(&mut self) {
        let accept = accept_token(&self.key, self.alphabet);
        let headers = self.inner.headers_mut();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        // base64 output is always a valid header value
        if let Ok(value) = HeaderValue::try_from(accept) {
            headers.insert(SEC_WEBSOCKET_ACCEPT, value);
        }
        headers.remove(PADDING);
    }
}

#[async_trait]
impl<'a> ResponseChannel for HandshakeTranslator<'a> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        tracing::trace!(parent: &self.span, "headers_mut");
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        tracing::debug!(parent: &self.span, status = status.as_u16(), "Status commit");

        let status = match self.state {
            HandshakeState::Created if is_tunnel_ready_signal(status) => {
                self.stage_handshake_headers();
                self.state = HandshakeState::Translated;
                tracing::debug!(parent: &self.span, "Tunnel ready, switching protocols");
                StatusCode::SWITCHING_PROTOCOLS
            }
            HandshakeState::Created => {
                self.state = HandshakeState::PassThrough;
                status
            }
            _ => status,
        };

        self.inner.write_status(status);
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        tracing::trace!(parent: &self.span, len = data.len(), "write");
        self.inner.write(data).await
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        tracing::trace!(parent: &self.span, "flush");
        self.inner.flush().await
    }

    async fn hijack(&mut self) -> Result<Hijacked, ChannelError> {
        tracing::trace!(parent: &self.span, state = ?self.state, "hijack");
        let hijacked = self.inner.hijack().await?;
        self.state = HandshakeState::Done;
        Ok(hijacked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::MockChannel;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn translator(inner: &mut MockChannel) -> HandshakeTranslator<'_> {
        HandshakeTranslator::new(inner, KEY.to_string(), AcceptAlphabet::Standard, Span::none())
    }

    #[test]
    fn ready_signal_becomes_switching_protocols() {
        let mut inner = MockChannel::new();
        inner
            .headers
            .insert(PADDING, HeaderValue::from_static("xxxxxxxx"));
        inner
            .headers
            .insert("x-backend", HeaderValue::from_static("kept"));

        let mut t = translator(&mut inner);
        t.write_status(StatusCode::OK);
        assert_eq!(t.state(), HandshakeState::Translated);

        assert_eq!(inner.statuses, vec![StatusCode::SWITCHING_PROTOCOLS]);
        let committed = &inner.committed_headers[0];
        assert_eq!(committed[UPGRADE], "websocket");
        assert_eq!(committed[CONNECTION], "Upgrade");
        assert_eq!(committed[SEC_WEBSOCKET_ACCEPT], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(!committed.contains_key(PADDING));
        assert_eq!(committed["x-backend"], "kept");
    }

    #[test]
    fn url_safe_alphabet_is_honoured() {
        let mut inner = MockChannel::new();
        let mut t =
            HandshakeTranslator::new(&mut inner, KEY.into(), AcceptAlphabet::UrlSafe, Span::none());
        t.write_status(StatusCode::OK);
        assert_eq!(
            inner.committed_headers[0][SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK-xOo="
        );
    }

    #[test]
    fn other_statuses_pass_through_untouched() {
        for status in [
            StatusCode::CREATED,
            StatusCode::NO_CONTENT,
            StatusCode::FORBIDDEN,
            StatusCode::BAD_GATEWAY,
        ] {
            let mut inner = MockChannel::new();
            inner
                .headers
                .insert(PADDING, HeaderValue::from_static("xx"));

            let mut t = translator(&mut inner);
            t.write_status(status);
            assert_eq!(t.state(), HandshakeState::PassThrough);

            assert_eq!(inner.statuses, vec![status]);
            let committed = &inner.committed_headers[0];
            assert_eq!(committed.len(), 1);
            assert!(committed.contains_key(PADDING));
        }
    }

    #[test]
    fn later_commits_are_forwarded_unchanged() {
        let mut inner = MockChannel::new();
        let mut t = translator(&mut inner);
        t.write_status(StatusCode::NOT_FOUND);
        t.write_status(StatusCode::OK);
        assert_eq!(t.state(), HandshakeState::PassThrough);
        assert_eq!(inner.statuses, vec![StatusCode::NOT_FOUND, StatusCode::OK]);
        assert!(!inner.committed_headers[1].contains_key(SEC_WEBSOCKET_ACCEPT));

        let mut inner = MockChannel::new();
        let mut t = translator(&mut inner);
        t.write_status(StatusCode::OK);
        t.write_status(StatusCode::OK);
        assert_eq!(
            inner.statuses,
            vec![StatusCode::SWITCHING_PROTOCOLS, StatusCode::OK]
        );
    }

    #[tokio::test]
    async fn write_and_flush_are_delegated() {
        let mut inner = MockChannel::new();
        let mut t = translator(&mut inner);
        t.headers_mut()
            .insert("x-added", HeaderValue::from_static("1"));
        assert_eq!(t.write(b"hello").await.unwrap(), 5);
        t.flush().await.unwrap();
        t.flush().await.unwrap();
        assert_eq!(t.capabilities(), Capabilities::ALL);

        assert_eq!(inner.body, b"hello");
        assert_eq!(inner.flushes, 2);
        assert_eq!(inner.headers["x-added"], "1");
        assert!(inner.statuses.is_empty());
    }

    #[tokio::test]
    async fn hijack_returns_inner_connection() {
        let mut inner = MockChannel::new();
        let mut t = translator(&mut inner);
        t.write_status(StatusCode::OK);
        let mut hijacked = t.hijack().await.unwrap();
        assert_eq!(t.state(), HandshakeState::Done);
        assert_eq!(&hijacked.buffered[..], b"early bytes");

        assert_eq!(inner.hijacks, 1);
        let mut peer = inner.peer.take().unwrap();
        hijacked.conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn missing_capabilities_surface_through_the_wrapper() {
        let mut inner = MockChannel::with_capabilities(Capabilities::default());
        let t = translator(&mut inner);
        assert_eq!(t.capabilities(), Capabilities::default());

        // channel relying on the trait defaults for flush and hijack
        struct Plain(HeaderMap);

        #[async_trait]
        impl ResponseChannel for Plain {
            fn headers(&self) -> &HeaderMap {
                &self.0
            }
            fn headers_mut(&mut self) -> &mut HeaderMap {
                &mut self.0
            }
            fn write_status(&mut self, _status: StatusCode) {}
            async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
                Ok(data.len())
            }
        }

        let mut plain = Plain(HeaderMap::new());
        let mut t = HandshakeTranslator::new(&mut plain, KEY.into(), AcceptAlphabet::Standard, Span::none());
        let err = t.hijack().await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
        assert_eq!(t.state(), HandshakeState::Created);
        assert!(t.flush().await.is_err());
    }
}
