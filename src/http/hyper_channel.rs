//! Response channel backed by a hyper connection.
//!
//! # Data Flow
//! ```text
//! handler task                          axum handler (awaiting head)
//!     write_status(s) ──oneshot──▶ Response { s, headers, body }
//!     write(bytes)    ──mpsc────▶ streamed body
//!     hijack()        ──OnUpgrade─▶ raw connection once the head is sent
//! ```
//!
//! # Design Decisions
//! - The pipeline runs in its own task so it can keep the channel after the
//!   response head has been returned to hyper
//! - Statuses that cannot carry a body get an empty one
//! - Hijack requires a committed head; hyper only releases the connection
//!   after `101` (or a successful CONNECT) has been written

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::stream;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::sync::{mpsc, oneshot};

use crate::http::channel::{Capabilities, Capability, ChannelError, Hijacked, ResponseChannel};

/// Body chunks buffered between the handler and hyper.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Response channel for one request served by [`crate::http::HttpServer`].
pub struct HyperChannel {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Response>>,
    body: Option<mpsc::Sender<Bytes>>,
    status: Option<StatusCode>,
    upgrade: Option<OnUpgrade>,
}

impl HyperChannel {
    /// Create a channel and the receiver for its response head.
    ///
    /// `upgrade` is hyper's upgrade handle for the connection; without it the
    /// channel cannot be hijacked.
    pub fn new(upgrade: Option<OnUpgrade>) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let channel = Self {
            headers: HeaderMap::new(),
            head: Some(tx),
            body: None,
            status: None,
            upgrade,
        };
        (channel, rx)
    }

    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// Committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn commit_if_needed(&mut self) {
        if !self.is_committed() {
            self.write_status(StatusCode::OK);
        }
    }
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

#[async_trait]
impl ResponseChannel for HyperChannel {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        let Some(head) = self.head.take() else {
            tracing::warn!(
                status = status.as_u16(),
                committed = ?self.status,
                "Superfluous status commit ignored"
            );
            return;
        };

        let body = if allows_body(status) {
            let (tx, rx) = mpsc::channel::<Bytes>(BODY_CHANNEL_CAPACITY);
            self.body = Some(tx);
            Body::from_stream(stream::unfold(rx, |mut rx| async move {
                rx.recv()
                    .await
                    .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
            }))
        } else {
            Body::empty()
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        self.status = Some(status);

        if head.send(response).is_err() {
            tracing::debug!(status = status.as_u16(), "Client went away before response head");
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.commit_if_needed();
        let Some(body) = &self.body else {
            return Err(match self.status {
                Some(status) => ChannelError::BodyNotAllowed(status),
                None => ChannelError::NotCommitted,
            });
        };
        body.send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(data.len())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            flush: true,
            hijack: self.upgrade.is_some(),
        }
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        // chunks are handed to hyper as they are written; only the head can be pending
        self.commit_if_needed();
        Ok(())
    }

    async fn hijack(&mut self) -> Result<Hijacked, ChannelError> {
        if !self.is_committed() {
            return Err(ChannelError::NotCommitted);
        }
        let upgrade = self
            .upgrade
            .take()
            .ok_or(ChannelError::Unsupported(Capability::Hijack))?;

        // end the response body so hyper can hand the connection over
        self.body = None;

        let upgraded = upgrade.await.map_err(ChannelError::Upgrade)?;
        Ok(Hijacked::new(TokioIo::new(upgraded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn commit_sends_head_with_staged_headers() {
        let (mut channel, head) = HyperChannel::new(None);
        channel
            .headers_mut()
            .insert("x-tunnel", HeaderValue::from_static("yes"));
        channel.write_status(StatusCode::ACCEPTED);
        assert!(channel.is_committed());
        assert!(channel.headers().is_empty());

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-tunnel"], "yes");
    }

    #[tokio::test]
    async fn body_is_streamed_after_implicit_ok() {
        let (mut channel, head) = HyperChannel::new(None);
        assert_eq!(channel.write(b"hello ").await.unwrap(), 6);
        channel.write(b"world").await.unwrap();
        drop(channel);

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn second_commit_is_ignored() {
        let (mut channel, head) = HyperChannel::new(None);
        channel.write_status(StatusCode::NOT_FOUND);
        channel.write_status(StatusCode::OK);
        assert_eq!(channel.status(), Some(StatusCode::NOT_FOUND));
        drop(channel);
        assert_eq!(head.await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn switching_protocols_has_no_body() {
        let (mut channel, _head) = HyperChannel::new(None);
        channel.write_status(StatusCode::SWITCHING_PROTOCOLS);
        let err = channel.write(b"x").await.unwrap_err();
        assert!(matches!(err, ChannelError::BodyNotAllowed(s) if s == StatusCode::SWITCHING_PROTOCOLS));
    }

    #[tokio::test]
    async fn flush_commits_ok() {
        let (mut channel, head) = HyperChannel::new(None);
        channel.flush().await.unwrap();
        assert_eq!(head.await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn hijack_needs_upgrade_handle_and_commit() {
        let (mut channel, _head) = HyperChannel::new(None);
        assert_eq!(
            channel.capabilities(),
            Capabilities {
                flush: true,
                hijack: false
            }
        );
        assert!(matches!(
            channel.hijack().await.unwrap_err(),
            ChannelError::NotCommitted
        ));
        channel.write_status(StatusCode::SWITCHING_PROTOCOLS);
        assert!(matches!(
            channel.hijack().await.unwrap_err(),
            ChannelError::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn write_after_client_left_reports_closed() {
        let (mut channel, head) = HyperChannel::new(None);
        channel.write_status(StatusCode::OK);
        drop(head);
        // the response (and its body receiver) died with the head receiver
        let err = channel.write(b"late").await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }
}
