//! CONNECT tunnel handler.
//!
//! # Responsibilities
//! - Dial the host named by a CONNECT request's authority
//! - Report "tunnel ready" with a plain `200`
//! - Take over the client connection and splice it to the backend
//!
//! # Design Decisions
//! - Dial failures surface as handler errors (502/504) before anything is
//!   committed
//! - Bytes the client sent ahead of the switch are forwarded first

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::channel::{Hijacked, ResponseChannel};
use crate::http::handler::{Handler, HandlerError};

/// Terminal handler opening raw TCP tunnels for CONNECT requests.
#[derive(Debug, Clone)]
pub struct ConnectHandler {
    connect_timeout: Duration,
}

impl ConnectHandler {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn dial(&self, host: &str) -> Result<TcpStream, HandlerError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(host)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(HandlerError::UpstreamConnect {
                host: host.to_owned(),
                source,
            }),
            Err(_) => Err(HandlerError::UpstreamTimeout {
                host: host.to_owned(),
            }),
        }
    }
}

#[async_trait]
impl Handler for ConnectHandler {
    async fn serve(
        &self,
        req: Request<Body>,
        resp: &mut dyn ResponseChannel,
    ) -> Result<(), HandlerError> {
        if req.method() != Method::CONNECT {
            resp.write_status(StatusCode::METHOD_NOT_ALLOWED);
            resp.write(b"only tunnel requests are served here\n").await?;
            return Ok(());
        }

        let host = match req.uri().authority() {
            Some(authority) => authority.to_string(),
            None => return Err(HandlerError::InvalidRoutingHost(req.uri().to_string())),
        };

        let mut upstream = self.dial(&host).await?;
        tracing::debug!(host = %host, "Tunnel established");

        resp.write_status(StatusCode::OK);
        resp.flush().await?;
        let Hijacked {
            mut conn,
            buffered,
        } = resp.hijack().await?;

        if !buffered.is_empty() {
            upstream.write_all(&buffered).await.map_err(|source| {
                HandlerError::UpstreamConnect {
                    host: host.clone(),
                    source,
                }
            })?;
        }

        match tokio::io::copy_bidirectional(&mut conn, &mut upstream).await {
            Ok((to_backend, to_client)) => {
                tracing::info!(host = %host, to_backend, to_client, "Tunnel closed");
            }
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "Tunnel aborted");
            }
        }
        Ok(())
    }
}
