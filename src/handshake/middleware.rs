//! `wss_handshake_tunnel` pipeline stage.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;

use crate::handshake::accept::AcceptAlphabet;
use crate::handshake::interceptor::HandshakeTranslator;
use crate::handshake::request::UpgradeRequest;
use crate::http::channel::ResponseChannel;
use crate::http::handler::{Handler, HandlerError, Middleware};

/// Bridges WebSocket upgrades onto CONNECT tunnels.
///
/// Requests that are not WebSocket upgrades carrying a tunnel host are handed
/// to `next` untouched. Matching requests are rewritten into CONNECT requests
/// and `next` sees a response channel that answers the client's handshake once
/// the tunnel reports ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct WssHandshakeTunnel {
    alphabet: AcceptAlphabet,
}

impl WssHandshakeTunnel {
    /// Directive name used in configuration and logs.
    pub const NAME: &'static str = "wss_handshake_tunnel";

    pub fn new() -> Self {
        Self::default()
    }

    /// Override the accept token encoding.
    pub fn with_alphabet(mut self, alphabet: AcceptAlphabet) -> Self {
        self.alphabet = alphabet;
        self
    }

    pub fn alphabet(&self) -> AcceptAlphabet {
        self.alphabet
    }
}

#[async_trait]
impl Middleware for WssHandshakeTunnel {
    async fn serve(
        &self,
        mut req: Request<Body>,
        resp: &mut dyn ResponseChannel,
        next: &dyn Handler,
    ) -> Result<(), HandlerError> {
        let span = tracing::debug_span!(
            "wss_handshake_tunnel",
            method = %req.method(),
            uri = %req.uri(),
        );

        let Some(upgrade) = UpgradeRequest::detect(&req) else {
            tracing::trace!(parent: &span, "Not a tunnel upgrade, passing through");
            return next.serve(req, resp).await;
        };

        upgrade.rewrite(&mut req)?;

        if let Some(missing) = resp.capabilities().missing() {
            tracing::error!(
                parent: &span,
                capability = %missing,
                "Response channel cannot complete a WebSocket handshake"
            );
            return Err(HandlerError::CapabilityMissing(missing));
        }

        tracing::debug!(parent: &span, host = upgrade.host_str(), "Tunnelling WebSocket upgrade");

        let mut translator = HandshakeTranslator::new(resp, upgrade.key, self.alphabet, span);
        next.serve(req, &mut translator).await
    }
}
