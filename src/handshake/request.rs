//! WebSocket upgrade detection and tunnel rewrite.
//!
//! # Responsibilities
//! - Decide whether a request is a WebSocket upgrade aimed at a tunnel host
//! - Rewrite it in place into a CONNECT request for that host
//! - Strip the WebSocket signalling headers so they never reach the backend
//!
//! # Design Decisions
//! - Checks run in a fixed order and stop at the first failure
//! - `Upgrade` is matched case-sensitively, `Connection` is not
//! - Repeated headers resolve to their last value
//! - Header values that are not visible ASCII count as absent

use axum::http::header::{CONNECTION, HOST, SEC_WEBSOCKET_KEY, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};

use crate::http::handler::HandlerError;

/// Header naming the backend host the tunnel is opened to.
pub const CONNECT_HOST: HeaderName = HeaderName::from_static("x-connect-host");

/// A request that passed every upgrade precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// The client's `Sec-WebSocket-Key`.
    pub key: String,
    /// Raw value of the routing header.
    pub host: HeaderValue,
}

impl UpgradeRequest {
    /// Run the applicability checks. `None` means the request is left alone.
    pub fn detect<B>(req: &Request<B>) -> Option<Self> {
        if req.method() != Method::GET {
            return None;
        }

        let headers = req.headers();
        if last(headers, &UPGRADE)?.as_bytes() != b"websocket" {
            return None;
        }
        if !last(headers, &CONNECTION)?
            .as_bytes()
            .eq_ignore_ascii_case(b"upgrade")
        {
            return None;
        }

        let key = non_empty(headers, &SEC_WEBSOCKET_KEY)?.to_owned();
        non_empty(headers, &CONNECT_HOST)?;
        let host = last(headers, &CONNECT_HOST)?.clone();

        Some(Self { key, host })
    }

    /// Turn `req` into a CONNECT request for the routing host.
    pub fn rewrite<B>(&self, req: &mut Request<B>) -> Result<(), HandlerError> {
        let host = self.host_str();
        let uri = match Uri::try_from(host) {
            Ok(uri) if uri.scheme().is_none() && uri.authority().is_some() => uri,
            _ => return Err(HandlerError::InvalidRoutingHost(host.to_owned())),
        };

        *req.method_mut() = Method::CONNECT;
        *req.uri_mut() = uri;

        let headers = req.headers_mut();
        headers.insert(HOST, self.host.clone());
        headers.remove(UPGRADE);
        headers.remove(CONNECTION);
        headers.remove(SEC_WEBSOCKET_KEY);
        headers.remove(CONNECT_HOST);
        Ok(())
    }

    pub fn host_str(&self) -> &str {
        // detect() only accepts visible-ASCII values
        self.host.to_str().unwrap_or_default()
    }
}

fn last<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a HeaderValue> {
    headers.get_all(name).iter().last()
}

fn non_empty<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    last(headers, name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
