//! WebSocket handshake tunnelling.
//!
//! Bridges WebSocket upgrade requests onto CONNECT-style tunnels: the upgrade
//! is rewritten into a tunnel request for the host named in `X-Connect-Host`,
//! and the tunnel's plain `200` is answered to the client as a
//! `101 Switching Protocols` handshake.

pub mod config;
pub mod handshake;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::TunnelConfig;
pub use handshake::WssHandshakeTunnel;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
