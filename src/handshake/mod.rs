//! WebSocket-to-tunnel handshake bridging.
//!
//! # Data Flow
//! ```text
//! GET + Upgrade: websocket + X-Connect-Host
//!     → request.rs (detect, rewrite into CONNECT host)
//!     → middleware.rs (capability probe, wrap response channel)
//!     → next handler opens the tunnel, commits 200
//!     → interceptor.rs (200 → 101 + handshake headers)
//!     → accept.rs (Sec-WebSocket-Accept)
//!     → next handler hijacks the connection
//! ```
//!
//! # Design Decisions
//! - A plain 200 from the tunnel handler is the only "tunnel ready" signal
//! - Requests that do not match are never touched
//! - A channel that cannot flush or hijack fails the request instead of
//!   degrading into a half-finished handshake

pub mod accept;
pub mod interceptor;
pub mod middleware;
pub mod request;

pub use accept::{accept_token, AcceptAlphabet};
pub use interceptor::{is_tunnel_ready_signal, HandshakeState, HandshakeTranslator};
pub use middleware::WssHandshakeTunnel;
pub use request::{UpgradeRequest, CONNECT_HOST};
