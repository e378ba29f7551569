//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, per-request task)
//!     → hyper_channel.rs (response channel over hyper)
//!     → handler.rs (middleware pipeline)
//!         → [handshake middleware]
//!         → connect.rs (dial backend, hijack, splice)
//! ```

pub mod channel;
pub mod connect;
pub mod handler;
pub mod hyper_channel;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{Capabilities, Capability, ChannelError, Hijacked, RawIo, ResponseChannel};
pub use connect::ConnectHandler;
pub use handler::{Handler, HandlerError, Middleware, Pipeline};
pub use hyper_channel::HyperChannel;
pub use server::HttpServer;
