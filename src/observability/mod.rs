//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handshake / http subsystems
//!     → tracing events and spans (request ID, tunnel host, status)
//!     → logging.rs (fmt subscriber, env filter)
//!     → stdout
//! ```

pub mod logging;
