//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → subscribers (HTTP server) stop accepting → exit
//! ```
//!
//! # Design Decisions
//! - Established tunnels are detached from the server and are not drained

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
