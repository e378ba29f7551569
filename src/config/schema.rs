//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::handshake::AcceptAlphabet;

/// Root configuration for the tunnel server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// WebSocket handshake bridging.
    pub handshake: HandshakeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend dial timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until the response head is produced, in seconds.
    /// Established tunnels are not bound by it.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// `wss_handshake_tunnel` settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Insert the handshake middleware in front of the CONNECT handler.
    pub enabled: bool,

    /// Encoding of `Sec-WebSocket-Accept`. Only change this for peers that
    /// expect the non-standard URL-safe form.
    pub accept_alphabet: AcceptAlphabet,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            accept_alphabet: AcceptAlphabet::Standard,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
