//! `Sec-WebSocket-Accept` derivation (RFC 6455 §4.2.2).

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Base64 alphabet used to encode the accept digest.
///
/// `Standard` is what RFC 6455 requires and what every conforming client
/// checks against. `UrlSafe` swaps `+`/`/` for `-`/`_`; it only exists for
/// peers that were built against a server emitting that encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptAlphabet {
    #[default]
    Standard,
    UrlSafe,
}

/// Compute the accept token for a client's `Sec-WebSocket-Key`.
pub fn accept_token(key: &str, alphabet: AcceptAlphabet) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();

    match alphabet {
        AcceptAlphabet::Standard => STANDARD.encode(digest),
        AcceptAlphabet::UrlSafe => URL_SAFE.encode(digest),
    }
}
