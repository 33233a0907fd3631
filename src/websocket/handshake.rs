//! Opening handshake (RFC 6455 §4.2).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::http::message::HttpMessage;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const SUPPORTED_VERSION: &str = "13";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("not a websocket upgrade request")]
    NotUpgrade,
    #[error("upgrade request method is not GET")]
    MethodNotGet,
    #[error("upgrade requires HTTP/1.1 or later")]
    VersionTooOld,
    #[error("missing Host header")]
    MissingHost,
    #[error("missing Sec-WebSocket-Key")]
    MissingKey,
    #[error("Sec-WebSocket-Key is not a base64 encoded 16 byte nonce")]
    InvalidKey,
}

/// Outcome of a well-formed upgrade request.
#[derive(Debug, Clone)]
pub enum Handshake {
    /// 101 Switching Protocols; the connection becomes a WebSocket.
    Accepted(Response),
    /// 426 Upgrade Required advertising the supported version; the connection stays HTTP.
    UpgradeRequired(Response),
}

/// `Upgrade` lists `websocket` and `Connection` lists `upgrade`, case-insensitively.
pub fn is_upgrade_request(msg: &HttpMessage) -> bool {
    msg.header_has_token("Upgrade", "websocket") && msg.header_has_token("Connection", "upgrade")
}

/// `base64(SHA-1(key ++ GUID))`.
pub fn accept_key(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn is_valid_key(key: &[u8]) -> bool {
    key.len() == 24 && STANDARD.decode(key).is_ok_and(|nonce| nonce.len() == 16)
}

/// Validates an upgrade request and builds the server's answer.
pub fn process_handshake_request(msg: &HttpMessage) -> Result<Handshake, HandshakeError> {
    if !is_upgrade_request(msg) {
        return Err(HandshakeError::NotUpgrade);
    }
    if msg.method() != Some(&b"GET"[..]) {
        return Err(HandshakeError::MethodNotGet);
    }
    if !msg.version().at_least(1, 1) {
        return Err(HandshakeError::VersionTooOld);
    }
    if msg.header("Host").is_none() {
        return Err(HandshakeError::MissingHost);
    }
    let key = msg.header("Sec-WebSocket-Key").ok_or(HandshakeError::MissingKey)?;
    if !is_valid_key(key) {
        return Err(HandshakeError::InvalidKey);
    }

    let version = msg.header("Sec-WebSocket-Version").unwrap_or_default();
    if version != SUPPORTED_VERSION.as_bytes() {
        tracing::debug!(version = %String::from_utf8_lossy(version), "unsupported websocket version");
        let response = ResponseBuilder::new(StatusCode::UpgradeRequired)
            .header("Sec-WebSocket-Version", SUPPORTED_VERSION)
            .build();
        return Ok(Handshake::UpgradeRequired(response));
    }

    for ignored in ["Sec-WebSocket-Protocol", "Sec-WebSocket-Extensions"] {
        if let Some(value) = msg.header(ignored) {
            tracing::debug!(header = ignored, value = %String::from_utf8_lossy(value), "ignoring");
        }
    }

    let response = ResponseBuilder::new(StatusCode::SwitchingProtocols)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", accept_key(key))
        .build();
    Ok(Handshake::Accepted(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_sample_key() {
        assert_eq!(accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn key_must_decode_to_sixteen_bytes() {
        assert!(is_valid_key(b"dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(!is_valid_key(b"c2hvcnQ="));
        assert!(!is_valid_key(b"!!!!!!!!!!!!!!!!!!!!!!!!"));
    }
}
