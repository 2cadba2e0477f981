//! Engine frame decoding
//!
//! The engine console server speaks JSON over a message-oriented socket.
//! Most frames are text frames holding one JSON document. Replies that carry
//! a binary blob (screenshots, captures) arrive as binary frames instead:
//! ```text
//! <UTF-8 JSON header> 0x00 <raw binary tail>
//! ```

use serde_json::Value;

use crate::common::{Error, Result};

/// A single frame as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// A decoded inbound message: the JSON header plus an optional binary tail
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub header: Value,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    /// Application-level message type (`type` field of the header)
    pub fn message_type(&self) -> Option<&str> {
        self.header.get("type").and_then(Value::as_str)
    }
}

/// Decode a transport frame into header and tail
pub fn decode(frame: Frame) -> Result<InboundMessage> {
    match frame {
        Frame::Text(text) => Ok(InboundMessage {
            header: serde_json::from_str(&text)?,
            payload: None,
        }),
        Frame::Binary(bytes) => {
            let (header, tail) = split_binary(&bytes)?;
            Ok(InboundMessage {
                header: serde_json::from_str(header)?,
                payload: Some(tail.to_vec()),
            })
        }
    }
}

/// Split a binary frame at its first NUL byte
///
/// The header is validated as UTF-8; a NUL can never occur inside a
/// multi-byte sequence, so the first NUL is always the boundary.
fn split_binary(bytes: &[u8]) -> Result<(&str, &[u8])> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::InvalidFrame("binary frame has no header terminator".to_string()))?;

    let header = std::str::from_utf8(&bytes[..nul])
        .map_err(|e| Error::InvalidFrame(format!("header is not valid UTF-8: {}", e)))?;

    Ok((header, &bytes[nul + 1..]))
}

/// Encode a header and tail the way the engine does (used by tests and tools)
pub fn encode_binary(header: &Value, tail: &[u8]) -> Vec<u8> {
    let mut bytes = header.to_string().into_bytes();
    bytes.push(0);
    bytes.extend_from_slice(tail);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_text_frame() {
        let msg = decode(Frame::Text(r#"{"type":"lua_debugger","message":"running"}"#.into()))
            .unwrap();
        assert_eq!(msg.message_type(), Some("lua_debugger"));
        assert_eq!(msg.header["message"], "running");
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_decode_binary_frame_splits_tail() {
        let header = json!({"type": "screenshot", "width": 2});
        let tail = [0xff, 0x00, 0x10, 0x00];
        let msg = decode(Frame::Binary(encode_binary(&header, &tail))).unwrap();

        assert_eq!(msg.header, header);
        // Later NULs belong to the tail
        assert_eq!(msg.payload.as_deref(), Some(&tail[..]));
    }

    #[test]
    fn test_decode_binary_multibyte_header() {
        let header = json!({"type": "message", "message": "héllo ✓ 𝄞"});
        let msg = decode(Frame::Binary(encode_binary(&header, b""))).unwrap();
        assert_eq!(msg.header["message"], "héllo ✓ 𝄞");
        assert_eq!(msg.payload.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_decode_binary_without_terminator() {
        let err = decode(Frame::Binary(b"{\"type\":\"x\"}".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[test]
    fn test_decode_binary_invalid_utf8_header() {
        let err = decode(Frame::Binary(vec![0xc3, 0x28, 0x00, 0x01])).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }
}
