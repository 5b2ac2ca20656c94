//! Wire protocol types
//!
//! Wire format:
//! ```text
//! Request:
//!   [4 bytes: total length (u32 BE)]
//!   [1 byte: method length (u8)]
//!   [method bytes (UTF-8)]
//!   [params bytes (MessagePack array of positional arguments)]
//!
//! Reply:
//!   [4 bytes: total length (u32 BE)]
//!   [1 byte: success flag (0 or 1)]
//!   [payload bytes (MessagePack result, or RemoteError on failure)]
//! ```
//!
//! The same framing is used in both directions: client → engine on the forward
//! connection, engine → client on the backward connection.

use std::io::{self, Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{BridgeError, RemoteError, Result};

/// Largest frame accepted by default
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Request parsed from wire format
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    /// Method name
    pub method: String,
    /// Raw MessagePack params (not yet deserialized)
    pub params: Vec<u8>,
}

impl RequestFrame {
    /// Build a request from a method name and serializable params
    pub fn new<T: Serialize + ?Sized>(method: &str, params: &T) -> Result<Self> {
        if method.len() > u8::MAX as usize {
            return Err(BridgeError::Protocol("method name too long".to_string()));
        }
        Ok(Self {
            method: method.to_string(),
            params: rmp_serde::to_vec(params)?,
        })
    }

    /// Parse a request body (after the length prefix)
    ///
    /// Format: [method_len: u8][method: bytes][params: bytes]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (&method_len, rest) = data
            .split_first()
            .ok_or_else(|| BridgeError::Protocol("empty request".to_string()))?;
        let method_len = method_len as usize;
        if rest.len() < method_len {
            return Err(BridgeError::Protocol("truncated method".to_string()));
        }

        let method = std::str::from_utf8(&rest[..method_len])
            .map_err(|e| BridgeError::Protocol(format!("invalid method UTF-8: {e}")))?
            .to_string();

        Ok(Self {
            method,
            params: rest[method_len..].to_vec(),
        })
    }

    /// Serialize to wire format, length prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        let method_bytes = self.method.as_bytes();
        let total_len = 1 + method_bytes.len() + self.params.len();
        let mut buf = Vec::with_capacity(4 + total_len);

        buf.extend_from_slice(&(total_len as u32).to_be_bytes());
        buf.push(method_bytes.len() as u8);
        buf.extend_from_slice(method_bytes);
        buf.extend_from_slice(&self.params);

        buf
    }

    /// Deserialize params into the typed argument list
    pub fn decode_params<T: DeserializeOwned>(&self) -> Result<T> {
        rmp_serde::from_slice(&self.params).map_err(|e| BridgeError::BadParams {
            method: self.method.clone(),
            message: e.to_string(),
        })
    }
}

/// Reply to a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyFrame {
    /// Whether the request succeeded
    pub success: bool,
    /// Raw MessagePack payload (result or error)
    pub payload: Vec<u8>,
}

impl ReplyFrame {
    /// Success reply carrying an already encoded result
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            success: true,
            payload,
        }
    }

    /// Success reply carrying `result`
    pub fn success<T: Serialize + ?Sized>(result: &T) -> Result<Self> {
        Ok(Self::ok(rmp_serde::to_vec(result)?))
    }

    /// Error reply
    pub fn error(error: &RemoteError) -> Self {
        // RemoteError is two plain fields; encoding it cannot fail
        let payload = rmp_serde::to_vec(error).unwrap_or_default();
        Self {
            success: false,
            payload,
        }
    }

    /// Serialize to wire format, length prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_len = 1 + self.payload.len();
        let mut buf = Vec::with_capacity(4 + total_len);

        buf.extend_from_slice(&(total_len as u32).to_be_bytes());
        buf.push(u8::from(self.success));
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Parse a reply body (after the length prefix)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (&flag, payload) = data
            .split_first()
            .ok_or_else(|| BridgeError::Protocol("empty reply".to_string()))?;

        Ok(Self {
            success: flag == 1,
            payload: payload.to_vec(),
        })
    }

    /// Decode the result, turning an error reply into [`BridgeError::Remote`]
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if self.success {
            Ok(rmp_serde::from_slice(&self.payload)?)
        } else {
            let remote: RemoteError = rmp_serde::from_slice(&self.payload)?;
            Err(BridgeError::Remote(remote))
        }
    }
}

/// Read one length-prefixed frame body
///
/// Returns `Ok(None)` on a clean end of stream before the length prefix.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > max_len {
        return Err(BridgeError::Protocol(format!("invalid frame length: {len}")));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Write an already framed buffer and flush
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct LoadUrl {
        browser: u64,
        url: String,
    }

    #[test]
    fn test_params_are_positional() {
        let request = RequestFrame::new(
            "Browser_LoadURL",
            &LoadUrl {
                browser: 7,
                url: "about:blank".to_string(),
            },
        )
        .unwrap();

        // a client that only knows the argument order can still call us
        let positional = RequestFrame::new("Browser_LoadURL", &(7u64, "about:blank")).unwrap();
        assert_eq!(request.params, positional.params);
    }

    #[test]
    fn test_request_framing() {
        let request = RequestFrame::new("echo", &("hi",)).unwrap();
        let bytes = request.to_bytes();

        let mut reader = Cursor::new(bytes);
        let body = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).unwrap().unwrap();
        let parsed = RequestFrame::from_bytes(&body).unwrap();

        assert_eq!(parsed.method, "echo");
        let (msg,): (String,) = parsed.decode_params().unwrap();
        assert_eq!(msg, "hi");
        // stream is exhausted
        assert!(read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).unwrap().is_none());
    }

    #[test]
    fn test_error_reply_decodes_to_remote_error() {
        let remote = RemoteError {
            code: ErrorCode::InvalidHandle,
            message: "invalid handle: #3v1".to_string(),
        };
        let bytes = ReplyFrame::error(&remote).to_bytes();
        let parsed = ReplyFrame::from_bytes(&bytes[4..]).unwrap();

        assert!(!parsed.success);
        match parsed.into_result::<String>() {
            Err(BridgeError::Remote(decoded)) => assert_eq!(decoded, remote),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut reader = Cursor::new(1024u32.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut reader, 16),
            Err(BridgeError::Protocol(_))
        ));

        let mut empty = Cursor::new(0u32.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut empty, 16),
            Err(BridgeError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_method_rejected() {
        assert!(RequestFrame::from_bytes(&[5, b'a']).is_err());
        assert!(RequestFrame::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_bad_params_carry_method() {
        let request = RequestFrame::new("Browser_SetZoomLevel", &("not a number",)).unwrap();
        match request.decode_params::<(u64, f64)>() {
            Err(BridgeError::BadParams { method, .. }) => assert_eq!(method, "Browser_SetZoomLevel"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
