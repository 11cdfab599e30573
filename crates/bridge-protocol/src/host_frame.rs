//! Framing for the browser host's stdio channel.
//!
//! Every message in either direction is a `u32` little-endian byte count
//! followed by that many bytes of UTF-8 JSON. This is the native messaging
//! format browsers use to talk to extension hosts.

use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FrameError, JsonSnafu};

pub const HEADER_SIZE: usize = size_of::<u32>();

/// Upper bound on a declared frame length read from the host. Anything
/// larger is treated as a corrupt stream rather than allocated.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A command sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "command")]
    pub name: String,
    pub params: Value,
}

impl Command {
    pub fn new<P: Serialize>(
        id: String,
        name: &str,
        params: &P,
    ) -> Result<Self, FrameError> {
        let params = serde_json::to_value(params).context(JsonSnafu)?;
        Ok(Self {
            id,
            name: name.to_owned(),
            params,
        })
    }

    /// Encode into the host's stdio format.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(self)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command({}) - {:?}", self.id, self.name)
    }
}

/// Serialize any message as a length-prefixed JSON frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(msg).context(JsonSnafu)?;
    let len = u32::try_from(body.len())
        .map_err(|_| FrameError::TooLong { len: body.len() })?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// A response read from the host.
///
/// `fault` is set when the frame body could not be parsed at all; such a
/// response has no usable `id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub id: String,
    pub error: String,
    pub payload: Value,
    pub fault: Option<String>,
}

impl Response {
    pub fn is_malformed(&self) -> bool {
        self.fault.is_some()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fault {
            Some(fault) => write!(f, "response(malformed) - {fault}"),
            None if self.error.is_empty() => {
                write!(f, "response({}) - ok", self.id)
            }
            None => write!(f, "response({}) - error {:?}", self.id, self.error),
        }
    }
}

// hosts send `null` as readily as they omit the field
#[derive(Deserialize)]
struct ResponseWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// Decode a frame body into a [`Response`]. Never fails: a body that is
/// not a JSON object comes back with `fault` set.
pub fn decode(body: &[u8]) -> Response {
    match serde_json::from_slice::<ResponseWire>(body) {
        Ok(wire) => Response {
            id: wire.id.unwrap_or_default(),
            error: wire.error.unwrap_or_default(),
            payload: wire.payload,
            fault: None,
        },
        Err(e) => Response {
            fault: Some(e.to_string()),
            ..Response::default()
        },
    }
}

/// Read one frame body.
///
/// Returns `Ok(None)` when the stream ends, including partway through a
/// frame, since that only happens when the host goes away. A declared
/// length above `max_len` is an `InvalidData` error.
pub async fn read_frame<R>(
    reader: &mut R,
    max_len: usize,
) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_len}"),
        ));
    }

    let mut body = vec![0u8; len];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Generates correlation IDs of the form `<unix seconds>.<counter>`.
#[derive(Debug, Default)]
pub struct CommandIds {
    last: AtomicU64,
}

impl CommandIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let n = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("{secs}.{n}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn command_frame_layout() {
        let cmd = Command::new("1.1".into(), "activate-tab", &42).unwrap();
        let frame = cmd.encode().unwrap();

        let len = u32::from_le_bytes(frame[..HEADER_SIZE].try_into().unwrap());
        assert_eq!(len as usize, frame.len() - HEADER_SIZE);

        let body: Value = serde_json::from_slice(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(
            body,
            json!({"id": "1.1", "command": "activate-tab", "params": 42})
        );
    }

    #[test]
    fn unit_params_encode_as_null() {
        let cmd = Command::new("7.3".into(), "ping", &()).unwrap();
        assert_eq!(cmd.params, Value::Null);
    }

    #[test]
    fn unserializable_params_are_an_encoding_error() {
        use std::collections::HashMap;
        // JSON object keys must be strings
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = Command::new("1.1".into(), "x", &bad).unwrap_err();
        assert!(matches!(err, FrameError::Json { .. }));
    }

    #[test]
    fn decode_success_and_error() {
        let ok = decode(br#"{"id":"3.9","error":"","payload":"pong"}"#);
        assert_eq!(ok.id, "3.9");
        assert!(ok.error.is_empty());
        assert_eq!(ok.payload, json!("pong"));
        assert!(!ok.is_malformed());

        let err = decode(br#"{"id":"3.10","error":"tab not found"}"#);
        assert_eq!(err.error, "tab not found");
        assert_eq!(err.payload, Value::Null);
    }

    #[test]
    fn decode_null_error_means_success() {
        let r = decode(br#"{"id":"1.2","error":null,"payload":[]}"#);
        assert!(r.error.is_empty());
        assert_eq!(r.payload, json!([]));
    }

    #[test]
    fn decode_garbage_sets_fault() {
        let r = decode(b"{not json");
        assert!(r.is_malformed());
        assert!(r.id.is_empty());
    }

    #[tokio::test]
    async fn read_frame_reads_consecutive_frames() {
        let mut stream = Vec::new();
        stream.extend(encode_frame(&json!({"id": "a"})).unwrap());
        stream.extend(encode_frame(&json!({"id": "b"})).unwrap());
        let mut reader = stream.as_slice();

        let first = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&first).id, "a");
        let second = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&second).id, "b");
        assert!(
            read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_length() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&u32::MAX.to_le_bytes());
        stream.extend_from_slice(b"{}");
        let mut reader = stream.as_slice();

        let err = read_frame(&mut reader, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_frame_is_end_of_stream() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&10u32.to_le_bytes());
        stream.extend_from_slice(b"{\"id\"");
        let mut reader = stream.as_slice();

        assert!(read_frame(&mut reader, 1024).await.unwrap().is_none());
    }

    #[test]
    fn command_ids_are_unique() {
        let ids = CommandIds::new();
        let seen: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }
}
