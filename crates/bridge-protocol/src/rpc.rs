use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::ProtocolError,
    models::{
        Bookmark, DownloadEntry, HistoryEntry, RunBookmarkletArg, RunScriptArg,
        Tab,
    },
};

/// Client requests to the bridge, one per host capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Check the host is reachable. It answers "pong".
    Ping,
    /// Name of the program serving the socket. Answered without the host.
    AppName,
    Tabs,
    /// Look up one tab. 0 means the active tab
    Tab { tab_id: i64 },
    CurrentTab,
    ActivateTab { tab_id: i64 },
    CloseTabsLeft { tab_id: i64 },
    CloseTabsRight { tab_id: i64 },
    CloseTabsOther { tab_id: i64 },
    /// Empty query lists every bookmark
    Bookmarks { query: String },
    History { query: String },
    Downloads { query: String },
    OpenIncognito { url: String },
    RunScript(RunScriptArg),
    RunBookmarklet(RunBookmarkletArg),
}

impl RpcRequest {
    /// Method name used in logs.
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Ping => "Ping",
            RpcRequest::AppName => "AppName",
            RpcRequest::Tabs => "Tabs",
            RpcRequest::Tab { .. } => "Tab",
            RpcRequest::CurrentTab => "CurrentTab",
            RpcRequest::ActivateTab { .. } => "ActivateTab",
            RpcRequest::CloseTabsLeft { .. } => "CloseTabsLeft",
            RpcRequest::CloseTabsRight { .. } => "CloseTabsRight",
            RpcRequest::CloseTabsOther { .. } => "CloseTabsOther",
            RpcRequest::Bookmarks { .. } => "Bookmarks",
            RpcRequest::History { .. } => "History",
            RpcRequest::Downloads { .. } => "Downloads",
            RpcRequest::OpenIncognito { .. } => "OpenIncognito",
            RpcRequest::RunScript(_) => "RunScript",
            RpcRequest::RunBookmarklet(_) => "RunBookmarklet",
        }
    }
}

/// Bridge responses to client requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Pong(String),
    AppName(String),
    Tabs(Vec<Tab>),
    Tab(Tab),
    Bookmarks(Vec<Bookmark>),
    History(Vec<HistoryEntry>),
    Downloads(Vec<DownloadEntry>),
    /// JSON-encoded result of a script
    ScriptResult(String),
    /// The call succeeded and has no payload
    Done,
    /// Request failed with error message
    Error { message: String },
}

/// Wire protocol: [u32 length][CBOR payload]
/// Length is in native endian (local unix socket, same machine)
pub const HEADER_SIZE: usize = std::mem::size_of::<u32>();

/// Largest message accepted on the local socket.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Serialize a request/response into wire format
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_cbor::to_vec(msg)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_MESSAGE_LEN,
        }
    })?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Read exactly one message from a stream. `Ok(None)` means the peer
/// closed the connection between messages.
pub async fn read_message<T, R>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_cbor::from_slice(&payload)?))
}

pub async fn write_message<T, W>(
    writer: &mut W,
    msg: &T,
) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = serialize_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
