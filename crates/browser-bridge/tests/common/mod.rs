#![allow(dead_code)]

use std::time::Duration;

use bridge_protocol::host_frame::{
    Command, DEFAULT_MAX_FRAME_LEN, encode_frame, read_frame,
};
use browser_bridge::{correlator::Correlator, transport::Transport};
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// The extension's end of the stdio pipe.
pub struct FakeHost {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeHost {
    /// Next command the bridge wrote, `None` once the bridge hung up.
    pub async fn next_command(&mut self) -> Option<Command> {
        let body = read_frame(&mut self.reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("read from bridge")?;
        Some(serde_json::from_slice(&body).expect("command is JSON"))
    }

    pub async fn reply(&mut self, id: &str, error: &str, payload: Value) {
        let frame = encode_frame(&json!({
            "id": id,
            "error": error,
            "payload": payload,
        }))
        .unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to bridge");
        self.writer.flush().await.unwrap();
    }
}

/// A transport wired to a fake host.
pub fn connect_host(
    max_frame_len: usize,
) -> (
    Transport,
    tokio::sync::mpsc::UnboundedReceiver<bridge_protocol::host_frame::Response>,
    FakeHost,
) {
    let (bridge_end, host_end) = tokio::io::duplex(1 << 20);
    let (bridge_read, bridge_write) = tokio::io::split(bridge_end);
    let (host_read, host_write) = tokio::io::split(host_end);

    let (transport, inbound) =
        Transport::start(bridge_read, bridge_write, max_frame_len);
    let host = FakeHost {
        reader: host_read,
        writer: host_write,
    };
    (transport, inbound, host)
}

pub fn correlator_with_host(timeout: Duration) -> (Correlator, Transport, FakeHost) {
    let (transport, inbound, host) = connect_host(DEFAULT_MAX_FRAME_LEN);
    let correlator = Correlator::new(transport.clone(), inbound, timeout);
    (correlator, transport, host)
}

/// Answers like a browser extension would until the bridge hangs up.
/// `all-tabs` is never answered.
pub async fn serve_like_a_browser(mut host: FakeHost) {
    while let Some(cmd) = host.next_command().await {
        let (error, payload) = match cmd.name.as_str() {
            "ping" => ("", json!("pong")),
            "all-tabs" => continue,
            "tab" => match cmd.params.as_i64() {
                Some(99) => ("tab not found", Value::Null),
                Some(0) => ("", json!({"id": 7, "title": "active", "active": true})),
                Some(id) => ("", json!({"id": id, "title": "some tab"})),
                None => ("bad params", Value::Null),
            },
            "all-bookmarks" => (
                "",
                json!([
                    {"id": "1", "title": "first", "type": "bookmark", "url": "https://one.example"},
                    {"id": "2", "title": "second", "type": "folder"},
                ]),
            ),
            "search-bookmarks" => (
                "",
                json!([{
                    "id": "3",
                    "title": cmd.params,
                    "type": "bookmark",
                    "url": "javascript:alert(%22hi%22)",
                }]),
            ),
            "execute-js" => ("", json!({"echo": cmd.params["js"]})),
            "open-incognito" | "activate-tab" | "run-bookmarklet" => {
                ("", Value::Null)
            }
            _ => ("unknown command", Value::Null),
        };
        host.reply(&cmd.id, error, payload).await;
    }
}
