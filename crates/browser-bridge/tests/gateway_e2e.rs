use std::time::Duration;

use bridge_protocol::{
    error::ProtocolError,
    rpc::{RpcRequest, RpcResponse},
    rpc_client::BridgeClient,
};
use browser_bridge::{gateway::Gateway, service::BrowserService};
use tempfile::TempDir;

mod common;
use common::{correlator_with_host, serve_like_a_browser};

struct Bridge {
    _dir: TempDir,
    gateway: Gateway,
}

fn start_bridge(timeout: Duration) -> Bridge {
    let dir = tempfile::tempdir().unwrap();
    let (correlator, _transport, host) = correlator_with_host(timeout);
    tokio::spawn(serve_like_a_browser(host));

    let service = BrowserService::new(correlator);
    let gateway =
        Gateway::start(&dir.path().join("bridge.sock"), service).unwrap();
    Bridge { _dir: dir, gateway }
}

async fn client(bridge: &Bridge) -> BridgeClient {
    BridgeClient::connect(bridge.gateway.socket_path())
        .await
        .expect("Failed to connect to bridge")
}

fn remote_message(err: ProtocolError) -> String {
    match err {
        ProtocolError::Remote { message } => message,
        other => panic!("Expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_and_tabs() {
    let bridge = start_bridge(Duration::from_secs(5));
    let mut client = client(&bridge).await;

    assert_eq!(client.ping().await.unwrap(), "pong");
    // answered without the host
    assert_eq!(client.app_name().await.unwrap(), "browser-bridge");

    let tab = client.tab(12).await.unwrap();
    assert_eq!(tab.id, 12);
    assert_eq!(tab.title, "some tab");

    let current = client.current_tab().await.unwrap();
    assert_eq!(current.id, 7);
    assert!(current.active);

    let err = client.tab(99).await.unwrap_err();
    assert_eq!(remote_message(err), "tab not found");

    // same connection keeps working after an error
    client.activate_tab(12).await.unwrap();
}

#[tokio::test]
async fn test_bookmark_query_picks_the_command() {
    let bridge = start_bridge(Duration::from_secs(5));
    let mut client = client(&bridge).await;

    let all = client.bookmarks("").await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].kind, "folder");

    let found = client.bookmarks("hi").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "hi");
    assert!(found[0].is_bookmarklet());
    assert_eq!(found[0].javascript(), "alert(\"hi\")");

    client.run_bookmarklet(0, &found[0].id).await.unwrap();
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_the_host() {
    let bridge = start_bridge(Duration::from_secs(5));
    let mut client = client(&bridge).await;

    let err = client.tab(-3).await.unwrap_err();
    assert_eq!(remote_message(err), "invalid argument: tab ID -3 is negative");

    let err = client.open_incognito("").await.unwrap_err();
    assert!(remote_message(err).starts_with("invalid argument: "));

    let err = client.run_script(0, " ").await.unwrap_err();
    assert!(remote_message(err).starts_with("invalid argument: "));

    client.open_incognito("https://example.org").await.unwrap();
}

#[tokio::test]
async fn test_script_result_is_json_text() {
    let bridge = start_bridge(Duration::from_secs(5));
    let mut client = client(&bridge).await;

    let out = client.run_script(0, "document.title").await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["echo"], "document.title");
}

#[tokio::test]
async fn test_timeout_reaches_the_client() {
    let bridge = start_bridge(Duration::from_millis(150));
    let mut client = client(&bridge).await;

    let response = client.request(&RpcRequest::Tabs).await.unwrap();
    let RpcResponse::Error { message } = response else {
        panic!("Expected an error, got {response:?}");
    };
    assert!(message.starts_with("timeout: "), "{message}");
}

#[tokio::test]
async fn test_clients_are_served_concurrently() {
    let bridge = start_bridge(Duration::from_millis(500));

    // one client stuck on a call the host never answers
    let mut stuck = client(&bridge).await;
    let stuck_call =
        tokio::spawn(async move { stuck.request(&RpcRequest::Tabs).await });

    let mut other = client(&bridge).await;
    assert_eq!(other.ping().await.unwrap(), "pong");
    assert!(!stuck_call.is_finished());

    let response = stuck_call.await.unwrap().unwrap();
    assert!(matches!(response, RpcResponse::Error { .. }));
}

#[tokio::test]
async fn test_stop_removes_socket() {
    let bridge = start_bridge(Duration::from_secs(5));
    let path = bridge.gateway.socket_path().to_path_buf();
    assert!(path.exists());

    bridge.gateway.stop();
    bridge.gateway.stop();
    tokio::time::timeout(Duration::from_secs(1), bridge.gateway.stopped())
        .await
        .unwrap();

    assert!(!path.exists());
    assert!(BridgeClient::connect(&path).await.is_err());
}
