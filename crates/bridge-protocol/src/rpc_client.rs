use std::path::Path;

use tokio::net::UnixStream;

use crate::{
    error::{MisMatchSnafu, ProtocolError},
    models::{
        Bookmark, DownloadEntry, HistoryEntry, RunBookmarkletArg, RunScriptArg,
        Tab,
    },
    rpc::{RpcRequest, RpcResponse, read_message, write_message},
};

/// Send an RPC request to the bridge and receive the response
pub async fn send_rpc_request(
    stream: &mut UnixStream,
    request: &RpcRequest,
) -> Result<RpcResponse, ProtocolError> {
    write_message(stream, request).await?;

    // the bridge answers every request; a close here is a protocol error
    read_message::<RpcResponse, _>(stream)
        .await?
        .ok_or_else(|| MisMatchSnafu.build())
}

/// A connection to a running bridge. Calls are sequential on one
/// connection; open more clients for concurrency.
#[derive(Debug)]
pub struct BridgeClient {
    stream: UnixStream,
}

// pull the expected variant out of a response, or explain why not
macro_rules! expect_variant {
    ($resp:expr, $pat:pat => $out:expr) => {
        match $resp {
            $pat => Ok($out),
            RpcResponse::Error { message } => {
                Err(ProtocolError::Remote { message })
            }
            _ => MisMatchSnafu.fail(),
        }
    };
}

impl BridgeClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    pub async fn request(
        &mut self,
        request: &RpcRequest,
    ) -> Result<RpcResponse, ProtocolError> {
        send_rpc_request(&mut self.stream, request).await
    }

    async fn expect_done(
        &mut self,
        request: &RpcRequest,
    ) -> Result<(), ProtocolError> {
        let resp = self.request(request).await?;
        expect_variant!(resp, RpcResponse::Done => ())
    }

    pub async fn ping(&mut self) -> Result<String, ProtocolError> {
        let resp = self.request(&RpcRequest::Ping).await?;
        expect_variant!(resp, RpcResponse::Pong(s) => s)
    }

    pub async fn app_name(&mut self) -> Result<String, ProtocolError> {
        let resp = self.request(&RpcRequest::AppName).await?;
        expect_variant!(resp, RpcResponse::AppName(name) => name)
    }

    pub async fn tabs(&mut self) -> Result<Vec<Tab>, ProtocolError> {
        let resp = self.request(&RpcRequest::Tabs).await?;
        expect_variant!(resp, RpcResponse::Tabs(tabs) => tabs)
    }

    pub async fn tab(&mut self, tab_id: i64) -> Result<Tab, ProtocolError> {
        let resp = self.request(&RpcRequest::Tab { tab_id }).await?;
        expect_variant!(resp, RpcResponse::Tab(tab) => tab)
    }

    pub async fn current_tab(&mut self) -> Result<Tab, ProtocolError> {
        let resp = self.request(&RpcRequest::CurrentTab).await?;
        expect_variant!(resp, RpcResponse::Tab(tab) => tab)
    }

    pub async fn activate_tab(&mut self, tab_id: i64) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::ActivateTab { tab_id }).await
    }

    pub async fn close_tabs_left(
        &mut self,
        tab_id: i64,
    ) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::CloseTabsLeft { tab_id }).await
    }

    pub async fn close_tabs_right(
        &mut self,
        tab_id: i64,
    ) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::CloseTabsRight { tab_id }).await
    }

    pub async fn close_tabs_other(
        &mut self,
        tab_id: i64,
    ) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::CloseTabsOther { tab_id }).await
    }

    pub async fn bookmarks(
        &mut self,
        query: &str,
    ) -> Result<Vec<Bookmark>, ProtocolError> {
        let resp = self
            .request(&RpcRequest::Bookmarks {
                query: query.to_owned(),
            })
            .await?;
        expect_variant!(resp, RpcResponse::Bookmarks(bookmarks) => bookmarks)
    }

    pub async fn history(
        &mut self,
        query: &str,
    ) -> Result<Vec<HistoryEntry>, ProtocolError> {
        let resp = self
            .request(&RpcRequest::History {
                query: query.to_owned(),
            })
            .await?;
        expect_variant!(resp, RpcResponse::History(entries) => entries)
    }

    pub async fn downloads(
        &mut self,
        query: &str,
    ) -> Result<Vec<DownloadEntry>, ProtocolError> {
        let resp = self
            .request(&RpcRequest::Downloads {
                query: query.to_owned(),
            })
            .await?;
        expect_variant!(resp, RpcResponse::Downloads(entries) => entries)
    }

    pub async fn open_incognito(&mut self, url: &str) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::OpenIncognito {
            url: url.to_owned(),
        })
        .await
    }

    /// Run `js` in a tab and return its JSON-encoded result.
    pub async fn run_script(
        &mut self,
        tab_id: i64,
        js: &str,
    ) -> Result<String, ProtocolError> {
        let resp = self
            .request(&RpcRequest::RunScript(RunScriptArg {
                tab_id,
                js: js.to_owned(),
            }))
            .await?;
        expect_variant!(resp, RpcResponse::ScriptResult(s) => s)
    }

    pub async fn run_bookmarklet(
        &mut self,
        tab_id: i64,
        bookmark_id: &str,
    ) -> Result<(), ProtocolError> {
        self.expect_done(&RpcRequest::RunBookmarklet(RunBookmarkletArg {
            tab_id,
            bookmark_id: bookmark_id.to_owned(),
        }))
        .await
    }
}
