//! One method per host capability.
//!
//! Each method checks its arguments, calls the host through the
//! correlator and hands back a typed result. [`BrowserService::dispatch`]
//! maps a decoded [`RpcRequest`] onto those methods for the gateway.

use std::time::Instant;

use bridge_protocol::{
    models::{
        ACTIVE_TAB, Bookmark, DownloadEntry, HistoryEntry, RunBookmarkletArg,
        RunScriptArg, Tab,
    },
    rpc::{RpcRequest, RpcResponse},
};
use serde::{Serialize, de::DeserializeOwned, de::IgnoredAny};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    correlator::Correlator,
    error::{CallError, InvalidArgumentSnafu},
};

/// The commands the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Ping,
    AllTabs,
    Tab,
    ActivateTab,
    CloseTabsLeft,
    CloseTabsRight,
    CloseTabsOther,
    AllBookmarks,
    SearchBookmarks,
    SearchHistory,
    SearchDownloads,
    OpenIncognito,
    ExecuteJs,
    RunBookmarklet,
}

impl Capability {
    /// Name of the command on the host wire.
    pub fn host_command(self) -> &'static str {
        match self {
            Capability::Ping => "ping",
            Capability::AllTabs => "all-tabs",
            Capability::Tab => "tab",
            Capability::ActivateTab => "activate-tab",
            Capability::CloseTabsLeft => "close-tabs-left",
            Capability::CloseTabsRight => "close-tabs-right",
            Capability::CloseTabsOther => "close-tabs-other",
            Capability::AllBookmarks => "all-bookmarks",
            Capability::SearchBookmarks => "search-bookmarks",
            Capability::SearchHistory => "search-history",
            Capability::SearchDownloads => "search-downloads",
            Capability::OpenIncognito => "open-incognito",
            Capability::ExecuteJs => "execute-js",
            Capability::RunBookmarklet => "run-bookmarklet",
        }
    }
}

fn check_tab_id(tab_id: i64) -> Result<i64, CallError> {
    if tab_id < 0 {
        return InvalidArgumentSnafu {
            reason: format!("tab ID {tab_id} is negative"),
        }
        .fail();
    }
    Ok(tab_id)
}

fn check_non_empty<'a>(what: &str, value: &'a str) -> Result<&'a str, CallError> {
    if value.trim().is_empty() {
        return InvalidArgumentSnafu {
            reason: format!("{what} is empty"),
        }
        .fail();
    }
    Ok(value)
}

#[derive(Clone, Debug)]
pub struct BrowserService {
    correlator: Correlator,
}

impl BrowserService {
    pub fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    async fn call<P, T>(&self, cap: Capability, params: &P) -> Result<T, CallError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        self.correlator.call(cap.host_command(), params).await
    }

    // for commands whose response carries nothing but `error`
    async fn call_unit<P: Serialize>(
        &self,
        cap: Capability,
        params: &P,
    ) -> Result<(), CallError> {
        self.call::<_, IgnoredAny>(cap, params).await.map(|_| ())
    }

    /// The host answers "pong".
    pub async fn ping(&self) -> Result<String, CallError> {
        self.call(Capability::Ping, &()).await
    }

    /// Answered locally; the host isn't involved.
    pub fn app_name() -> &'static str {
        env!("CARGO_PKG_NAME")
    }

    pub async fn tabs(&self) -> Result<Vec<Tab>, CallError> {
        self.call(Capability::AllTabs, &()).await
    }

    /// Tab 0 is the active tab.
    pub async fn tab(&self, tab_id: i64) -> Result<Tab, CallError> {
        let tab_id = check_tab_id(tab_id)?;
        self.call(Capability::Tab, &tab_id).await
    }

    pub async fn current_tab(&self) -> Result<Tab, CallError> {
        self.tab(ACTIVE_TAB).await
    }

    pub async fn activate_tab(&self, tab_id: i64) -> Result<(), CallError> {
        let tab_id = check_tab_id(tab_id)?;
        self.call_unit(Capability::ActivateTab, &tab_id).await
    }

    pub async fn close_tabs_left(&self, tab_id: i64) -> Result<(), CallError> {
        let tab_id = check_tab_id(tab_id)?;
        self.call_unit(Capability::CloseTabsLeft, &tab_id).await
    }

    pub async fn close_tabs_right(&self, tab_id: i64) -> Result<(), CallError> {
        let tab_id = check_tab_id(tab_id)?;
        self.call_unit(Capability::CloseTabsRight, &tab_id).await
    }

    pub async fn close_tabs_other(&self, tab_id: i64) -> Result<(), CallError> {
        let tab_id = check_tab_id(tab_id)?;
        self.call_unit(Capability::CloseTabsOther, &tab_id).await
    }

    /// An empty query lists every bookmark.
    pub async fn bookmarks(&self, query: &str) -> Result<Vec<Bookmark>, CallError> {
        if query.is_empty() {
            self.call(Capability::AllBookmarks, &()).await
        } else {
            self.call(Capability::SearchBookmarks, &query).await
        }
    }

    pub async fn history(&self, query: &str) -> Result<Vec<HistoryEntry>, CallError> {
        self.call(Capability::SearchHistory, &query).await
    }

    pub async fn downloads(
        &self,
        query: &str,
    ) -> Result<Vec<DownloadEntry>, CallError> {
        self.call(Capability::SearchDownloads, &query).await
    }

    pub async fn open_incognito(&self, url: &str) -> Result<(), CallError> {
        let url = check_non_empty("URL", url)?;
        self.call_unit(Capability::OpenIncognito, &url).await
    }

    /// Run a script in a tab. The result comes back JSON-encoded.
    pub async fn run_script(&self, arg: &RunScriptArg) -> Result<String, CallError> {
        check_tab_id(arg.tab_id)?;
        check_non_empty("script", &arg.js)?;
        let value: Value = self.call(Capability::ExecuteJs, arg).await?;
        Ok(match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub async fn run_bookmarklet(
        &self,
        arg: &RunBookmarkletArg,
    ) -> Result<(), CallError> {
        check_tab_id(arg.tab_id)?;
        check_non_empty("bookmark ID", &arg.bookmark_id)?;
        self.call_unit(Capability::RunBookmarklet, arg).await
    }

    /// Serve one RPC request. Failures become [`RpcResponse::Error`] with
    /// the error's display text.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let method = request.method();
        let started = Instant::now();

        let result = match request {
            RpcRequest::Ping => self.ping().await.map(RpcResponse::Pong),
            RpcRequest::AppName => {
                Ok(RpcResponse::AppName(Self::app_name().to_owned()))
            }
            RpcRequest::Tabs => self.tabs().await.map(RpcResponse::Tabs),
            RpcRequest::Tab { tab_id } => {
                self.tab(tab_id).await.map(RpcResponse::Tab)
            }
            RpcRequest::CurrentTab => {
                self.current_tab().await.map(RpcResponse::Tab)
            }
            RpcRequest::ActivateTab { tab_id } => {
                self.activate_tab(tab_id).await.map(|()| RpcResponse::Done)
            }
            RpcRequest::CloseTabsLeft { tab_id } => self
                .close_tabs_left(tab_id)
                .await
                .map(|()| RpcResponse::Done),
            RpcRequest::CloseTabsRight { tab_id } => self
                .close_tabs_right(tab_id)
                .await
                .map(|()| RpcResponse::Done),
            RpcRequest::CloseTabsOther { tab_id } => self
                .close_tabs_other(tab_id)
                .await
                .map(|()| RpcResponse::Done),
            RpcRequest::Bookmarks { query } => {
                self.bookmarks(&query).await.map(RpcResponse::Bookmarks)
            }
            RpcRequest::History { query } => {
                self.history(&query).await.map(RpcResponse::History)
            }
            RpcRequest::Downloads { query } => {
                self.downloads(&query).await.map(RpcResponse::Downloads)
            }
            RpcRequest::OpenIncognito { url } => {
                self.open_incognito(&url).await.map(|()| RpcResponse::Done)
            }
            RpcRequest::RunScript(arg) => {
                self.run_script(&arg).await.map(RpcResponse::ScriptResult)
            }
            RpcRequest::RunBookmarklet(arg) => self
                .run_bookmarklet(&arg)
                .await
                .map(|()| RpcResponse::Done),
        };

        match result {
            Ok(response) => {
                debug!("{method} took {:?}", started.elapsed());
                response
            }
            Err(e) => {
                warn!("{method} failed after {:?}: {e}", started.elapsed());
                RpcResponse::Error {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const EVERY_CAPABILITY: [Capability; 14] = [
        Capability::Ping,
        Capability::AllTabs,
        Capability::Tab,
        Capability::ActivateTab,
        Capability::CloseTabsLeft,
        Capability::CloseTabsRight,
        Capability::CloseTabsOther,
        Capability::AllBookmarks,
        Capability::SearchBookmarks,
        Capability::SearchHistory,
        Capability::SearchDownloads,
        Capability::OpenIncognito,
        Capability::ExecuteJs,
        Capability::RunBookmarklet,
    ];

    #[test]
    fn host_commands_are_distinct() {
        let names: HashSet<_> =
            EVERY_CAPABILITY.iter().map(|c| c.host_command()).collect();
        assert_eq!(names.len(), EVERY_CAPABILITY.len());
        assert!(names.contains("execute-js"));
    }

    #[test]
    fn argument_checks() {
        assert!(check_tab_id(0).is_ok());
        assert!(check_tab_id(17).is_ok());
        let err = check_tab_id(-1).unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: tab ID -1 is negative");

        assert!(check_non_empty("URL", "https://example.org").is_ok());
        assert!(check_non_empty("URL", "  ").is_err());
    }
}
