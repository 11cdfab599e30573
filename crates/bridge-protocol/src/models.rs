//! Payload shapes the browser host returns. Field names follow the
//! WebExtensions API objects they are copied from; missing fields default.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tab ID the host interprets as "the active tab".
pub const ACTIVE_TAB: i64 = 0;

/// Subset of `tabs.Tab`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tab {
    pub id: i64,
    pub window_id: i64,
    /// position in its window
    pub index: i64,
    pub title: String,
    pub url: String,
    pub active: bool,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tab(id={}, title={:?}, url={:?}, active={})",
            self.id, self.title, self.url, self.active
        )
    }
}

/// Subset of `bookmarks.BookmarkTreeNode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    /// "bookmark" or "folder"
    #[serde(rename = "type")]
    pub kind: String,
    /// only present for bookmarks
    pub url: String,
    pub parent_id: String,
    pub index: i64,
}

const BOOKMARKLET_SCHEME: &str = "javascript:";

impl Bookmark {
    pub fn is_bookmarklet(&self) -> bool {
        self.url.starts_with(BOOKMARKLET_SCHEME)
    }

    /// The script of a bookmarklet, percent-decoded. Empty for ordinary
    /// bookmarks and for bookmarklets whose escapes aren't valid UTF-8.
    pub fn javascript(&self) -> String {
        let Some(code) = self.url.strip_prefix(BOOKMARKLET_SCHEME) else {
            return String::new();
        };
        urlencoding::decode(code)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_default()
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bookmark(id={:?}, title={:?}, url={:?})",
            self.id, self.title, self.url
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Subset of `downloads.DownloadItem`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadEntry {
    pub id: i64,
    /// absolute path on disk
    pub filename: String,
    pub url: String,
    pub mime: String,
    /// "in_progress", "interrupted" or "complete"
    pub state: String,
    pub exists: bool,
}

/// Arguments of `execute-js`. A `tab_id` of 0 targets the active tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScriptArg {
    pub tab_id: i64,
    pub js: String,
}

/// Arguments of `run-bookmarklet`. A `tab_id` of 0 targets the active tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBookmarkletArg {
    pub tab_id: i64,
    pub bookmark_id: String,
}
