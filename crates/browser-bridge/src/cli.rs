use std::{path::PathBuf, time::Duration};

use bridge_protocol::{
    models::{RunBookmarkletArg, RunScriptArg},
    rpc::RpcRequest,
};

use crate::config::ServerConfig;

static HELP_STR_SOCKET: &str = "
    The fully qualified path of the RPC socket. Clients and the server must \
                                agree on it. Defaults to \
                                \"$HOME/.browser-bridge.sock\"
";

#[derive(clap::Parser, Debug)]
#[command(
    name = "browser-bridge",
    version,
    about = "browser-bridge",
    long_about = "Runs as a browser extension's native messaging host and \
                  makes the extension's capabilities available to other \
                  programs over a Unix socket"
)]
pub enum Args {
    /// Run the bridge. Started by the browser, talks to the extension over
    /// stdin/stdout.
    Serve(ServeArgs),
    /// Call one method on a running bridge and print the result as JSON.
    Call {
        #[arg(
            long,
            short,
            value_name = "SOCKET_PATH",
            help = HELP_STR_SOCKET
        )]
        socket_path: Option<PathBuf>,

        #[command(subcommand)]
        method: Method,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, short, value_name = "SOCKET_PATH", help = HELP_STR_SOCKET)]
    pub socket_path: Option<PathBuf>,

    #[arg(
        long,
        short,
        value_name = "PID_FILE",
        help = "Where the running server records its PID. Defaults to \
                $XDG_CACHE_HOME/browser-bridge/server.pid"
    )]
    pub pid_file: Option<PathBuf>,

    #[arg(
        long,
        short = 'l',
        value_name = "LOG_PATH",
        help = "Log file, rotated to <LOG_PATH>.1 when it grows past 1MiB. \
                Defaults to $XDG_CACHE_HOME/browser-bridge/server.log"
    )]
    pub log_path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MILLIS",
        help = "How long any host call may take",
        default_value_t = 5000
    )]
    pub timeout_ms: u64,

    #[arg(
        long,
        value_name = "MILLIS",
        help = "How long a previous server gets to exit before startup \
                gives up",
        default_value_t = 2000
    )]
    pub takeover_grace_ms: u64,

    /// Browsers append the manifest path and extension ID when launching a
    /// native host. They carry nothing we use.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub host_args: Vec<String>,
}

impl ServeArgs {
    pub fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            socket_path: self.socket_path.unwrap_or(defaults.socket_path),
            pid_file: self.pid_file.unwrap_or(defaults.pid_file),
            log_file: self.log_path.unwrap_or(defaults.log_file),
            call_timeout: Duration::from_millis(self.timeout_ms),
            takeover_grace: Duration::from_millis(self.takeover_grace_ms),
            ..defaults
        }
    }
}

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Ping,
    /// Name of the program behind the socket
    AppName,
    Tabs,
    /// Show one tab, 0 for the active one
    Tab {
        #[arg(default_value_t = 0)]
        tab_id: i64,
    },
    CurrentTab,
    ActivateTab {
        tab_id: i64,
    },
    CloseTabsLeft {
        #[arg(default_value_t = 0)]
        tab_id: i64,
    },
    CloseTabsRight {
        #[arg(default_value_t = 0)]
        tab_id: i64,
    },
    CloseTabsOther {
        #[arg(default_value_t = 0)]
        tab_id: i64,
    },
    /// Search bookmarks. Lists all of them without a query
    Bookmarks {
        #[arg(default_value = "")]
        query: String,
    },
    History {
        #[arg(default_value = "")]
        query: String,
    },
    Downloads {
        #[arg(default_value = "")]
        query: String,
    },
    OpenIncognito {
        url: String,
    },
    RunScript {
        #[arg(long, short, default_value_t = 0)]
        tab_id: i64,
        js: String,
    },
    RunBookmarklet {
        #[arg(long, short, default_value_t = 0)]
        tab_id: i64,
        bookmark_id: String,
    },
}

impl From<Method> for RpcRequest {
    fn from(method: Method) -> Self {
        match method {
            Method::Ping => RpcRequest::Ping,
            Method::AppName => RpcRequest::AppName,
            Method::Tabs => RpcRequest::Tabs,
            Method::Tab { tab_id } => RpcRequest::Tab { tab_id },
            Method::CurrentTab => RpcRequest::CurrentTab,
            Method::ActivateTab { tab_id } => RpcRequest::ActivateTab { tab_id },
            Method::CloseTabsLeft { tab_id } => {
                RpcRequest::CloseTabsLeft { tab_id }
            }
            Method::CloseTabsRight { tab_id } => {
                RpcRequest::CloseTabsRight { tab_id }
            }
            Method::CloseTabsOther { tab_id } => {
                RpcRequest::CloseTabsOther { tab_id }
            }
            Method::Bookmarks { query } => RpcRequest::Bookmarks { query },
            Method::History { query } => RpcRequest::History { query },
            Method::Downloads { query } => RpcRequest::Downloads { query },
            Method::OpenIncognito { url } => RpcRequest::OpenIncognito { url },
            Method::RunScript { tab_id, js } => {
                RpcRequest::RunScript(RunScriptArg { tab_id, js })
            }
            Method::RunBookmarklet {
                tab_id,
                bookmark_id,
            } => RpcRequest::RunBookmarklet(RunBookmarkletArg {
                tab_id,
                bookmark_id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn serve_ignores_native_host_arguments() {
        let args = Args::try_parse_from([
            "browser-bridge",
            "serve",
            "--socket-path",
            "/tmp/b.sock",
            "/usr/lib/mozilla/native-messaging-hosts/bridge.json",
            "bridge@example.org",
        ])
        .unwrap();
        let Args::Serve(serve) = args else {
            panic!("expected serve");
        };
        assert_eq!(serve.host_args.len(), 2);

        let config = serve.into_config();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/b.sock"));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn call_builds_requests() {
        let args = Args::try_parse_from([
            "browser-bridge",
            "call",
            "run-bookmarklet",
            "--tab-id",
            "12",
            "bm-1",
        ])
        .unwrap();
        let Args::Call { method, .. } = args else {
            panic!("expected call");
        };
        assert_eq!(
            RpcRequest::from(method),
            RpcRequest::RunBookmarklet(RunBookmarkletArg {
                tab_id: 12,
                bookmark_id: "bm-1".into(),
            })
        );
    }

    #[test]
    fn bookmarks_query_defaults_to_empty() {
        let args =
            Args::try_parse_from(["browser-bridge", "call", "bookmarks"])
                .unwrap();
        let Args::Call { method, .. } = args else {
            panic!("expected call");
        };
        assert_eq!(
            method,
            Method::Bookmarks {
                query: String::new()
            }
        );
    }
}
