use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use bridge_protocol::host_frame::DEFAULT_MAX_FRAME_LEN;

pub const APP_NAME: &str = "browser-bridge";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TAKEOVER_GRACE: Duration = Duration::from_secs(2);
/// Log file size above which it is moved to `<log>.1` at startup.
pub const DEFAULT_LOG_ROTATE_BYTES: u64 = 1024 * 1024;

/// Everything the server needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    /// Applies to every host call alike
    pub call_timeout: Duration,
    /// How long a previous instance gets to exit after SIGTERM
    pub takeover_grace: Duration,
    pub max_frame_len: usize,
    pub log_rotate_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let dirs = Dirs::from_env();
        Self::in_dirs(&dirs)
    }
}

impl ServerConfig {
    fn in_dirs(dirs: &Dirs) -> Self {
        Self {
            socket_path: dirs.socket_path(),
            pid_file: dirs.cache_dir().join("server.pid"),
            log_file: dirs.cache_dir().join("server.log"),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            takeover_grace: DEFAULT_TAKEOVER_GRACE,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            log_rotate_bytes: DEFAULT_LOG_ROTATE_BYTES,
        }
    }

    /// All state files under one directory. Used by tests and by anyone
    /// running a private instance.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            socket_path: dir.join("bridge.sock"),
            pid_file: dir.join("server.pid"),
            log_file: dir.join("server.log"),
            ..Self::default()
        }
    }
}

/// Where per-user state lives.
#[derive(Debug, Clone)]
pub struct Dirs {
    home: PathBuf,
    cache: PathBuf,
}

impl Dirs {
    pub fn from_env() -> Self {
        Self::new(env::var_os("HOME"), env::var_os("XDG_CACHE_HOME"))
    }

    fn new(home: Option<OsString>, xdg_cache: Option<OsString>) -> Self {
        let home = home
            .filter(|h| !h.is_empty())
            .map_or_else(env::temp_dir, PathBuf::from);
        // XDG says relative paths are invalid and must be ignored
        let cache = xdg_cache
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .unwrap_or_else(|| home.join(".cache"));
        Self { home, cache }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.home.join(format!(".{APP_NAME}.sock"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache.join(APP_NAME)
    }
}
