use std::{
    fs::{self, File, OpenOptions},
    io,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::ResultExt;
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::error::{LifecycleError, LogSnafu};

/// Move `path` to `path.1` if it is larger than `limit` bytes. Only one
/// backup is kept. Returns whether a rotation happened.
pub fn rotate_if_oversized(path: &Path, limit: u64) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(md) if md.len() > limit => {
            fs::rename(path, backup_path(path))?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

/// Open the server log for appending, rotating it first.
pub fn open_log_file(path: &Path, rotate_limit: u64) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    rotate_if_oversized(path, rotate_limit)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

/// Server logging: the log file plus stderr. Never stdout, which carries
/// the host protocol.
///
/// Only the first call in a process installs the subscriber; later calls
/// still open (and rotate) the file.
pub fn init_server_tracing(
    log_path: &Path,
    rotate_limit: u64,
) -> Result<(), LifecycleError> {
    let file = open_log_file(log_path, rotate_limit)
        .context(LogSnafu { path: log_path })?;
    let file = Arc::new(file);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    #[cfg(tokio_unstable)]
    {
        // Tokio console layer (spawns a background task; must be called inside
        // a Tokio runtime)
        let console_layer = console_subscriber::ConsoleLayer::builder()
            .with_default_env() // honors TOKIO_CONSOLE_* env vars
            .spawn();

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .with(stderr_layer)
            .try_init();
    }

    #[cfg(not(tokio_unstable))]
    {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .try_init();
    }

    Ok(())
}

/// Client commands are short-lived; warnings to stderr are plenty.
pub fn init_client_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
