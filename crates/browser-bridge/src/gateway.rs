use std::{
    fs, io,
    os::unix::fs::{FileTypeExt, PermissionsExt},
    path::{Path, PathBuf},
};

use bridge_protocol::{
    error::ProtocolError,
    rpc::{RpcRequest, RpcResponse, read_message, write_message},
};
use snafu::ResultExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::{
    error::{LifecycleError, SocketSnafu},
    service::BrowserService,
    spawn_named,
    stop::StopSignal,
};

/// Owner read/write only; the socket is the only access control there is.
pub const SOCKET_MODE: u32 = 0o600;

/// Removes the socket file when dropped.
#[derive(Debug)]
pub struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

pub fn setup_unix_socket(
    path: &Path,
    mode: u32,
) -> io::Result<(UnixListener, SocketGuard)> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    if let Ok(md) = fs::symlink_metadata(path) {
        if md.file_type().is_socket() {
            fs::remove_file(path)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a socket", path.display()),
            ));
        }
    }

    let listener = UnixListener::bind(path)?;
    let guard = SocketGuard(path.to_path_buf());
    // before the first accept, the file is briefly world-accessible
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;

    Ok((listener, guard))
}

/// Handle to the listening side of the RPC socket.
#[derive(Clone, Debug)]
pub struct Gateway {
    path: PathBuf,
    shutdown: StopSignal,
    stopped: StopSignal,
}

impl Gateway {
    /// Bind the socket and start accepting connections.
    pub fn start(
        path: &Path,
        service: BrowserService,
    ) -> Result<Self, LifecycleError> {
        let (listener, guard) = setup_unix_socket(path, SOCKET_MODE)
            .context(SocketSnafu { path })?;
        info!("serving RPC on {}", path.display());

        let shutdown = StopSignal::new();
        let stopped = StopSignal::new();
        spawn_named(
            "rpc-listener",
            accept_loop(listener, guard, service, shutdown.clone(), stopped.clone()),
        );

        Ok(Self {
            path: path.to_path_buf(),
            shutdown,
            stopped,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Close the listener. Connections already accepted finish their
    /// current call.
    pub fn stop(&self) {
        if self.shutdown.fire() {
            debug!("gateway stop requested");
        }
    }

    /// Resolves once the listener is closed and the socket file removed.
    pub async fn stopped(&self) {
        self.stopped.fired().await;
    }
}

async fn accept_loop(
    listener: UnixListener,
    guard: SocketGuard,
    service: BrowserService,
    shutdown: StopSignal,
    stopped: StopSignal,
) {
    let _stopped = stopped.fire_on_drop();
    let mut next_conn: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = shutdown.fired() => break,
            res = listener.accept() => match res {
                Ok((stream, _addr)) => {
                    next_conn += 1;
                    let conn = next_conn;
                    let service = service.clone();
                    spawn_named("rpc-connection", async move {
                        debug!("client {conn} connected");
                        if let Err(e) = handle_rpc_connection(stream, service).await {
                            error!("RPC connection {conn} error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("RPC accept error: {e}");
                }
            },
        }
    }

    drop(listener);
    drop(guard);
    info!("RPC listener closed");
}

/// Handle a single RPC connection from a client
pub async fn handle_rpc_connection(
    mut stream: UnixStream,
    service: BrowserService,
) -> Result<(), ProtocolError> {
    loop {
        let Some(request) = read_message::<RpcRequest, _>(&mut stream).await?
        else {
            // Connection closed
            return Ok(());
        };

        let response: RpcResponse = service.dispatch(request).await;
        write_message(&mut stream, &response).await?;
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::MetadataExt;

    use super::*;

    #[tokio::test]
    async fn socket_is_owner_only_and_removed_by_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/bridge.sock");

        let (listener, guard) = setup_unix_socket(&path, SOCKET_MODE).unwrap();
        let mode = fs::metadata(&path).unwrap().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");

        let (first, first_guard) = setup_unix_socket(&path, SOCKET_MODE).unwrap();
        drop(first);
        // simulate a crash: the file stays behind
        std::mem::forget(first_guard);
        assert!(path.exists());

        let (_second, _guard) = setup_unix_socket(&path, SOCKET_MODE).unwrap();
        UnixStream::connect(&path).await.unwrap();
    }

    #[tokio::test]
    async fn regular_file_is_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        fs::write(&path, b"precious").unwrap();

        let err = setup_unix_socket(&path, SOCKET_MODE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&path).unwrap(), b"precious");
    }
}
