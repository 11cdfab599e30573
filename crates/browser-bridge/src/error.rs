use std::{io, path::PathBuf};

use bridge_protocol::error::FrameError;
use snafu::Snafu;

/// Why a call to the host did not produce a payload.
///
/// The display text is what RPC clients see.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CallError {
    #[snafu(display("unable to encode command {name:?}: {source}"))]
    Encoding { name: String, source: FrameError },

    #[snafu(display("host I/O failed: {source}"))]
    TransportIo { source: io::Error },

    /// The host reported a failure for this command.
    #[snafu(display("{message}"))]
    Host { message: String },

    #[snafu(display("timeout: {id}"))]
    Timeout { id: String },

    #[snafu(display("transport closed"))]
    TransportClosed,

    #[snafu(display("unexpected payload for {name:?}: {source}"))]
    Payload {
        name: String,
        source: serde_json::Error,
    },

    /// Rejected before anything was sent to the host.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument { reason: String },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LifecycleError {
    #[snafu(display("server already running (pid {pid})"))]
    StartupConflict { pid: i32 },

    #[snafu(display("PID file {}: {source}", path.display()))]
    PidFile { path: PathBuf, source: io::Error },

    #[snafu(display("unable to bind socket {}: {source}", path.display()))]
    Socket { path: PathBuf, source: io::Error },

    #[snafu(display("log file {}: {source}", path.display()))]
    Log { path: PathBuf, source: io::Error },

    #[snafu(display("unable to install signal handler: {source}"))]
    Signal { source: io::Error },
}
