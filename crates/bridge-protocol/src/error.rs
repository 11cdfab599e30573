use std::backtrace::Backtrace;

use snafu::Snafu;

/// Failure to turn a message into a host frame.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FrameError {
    #[snafu(display("unable to encode JSON body: {source}"))]
    Json { source: serde_json::Error },
    #[snafu(display("frame body of {len} bytes does not fit a u32 prefix"))]
    TooLong { len: usize },
}

/// Errors on the local RPC socket, seen from either end.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    #[snafu(display("I/O error: {source}"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    //
    #[snafu(display("CBOR error: {source}"))]
    Cbor {
        source: serde_cbor::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Mismatch Error"))]
    MisMatchError { backtrace: Backtrace },
    #[snafu(display("declared message length {len} exceeds limit {max}"))]
    FrameTooLarge { len: usize, max: usize },
    /// The server answered with an error; the text is what the RPC method
    /// reported (host error text, `timeout: <id>`, ...).
    #[snafu(display("{message}"))]
    Remote { message: String },
}

impl From<std::io::Error> for ProtocolError {
    fn from(source: std::io::Error) -> Self {
        ProtocolError::Io {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<serde_cbor::Error> for ProtocolError {
    fn from(source: serde_cbor::Error) -> Self {
        ProtocolError::Cbor {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}
