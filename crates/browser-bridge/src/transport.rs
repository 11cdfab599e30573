//! The host's stdio channel.
//!
//! A reader task owns the host's output and turns frames into
//! [`Response`]s for the correlator. A writer task owns the host's input
//! and is the only place frames are written, one complete frame at a time.

use std::io;

use bridge_protocol::host_frame::{self, Command, Response};
use snafu::ResultExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, warn};

use crate::{
    error::{CallError, EncodingSnafu, TransportClosedSnafu},
    spawn_named,
    stop::StopSignal,
};

// commands queued behind the one being written
const OUTBOX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Running,
    Stopped,
}

struct Outgoing {
    frame: Vec<u8>,
    label: String,
    ack: oneshot::Sender<io::Result<()>>,
}

/// Handle to a running transport. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Transport {
    outbox: mpsc::Sender<Outgoing>,
    shutdown: StopSignal,
}

impl Transport {
    /// Spawn the reader and writer tasks. Decoded responses come out of the
    /// returned receiver, which closes once the reader has stopped.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        max_frame_len: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Response>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shutdown = StopSignal::new();
        let (outbox, queue) = mpsc::channel(OUTBOX_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        spawn_named(
            "host-reader",
            read_loop(reader, max_frame_len, inbound_tx, shutdown.clone()),
        );
        spawn_named("host-writer", write_loop(writer, queue, shutdown.clone()));

        (Self { outbox, shutdown }, inbound_rx)
    }

    /// Write `command` to the host. Resolves once the whole frame has been
    /// written and flushed, or with the error that write hit.
    pub async fn submit(&self, command: &Command) -> Result<(), CallError> {
        let frame = command
            .encode()
            .context(EncodingSnafu { name: &command.name })?;
        if self.shutdown.is_fired() {
            return TransportClosedSnafu.fail();
        }

        let (ack, done) = oneshot::channel();
        let item = Outgoing {
            frame,
            label: command.to_string(),
            ack,
        };
        if self.outbox.send(item).await.is_err() {
            return TransportClosedSnafu.fail();
        }

        match done.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(CallError::TransportIo { source }),
            // writer went away before getting to us
            Err(_) => TransportClosedSnafu.fail(),
        }
    }

    pub fn state(&self) -> TransportState {
        if self.shutdown.is_fired() {
            TransportState::Stopped
        } else {
            TransportState::Running
        }
    }

    /// Resolves once the transport has stopped, for whatever reason.
    pub async fn closed(&self) {
        self.shutdown.fired().await;
    }

    pub fn stop(&self) {
        if self.shutdown.fire() {
            debug!("transport stop requested");
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    max_frame_len: usize,
    inbound: mpsc::UnboundedSender<Response>,
    shutdown: StopSignal,
) where
    R: AsyncRead + Unpin,
{
    // the host is unreachable once we stop reading, so take the writer
    // down with us
    let _stop = shutdown.fire_on_drop();

    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.fired() => return,
            res = host_frame::read_frame(&mut reader, max_frame_len) => res,
        };

        let body = match frame {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!("host closed its output");
                return;
            }
            Err(e) => {
                error!("read from host: {e}");
                return;
            }
        };

        let response = host_frame::decode(&body);
        if let Some(fault) = &response.fault {
            warn!("dropping malformed frame of {} bytes: {fault}", body.len());
            continue;
        }
        debug!("received {response}");

        if inbound.send(response).is_err() {
            debug!("correlator gone, reader exiting");
            return;
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Outgoing>,
    shutdown: StopSignal,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let item = tokio::select! {
            biased;
            () = shutdown.fired() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let res = tokio::select! {
            biased;
            // dropping the ack tells the issuer the transport closed
            () = shutdown.fired() => break,
            res = write_frame(&mut writer, &item.frame) => res,
        };

        match &res {
            Ok(()) => debug!("sent {}", item.label),
            Err(e) => error!("write {} to host: {e}", item.label),
        }
        // the issuer may have timed out already
        let _ = item.ack.send(res);
    }
    debug!("host writer stopped");
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}
