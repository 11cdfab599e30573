//! Matches host responses to the calls that caused them.
//!
//! The pending-call table lives inside one task. Callers register a reply
//! channel through an operation queue before their command is written, and
//! the reader's responses are routed by that same task, so the table never
//! needs a lock. When the task ends every registered reply channel is
//! dropped, which is how outstanding calls learn the transport closed.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bridge_protocol::host_frame::{Command, CommandIds, Response};
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    error::{
        CallError, EncodingSnafu, HostSnafu, PayloadSnafu, TimeoutSnafu,
        TransportClosedSnafu,
    },
    spawn_named,
    stop::StopSignal,
    transport::{Transport, TransportState},
};

enum TableOp {
    Register {
        id: String,
        reply: oneshot::Sender<Response>,
    },
    Reclaim {
        id: String,
    },
    Stats {
        reply: oneshot::Sender<CorrelatorStats>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// calls waiting on a response
    pub pending: usize,
    /// responses nobody was waiting for
    pub orphans: u64,
}

#[derive(Clone, Debug)]
pub struct Correlator {
    transport: Transport,
    ops: mpsc::UnboundedSender<TableOp>,
    ids: Arc<CommandIds>,
    timeout: Duration,
    shutdown: StopSignal,
}

impl Correlator {
    /// `inbound` is the response stream of `transport`.
    pub fn new(
        transport: Transport,
        inbound: mpsc::UnboundedReceiver<Response>,
        timeout: Duration,
    ) -> Self {
        let (ops, ops_rx) = mpsc::unbounded_channel();
        let shutdown = StopSignal::new();
        spawn_named(
            "pending-table",
            run_table(ops_rx, inbound, shutdown.clone()),
        );

        Self {
            transport,
            ops,
            ids: Arc::new(CommandIds::new()),
            timeout,
            shutdown,
        }
    }

    /// Send `name` to the host and decode the `payload` of its response as
    /// `T`. A non-empty `error` in the response becomes
    /// [`CallError::Host`].
    pub async fn call<P, T>(&self, name: &str, params: &P) -> Result<T, CallError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let response = self.round_trip(name, params).await?;
        if !response.error.is_empty() {
            return HostSnafu {
                message: response.error,
            }
            .fail();
        }
        serde_json::from_value(response.payload).context(PayloadSnafu { name })
    }

    /// Send a command and wait for the matching response, whatever it says.
    pub async fn round_trip<P>(
        &self,
        name: &str,
        params: &P,
    ) -> Result<Response, CallError>
    where
        P: Serialize,
    {
        if self.is_stopped() {
            return TransportClosedSnafu.fail();
        }
        // the write counts against the deadline too
        let deadline = Instant::now() + self.timeout;

        let id = self.ids.next_id();
        let command = Command::new(id.clone(), name, params)
            .context(EncodingSnafu { name })?;

        let (reply, waiter) = oneshot::channel();
        if self
            .ops
            .send(TableOp::Register {
                id: id.clone(),
                reply,
            })
            .is_err()
        {
            return TransportClosedSnafu.fail();
        }

        let exchange = async {
            self.transport.submit(&command).await?;
            // sender dropped means the table shut down under us
            waiter.await.map_err(|_| CallError::TransportClosed)
        };

        let outcome = tokio::select! {
            res = exchange => res,
            () = tokio::time::sleep_until(deadline) => {
                warn!("{command} timed out after {:?}", self.timeout);
                TimeoutSnafu { id: id.clone() }.fail()
            }
        };

        if outcome.is_err() {
            // fine if the table is gone, there is nothing left to reclaim
            let _ = self.ops.send(TableOp::Reclaim { id });
        }
        outcome
    }

    /// Snapshot of the pending table. `None` once the table has shut down.
    pub async fn stats(&self) -> Option<CorrelatorStats> {
        let (reply, rx) = oneshot::channel();
        self.ops.send(TableOp::Stats { reply }).ok()?;
        rx.await.ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_fired()
            || self.transport.state() == TransportState::Stopped
    }

    /// Fail all outstanding calls and refuse new ones.
    pub fn stop(&self) {
        if self.shutdown.fire() {
            debug!("correlator stop requested");
        }
    }
}

async fn run_table(
    mut ops: mpsc::UnboundedReceiver<TableOp>,
    mut inbound: mpsc::UnboundedReceiver<Response>,
    shutdown: StopSignal,
) {
    let mut pending: HashMap<String, oneshot::Sender<Response>> =
        HashMap::new();
    let mut orphans: u64 = 0;

    loop {
        tokio::select! {
            // registrations are queued before their command is written, so
            // draining ops first means a response never beats its waiter
            biased;
            () = shutdown.fired() => break,
            op = ops.recv() => match op {
                Some(TableOp::Register { id, reply }) => {
                    pending.insert(id, reply);
                }
                Some(TableOp::Reclaim { id }) => {
                    if pending.remove(&id).is_some() {
                        debug!("reclaimed pending call {id}");
                    }
                }
                Some(TableOp::Stats { reply }) => {
                    let _ = reply.send(CorrelatorStats {
                        pending: pending.len(),
                        orphans,
                    });
                }
                None => break,
            },
            response = inbound.recv() => match response {
                Some(response) => {
                    if !route(&mut pending, response) {
                        orphans += 1;
                    }
                }
                None => break,
            },
        }
    }

    if !pending.is_empty() {
        info!("failing {} pending call(s): transport closed", pending.len());
    }
}

// false when nobody was waiting for the response
fn route(
    pending: &mut HashMap<String, oneshot::Sender<Response>>,
    response: Response,
) -> bool {
    let Some(reply) = pending.remove(&response.id) else {
        warn!("no handler for message {:?}", response.id);
        return false;
    };
    match reply.send(response) {
        Ok(()) => true,
        Err(response) => {
            warn!("caller for {:?} already gone", response.id);
            false
        }
    }
}
