//! One-way stop signal shared by a component's handle and its tasks.

use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct State {
    fired: AtomicBool,
    wakeup: Notify,
}

/// Cheap to clone; every clone observes the same signal. Once fired it
/// stays fired.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<State>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. True only for the call that fired it.
    pub fn fire(&self) -> bool {
        let first = !self.0.fired.swap(true, Ordering::AcqRel);
        if first {
            self.0.wakeup.notify_waiters();
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.0.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn fired(&self) {
        let mut notified = pin!(self.0.wakeup.notified());
        // register before checking, or a fire in between is missed
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }

    /// Fires the signal when dropped, so a task that ends for any reason
    /// takes its siblings down with it.
    pub fn fire_on_drop(&self) -> FireOnDrop {
        FireOnDrop(self.clone())
    }
}

#[derive(Debug)]
pub struct FireOnDrop(StopSignal);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}
