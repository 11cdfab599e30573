use tokio::task::JoinHandle;
use tracing::Instrument;

pub mod cli;
pub mod config;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod service;
pub mod stop;
pub mod tracing_init;
pub mod transport;

/// Spawn a task inside a span carrying its name. Under `tokio_unstable`
/// the name also shows up in tokio-console.
///
/// Task spans are always roots, even when spawned from another task.
#[allow(unexpected_cfgs)]
pub fn spawn_named<F>(name: &str, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    use futures::FutureExt;

    let span = tracing::info_span!(parent: None, "task", task_name = %name);
    let fut = fut.instrument(span);

    #[cfg(tokio_unstable)]
    {
        match tokio::task::Builder::new().name(name).spawn(fut.boxed()) {
            Ok(handle) => handle,
            Err(e) => panic!("unable to spawn {name}: {e}"),
        }
    }

    #[cfg(not(tokio_unstable))]
    {
        tokio::spawn(fut.boxed())
    }
}
