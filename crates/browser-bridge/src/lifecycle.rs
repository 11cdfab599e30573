//! Single-instance startup and orderly shutdown.
//!
//! Exclusivity rests on the PID file alone: a new server asks whoever the
//! file names to exit and waits for it before claiming the file, the log
//! and the socket. There is a window between reading the file and
//! signalling in which the PID could be reused; an advisory lock held for
//! the server's lifetime would close it.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use snafu::ResultExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    signal::unix::{SignalKind, signal},
    time::Instant,
};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    correlator::Correlator,
    error::{LifecycleError, PidFileSnafu, SignalSnafu, StartupConflictSnafu},
    gateway::Gateway,
    service::BrowserService,
    spawn_named,
    tracing_init::init_server_tracing,
    transport::Transport,
};

const TAKEOVER_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded PID. Missing, unreadable or garbage files read as
    /// `None`, as does anything that isn't a positive PID.
    pub fn read(&self) -> Option<i32> {
        let text = fs::read_to_string(&self.path).ok()?;
        text.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
    }

    /// Record this process as the owner.
    pub fn claim(&self) -> Result<(), LifecycleError> {
        let write = || -> io::Result<()> {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir)?;
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)?;
            file.write_all(own_pid().to_string().as_bytes())
        };
        write().context(PidFileSnafu { path: &self.path })
    }

    /// Remove the file if it still names this process. A successor that
    /// already claimed it keeps it.
    pub fn release(&self) -> bool {
        if self.read() != Some(own_pid()) {
            return false;
        }
        fs::remove_file(&self.path).is_ok()
    }
}

pub fn own_pid() -> i32 {
    std::process::id() as i32
}

/// Whether `pid` names a live process. One we may not signal still counts.
pub fn process_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Ask the server recorded in `pid_file` to exit and wait up to `grace`
/// for it to go. Returns the PID that was displaced, if any.
pub async fn take_over(
    pid_file: &PidFile,
    grace: Duration,
) -> Result<Option<i32>, LifecycleError> {
    let Some(pid) = pid_file.read() else {
        return Ok(None);
    };
    if pid == own_pid() || !process_alive(pid) {
        // left behind by a server that didn't shut down cleanly
        return Ok(None);
    }

    info!("signalling existing server {pid} to stop ...");
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("unable to signal {pid}: {e}"),
    }

    let start = Instant::now();
    while process_alive(pid) {
        if start.elapsed() > grace {
            return StartupConflictSnafu { pid }.fail();
        }
        tokio::time::sleep(TAKEOVER_POLL).await;
    }
    Ok(Some(pid))
}

/// Resolves on SIGINT, SIGTERM or SIGQUIT. Handlers are installed when
/// this is called, not when the future is first polled.
pub fn termination_signal()
-> Result<impl Future<Output = ()> + Send + 'static, LifecycleError> {
    let mut interrupt = signal(SignalKind::interrupt()).context(SignalSnafu)?;
    let mut terminate = signal(SignalKind::terminate()).context(SignalSnafu)?;
    let mut quit = signal(SignalKind::quit()).context(SignalSnafu)?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
            _ = quit.recv() => info!("received SIGQUIT"),
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Claiming,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub struct Supervisor {
    config: ServerConfig,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Starting,
        }
    }

    fn enter(&mut self, next: SupervisorState) {
        info!("supervisor {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run a server on the given host stdio until `stop` resolves or the
    /// host goes away, then clean up.
    pub async fn run<R, W, F>(
        mut self,
        host_output: R,
        host_input: W,
        stop: F,
    ) -> Result<(), LifecycleError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let pid_file = PidFile::new(&self.config.pid_file);
        let displaced = take_over(&pid_file, self.config.takeover_grace).await?;

        self.enter(SupervisorState::Claiming);
        pid_file.claim()?;
        if let Err(e) =
            init_server_tracing(&self.config.log_file, self.config.log_rotate_bytes)
        {
            pid_file.release();
            return Err(e);
        }
        info!(
            "browser-bridge {} starting, pid {}",
            env!("CARGO_PKG_VERSION"),
            own_pid()
        );
        if let Some(pid) = displaced {
            info!("took over from previous server {pid}");
        }

        let (transport, inbound) =
            Transport::start(host_output, host_input, self.config.max_frame_len);
        let correlator =
            Correlator::new(transport.clone(), inbound, self.config.call_timeout);
        let service = BrowserService::new(correlator.clone());

        let gateway = match Gateway::start(&self.config.socket_path, service.clone())
        {
            Ok(gateway) => gateway,
            Err(e) => {
                correlator.stop();
                transport.stop();
                pid_file.release();
                return Err(e);
            }
        };

        spawn_named("startup-ping", async move {
            match service.ping().await {
                Ok(reply) => info!("ping => {reply:?}"),
                Err(e) => warn!("startup ping failed: {e}"),
            }
        });

        self.enter(SupervisorState::Running);
        tokio::select! {
            () = stop => {}
            () = transport.closed() => info!("host disconnected"),
        }

        self.enter(SupervisorState::Draining);
        correlator.stop();
        transport.stop();
        gateway.stop();
        gateway.stopped().await;
        if !pid_file.release() {
            warn!("PID file {} no longer ours, leaving it", pid_file.path().display());
        }

        self.enter(SupervisorState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_pid_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        assert_eq!(pid_file.read(), None);

        for junk in ["", "abc", "-4", "0", "12x"] {
            fs::write(pid_file.path(), junk).unwrap();
            assert_eq!(pid_file.read(), None, "{junk:?}");
        }

        fs::write(pid_file.path(), "4242\n").unwrap();
        assert_eq!(pid_file.read(), Some(4242));
    }

    #[test]
    fn claim_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("cache/server.pid"));

        pid_file.claim().unwrap();
        assert_eq!(pid_file.read(), Some(own_pid()));
        assert!(pid_file.release());
        assert!(!pid_file.path().exists());
    }

    #[test]
    fn release_leaves_a_successors_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        fs::write(pid_file.path(), "1").unwrap();

        assert!(!pid_file.release());
        assert!(pid_file.path().exists());
    }

    #[test]
    fn we_are_alive() {
        assert!(process_alive(own_pid()));
    }

    #[tokio::test]
    async fn own_or_dead_pid_is_not_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));

        pid_file.claim().unwrap();
        assert_eq!(
            take_over(&pid_file, Duration::from_millis(100)).await.unwrap(),
            None
        );

        // reap a child so its PID is known dead
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead = child.id() as i32;
        child.wait().unwrap();
        fs::write(pid_file.path(), dead.to_string()).unwrap();
        assert_eq!(
            take_over(&pid_file, Duration::from_millis(100)).await.unwrap(),
            None
        );
    }
}
