//! Drain-then-exit shutdown.
//!
//! `Running → Draining → Terminated`. The first SIGINT/SIGTERM flips the
//! coordinator into draining: new sockets are refused with 1001, background
//! tasks stop, and existing clients keep being served until they leave or the
//! drain ceiling passes. The worker then releases the broker and exits 0.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DrainConfig;
use crate::context::ServerContext;
use crate::websocket::registry::ConnectionRegistry;

/// Terminates the process. Only the final step of the shutdown sequence
/// calls it.
pub trait ProcessExit: Send + Sync {
    /// End the process with `code`.
    fn exit(&self, code: i32);
}

/// [`ProcessExit`] that really exits.
#[derive(Clone, Copy, Debug, Default)]
pub struct HardExit;

impl ProcessExit for HardExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// How a drain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every client left.
    Drained,
    /// The ceiling passed with clients still attached.
    TimedOut {
        /// Connections still open.
        remaining: usize,
    },
}

/// Process-wide shutdown flag plus the tasks to stop when it flips.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    triggered: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            triggered: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Flip into draining. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Register a background task to abort when draining starts.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Abort every tracked task. Aborting a finished task is a no-op.
    fn stop_tasks(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for task in tasks {
            task.abort();
        }
        count
    }

    /// Wait until `registry` is empty or `config.timeout` elapses, polling
    /// every `config.poll_interval` and logging every
    /// `config.progress_interval`.
    pub async fn drain(&self, registry: &ConnectionRegistry, config: DrainConfig) -> DrainOutcome {
        let started = Instant::now();
        let mut last_progress: Option<Instant> = None;
        loop {
            let connections = registry.count();
            if connections == 0 {
                info!(waited_secs = started.elapsed().as_secs(), "all clients disconnected");
                return DrainOutcome::Drained;
            }
            let elapsed = started.elapsed();
            if elapsed >= config.timeout {
                warn!(connections, "drain timed out, forcing exit");
                return DrainOutcome::TimedOut {
                    remaining: connections,
                };
            }
            let budget = config.timeout - elapsed;
            if last_progress.is_none_or(|at| at.elapsed() >= config.progress_interval) {
                info!(
                    connections,
                    remaining_secs = budget.as_secs(),
                    "waiting for clients to disconnect"
                );
                last_progress = Some(Instant::now());
            }
            tokio::time::sleep(config.poll_interval.min(budget)).await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the whole sequence for `ctx`: flip the flag, stop background tasks,
/// drain, close the bus bridge, exit 0.
///
/// Returns `None` without doing anything if shutdown was already under way.
pub async fn run_shutdown(ctx: &ServerContext, exit: &dyn ProcessExit) -> Option<DrainOutcome> {
    if !ctx.shutdown.trigger() {
        info!(pid = %ctx.process, "shutdown already in progress, ignoring");
        return None;
    }
    let stopped = ctx.shutdown.stop_tasks();
    info!(
        pid = %ctx.process,
        connections = ctx.registry.count(),
        stopped_tasks = stopped,
        "shutdown started, serving existing clients until they leave"
    );

    let outcome = ctx.shutdown.drain(&ctx.registry, ctx.drain).await;
    ctx.bridge.close().await;
    info!(pid = %ctx.process, ?outcome, "final exit");
    exit.exit(0);
    Some(outcome)
}

/// Wait for SIGINT or SIGTERM and name the one received.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}

/// Run [`run_shutdown`] on the first termination signal; later signals are
/// logged and ignored.
pub fn spawn_signal_listener(ctx: Arc<ServerContext>, exit: Arc<dyn ProcessExit>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match wait_for_signal().await {
                Ok(signal) => {
                    info!(signal, pid = %ctx.process, "termination signal received");
                    let ctx = Arc::clone(&ctx);
                    let exit = Arc::clone(&exit);
                    let _ = tokio::spawn(async move {
                        let _ = run_shutdown(&ctx, exit.as_ref()).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to listen for termination signals");
                    break;
                }
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::websocket::connection::ClientConnection;
    use beacon_bus::MemoryBroker;
    use beacon_core::{ConnectionId, ProcessId};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingExit {
        calls: AtomicUsize,
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) {
            assert_eq!(code, 0);
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn drain_config() -> DrainConfig {
        DrainConfig {
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }

    async fn settle(abort: &tokio::task::AbortHandle) {
        for _ in 0..16 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    fn attach(registry: &ConnectionRegistry, id: &str) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(4);
        let _ = registry.register(Arc::new(ClientConnection::new(ConnectionId::from(id), tx)));
        rx
    }

    fn context(broker: Arc<MemoryBroker>) -> ServerContext {
        let config = ServerConfig {
            drain: drain_config(),
            ..ServerConfig::default()
        };
        ServerContext::new(ProcessId::from(5), broker, &config)
    }

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn trigger_flips_once() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(coord.trigger());
        assert!(!coord.trigger());
        assert!(!coord.trigger());
        assert!(coord.is_shutting_down());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn trigger_aborts_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let abort = handle.abort_handle();
        coord.track(handle);
        assert_eq!(coord.stop_tasks(), 1);
        settle(&abort).await;
        assert!(abort.is_finished());
        assert_eq!(coord.stop_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_with_no_connections_returns_immediately() {
        let coord = ShutdownCoordinator::new();
        let registry = ConnectionRegistry::new();
        let started = Instant::now();
        assert_eq!(coord.drain(&registry, drain_config()).await, DrainOutcome::Drained);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_observes_late_disconnect() {
        let coord = ShutdownCoordinator::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let _rx = attach(&registry, "slow");

        let leaver = Arc::clone(&registry);
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = leaver.unregister(&ConnectionId::from("slow"));
        });

        let started = Instant::now();
        assert_eq!(coord.drain(&registry, drain_config()).await, DrainOutcome::Drained);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < drain_config().timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_with_stuck_client() {
        let coord = ShutdownCoordinator::new();
        let registry = ConnectionRegistry::new();
        let _rx = attach(&registry, "stuck");

        let started = Instant::now();
        let outcome = coord.drain(&registry, drain_config()).await;
        assert_eq!(outcome, DrainOutcome::TimedOut { remaining: 1 });
        let waited = started.elapsed();
        assert!(waited >= drain_config().timeout);
        assert!(waited < drain_config().timeout + Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_closes_bridge_and_exits_once() {
        let broker = Arc::new(MemoryBroker::new());
        let ctx = context(Arc::clone(&broker));
        let exit = RecordingExit::default();

        assert_eq!(run_shutdown(&ctx, &exit).await, Some(DrainOutcome::Drained));
        assert_eq!(run_shutdown(&ctx, &exit).await, None);

        assert_eq!(exit.calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.close_calls(), 1);
        assert!(ctx.bridge.is_closed());
        assert!(ctx.shutdown.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_triggers_drain_once() {
        let broker = Arc::new(MemoryBroker::new());
        let ctx = Arc::new(context(Arc::clone(&broker)));
        let _rx = attach(&ctx.registry, "c");
        let exit = Arc::new(RecordingExit::default());

        let first = {
            let (ctx, exit) = (Arc::clone(&ctx), Arc::clone(&exit));
            tokio::spawn(async move { run_shutdown(&ctx, exit.as_ref()).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(run_shutdown(&ctx, exit.as_ref()).await, None);

        let _ = ctx.registry.unregister(&ConnectionId::from("c"));
        assert_eq!(first.await.unwrap(), Some(DrainOutcome::Drained));
        assert_eq!(exit.calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_stops_tracked_tasks() {
        let ctx = context(Arc::new(MemoryBroker::new()));
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let abort = handle.abort_handle();
        ctx.shutdown.track(handle);

        let _ = run_shutdown(&ctx, &RecordingExit::default()).await;
        settle(&abort).await;
        assert!(abort.is_finished());
    }
}
