//! Lock-gated periodic notification.
//!
//! Every worker runs a notifier; each tick they all race for the same
//! expiring lock and only the winner publishes. The lock TTL is shorter than
//! the period, so a winner that dies mid-period never blocks the next tick.

use std::sync::Arc;
use std::time::Duration;

use beacon_bus::DistributedLock;
use beacon_core::{BroadcastMessage, ProcessId};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::PERIODIC_BROADCASTS_TOTAL;
use crate::websocket::bridge::BusBridge;

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// This worker held the lock and published.
    Broadcast,
    /// Another worker holds the lock, or the broker was unreachable.
    Skipped,
}

/// Periodic "still running" broadcaster for one worker.
pub struct PeriodicNotifier {
    origin: ProcessId,
    bridge: Arc<BusBridge>,
    lock: DistributedLock,
    interval: Duration,
}

impl PeriodicNotifier {
    /// Create a notifier ticking every `interval`.
    pub fn new(
        origin: ProcessId,
        bridge: Arc<BusBridge>,
        lock: DistributedLock,
        interval: Duration,
    ) -> Self {
        Self {
            origin,
            bridge,
            lock,
            interval,
        }
    }

    /// Try the lock once and publish if it was won.
    pub async fn tick(&self) -> TickOutcome {
        if !self.lock.try_acquire().await {
            debug!(pid = %self.origin, "periodic lock not acquired, skipping tick");
            return TickOutcome::Skipped;
        }
        let delivery = self.bridge.publish(&BroadcastMessage::periodic(self.origin)).await;
        counter!(PERIODIC_BROADCASTS_TOTAL).increment(1);
        debug!(pid = %self.origin, ?delivery, "periodic notification published");
        TickOutcome::Broadcast
    }

    /// Sleep-then-tick until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            pid = %self.origin,
            interval_secs = self.interval.as_secs(),
            lock_key = self.lock.key(),
            "periodic notifier started"
        );
        while !token.is_cancelled() {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            let _ = self.tick().await;
        }
        info!(pid = %self.origin, "periodic notifier stopped");
    }

    /// Run on a background task.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::ConnectionRegistry;
    use beacon_bus::{Broker, MemoryBroker};
    use beacon_core::ConnectionId;
    use tokio::sync::mpsc;

    const INTERVAL: Duration = Duration::from_secs(10);
    const TTL: Duration = Duration::from_secs(9);

    struct Worker {
        notifier: PeriodicNotifier,
        rx: mpsc::Receiver<Arc<str>>,
    }

    fn worker(pid: u32, broker: &MemoryBroker) -> Worker {
        let broker: Arc<dyn Broker> = Arc::new(broker.peer());
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel(16);
        let _ = registry.register(Arc::new(ClientConnection::new(ConnectionId::new(), tx)));
        let bridge = Arc::new(BusBridge::new(Arc::clone(&broker), "chan", registry));
        let lock = DistributedLock::new(broker, "lock", TTL, pid.to_string());
        Worker {
            notifier: PeriodicNotifier::new(ProcessId::from(pid), bridge, lock, INTERVAL),
            rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn racing_workers_broadcast_once_per_window() {
        let hub = MemoryBroker::new();
        let a = worker(1, &hub);
        let b = worker(2, &hub);

        let (ra, rb) = tokio::join!(a.notifier.tick(), b.notifier.tick());
        let winners = [ra, rb]
            .iter()
            .filter(|o| **o == TickOutcome::Broadcast)
            .count();
        assert_eq!(winners, 1);

        tokio::time::advance(INTERVAL).await;
        let (ra, rb) = tokio::join!(a.notifier.tick(), b.notifier.tick());
        let winners = [ra, rb]
            .iter()
            .filter(|o| **o == TickOutcome::Broadcast)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn winner_publishes_periodic_text() {
        let hub = MemoryBroker::new();
        let mut w = worker(77, &hub);
        assert_eq!(w.notifier.tick().await, TickOutcome::Broadcast);
        let frame = w.rx.try_recv().unwrap();
        assert!(frame.starts_with("[notification] Real-time notification"));
        assert!(frame.contains("worker 77"));
    }

    #[tokio::test]
    async fn broker_outage_skips_tick() {
        let hub = MemoryBroker::new();
        hub.fail_locks(true);
        let mut w = worker(1, &hub);
        assert_eq!(w.notifier.tick().await, TickOutcome::Skipped);
        assert!(w.rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_after_each_interval() {
        let hub = MemoryBroker::new();
        let mut w = worker(3, &hub);
        let token = CancellationToken::new();
        let handle = w.notifier.spawn(token.clone());

        // nothing before the first period
        tokio::time::sleep(INTERVAL / 2).await;
        assert!(w.rx.try_recv().is_err());

        tokio::time::sleep(INTERVAL).await;
        assert!(w.rx.try_recv().is_ok());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let hub = MemoryBroker::new();
        let w = worker(3, &hub);
        let token = CancellationToken::new();
        let handle = w.notifier.spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        let started = tokio::time::Instant::now();
        handle.await.unwrap();
        assert!(started.elapsed() < INTERVAL);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_ticks() {
        let hub = MemoryBroker::new();
        let mut w = worker(3, &hub);
        let token = CancellationToken::new();
        token.cancel();
        w.notifier.run(token).await;
        assert!(w.rx.try_recv().is_err());
    }
}
