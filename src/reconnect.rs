use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::health::DbGate;
use crate::config::RECONNECT_INTERVAL_SECS;
use crate::db::{initialize, CounterStore};

/// Background task that brings the database up and opens the gate.
///
/// Tries once immediately, then every 30 seconds until an attempt succeeds or
/// the token is cancelled. Once the gate is open the task ends; there is no
/// transition back to disconnected.
pub struct Reconnector {
    store: Arc<dyn CounterStore>,
    gate: Arc<DbGate>,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl Reconnector {
    pub fn new(store: Arc<dyn CounterStore>, gate: Arc<DbGate>, cancel: CancellationToken) -> Self {
        Self {
            store,
            gate,
            retry_interval: Duration::from_secs(RECONNECT_INTERVAL_SECS),
            cancel,
        }
    }

    pub async fn run(self) {
        info!("Initializing database");
        match self.attempt_unless_cancelled().await {
            Some(false) => {}
            Some(true) | None => return,
        }

        let mut ticker = interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume immediate first tick

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Database reconnect loop cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            info!("Retrying database connection");
            match self.attempt_unless_cancelled().await {
                Some(true) => {
                    info!("Database reconnected");
                    return;
                }
                None => return,
                // A slow attempt must not eat into the wait before the next one.
                Some(false) => ticker.reset(),
            }
        }
    }

    /// `None` if cancelled before the attempt finished.
    async fn attempt_unless_cancelled(&self) -> Option<bool> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Database initialization cancelled");
                None
            }
            up = self.attempt() => Some(up),
        }
    }

    /// One connect + schema sync. Opens the gate on success.
    async fn attempt(&self) -> bool {
        match initialize(self.store.as_ref()).await {
            Ok(()) => {
                self.gate.set_connected();
                info!("Database initialized");
                true
            }
            Err(e) => {
                error!("Database initialization failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn reconnector(store: &Arc<MemoryStore>, gate: &Arc<DbGate>, cancel: CancellationToken) -> Reconnector {
        let store: Arc<dyn CounterStore> = Arc::clone(store) as Arc<dyn CounterStore>;
        Reconnector::new(store, Arc::clone(gate), cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_opens_gate() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(DbGate::new());

        reconnector(&store, &gate, CancellationToken::new()).run().await;

        assert!(gate.is_connected());
        assert_eq!(store.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_gate_after_k_failures_then_stops() {
        let k = 4;
        let store = Arc::new(MemoryStore::failing_connects(k));
        let gate = Arc::new(DbGate::new());

        let started = tokio::time::Instant::now();
        reconnector(&store, &gate, CancellationToken::new()).run().await;

        assert!(gate.is_connected());
        assert_eq!(store.connect_attempts(), k + 1);
        let expected = Duration::from_secs(RECONNECT_INTERVAL_SECS * u64::from(k));
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_secs(1),
            "elapsed={elapsed:?}"
        );

        tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS * 10)).await;
        assert_eq!(store.connect_attempts(), k + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_stays_closed_while_failing() {
        let store = Arc::new(MemoryStore::unreachable());
        let gate = Arc::new(DbGate::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(reconnector(&store, &gate, cancel.clone()).run());

        // Attempts at t=0, 30s, 60s.
        tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS * 2 + 5)).await;
        assert!(!gate.is_connected());
        assert_eq!(store.connect_attempts(), 3);

        cancel.cancel();
        task.await.unwrap();
        assert!(!gate.is_connected());
        assert_eq!(store.connect_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_attempt() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(DbGate::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        reconnector(&store, &gate, cancel).run().await;

        assert!(!gate.is_connected());
        assert_eq!(store.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_keep_full_interval_between_them() {
        let attempt_secs = 90;
        let store = Arc::new(MemoryStore::unreachable().with_connect_delay(Duration::from_secs(attempt_secs)));
        let gate = Arc::new(DbGate::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(reconnector(&store, &gate, cancel.clone()).run());

        // Starts at 0, 120, 240, 360, 480; the next would be 600.
        tokio::time::sleep(Duration::from_secs(590)).await;
        cancel.cancel();
        task.await.unwrap();

        let starts = store.connect_starts();
        assert_eq!(starts.len(), 5, "starts={starts:?}");
        let min_gap = Duration::from_secs(attempt_secs + RECONNECT_INTERVAL_SECS);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= min_gap, "gap={gap:?} starts={starts:?}");
        }
        assert!(!gate.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_slow_attempt() {
        let store = Arc::new(MemoryStore::unreachable().with_connect_delay(Duration::from_secs(90)));
        let gate = Arc::new(DbGate::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(reconnector(&store, &gate, cancel.clone()).run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let cancelled_at = tokio::time::Instant::now();
        cancel.cancel();
        task.await.unwrap();

        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert_eq!(store.connect_attempts(), 1);
    }
}
