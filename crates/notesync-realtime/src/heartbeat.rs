//! # Heartbeat Emitter
//!
//! Broadcasts a liveness message to every connection on a fixed period, so
//! clients can tell an idle connection from a dead one.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────┐  run()   ┌─────────┐  cancel   ┌─────────┐                  │
//! │   │ Idle │ ───────► │ Running │ ────────► │ Stopped │                  │
//! │   └──────┘          └────┬────┘           └─────────┘                  │
//! │                          │ ▲                                            │
//! │              every 5 s   │ │  send_to_all({"type":"heartbeat",...})    │
//! │                          ▼ │  failures logged, next tick proceeds      │
//! │                       (tick)                                            │
//! │                                                                         │
//! │  Cancellation is checked before each wait and raced against the wait, │
//! │  so shutdown completes within one period.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notesync_core::Notification;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fanout::FanOut;

/// Period between heartbeats.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle of the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle,
    Running,
    Stopped,
}

impl HeartbeatState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HeartbeatState::Idle,
            1 => HeartbeatState::Running,
            _ => HeartbeatState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            HeartbeatState::Idle => 0,
            HeartbeatState::Running => 1,
            HeartbeatState::Stopped => 2,
        }
    }
}

/// Periodic liveness broadcaster.
///
/// Clones share state; the loop runs at most once per emitter.
#[derive(Debug, Clone)]
pub struct HeartbeatEmitter {
    fanout: Arc<FanOut>,
    period: Duration,
    state: Arc<AtomicU8>,
    ticks: Arc<AtomicU64>,
}

impl HeartbeatEmitter {
    pub fn new(fanout: Arc<FanOut>, period: Duration) -> Self {
        HeartbeatEmitter {
            fanout,
            period,
            state: Arc::new(AtomicU8::new(HeartbeatState::Idle.as_u8())),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> HeartbeatState {
        HeartbeatState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Heartbeats broadcast so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs the loop on a background task.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let emitter = self.clone();
        tokio::spawn(async move { emitter.run(cancel).await })
    }

    /// Runs the loop until `cancel` fires.
    ///
    /// The first heartbeat goes out one period after start. Returns
    /// immediately if the emitter already ran.
    pub async fn run(&self, cancel: CancellationToken) {
        let started = self.state.compare_exchange(
            HeartbeatState::Idle.as_u8(),
            HeartbeatState::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if started.is_err() {
            warn!(state = ?self.state(), "Heartbeat emitter already started");
            return;
        }

        info!(period_secs = self.period.as_secs_f64(), "Heartbeat emitter started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.beat(&cancel).await;
        }

        self.state
            .store(HeartbeatState::Stopped.as_u8(), Ordering::Release);
        info!(ticks = self.ticks(), "Heartbeat emitter stopped");
    }

    async fn beat(&self, cancel: &CancellationToken) {
        let payload = match Notification::heartbeat(Utc::now()).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode heartbeat");
                return;
            }
        };

        let report = self.fanout.send_to_all_cancellable(&payload, cancel).await;
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        if report.failed > 0 {
            warn!(
                tick,
                failed = report.failed,
                delivered = report.delivered,
                "Heartbeat partially failed"
            );
        } else {
            debug!(tick, delivered = report.delivered, "Heartbeat sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;
    use crate::registry::ConnectionRegistry;
    use notesync_core::HeartbeatData;

    fn emitter_with_connection() -> (HeartbeatEmitter, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(FanOut::new(registry.clone(), Duration::from_secs(1)));
        (
            HeartbeatEmitter::new(fanout, DEFAULT_HEARTBEAT_PERIOD),
            registry,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_over_twelve_seconds() {
        let (emitter, registry) = emitter_with_connection();
        let (conn, mut rx) = ChannelConnection::pair(16);
        registry.register(Arc::new(conn), "u1", "a").await;

        let cancel = CancellationToken::new();
        let handle = emitter.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(emitter.state(), HeartbeatState::Running);

        let cancelled_at = Instant::now();
        cancel.cancel();
        handle.await.unwrap();
        assert!(cancelled_at.elapsed() < DEFAULT_HEARTBEAT_PERIOD);
        assert_eq!(emitter.state(), HeartbeatState::Stopped);

        let mut received = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            received.push(Notification::from_json(&raw).unwrap());
        }
        assert!((2..=3).contains(&received.len()), "got {}", received.len());
        assert_eq!(emitter.ticks(), received.len() as u64);
        assert!(received.iter().all(|msg| msg.is_heartbeat()));
        assert!(received[0].decode_data::<HeartbeatData>().unwrap().t > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_without_connections() {
        let (emitter, _registry) = emitter_with_connection();
        let cancel = CancellationToken::new();
        let handle = emitter.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(emitter.ticks(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_stops_immediately() {
        let (emitter, _registry) = emitter_with_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();

        emitter.run(cancel).await;
        assert_eq!(emitter.state(), HeartbeatState::Stopped);
        assert_eq!(emitter.ticks(), 0);
    }

    #[tokio::test]
    async fn test_runs_at_most_once() {
        let (emitter, _registry) = emitter_with_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();
        emitter.run(cancel.clone()).await;

        // Second run is a no-op and keeps the Stopped state
        emitter.run(CancellationToken::new()).await;
        assert_eq!(emitter.state(), HeartbeatState::Stopped);
    }
}
