//! # Sync Metrics
//!
//! Counters and histograms for the sync subsystem, recorded through the
//! `metrics` facade. Whatever recorder the process installs (Prometheus in
//! `main`, a local one in tests) receives them.
//!
//! ```text
//! ┌──────────────────────────┬──────────────┬──────────────────────────────┐
//! │ name                     │ kind         │ recorded by                  │
//! ├──────────────────────────┼──────────────┼──────────────────────────────┤
//! │ sync.fetches             │ counter      │ every v1 fetch               │
//! │ sync.pushes              │ counter      │ every v1 push                │
//! │ sync.v2.fetches          │ counter      │ every v2 fetch               │
//! │ sync.v2.pushes           │ counter      │ every v2 push                │
//! │ sync.v2.fetch_duration   │ histogram ms │ v2 fetch only                │
//! │ sync.v2.push_duration    │ histogram ms │ v2 push only                 │
//! └──────────────────────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! Handles are resolved once at construction, so recording is a single
//! atomic operation on the recorder's side.
//!
//! ## Lifetime
//! The recorder owns the instruments. When the exporter is enabled, `main`
//! installs it once as the process-global recorder and it lives until the
//! process exits, so the instruments are released exactly once, at exit. `SyncMetrics` clones
//! only share handles; dropping them (the last one goes with the
//! `SyncService` in `RunningServer::shutdown`) never resets a value.

use ::metrics::{
    counter, describe_counter, describe_histogram, histogram, Counter, Histogram, Unit,
};

pub const FETCHES: &str = "sync.fetches";
pub const PUSHES: &str = "sync.pushes";
pub const V2_FETCHES: &str = "sync.v2.fetches";
pub const V2_PUSHES: &str = "sync.v2.pushes";
pub const V2_FETCH_DURATION: &str = "sync.v2.fetch_duration";
pub const V2_PUSH_DURATION: &str = "sync.v2.push_duration";

/// Sync operation instruments.
#[derive(Clone)]
pub struct SyncMetrics {
    fetches: Counter,
    pushes: Counter,
    v2_fetches: Counter,
    v2_pushes: Counter,
    v2_fetch_duration: Histogram,
    v2_push_duration: Histogram,
}

impl SyncMetrics {
    /// Describes and registers every instrument with the current recorder.
    pub fn new() -> Self {
        describe_counter!(FETCHES, Unit::Count, "v1 fetch operations");
        describe_counter!(PUSHES, Unit::Count, "v1 push operations");
        describe_counter!(V2_FETCHES, Unit::Count, "v2 fetch operations");
        describe_counter!(V2_PUSHES, Unit::Count, "v2 push operations");
        describe_histogram!(V2_FETCH_DURATION, Unit::Milliseconds, "v2 fetch duration");
        describe_histogram!(V2_PUSH_DURATION, Unit::Milliseconds, "v2 push duration");

        SyncMetrics {
            fetches: counter!(FETCHES),
            pushes: counter!(PUSHES),
            v2_fetches: counter!(V2_FETCHES),
            v2_pushes: counter!(V2_PUSHES),
            v2_fetch_duration: histogram!(V2_FETCH_DURATION),
            v2_push_duration: histogram!(V2_PUSH_DURATION),
        }
    }

    pub fn record_fetch(&self) {
        self.fetches.increment(1);
    }

    pub fn record_push(&self) {
        self.pushes.increment(1);
    }

    pub fn record_fetch_v2(&self) {
        self.v2_fetches.increment(1);
    }

    pub fn record_push_v2(&self) {
        self.v2_pushes.increment(1);
    }

    pub fn record_fetch_duration(&self, millis: f64) {
        self.v2_fetch_duration.record(millis);
    }

    pub fn record_push_duration(&self, millis: f64) {
        self.v2_push_duration.record(millis);
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Arc;

    fn line_value(rendered: &str, name: &str) -> Option<u64> {
        rendered
            .lines()
            .find(|line| {
                line.strip_prefix(name)
                    .map(|rest| rest.starts_with(' ') || rest.starts_with("_total "))
                    .unwrap_or(false)
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value as u64)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = Arc::new(::metrics::with_local_recorder(&recorder, SyncMetrics::new));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let metrics = metrics.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..250 {
                    metrics.record_push_v2();
                    metrics.record_fetch();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let rendered = handle.render();
        assert_eq!(line_value(&rendered, "sync_v2_pushes"), Some(2000));
        assert_eq!(line_value(&rendered, "sync_fetches"), Some(2000));
    }

    #[test]
    fn test_durations_are_recorded() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = ::metrics::with_local_recorder(&recorder, SyncMetrics::new);

        metrics.record_push_duration(12.0);
        metrics.record_push_duration(30.0);
        metrics.record_fetch_duration(4.0);

        let rendered = handle.render();
        assert_eq!(line_value(&rendered, "sync_v2_push_duration_count"), Some(2));
        assert_eq!(line_value(&rendered, "sync_v2_fetch_duration_count"), Some(1));
    }

    #[test]
    fn test_values_outlive_dropped_handles() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let metrics = ::metrics::with_local_recorder(&recorder, SyncMetrics::new);
        let clone = metrics.clone();
        metrics.record_fetch_v2();
        clone.record_fetch_v2();
        drop(metrics);
        drop(clone);

        // A second service built later reuses the same instruments
        let again = ::metrics::with_local_recorder(&recorder, SyncMetrics::new);
        again.record_fetch_v2();

        assert_eq!(line_value(&handle.render(), "sync_v2_fetches"), Some(3));
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        let metrics = SyncMetrics::new();
        metrics.record_fetch();
        metrics.record_push_duration(1.0);
    }
}
