//! Lightweight in-memory reconciliation metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct SyncMetrics {
    events_received: AtomicU64,
    events_reconciled: AtomicU64,
    events_retracted: AtomicU64,
    events_dropped: AtomicU64,
    events_failed: AtomicU64,
    retries: AtomicU64,
    columns_upserted: AtomicU64,
    columns_failed: AtomicU64,
    stale_deleted: AtomicU64,
    stale_delete_failures: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static SYNC_METRICS: OnceLock<SyncMetrics> = OnceLock::new();

fn metrics() -> &'static SyncMetrics {
    SYNC_METRICS.get_or_init(SyncMetrics::default)
}

/// How a notification ended, for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Reconciled,
    Retracted,
    Dropped,
    Failed,
}

pub fn record_received() {
    metrics().events_received.fetch_add(1, Ordering::Relaxed);
}

pub fn record_event(result: EventResult, duration_ms: f64) {
    let metrics = metrics();
    let counter = match result {
        EventResult::Reconciled => &metrics.events_reconciled,
        EventResult::Retracted => &metrics.events_retracted,
        EventResult::Dropped => &metrics.events_dropped,
        EventResult::Failed => &metrics.events_failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);

    let duration_ms = duration_ms.max(0.0) as u64;
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);

    let mut current = metrics.duration_max_ms.load(Ordering::Relaxed);
    while duration_ms > current {
        match metrics.duration_max_ms.compare_exchange(
            current,
            duration_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

pub fn record_retry() {
    metrics().retries.fetch_add(1, Ordering::Relaxed);
}

pub fn record_columns(upserted: usize, failed: usize) {
    let metrics = metrics();
    metrics
        .columns_upserted
        .fetch_add(upserted as u64, Ordering::Relaxed);
    metrics
        .columns_failed
        .fetch_add(failed as u64, Ordering::Relaxed);
}

pub fn record_stale(deleted: usize, failures: usize) {
    let metrics = metrics();
    metrics
        .stale_deleted
        .fetch_add(deleted as u64, Ordering::Relaxed);
    metrics
        .stale_delete_failures
        .fetch_add(failures as u64, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct SyncMetricsSnapshot {
    pub events_received: u64,
    pub events_reconciled: u64,
    pub events_retracted: u64,
    pub events_dropped: u64,
    pub events_failed: u64,
    pub retries: u64,
    pub columns_upserted: u64,
    pub columns_failed: u64,
    pub stale_deleted: u64,
    pub stale_delete_failures: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> SyncMetricsSnapshot {
    let metrics = metrics();
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

    let events_reconciled = load(&metrics.events_reconciled);
    let events_retracted = load(&metrics.events_retracted);
    let events_dropped = load(&metrics.events_dropped);
    let events_failed = load(&metrics.events_failed);
    let finished = events_reconciled + events_retracted + events_dropped + events_failed;
    let duration_total = load(&metrics.duration_total_ms);
    let max_ms = load(&metrics.duration_max_ms);

    let avg_ms = if finished > 0 {
        Some(duration_total as f64 / finished as f64)
    } else {
        None
    };

    SyncMetricsSnapshot {
        events_received: load(&metrics.events_received),
        events_reconciled,
        events_retracted,
        events_dropped,
        events_failed,
        retries: load(&metrics.retries),
        columns_upserted: load(&metrics.columns_upserted),
        columns_failed: load(&metrics.columns_failed),
        stale_deleted: load(&metrics.stale_deleted),
        stale_delete_failures: load(&metrics.stale_delete_failures),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        // Other tests record concurrently, so only compare deltas.
        let initial = snapshot();

        record_received();
        record_event(EventResult::Reconciled, 12.0);
        let s1 = snapshot();
        assert!(s1.events_received >= initial.events_received + 1);
        assert!(s1.events_reconciled >= initial.events_reconciled + 1);

        record_event(EventResult::Failed, 3.0);
        let s2 = snapshot();
        assert!(s2.events_failed >= s1.events_failed + 1);

        record_columns(3, 1);
        record_stale(2, 1);
        record_retry();
        let s3 = snapshot();
        assert!(s3.columns_upserted >= initial.columns_upserted + 3);
        assert!(s3.columns_failed >= initial.columns_failed + 1);
        assert!(s3.stale_deleted >= initial.stale_deleted + 2);
        assert!(s3.stale_delete_failures >= initial.stale_delete_failures + 1);
        assert!(s3.retries >= initial.retries + 1);

        record_event(EventResult::Dropped, 99999.0);
        assert!(snapshot().max_ms.unwrap() >= 99999);
    }
}
