// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-process metrics for migrations and streamed joins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct EngineMetrics {
    migrations_started: AtomicU64,
    migrations_failed: AtomicU64,
    batches: AtomicU64,
    rows_migrated: AtomicU64,
    batch_rows_max: AtomicU64,
    timeouts: AtomicU64,
    streamer_executions: AtomicU64,
}

static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

fn metrics() -> &'static EngineMetrics {
    ENGINE_METRICS.get_or_init(EngineMetrics::default)
}

pub fn record_migration_started() {
    metrics().migrations_started.fetch_add(1, Ordering::Relaxed);
}

pub fn record_migration_failed() {
    metrics().migrations_failed.fetch_add(1, Ordering::Relaxed);
}

/// Counts one executed target batch of `rows` rows.
pub fn record_batch(rows: u64) {
    let metrics = metrics();
    metrics.batches.fetch_add(1, Ordering::Relaxed);
    metrics.rows_migrated.fetch_add(rows, Ordering::Relaxed);

    let mut current = metrics.batch_rows_max.load(Ordering::Relaxed);
    while rows > current {
        match metrics.batch_rows_max.compare_exchange(
            current,
            rows,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

pub fn record_timeout() {
    metrics().timeouts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_streamer_execution() {
    metrics().streamer_executions.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct EngineMetricsSnapshot {
    pub migrations_started: u64,
    pub migrations_failed: u64,
    pub batches: u64,
    pub rows_migrated: u64,
    pub avg_batch_rows: Option<f64>,
    pub max_batch_rows: Option<u64>,
    pub timeouts: u64,
    pub streamer_executions: u64,
}

pub fn snapshot() -> EngineMetricsSnapshot {
    let metrics = metrics();
    let batches = metrics.batches.load(Ordering::Relaxed);
    let rows = metrics.rows_migrated.load(Ordering::Relaxed);
    let max_rows = metrics.batch_rows_max.load(Ordering::Relaxed);

    let avg_batch_rows = if batches > 0 {
        Some(rows as f64 / batches as f64)
    } else {
        None
    };

    EngineMetricsSnapshot {
        migrations_started: metrics.migrations_started.load(Ordering::Relaxed),
        migrations_failed: metrics.migrations_failed.load(Ordering::Relaxed),
        batches,
        rows_migrated: rows,
        avg_batch_rows,
        max_batch_rows: if batches > 0 { Some(max_rows) } else { None },
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        streamer_executions: metrics.streamer_executions.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_counters_only_grow() {
        let before = snapshot();
        record_batch(3);
        record_batch(7);
        let after = snapshot();
        assert!(after.batches >= before.batches + 2);
        assert!(after.rows_migrated >= before.rows_migrated + 10);
        assert!(after.max_batch_rows.unwrap_or(0) >= 7);
    }
}
