//! Metrics collection and monitoring
//!
//! Lightweight in-memory metrics for the Gamestash backend: counters for
//! captured events and API requests, plus duration tracking for rollup runs.
//! Exposed as a JSON snapshot at `GET /metrics` for scraping; nothing here
//! persists across process restarts.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::debug;

/// Core metrics collection service
#[derive(Clone)]
pub struct MetricsService {
    counters: Arc<RwLock<HashMap<String, AtomicU64>>>,
    durations: Arc<RwLock<HashMap<String, Vec<Duration>>>>,
    start_time: Instant,
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            durations: Arc::new(RwLock::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }

    /// Increments a named counter metric by the specified value
    pub async fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(value, Ordering::Relaxed);

        debug!("Incremented counter '{}' by {}", name, value);
    }

    /// Records a duration measurement, keeping a bounded history per name
    pub async fn record_duration(&self, name: &str, duration: Duration) {
        let mut durations = self.durations.write().await;
        let entries = durations.entry(name.to_string()).or_insert_with(Vec::new);

        // Keep only the last 1000 measurements to prevent memory growth
        if entries.len() >= 1000 {
            entries.remove(0);
        }

        entries.push(duration);
    }

    /// Records one captured event by kind (view, like, unlike, sale)
    pub async fn record_event(&self, kind: &str) {
        self.increment_counter(&format!("events_{}_total", kind), 1).await;
    }

    /// Records the outcome of a rollup run
    pub async fn record_rollup_run(&self, duration: Duration, processed: u64, failed: u64) {
        self.increment_counter("rollup_runs_total", 1).await;
        self.increment_counter("rollup_products_processed", processed).await;
        if failed > 0 {
            self.increment_counter("rollup_products_failed", failed).await;
        }
        self.record_duration("rollup_run_duration", duration).await;
    }

    /// Creates a snapshot of all current metrics for monitoring systems
    pub async fn get_metrics_snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().await;
        let durations = self.durations.read().await;

        let mut counter_values = HashMap::new();
        for (name, counter) in counters.iter() {
            counter_values.insert(name.clone(), counter.load(Ordering::Relaxed));
        }

        let mut duration_stats = HashMap::new();
        for (name, entries) in durations.iter() {
            if !entries.is_empty() {
                duration_stats.insert(name.clone(), DurationStats::from_samples(entries));
            }
        }

        MetricsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            counters: counter_values,
            durations: duration_stats,
        }
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all system metrics
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub counters: HashMap<String, u64>,
    pub durations: HashMap<String, DurationStats>,
}

/// Statistical summary of duration measurements
#[derive(Debug, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DurationStats {
    fn from_samples(samples: &[Duration]) -> Self {
        let count = samples.len();
        let total_ms: f64 = samples.iter().map(|d| d.as_millis() as f64).sum();
        let min_ms = samples
            .iter()
            .map(|d| d.as_millis() as f64)
            .fold(f64::MAX, f64::min);
        let max_ms = samples
            .iter()
            .map(|d| d.as_millis() as f64)
            .fold(0.0, f64::max);

        Self {
            count,
            avg_ms: total_ms / count as f64,
            min_ms,
            max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests basic counter and duration collection
    #[tokio::test]
    async fn test_metrics_collection() {
        let metrics = MetricsService::new();

        metrics.increment_counter("test_counter", 5).await;
        metrics.increment_counter("test_counter", 3).await;

        metrics.record_duration("test_duration", Duration::from_millis(100)).await;
        metrics.record_duration("test_duration", Duration::from_millis(200)).await;

        let snapshot = metrics.get_metrics_snapshot().await;

        assert_eq!(snapshot.counters.get("test_counter"), Some(&8));

        let stats = snapshot.durations.get("test_duration").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.avg_ms, 150.0);
        assert_eq!(stats.min_ms, 100.0);
        assert_eq!(stats.max_ms, 200.0);
    }

    /// Tests the event and rollup recording helpers
    #[tokio::test]
    async fn test_event_and_rollup_recording() {
        let metrics = MetricsService::new();

        metrics.record_event("view").await;
        metrics.record_event("view").await;
        metrics.record_event("sale").await;
        metrics
            .record_rollup_run(Duration::from_millis(40), 12, 1)
            .await;

        let snapshot = metrics.get_metrics_snapshot().await;
        assert_eq!(snapshot.counters.get("events_view_total"), Some(&2));
        assert_eq!(snapshot.counters.get("events_sale_total"), Some(&1));
        assert_eq!(snapshot.counters.get("rollup_runs_total"), Some(&1));
        assert_eq!(snapshot.counters.get("rollup_products_processed"), Some(&12));
        assert_eq!(snapshot.counters.get("rollup_products_failed"), Some(&1));
    }
}
