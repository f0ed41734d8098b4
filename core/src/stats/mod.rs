//! Reader and importer counters.
//!
//! A [`ReaderStats`] is shared by a reader session (cache effectiveness, decode latency) and the
//! import lane (completed and failed runs). Snapshots serialise for diagnostics dumps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::CacheState;

/// Decode latencies kept for percentile estimates.
const LATENCY_WINDOW: usize = 240;

/// Ring of the most recent decode latencies.
#[derive(Debug, Default)]
struct LatencyWindow {
    recent: VecDeque<Duration>,
    limit: usize,
}

impl LatencyWindow {
    fn with_limit(limit: usize) -> Self {
        Self { recent: VecDeque::with_capacity(limit), limit }
    }

    fn record(&mut self, latency: Duration) {
        while self.recent.len() >= self.limit.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(latency);
    }

    /// Nearest-rank percentile in milliseconds; zero while empty.
    fn percentile_ms(&self, quantile: f32) -> f32 {
        let mut ordered: Vec<Duration> = self.recent.iter().copied().collect();
        if ordered.is_empty() {
            return 0.0;
        }
        let rank = (quantile.clamp(0.0, 1.0) * (ordered.len() - 1) as f32).round() as usize;
        let (_, value, _) = ordered.select_nth_unstable(rank);
        value.as_secs_f32() * 1_000.0
    }
}

#[derive(Debug)]
struct StatsInner {
    started_at: Instant,
    decode_latency: LatencyWindow,
    cache_requests: u64,
    cache_hits: u64,
    evictions: u64,
    cache: Option<CacheState>,
    imports_completed: u64,
    imports_failed: u64,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            decode_latency: LatencyWindow::with_limit(LATENCY_WINDOW),
            cache_requests: 0,
            cache_hits: 0,
            evictions: 0,
            cache: None,
            imports_completed: 0,
            imports_failed: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReaderStats {
    inner: Mutex<StatsInner>,
}

impl ReaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decode(&self, duration: Duration) {
        self.inner.lock().decode_latency.record(duration);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let mut guard = self.inner.lock();
        guard.cache_requests = guard.cache_requests.saturating_add(1);
        if hit {
            guard.cache_hits = guard.cache_hits.saturating_add(1);
        }
    }

    pub fn record_evictions(&self, count: usize) {
        let mut guard = self.inner.lock();
        guard.evictions = guard.evictions.saturating_add(count as u64);
    }

    pub fn update_cache_usage(&self, state: CacheState) {
        self.inner.lock().cache = Some(state);
    }

    pub fn record_import(&self, succeeded: bool) {
        let mut guard = self.inner.lock();
        if succeeded {
            guard.imports_completed = guard.imports_completed.saturating_add(1);
        } else {
            guard.imports_failed = guard.imports_failed.saturating_add(1);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let guard = self.inner.lock();
        let cache = guard.cache;
        let cache_hit_ratio = guard.cache_hits as f32 / guard.cache_requests.max(1) as f32;

        StatsSnapshot {
            uptime_ms: guard.started_at.elapsed().as_millis() as u64,
            decode_time_ms_p50: guard.decode_latency.percentile_ms(0.50),
            decode_time_ms_p95: guard.decode_latency.percentile_ms(0.95),
            cache_requests: guard.cache_requests,
            cache_hits: guard.cache_hits,
            cache_hit_ratio,
            cache_evictions: guard.evictions,
            cache_entries: cache.map_or(0, |state| state.entries),
            cache_bytes_used: cache.map_or(0, |state| state.resident_bytes as u64),
            cache_bytes_capacity: cache.map_or(0, |state| state.max_bytes as u64),
            imports_completed: guard.imports_completed,
            imports_failed: guard.imports_failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub uptime_ms: u64,
    pub decode_time_ms_p50: f32,
    pub decode_time_ms_p95: f32,
    pub cache_requests: u64,
    pub cache_hits: u64,
    pub cache_hit_ratio: f32,
    pub cache_evictions: u64,
    pub cache_entries: usize,
    pub cache_bytes_used: u64,
    pub cache_bytes_capacity: u64,
    pub imports_completed: u64,
    pub imports_failed: u64,
}
