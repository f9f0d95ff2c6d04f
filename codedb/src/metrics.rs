use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters for one find pass, shared by every worker
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    chunks_dispatched: Arc<AtomicU64>,
    chunks_flushed: Arc<AtomicU64>,
    bytes_decoded: Arc<AtomicU64>,
    matches_emitted: Arc<AtomicU64>,
    free_slot_waits: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self {
            chunks_dispatched: Arc::new(AtomicU64::new(0)),
            chunks_flushed: Arc::new(AtomicU64::new(0)),
            bytes_decoded: Arc::new(AtomicU64::new(0)),
            matches_emitted: Arc::new(AtomicU64::new(0)),
            free_slot_waits: Arc::new(AtomicU64::new(0)),
            peak_in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a dispatch along with the number of slots now outside the free list
    pub fn record_dispatch(&self, in_flight: usize) {
        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.peak_in_flight
            .fetch_max(in_flight as u64, Ordering::Relaxed);
    }

    pub fn record_flush(&self, chunks: u64) {
        let total = self.chunks_flushed.fetch_add(chunks, Ordering::Relaxed) + chunks;
        debug!("Flushed {} chunks, {} total", chunks, total);
    }

    pub fn record_decode(&self, bytes: u64) {
        self.bytes_decoded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_matches(&self, count: u64) {
        self.matches_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a dispatcher blocking because every slot was in use
    pub fn record_wait(&self) {
        self.free_slot_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> PassStats {
        PassStats {
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            chunks_flushed: self.chunks_flushed.load(Ordering::Relaxed),
            bytes_decoded: self.bytes_decoded.load(Ordering::Relaxed),
            matches_emitted: self.matches_emitted.load(Ordering::Relaxed),
            free_slot_waits: self.free_slot_waits.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Find pass stats:\n\
             Chunks dispatched/flushed: {}/{}\n\
             Bytes decoded: {}\n\
             Matches: {}\n\
             Free-slot waits: {}\n\
             Peak slots in flight: {}",
            stats.chunks_dispatched,
            stats.chunks_flushed,
            stats.bytes_decoded,
            stats.matches_emitted,
            stats.free_slot_waits,
            stats.peak_in_flight
        );
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`SearchMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub chunks_dispatched: u64,
    pub chunks_flushed: u64,
    pub bytes_decoded: u64,
    pub matches_emitted: u64,
    pub free_slot_waits: u64,
    pub peak_in_flight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_tracks_peak() {
        let metrics = SearchMetrics::new();
        metrics.record_dispatch(1);
        metrics.record_dispatch(3);
        metrics.record_dispatch(2);

        let stats = metrics.get_stats();
        assert_eq!(stats.chunks_dispatched, 3);
        assert_eq!(stats.peak_in_flight, 3);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = SearchMetrics::new();
        let worker = metrics.clone();
        worker.record_decode(100);
        worker.record_matches(2);
        metrics.record_decode(50);
        metrics.record_flush(4);
        metrics.record_wait();

        let stats = metrics.get_stats();
        assert_eq!(stats.bytes_decoded, 150);
        assert_eq!(stats.matches_emitted, 2);
        assert_eq!(stats.chunks_flushed, 4);
        assert_eq!(stats.free_slot_waits, 1);
    }
}
