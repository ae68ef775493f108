//! Counters for distance computations, queries and page accesses.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Collects runtime counters for an index.
///
/// Counters are atomic so that concurrent read-only queries can record
/// against a shared tree.
#[derive(Debug, Default)]
pub struct Statistics {
    distance_calcs: AtomicU64,
    knn_queries: AtomicU64,
    range_queries: AtomicU64,
    rknn_queries: AtomicU64,
    page_reads: AtomicU64,
    page_writes: AtomicU64,
}

/// Point-in-time copy of a [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub distance_calcs: u64,
    pub knn_queries: u64,
    pub range_queries: u64,
    pub rknn_queries: u64,
    pub page_reads: u64,
    pub page_writes: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_distance(&self) {
        self.distance_calcs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_knn_query(&self) {
        self.knn_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_range_query(&self) {
        self.range_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_rknn_query(&self) {
        self.rknn_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_page_read(&self) {
        self.page_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_page_write(&self) {
        self.page_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            distance_calcs: self.distance_calcs.load(Ordering::Relaxed),
            knn_queries: self.knn_queries.load(Ordering::Relaxed),
            range_queries: self.range_queries.load(Ordering::Relaxed),
            rknn_queries: self.rknn_queries.load(Ordering::Relaxed),
            page_reads: self.page_reads.load(Ordering::Relaxed),
            page_writes: self.page_writes.load(Ordering::Relaxed),
        }
    }

    /// Reset every counter to zero.
    pub fn clear(&self) {
        for counter in [
            &self.distance_calcs,
            &self.knn_queries,
            &self.range_queries,
            &self.rknn_queries,
            &self.page_reads,
            &self.page_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
