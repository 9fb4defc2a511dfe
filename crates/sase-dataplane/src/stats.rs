//! Stage Statistics
//!
//! Lock-free counters updated once per batch.

use sase_classify::BatchOutcome;
use sase_common::AtomicCounter;

/// Per-stage counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct StageStats {
    /// Batches processed
    pub batches: AtomicCounter,
    /// Packets processed
    pub packets: AtomicCounter,
    /// Packets that matched a rule
    pub hits: AtomicCounter,
    /// Packets routed to the default gate
    pub misses: AtomicCounter,
    /// Packets routed to the drop gate
    pub dropped: AtomicCounter,
}

impl StageStats {
    /// Record one batch
    #[inline(always)]
    pub fn record_batch(&self, outcome: BatchOutcome, dropped: usize) {
        self.batches.inc();
        self.packets.add((outcome.hits + outcome.misses) as u64);
        self.hits.add(outcome.hits as u64);
        self.misses.add(outcome.misses as u64);
        self.dropped.add(dropped as u64);
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> StageStatsSnapshot {
        StageStatsSnapshot {
            batches: self.batches.get(),
            packets: self.packets.get(),
            hits: self.hits.get(),
            misses: self.misses.get(),
            dropped: self.dropped.get(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStatsSnapshot {
    /// Batches processed
    pub batches: u64,
    /// Packets processed
    pub packets: u64,
    /// Matched packets
    pub hits: u64,
    /// Unmatched packets
    pub misses: u64,
    /// Dropped packets
    pub dropped: u64,
}

impl StageStatsSnapshot {
    /// Fraction of packets that matched a rule
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Mean packets per batch
    pub fn avg_batch(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        self.packets as f64 / self.batches as f64
    }
}
