//! Mining statistics carried across cycles.

use std::fmt;
use std::time::Duration;

/// Cumulative counters for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Total hashes computed.
    pub total_hashes: u64,
    /// Time spent inside nonce searches.
    pub search_time: Duration,
    /// Templates fetched successfully.
    pub templates: u64,
    /// Solved blocks, whatever the node then said about them.
    pub blocks_found: u32,
    pub blocks_accepted: u32,
    pub blocks_rejected: u32,
    /// Solved blocks whose submission failed before the node answered.
    pub submit_failures: u32,
    /// Cycles abandoned on a recoverable error.
    pub failed_cycles: u64,
    /// Height of the last template seen.
    pub last_height: Option<u32>,
}

impl MiningStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_search(&mut self, hashes: u64, elapsed: Duration) {
        self.total_hashes += hashes;
        self.search_time += elapsed;
    }

    /// Record the height of a fresh template. Returns the previous height
    /// when it changed.
    pub fn observe_height(&mut self, height: u32) -> Option<Option<u32>> {
        let previous = self.last_height.replace(height);
        if previous == Some(height) {
            None
        } else {
            Some(previous)
        }
    }

    /// Average hashes per second over all searches.
    pub fn hash_rate(&self) -> f64 {
        let secs = self.search_time.as_secs_f64();
        if secs > 0.0 {
            self.total_hashes as f64 / secs
        } else {
            0.0
        }
    }

    /// Format hash rate for display.
    pub fn format_hash_rate(&self) -> String {
        format_hash_rate(self.hash_rate())
    }
}

impl fmt::Display for MiningStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hashes at {}, {} templates, {} found ({} accepted, {} rejected, {} not submitted)",
            self.total_hashes,
            self.format_hash_rate(),
            self.templates,
            self.blocks_found,
            self.blocks_accepted,
            self.blocks_rejected,
            self.submit_failures
        )
    }
}

pub fn format_hash_rate(hash_rate: f64) -> String {
    if hash_rate >= 1_000_000_000.0 {
        format!("{:.2} GH/s", hash_rate / 1_000_000_000.0)
    } else if hash_rate >= 1_000_000.0 {
        format!("{:.2} MH/s", hash_rate / 1_000_000.0)
    } else if hash_rate >= 1_000.0 {
        format!("{:.2} KH/s", hash_rate / 1_000.0)
    } else {
        format!("{:.2} H/s", hash_rate)
    }
}
