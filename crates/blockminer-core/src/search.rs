//! Nonce search over a fixed header.
//!
//! The header is serialized once into an 80-byte buffer and only the last
//! four bytes are rewritten per attempt. The parallel path splits the range
//! into chunks handled on a rayon pool; the lowest winning nonce is reported
//! and chunks above a known winner stop early.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use rayon::ThreadPool;
use thiserror::Error;

use crate::block::BlockHeader;
use crate::difficulty::Target;
use crate::hash::{double_sha256, Hash256};
use crate::network::BLOCK_HEADER_SIZE;

/// One past the largest nonce.
const NONCE_SPACE: u64 = 1 << 32;

/// Nonces per parallel work unit.
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 16;

/// How often a worker looks at the shared stop flag.
const STOP_CHECK_INTERVAL: u64 = 1024;

/// A hashing failure for one candidate header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hash fault at nonce {nonce}")]
pub struct HashFault {
    pub nonce: u32,
}

/// Hashes a serialized header.
pub trait HeaderHasher: Sync {
    fn hash_header(&self, header: &[u8; BLOCK_HEADER_SIZE]) -> Result<Hash256, HashFault>;
}

/// Bitcoin's proof-of-work hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSha256;

impl HeaderHasher for DoubleSha256 {
    #[inline]
    fn hash_header(&self, header: &[u8; BLOCK_HEADER_SIZE]) -> Result<Hash256, HashFault> {
        Ok(double_sha256(header))
    }
}

/// Result of a search pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// The winning nonce, if any.
    pub nonce: Option<u32>,
    /// The winning hash, in wire order.
    pub hash: Option<Hash256>,
    /// Nonces examined, faulted ones included.
    pub hashes: u64,
    /// Nonces skipped because hashing failed.
    pub faults: u64,
}

impl SearchOutcome {
    pub fn found(&self) -> bool {
        self.nonce.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NonceSearch<H = DoubleSha256> {
    hasher: H,
    chunk_size: u64,
}

impl NonceSearch<DoubleSha256> {
    pub fn new() -> Self {
        Self::with_hasher(DoubleSha256)
    }
}

impl Default for NonceSearch<DoubleSha256> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HeaderHasher> NonceSearch<H> {
    pub fn with_hasher(hasher: H) -> Self {
        NonceSearch {
            hasher,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the parallel work unit size. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Try `count` nonces upward from `start` on the calling thread.
    ///
    /// The range is clipped at the top of the 32-bit nonce space. The
    /// header's own nonce is ignored.
    pub fn search(&self, header: &BlockHeader, target: &Target, start: u32, count: u64) -> SearchOutcome {
        let (start, end) = clip_range(start, count);
        let buffer = header.serialize();
        let hashes = AtomicU64::new(0);
        let faults = AtomicU64::new(0);
        let stop = AtomicU64::new(u64::MAX);

        let found = self.scan(buffer, target, start, end, &stop, &hashes, &faults);
        outcome(found, &hashes, &faults)
    }

    /// Same contract as [`NonceSearch::search`], spread over `pool`.
    pub fn search_parallel(
        &self,
        pool: &ThreadPool,
        header: &BlockHeader,
        target: &Target,
        start: u32,
        count: u64,
    ) -> SearchOutcome {
        let (start, end) = clip_range(start, count);
        let buffer = header.serialize();
        let hashes = AtomicU64::new(0);
        let faults = AtomicU64::new(0);
        let stop = AtomicU64::new(u64::MAX);

        let chunk_size = self.chunk_size;
        let chunks: Vec<(u64, u64)> = (start..end)
            .step_by(chunk_size as usize)
            .map(|chunk_start| (chunk_start, (chunk_start + chunk_size).min(end)))
            .collect();

        let found = pool.install(|| {
            chunks.into_par_iter().find_map_first(|(chunk_start, chunk_end)| {
                self.scan(buffer, target, chunk_start, chunk_end, &stop, &hashes, &faults)
            })
        });
        outcome(found, &hashes, &faults)
    }

    /// Scan `[start, end)` in a private copy of the header.
    ///
    /// Publishes a win through `stop` and abandons the scan once a lower
    /// winner has been published elsewhere.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        mut buffer: [u8; BLOCK_HEADER_SIZE],
        target: &Target,
        start: u64,
        end: u64,
        stop: &AtomicU64,
        hashes: &AtomicU64,
        faults: &AtomicU64,
    ) -> Option<(u32, Hash256)> {
        let mut examined = 0u64;
        let mut faulted = 0u64;
        let mut found = None;

        for nonce in start..end {
            if examined % STOP_CHECK_INTERVAL == 0 && stop.load(Ordering::Relaxed) < start {
                break;
            }
            let nonce = nonce as u32;
            buffer[76..80].copy_from_slice(&nonce.to_le_bytes());
            examined += 1;

            match self.hasher.hash_header(&buffer) {
                Ok(hash) if target.is_met_by(&hash) => {
                    stop.fetch_min(nonce as u64, Ordering::Relaxed);
                    found = Some((nonce, hash));
                    break;
                }
                Ok(_) => {}
                Err(_) => faulted += 1,
            }
        }

        hashes.fetch_add(examined, Ordering::Relaxed);
        faults.fetch_add(faulted, Ordering::Relaxed);
        found
    }
}

fn clip_range(start: u32, count: u64) -> (u64, u64) {
    let start = start as u64;
    (start, start.saturating_add(count).min(NONCE_SPACE))
}

fn outcome(found: Option<(u32, Hash256)>, hashes: &AtomicU64, faults: &AtomicU64) -> SearchOutcome {
    SearchOutcome {
        nonce: found.map(|(nonce, _)| nonce),
        hash: found.map(|(_, hash)| hash),
        hashes: hashes.load(Ordering::Relaxed),
        faults: faults.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_to_display_hex;

    /// First three nonces meeting 0x1f00ffff for `fixture_header`.
    const WINNING_NONCES: [u32; 3] = [6797, 78400, 163466];
    const FIRST_WINNING_HASH: &str =
        "0000c2274c350ceded74b3663b4f67ee46f148f3ab0f6f43d71a274a5707e430";

    fn fixture_header() -> BlockHeader {
        BlockHeader {
            version: 0x20000000,
            prev_block_hash: [0u8; 32],
            merkle_root: [0x11u8; 32],
            timestamp: 1_700_000_000,
            bits: 0x1f00ffff,
            nonce: 0,
        }
    }

    fn fixture_target() -> Target {
        Target::from_compact(0x1f00ffff).unwrap()
    }

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    /// Fails on one nonce, hashes normally otherwise.
    struct FaultAt(u32);

    impl HeaderHasher for FaultAt {
        fn hash_header(&self, header: &[u8; BLOCK_HEADER_SIZE]) -> Result<Hash256, HashFault> {
            let nonce = u32::from_le_bytes([header[76], header[77], header[78], header[79]]);
            if nonce == self.0 {
                return Err(HashFault { nonce });
            }
            Ok(double_sha256(header))
        }
    }

    #[test]
    fn test_finds_known_nonce() {
        let result = NonceSearch::new().search(&fixture_header(), &fixture_target(), 0, 100_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[0]));
        assert_eq!(hash_to_display_hex(&result.hash.unwrap()), FIRST_WINNING_HASH);
        assert_eq!(result.hashes, WINNING_NONCES[0] as u64 + 1);
        assert_eq!(result.faults, 0);

        let mut solved = fixture_header();
        solved.nonce = result.nonce.unwrap();
        assert!(fixture_target().is_met_by(&solved.hash()));
    }

    #[test]
    fn test_search_starts_at_offset() {
        let start = WINNING_NONCES[0] + 1;
        let result = NonceSearch::new().search(&fixture_header(), &fixture_target(), start, 100_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[1]));
    }

    #[test]
    fn test_zero_target_examines_whole_range() {
        let result = NonceSearch::new().search(&fixture_header(), &Target::ZERO, 0, 5_000);
        assert!(!result.found());
        assert_eq!(result.hash, None);
        assert_eq!(result.hashes, 5_000);
    }

    #[test]
    fn test_range_clipped_at_nonce_space() {
        let result = NonceSearch::new().search(&fixture_header(), &Target::ZERO, u32::MAX - 9, 1_000);
        assert_eq!(result.hashes, 10);
    }

    #[test]
    fn test_hash_fault_skips_nonce() {
        let search = NonceSearch::with_hasher(FaultAt(WINNING_NONCES[0]));
        let result = search.search(&fixture_header(), &fixture_target(), 0, 100_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[1]));
        assert_eq!(result.faults, 1);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let pool = pool(4);
        let search = NonceSearch::new().with_chunk_size(1_000);
        let result = search.search_parallel(&pool, &fixture_header(), &fixture_target(), 0, 200_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[0]));
        assert!(result.hashes > WINNING_NONCES[0] as u64);
    }

    #[test]
    fn test_parallel_prefers_lowest_nonce() {
        // Start just past the first winner so two later winners share the range.
        let pool = pool(4);
        let search = NonceSearch::new().with_chunk_size(4_096);
        let start = WINNING_NONCES[0] + 1;
        let result = search.search_parallel(&pool, &fixture_header(), &fixture_target(), start, 200_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[1]));
    }

    #[test]
    fn test_parallel_zero_target_examines_whole_range() {
        let pool = pool(3);
        let search = NonceSearch::new().with_chunk_size(777);
        let result = search.search_parallel(&pool, &fixture_header(), &Target::ZERO, 10, 10_000);
        assert!(!result.found());
        assert_eq!(result.hashes, 10_000);
    }

    #[test]
    fn test_parallel_hash_fault_skips_nonce() {
        let pool = pool(2);
        let search = NonceSearch::with_hasher(FaultAt(WINNING_NONCES[0])).with_chunk_size(2_048);
        let result = search.search_parallel(&pool, &fixture_header(), &fixture_target(), 0, 100_000);
        assert_eq!(result.nonce, Some(WINNING_NONCES[1]));
        assert!(result.faults >= 1);
    }
}
