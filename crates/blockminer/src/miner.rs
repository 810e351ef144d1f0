//! The mining loop: fetch a template, assemble a block, search nonces,
//! submit, and start over with a fresh template.

use std::thread;
use std::time::{Duration, Instant};

use blockminer_core::hash::count_leading_zeros;
use blockminer_core::merkle::{compute_witness_commitment, WITNESS_COMMITMENT_HEADER};
use blockminer_core::script::OP_RETURN;
use blockminer_core::{
    format_difficulty, hash_to_display_hex, transactions_merkle_root, Block, BlockAssembler,
    BlockTemplate, CoinbaseBuilder, CoinbaseError, ExtraNonceSource, Hash256, NonceSearch,
    RewardAddress, Target,
};
use log::{debug, error, info, warn};
use rayon::ThreadPool;

use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::rpc::{NodeClient, SubmitOutcome};
use crate::state::MiningStats;

/// Where the loop is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    FetchingTemplate,
    Assembling,
    Searching,
    Submitting,
}

/// How one cycle ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No nonce in the range met the target.
    Exhausted { height: u32, hashes: u64 },
    Accepted { height: u32, hash: String },
    Rejected { height: u32, hash: String, reason: String },
}

/// A block ready for the nonce search.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: Block,
    pub target: Target,
    pub height: u32,
    /// Satoshis paid by the coinbase.
    pub reward: u64,
}

pub struct MiningLoop<N, S> {
    node: N,
    config: MinerConfig,
    reward_address: RewardAddress,
    extra_nonce: S,
    search: NonceSearch,
    /// Worker pool, only when more than one thread is configured.
    pool: Option<ThreadPool>,
    state: MinerState,
    stats: MiningStats,
}

impl<N: NodeClient, S: ExtraNonceSource> MiningLoop<N, S> {
    pub fn new(node: N, config: MinerConfig, extra_nonce: S) -> Result<Self> {
        let reward_address = RewardAddress::parse(&config.reward_address, config.network)
            .map_err(CoinbaseError::from)?;
        let pool = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("search-{}", i))
                .build()?;
            Some(pool)
        } else {
            None
        };

        Ok(MiningLoop {
            node,
            config,
            reward_address,
            extra_nonce,
            search: NonceSearch::new(),
            pool,
            state: MinerState::Idle,
            stats: MiningStats::new(),
        })
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn stats(&self) -> &MiningStats {
        &self.stats
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Mine until a fatal error, or until `max_cycles` cycles have run.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<()> {
        info!(
            "Mining on {} to {} ({}) with {} thread(s), {} nonces per template",
            self.config.network,
            self.reward_address,
            self.reward_address.kind,
            self.config.threads,
            self.config.nonces_per_template
        );

        let mut cycles = 0u64;
        while max_cycles.map_or(true, |max| cycles < max) {
            cycles += 1;
            match self.run_cycle() {
                Ok(outcome) => self.report(&outcome),
                Err(err) if err.is_fatal() => {
                    self.state = MinerState::Idle;
                    return Err(err);
                }
                Err(err) => {
                    self.stats.failed_cycles += 1;
                    match &err {
                        MinerError::Fetch(_) => {
                            warn!("{}; retrying in {} ms", err, self.config.retry_delay_ms)
                        }
                        MinerError::Submit(_) => {
                            error!("{}; fetching a new template", err);
                            info!("{}", self.stats);
                        }
                        _ => error!("Abandoning template: {}", err),
                    }
                    if self.config.retry_delay_ms > 0 {
                        thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
                    }
                }
            }
        }

        self.state = MinerState::Idle;
        Ok(())
    }

    /// One pass of fetch, assemble, search and (on success) submit.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.state = MinerState::FetchingTemplate;
        let template = self.node.get_template().map_err(MinerError::Fetch)?;
        self.stats.templates += 1;
        if let Some(previous) = self.stats.observe_height(template.height) {
            match previous {
                Some(previous) => info!("Height changed {} -> {}", previous, template.height),
                None => info!("Mining at height {}", template.height),
            }
        }

        self.state = MinerState::Assembling;
        let mut candidate = self.assemble(&template)?;

        self.state = MinerState::Searching;
        let header = &candidate.block.header;
        let count = self.config.nonces_per_template;
        let started = Instant::now();
        let result = match &self.pool {
            Some(pool) => self
                .search
                .search_parallel(pool, header, &candidate.target, 0, count),
            None => self.search.search(header, &candidate.target, 0, count),
        };
        self.stats.record_search(result.hashes, started.elapsed());
        if result.faults > 0 {
            warn!("Skipped {} nonces on hash faults", result.faults);
        }

        let nonce = match result.nonce {
            Some(nonce) => nonce,
            None => {
                return Ok(CycleOutcome::Exhausted {
                    height: candidate.height,
                    hashes: result.hashes,
                })
            }
        };

        candidate.block.header.nonce = nonce;
        let block_hash = candidate.block.hash();
        let hash = hash_to_display_hex(&block_hash);
        self.stats.blocks_found += 1;
        info!(
            "Found block {} at height {} (nonce {}, {} leading zero bits, reward {} sat)",
            hash,
            candidate.height,
            nonce,
            count_leading_zeros(&block_hash),
            candidate.reward
        );

        self.state = MinerState::Submitting;
        let reply = self.node.submit_block(&candidate.block);
        self.state = MinerState::FetchingTemplate;
        let outcome = match reply {
            Ok(SubmitOutcome::Accepted) => {
                self.stats.blocks_accepted += 1;
                CycleOutcome::Accepted {
                    height: candidate.height,
                    hash,
                }
            }
            Ok(SubmitOutcome::Rejected(reason)) => {
                self.stats.blocks_rejected += 1;
                CycleOutcome::Rejected {
                    height: candidate.height,
                    hash,
                    reason,
                }
            }
            Err(err) => {
                self.stats.submit_failures += 1;
                return Err(MinerError::Submit(err));
            }
        };
        Ok(outcome)
    }

    /// Build the coinbase, merkle root and header for `template`.
    ///
    /// The coinbase goes first, followed by the template transactions in
    /// the node's order. The nonce starts at zero.
    pub fn assemble(&mut self, template: &BlockTemplate) -> Result<Candidate> {
        let bits = template.bits()?;
        let target = Target::from_compact(bits)?;
        let transactions = template.decode_transactions()?;

        let mut builder = CoinbaseBuilder::new(self.config.network);
        if self.config.collect_fees {
            match template.coinbase_value {
                Some(value) => builder = builder.with_value(value),
                None => warn!("Template has no coinbasevalue, paying the bare subsidy"),
            }
        }
        if let Some(script_hex) = &template.default_witness_commitment {
            let commitment = parse_witness_commitment(script_hex)?;
            let computed = compute_witness_commitment(&transactions, builder.witness_reserved());
            if computed != commitment {
                warn!(
                    "Node witness commitment {} differs from computed {}",
                    hex::encode(commitment),
                    hex::encode(computed)
                );
            }
            builder = builder.with_witness_commitment(commitment);
        }

        let coinbase = builder.build(
            template.height,
            &self.config.reward_address,
            &self.config.message,
            &mut self.extra_nonce,
        )?;
        let reward = coinbase.value;

        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(coinbase.into_transaction());
        all.extend(transactions);
        let merkle_root = transactions_merkle_root(&all)?;

        let mut assembler = BlockAssembler::new();
        if let Some(version) = template.version {
            assembler = assembler.with_version(version);
        }
        if let Some(curtime) = template.curtime {
            assembler = assembler.with_timestamp(curtime);
        }
        let block = assembler.assemble(&template.previous_block_hash, merkle_root, bits, 0, all)?;

        debug!(
            "Template {}: bits {:08x}, target {}, difficulty {}, {} transactions, fees {:?}, merkle root {}",
            template.height,
            bits,
            target,
            format_difficulty(target.difficulty()),
            block.transactions.len(),
            template.total_fees(),
            hash_to_display_hex(&merkle_root)
        );

        Ok(Candidate {
            block,
            target,
            height: template.height,
            reward,
        })
    }

    fn report(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Exhausted { height, hashes } => {
                info!("No block at height {} after {} hashes, fetching a new template", height, hashes)
            }
            CycleOutcome::Accepted { height, hash } => {
                info!("Block {} at height {} accepted", hash, height)
            }
            CycleOutcome::Rejected { height, hash, reason } => {
                warn!("Block {} at height {} rejected: {}", hash, height, reason)
            }
        }
        info!("{}", self.stats);
    }
}

/// Pull the 32-byte commitment out of a witness commitment output script.
fn parse_witness_commitment(script_hex: &str) -> Result<Hash256> {
    let malformed = || MinerError::WitnessCommitment(script_hex.to_string());
    let script = hex::decode(script_hex).map_err(|_| malformed())?;
    match script.as_slice() {
        [OP_RETURN, 0x24, rest @ ..] if rest.len() == 36 && rest[..4] == WITNESS_COMMITMENT_HEADER => {
            let mut commitment = [0u8; 32];
            commitment.copy_from_slice(&rest[4..]);
            Ok(commitment)
        }
        _ => Err(malformed()),
    }
}
