//! Chain-context capability consumed by the audit pipeline.
//!
//! Every state-transition call receives the context explicitly. The audit
//! oracle uses it to look at a finalized block other than the current one,
//! which is the only source of entropy in the pipeline.

use crate::config::AuditParams;
use crate::error::{Error, Result};
use crate::merkle::Hash32;
use crate::session::BlockHeight;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// Read-only view of a finalized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Height of the block.
    pub height: BlockHeight,
    /// Hash of the block.
    pub block_hash: Hash32,
}

/// Deterministic access to chain state from inside a state transition.
pub trait ChainContext {
    /// Height of the block currently being applied.
    fn current_height(&self) -> BlockHeight;

    /// Point-in-time view at `height`.
    ///
    /// # Errors
    ///
    /// Returns `FutureContextUnavailable` if `height` is not finalized or not retained.
    fn context_at(&self, height: BlockHeight) -> Result<BlockContext>;

    /// Governance parameters in force at the current height.
    fn audit_params(&self) -> AuditParams;
}

/// In-memory chain with deterministic block hashes.
///
/// Used for development networks, the CLI simulation and tests.
#[derive(Debug, Clone)]
pub struct InMemoryChain {
    params: AuditParams,
    seed: Hash32,
    height: BlockHeight,
    hashes: BTreeMap<BlockHeight, Hash32>,
    pruned_before: BlockHeight,
}

impl InMemoryChain {
    /// Create a chain holding only the genesis block at height 1.
    #[must_use]
    pub fn new(params: AuditParams, seed: &[u8]) -> Self {
        let seed: Hash32 = Sha256::digest(seed).into();
        let mut chain = Self {
            params,
            seed,
            height: 0,
            hashes: BTreeMap::new(),
            pruned_before: 0,
        };
        chain.advance(1);
        chain
    }

    fn next_hash(&self) -> Hash32 {
        let prev = self.hashes.get(&self.height).copied().unwrap_or(self.seed);
        let mut h = Sha256::new();
        h.update(b"relay-audit/block");
        h.update(self.seed);
        h.update(prev);
        h.update((self.height + 1).to_be_bytes());
        h.finalize().into()
    }

    /// Produce `blocks` new blocks.
    pub fn advance(&mut self, blocks: u64) {
        for _ in 0..blocks {
            let hash = self.next_hash();
            self.height += 1;
            self.hashes.insert(self.height, hash);
        }
        debug!("Chain advanced to height {}", self.height);
    }

    /// Produce blocks until `height` is reached. No-op if already past it.
    pub fn advance_to(&mut self, height: BlockHeight) {
        if height > self.height {
            self.advance(height - self.height);
        }
    }

    /// Override the hash of an already produced block.
    pub fn set_block_hash(&mut self, height: BlockHeight, hash: Hash32) {
        if height >= 1 && height <= self.height {
            self.hashes.insert(height, hash);
        }
    }

    /// Forget every block below `height`, as a pruning node would.
    pub fn prune_before(&mut self, height: BlockHeight) {
        self.pruned_before = height;
        self.hashes.retain(|h, _| *h >= height);
    }

    /// Replace the governance parameters.
    pub fn set_params(&mut self, params: AuditParams) {
        self.params = params;
    }
}

impl ChainContext for InMemoryChain {
    fn current_height(&self) -> BlockHeight {
        self.height
    }

    fn context_at(&self, height: BlockHeight) -> Result<BlockContext> {
        if height > self.height {
            return Err(Error::FutureContextUnavailable {
                height,
                reason: format!("not finalized (chain at {})", self.height),
            });
        }
        if height < self.pruned_before {
            return Err(Error::FutureContextUnavailable {
                height,
                reason: format!("pruned (retained from {})", self.pruned_before),
            });
        }
        self.hashes
            .get(&height)
            .map(|hash| BlockContext {
                height,
                block_hash: *hash,
            })
            .ok_or_else(|| Error::FutureContextUnavailable {
                height,
                reason: "no such block".to_string(),
            })
    }

    fn audit_params(&self) -> AuditParams {
        self.params
    }
}
