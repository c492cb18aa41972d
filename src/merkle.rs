//! Index-addressable Merkle commitments over an ordered evidence sequence.
//!
//! Leaves and interior nodes are hashed with SHA-256 under distinct one-byte
//! domain prefixes. The tree is built bottom-up by pairing adjacent nodes.
//! When a level has an odd number of nodes the last one is carried up
//! unchanged, unpaired. The same rule drives proof construction and
//! verification, so the shape of the tree is a pure function of the leaf
//! count:
//!
//! ```text
//!            root
//!          /      \
//!       n01        c        <- c carried up unpaired
//!      /   \       |
//!     a     b      c
//! ```
//!
//! Carrying instead of duplicating keeps `[a, b, c]` and `[a, b, c, c]`
//! distinct, so a claimant cannot inflate a count by repeating its last leaf.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 32-byte SHA-256 digest.
pub type Hash32 = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Upper bound on proof length for any `u64` leaf count.
pub const MAX_PROOF_DEPTH: usize = 64;

/// Hash a serialized leaf.
#[must_use]
pub fn leaf_hash(data: &[u8]) -> Hash32 {
    let mut h = Sha256::new();
    h.update([LEAF_PREFIX]);
    h.update(data);
    h.finalize().into()
}

/// Hash two child nodes into their parent.
#[must_use]
pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut h = Sha256::new();
    h.update([NODE_PREFIX]);
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Root hash of an evidence sequence together with its leaf count.
///
/// The count cannot be recovered from the hash, and verification needs it
/// to reconstruct the tree shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot {
    /// Root hash.
    pub hash: Hash32,
    /// Number of leaves under the root.
    pub count: u64,
}

impl MerkleRoot {
    /// Hex-encoded root hash.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Side of the path node on which a sibling sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is the left child; the running hash is on the right.
    Left,
    /// Sibling is the right child; the running hash is on the left.
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofNode {
    /// Sibling hash at this level.
    pub hash: Hash32,
    /// Which side the sibling is on.
    pub side: Side,
}

/// Inclusion proof for one leaf, ordered from the leaf level up.
///
/// Levels at which the path node was carried up unpaired contribute no step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the proved leaf.
    pub leaf_index: u64,
    /// Sibling chain from the leaf level to just below the root.
    pub siblings: Vec<ProofNode>,
}

/// A fully materialized Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds only the root.
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Build a tree over already-hashed leaves.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if `leaves` is empty.
    pub fn from_leaves(leaves: Vec<Hash32>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::InvalidClaimParameters(
                "cannot commit to an empty evidence sequence".to_string(),
            ));
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last() {
            if level.len() <= 1 {
                break;
            }
            let next = next_level(level);
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> u64 {
        self.levels.first().map_or(0, |l| l.len() as u64)
    }

    /// Root of the tree.
    #[must_use]
    pub fn root(&self) -> MerkleRoot {
        let hash = self
            .levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_default();
        MerkleRoot {
            hash,
            count: self.leaf_count(),
        }
    }

    /// Build the inclusion proof for the leaf at `index`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if `index` is out of range.
    pub fn proof(&self, index: u64) -> Result<MerkleProof> {
        let count = self.leaf_count();
        if index >= count {
            return Err(Error::InvalidClaimParameters(format!(
                "leaf index {index} out of range for {count} leaves"
            )));
        }

        let mut siblings = Vec::new();
        let mut pos = usize::try_from(index)
            .map_err(|_| Error::InvalidClaimParameters(format!("leaf index {index} too large")))?;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = pos ^ 1;
            if let Some(hash) = level.get(sibling) {
                let side = if pos % 2 == 0 { Side::Right } else { Side::Left };
                siblings.push(ProofNode { hash: *hash, side });
            }
            pos /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            siblings,
        })
    }
}

fn next_level(level: &[Hash32]) -> Vec<Hash32> {
    level
        .chunks(2)
        .filter_map(|pair| match pair {
            [left, right] => Some(node_hash(left, right)),
            [single] => Some(*single),
            _ => None,
        })
        .collect()
}

/// Root over already-hashed leaves.
///
/// # Errors
///
/// Returns `InvalidClaimParameters` if `leaves` is empty.
pub fn build_root(leaves: &[Hash32]) -> Result<MerkleRoot> {
    Ok(MerkleTree::from_leaves(leaves.to_vec())?.root())
}

/// Inclusion proof for `index` over already-hashed leaves.
///
/// # Errors
///
/// Returns `InvalidClaimParameters` if `leaves` is empty or `index` is out of range.
pub fn build_proof(leaves: &[Hash32], index: u64) -> Result<MerkleProof> {
    MerkleTree::from_leaves(leaves.to_vec())?.proof(index)
}

/// Number of sibling steps a proof for `index` in a tree of `total` leaves carries.
#[must_use]
pub fn proof_len(index: u64, total: u64) -> usize {
    let mut pos = index;
    let mut width = total;
    let mut len = 0;
    while width > 1 {
        if pos % 2 == 1 || pos + 1 < width {
            len += 1;
        }
        pos /= 2;
        width = width.div_ceil(2);
    }
    len
}

/// Recompute the root from `leaf` and `proof` and compare it with `root`.
///
/// `index` is the position the caller requires the proof to be for; a proof
/// that is structurally valid for a different position is rejected.
///
/// # Errors
///
/// Returns `InvalidMerkleProof` describing the first check that failed.
pub fn check_proof(
    leaf: &Hash32,
    proof: &MerkleProof,
    root: &Hash32,
    total: u64,
    index: u64,
) -> Result<()> {
    if total == 0 {
        return Err(Error::InvalidMerkleProof("tree has no leaves".to_string()));
    }
    if index >= total {
        return Err(Error::InvalidMerkleProof(format!(
            "index {index} out of range for {total} leaves"
        )));
    }
    if proof.leaf_index != index {
        return Err(Error::InvalidMerkleProof(format!(
            "proof is for leaf {} but leaf {index} was required",
            proof.leaf_index
        )));
    }
    let expected_len = proof_len(index, total);
    if proof.siblings.len() != expected_len || expected_len > MAX_PROOF_DEPTH {
        return Err(Error::InvalidMerkleProof(format!(
            "proof has {} siblings, expected {expected_len}",
            proof.siblings.len()
        )));
    }

    let mut hash = *leaf;
    let mut pos = index;
    let mut width = total;
    let mut steps = proof.siblings.iter();

    while width > 1 {
        let expected_side = if pos % 2 == 1 {
            Some(Side::Left)
        } else if pos + 1 < width {
            Some(Side::Right)
        } else {
            None
        };

        if let Some(side) = expected_side {
            let Some(step) = steps.next() else {
                return Err(Error::InvalidMerkleProof("proof too short".to_string()));
            };
            if step.side != side {
                return Err(Error::InvalidMerkleProof(format!(
                    "sibling on the wrong side at width {width}"
                )));
            }
            hash = match side {
                Side::Left => node_hash(&step.hash, &hash),
                Side::Right => node_hash(&hash, &step.hash),
            };
        }

        pos /= 2;
        width = width.div_ceil(2);
    }

    if hash == *root {
        Ok(())
    } else {
        Err(Error::InvalidMerkleProof(format!(
            "recomputed root {} does not match committed root {}",
            hex::encode(hash),
            hex::encode(root)
        )))
    }
}

/// Boolean form of [`check_proof`].
#[must_use]
pub fn verify(leaf: &Hash32, proof: &MerkleProof, root: &Hash32, total: u64, index: u64) -> bool {
    check_proof(leaf, proof, root, total, index).is_ok()
}
