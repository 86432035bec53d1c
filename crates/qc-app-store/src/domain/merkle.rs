//! # State Commitment Tree
//!
//! Binary merkle tree over the sorted live key/value pairs of one version.
//!
//! ## Invariants
//!
//! - **Power of Two**: leaves are padded to the next power of two with
//!   `SENTINEL_HASH`.
//! - **Deterministic Hashing**: the same set of pairs always yields the same
//!   root, independent of the order the writes happened in.
//! - **Domain Separation**: leaves are hashed with a `0x00` tag and inner
//!   nodes with `0x01`, so a leaf can never be passed off as an inner node.
//!
//! The commitment handed to consensus binds the root to its version:
//! `H(version_be || root)`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::Hash;

use super::entities::{CommitId, KvPair};

/// Padding leaf.
pub const SENTINEL_HASH: Hash = [0u8; 32];

const LEAF_TAG: u8 = 0x00;
const INNER_TAG: u8 = 0x01;

/// Hash of a single key/value leaf.
pub fn leaf_hash(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_TAG]);
    hasher.update((key.len() as u32).to_be_bytes());
    hasher.update(key);
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value);
    hasher.finalize().into()
}

/// Commitment hash for a version given its tree root.
pub fn commitment_hash(version: u64, root: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(version.to_be_bytes());
    hasher.update(root);
    hasher.finalize().into()
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([INNER_TAG]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Merkle tree over the state of one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTree {
    nodes: Vec<Hash>,
    leaf_count: usize,
    padded_leaf_count: usize,
    root: Hash,
}

impl StateTree {
    /// Build a tree from pairs already sorted by key.
    pub fn from_pairs(pairs: &[KvPair]) -> Self {
        Self::build(
            pairs
                .iter()
                .map(|pair| leaf_hash(&pair.key, &pair.value))
                .collect(),
        )
    }

    /// Build a tree from leaf hashes.
    ///
    /// 1. Pad leaves to a power of two (minimum 2) with `SENTINEL_HASH`
    /// 2. Each parent = H(0x01 || left || right), built bottom-up
    /// 3. Root sits at index 0
    pub fn build(leaves: Vec<Hash>) -> Self {
        let leaf_count = leaves.len();

        if leaf_count == 0 {
            return Self {
                nodes: vec![SENTINEL_HASH],
                leaf_count: 0,
                padded_leaf_count: 0,
                root: SENTINEL_HASH,
            };
        }

        let padded_leaf_count = leaf_count.next_power_of_two().max(2);
        let mut padded = leaves;
        padded.resize(padded_leaf_count, SENTINEL_HASH);

        // Parent at index i has children at 2i+1 and 2i+2
        let leaf_start = padded_leaf_count - 1;
        let mut nodes = vec![SENTINEL_HASH; 2 * padded_leaf_count - 1];
        nodes[leaf_start..].copy_from_slice(&padded);
        for i in (0..leaf_start).rev() {
            nodes[i] = hash_pair(&nodes[2 * i + 1], &nodes[2 * i + 2]);
        }

        let root = nodes[0];
        Self {
            nodes,
            leaf_count,
            padded_leaf_count,
            root,
        }
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Inclusion proof for the leaf at `index`, or `None` when out of range.
    pub fn generate_proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut current = self.padded_leaf_count - 1 + index;
        let leaf_hash = self.nodes[current];
        let mut path = Vec::new();

        while current > 0 {
            let (sibling, position) = if current % 2 == 0 {
                (current - 1, SiblingPosition::Left)
            } else {
                (current + 1, SiblingPosition::Right)
            };
            path.push(ProofNode {
                hash: self.nodes[sibling],
                position,
            });
            current = (current - 1) / 2;
        }

        Some(MerkleProof {
            leaf_hash,
            index,
            root: self.root,
            path,
        })
    }
}

/// Inclusion proof of a key/value pair in a committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: Hash,
    /// Position of the pair in the sorted leaf list.
    pub index: usize,
    /// Tree root the path leads to.
    pub root: Hash,
    /// Sibling hashes from leaf to root.
    pub path: Vec<ProofNode>,
}

/// A single node in the proof path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: Hash,
    pub position: SiblingPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingPosition {
    Left,
    Right,
}

impl MerkleProof {
    /// Recompute the root from `leaf_hash` and the path.
    pub fn compute_root(&self) -> Hash {
        self.path.iter().fold(self.leaf_hash, |current, node| match node.position {
            SiblingPosition::Left => hash_pair(&node.hash, &current),
            SiblingPosition::Right => hash_pair(&current, &node.hash),
        })
    }

    /// Verify that `key = value` is part of the state committed as `commit`.
    pub fn verify(&self, key: &[u8], value: &[u8], commit: &CommitId) -> bool {
        leaf_hash(key, value) == self.leaf_hash
            && self.compute_root() == self.root
            && commitment_hash(commit.version, &self.root) == commit.hash
    }
}
