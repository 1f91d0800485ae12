//! Partial Merkle tree construction and reconstruction (spec.md §4.2).

pub mod partial_tree;

pub use partial_tree::{ParsedPartialMerkleTree, PartialMerkleTree};
