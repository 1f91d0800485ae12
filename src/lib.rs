//! BIP37 bloom filter and partial Merkle tree core for an SPV client.
//!
//! This crate provides the two pieces of filtering logic a lightweight
//! client needs to ask full peers for only the transactions it cares
//! about:
//!
//! - [`util::bloom::BloomFilter`]: a probabilistic membership filter over
//!   txids, output script push-data, and spent outpoints.
//! - [`merkle::partial_tree::PartialMerkleTree`]: the depth-first encoding
//!   a full peer uses to prove which transactions in a block matched that
//!   filter, without shipping the whole block.
//!
//! Block-header persistence, peer-to-peer framing beyond the three
//! messages in [`network::message_filter`], and the transaction/script
//! data model itself are treated as external collaborators; [`tx`] is a
//! minimal read-only stand-in for the latter, sufficient to drive
//! [`util::bloom::BloomFilter::is_relevant`]/`update`.
//!
//! # Example
//!
//! ```rust
//! use bip37_filter::util::bloom::{BloomFilter, UpdateFlags};
//! use bip37_filter::hash::double_sha256;
//!
//! let mut filter = BloomFilter::new(3, 0.01, 0, UpdateFlags::All);
//! filter.insert(b"some output script push-data");
//! assert!(filter.contains(b"some output script push-data"));
//!
//! let txid = double_sha256(b"a transaction");
//! assert!(!filter.contains_hash(&txid));
//! ```

pub mod consensus;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod murmur3;
pub mod network;
pub mod tx;
pub mod util;

pub use error::{BloomError, MerkleBlockError};
pub use hash::{double_sha256, Sha256dHash};
pub use merkle::{ParsedPartialMerkleTree, PartialMerkleTree};
pub use util::bloom::{BloomFilter, UpdateFlags};
