//! Error taxonomy for the filtering core.
//!
//! Construction-invariant violations and wire-decode failures are kept as
//! two separate enums (one per structure) rather than a single grab-bag
//! error, per the taxonomy in the design notes: a bad `filterload` and a
//! malformed `merkleblock` are different failures with different
//! sub-reasons, and neither is retried here. Logging/peer-banning is left
//! to the caller.

use thiserror::Error;

/// Failures constructing or decoding a [`crate::util::bloom::BloomFilter`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BloomError {
    /// `filter_size` is outside BIP37's `1..=36000` byte range (zero is
    /// as invalid as too-large — spec.md §3's `1 <= filter_size` half of
    /// the invariant).
    #[error("bloom filter size out of range: {0} bytes (must be 1..=36000)")]
    FilterSizeOutOfRange(usize),

    /// `hash_funcs` exceeds the BIP37 cap of 50.
    #[error("too many hash functions: {0} (max 50)")]
    TooManyHashFuncs(u32),

    /// The `flags` byte did not match a known [`crate::util::bloom::UpdateFlags`] variant.
    #[error("unknown bloom filter update flag: {0}")]
    UnknownFlags(u8),

    /// Ran out of input while decoding a `filterload` payload.
    #[error("truncated bloom filter payload: {0}")]
    Io(String),
}

/// Failures decoding a [`crate::merkle::partial_tree::PartialMerkleTree`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleBlockError {
    /// `transaction_count` was zero.
    #[error("partial merkle tree claims zero transactions")]
    NoTransactions,

    /// The traversal needed a hash that wasn't there.
    #[error("ran out of hashes while reconstructing the tree")]
    HashUnderflow,

    /// Hashes remained unconsumed after the traversal finished.
    #[error("{0} hash(es) left over after reconstructing the tree")]
    HashOverflow(usize),

    /// More bits remained unconsumed than byte-alignment padding allows.
    #[error("{0} flag bit(s) left over beyond padding")]
    BitOverflow(usize),

    /// A non-zero bit appeared in the padding past `bits.len()`.
    #[error("non-zero padding bit in the final flag byte")]
    MalformedPadding,

    /// A node with a genuine right child reconstructed to the same hash as its left child.
    #[error("duplicate sibling hash at an internal node (possible CVE-2017-12842 attack)")]
    DuplicateSibling,

    /// The tree decoded cleanly, but its recomputed root doesn't match the
    /// block header's advertised Merkle root.
    #[error("merkle root mismatch: header said {expected}, reconstructed {actual}")]
    RootMismatch { expected: crate::hash::Sha256dHash, actual: crate::hash::Sha256dHash },

    /// Ran out of input decoding the wire payload.
    #[error("truncated partial merkle tree payload: {0}")]
    Io(String),
}
