//! Partial Merkle tree: encodes a matched-txid subset of a block as a
//! depth-first `(bits, hashes)` pair, and reconstructs the pair back into
//! a Merkle root plus the matched txids.
//!
//! Grounded directly on `light-bitcoin`'s `merkle/src/lib.rs`
//! (`PartialMerkleTreeBuilder::build_branch`/`parse_branch`), translated
//! from its leaves-are-height-0 convention to spec.md's root-is-height-0
//! convention, from its `BitVec` flags to a plain `Vec<bool>`, and from
//! its five-variant `Error` to `MerkleBlockError`'s richer sub-reasons.

use std::io;

use bitcoin_hashes::Hash as _;

use crate::consensus::encode::{Decodable, Encodable, VarInt};
use crate::error::MerkleBlockError;

/// Not a BIP37/protocol limit — a decoder-side sanity cap so a malformed
/// `transaction_count` can't drive `hash_count`/`flag_byte_count` into
/// allocating gigabytes before a single wire byte past the header has
/// been read. Generous relative to any real block's transaction count.
const MAX_DECODE_TRANSACTIONS: usize = 1_000_000;
use crate::hash::{merkle_node_hash, Sha256dHash};

/// Computes `max_height = ceil(log2(n))`, with `n == 1` special-cased to 0
/// (spec.md §4.2).
fn max_height(transaction_count: u32) -> u32 {
    if transaction_count <= 1 {
        return 0;
    }
    let mut h = 0u32;
    while (1u64 << h) < transaction_count as u64 {
        h += 1;
    }
    h
}

/// `tree_width(n, h)`: the number of nodes at depth `h` from the root
/// (spec.md §4.2).
fn tree_width(transaction_count: u32, max_height: u32, height: u32) -> u32 {
    let shift = max_height - height;
    (((transaction_count as u64) + (1u64 << shift) - 1) >> shift) as u32
}

/// A partial Merkle tree as transmitted on the wire: the total
/// transaction count plus the depth-first `(bits, hashes)` pair
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMerkleTree {
    pub transaction_count: u32,
    pub hashes: Vec<Sha256dHash>,
    pub bits: Vec<bool>,
}

/// The result of reconstructing a [`PartialMerkleTree`]: the recomputed
/// Merkle root and the matched txids, in ascending transaction-index
/// order (spec.md §4.2, "Match extraction").
///
/// spec.md's data model also names a `tree` field (the reconstructed
/// binary tree of digests); this crate reconstructs that tree implicitly
/// via the recursive descent in `parse_branch` (its call stack *is* the
/// tree) rather than materializing it, since nothing observable depends
/// on inspecting intermediate nodes once the root and matches are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPartialMerkleTree {
    pub root: Sha256dHash,
    pub matches: Vec<(u32, Sha256dHash)>,
}

impl ParsedPartialMerkleTree {
    /// Matched txids only, ascending transaction-index order.
    pub fn matched_hashes(&self) -> Vec<Sha256dHash> {
        self.matches.iter().map(|(_, h)| *h).collect()
    }
}

impl PartialMerkleTree {
    /// Builds a partial Merkle tree from every transaction hash in a
    /// block plus a parallel match mask (spec.md §4.2, "Encoding").
    ///
    /// Panics if `tx_hashes.len() != matches.len()` or either is empty —
    /// both are programmer errors at the call site, not recoverable
    /// protocol-level conditions.
    pub fn build(tx_hashes: &[Sha256dHash], matches: &[bool]) -> Self {
        assert_eq!(tx_hashes.len(), matches.len(), "tx_hashes/matches length mismatch");
        assert!(!tx_hashes.is_empty(), "cannot build a partial tree for zero transactions");

        let transaction_count = tx_hashes.len() as u32;
        let top_height = max_height(transaction_count);
        let mut builder = Builder {
            transaction_count,
            max_height: top_height,
            all_hashes: tx_hashes,
            all_matches: matches,
            hashes: Vec::new(),
            bits: Vec::new(),
        };
        builder.build_branch(0, 0);

        log::debug!(
            "built partial merkle tree: {} txs, {} hashes, {} bits",
            transaction_count,
            builder.hashes.len(),
            builder.bits.len()
        );

        PartialMerkleTree { transaction_count, hashes: builder.hashes, bits: builder.bits }
    }

    /// Reconstructs the Merkle root and matched txids (spec.md §4.2,
    /// "Decoding"/"Match extraction"). The caller is responsible for
    /// comparing `root` against the block header's advertised Merkle
    /// root (spec.md §4.2: "this check is performed by the caller").
    pub fn parse(&self) -> Result<ParsedPartialMerkleTree, MerkleBlockError> {
        if self.transaction_count == 0 {
            log::warn!("rejecting merkleblock: transaction_count is zero");
            return Err(MerkleBlockError::NoTransactions);
        }
        let top_height = max_height(self.transaction_count);
        let mut parser = Parser {
            transaction_count: self.transaction_count,
            max_height: top_height,
            hashes: &self.hashes,
            bits: &self.bits,
            hash_cursor: 0,
            bit_cursor: 0,
            matches: Vec::new(),
        };
        let root = parser.parse_branch(0, 0).inspect_err(|err| {
            log::warn!("rejecting merkleblock: {err}");
        })?;

        let hash_cursor = parser.hash_cursor;
        let bit_cursor = parser.bit_cursor;
        let matches = parser.matches;

        if hash_cursor != self.hashes.len() {
            let err = MerkleBlockError::HashOverflow(self.hashes.len() - hash_cursor);
            log::warn!("rejecting merkleblock: {err}");
            return Err(err);
        }
        let remaining_bits = self.bits.len() - bit_cursor;
        if remaining_bits >= 8 {
            let err = MerkleBlockError::BitOverflow(remaining_bits);
            log::warn!("rejecting merkleblock: {err}");
            return Err(err);
        }
        if self.bits[bit_cursor..].iter().any(|&b| b) {
            log::warn!("rejecting merkleblock: non-zero padding bit");
            return Err(MerkleBlockError::MalformedPadding);
        }

        Ok(ParsedPartialMerkleTree { root, matches })
    }

    /// `u32(transaction_count) ++ varint(hash_count) ++ hashes ++
    /// varint(flag_byte_count) ++ flag_bytes` (spec.md §6), with `bits`
    /// packed LSB-first and zero-padded to a byte boundary.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.consensus_encode(&mut buf).expect("writing to a Vec cannot fail");
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, MerkleBlockError> {
        let mut cursor = bytes;
        Self::consensus_decode(&mut cursor).map_err(|e| MerkleBlockError::Io(e.to_string()))
    }
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i >> 3] |= 1 << (i & 7);
        }
    }
    out
}

fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    let mut out = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for bit in 0..8 {
            out.push(byte & (1 << bit) != 0);
        }
    }
    out
}

impl Encodable for PartialMerkleTree {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut n = self.transaction_count.consensus_encode(writer)?;

        n += VarInt::from(self.hashes.len()).consensus_encode(writer)?;
        for hash in &self.hashes {
            writer.write_all(hash.as_byte_array())?;
            n += 32;
        }

        let packed = pack_bits(&self.bits);
        n += VarInt::from(packed.len()).consensus_encode(writer)?;
        writer.write_all(&packed)?;
        n += packed.len();

        Ok(n)
    }
}

impl Decodable for PartialMerkleTree {
    fn consensus_decode<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let transaction_count = u32::consensus_decode(reader)?;
        if transaction_count as usize > MAX_DECODE_TRANSACTIONS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "transaction_count {transaction_count} exceeds decode-time maximum {MAX_DECODE_TRANSACTIONS}"
                ),
            ));
        }

        let hash_count = VarInt::consensus_decode(reader)?.0 as usize;
        if hash_count > transaction_count as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{hash_count} hashes exceeds transaction_count {transaction_count}"),
            ));
        }
        let mut hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            let mut buf = [0u8; 32];
            reader.read_exact(&mut buf)?;
            hashes.push(
                Sha256dHash::from_slice(&buf).expect("32-byte buffer always yields a valid hash"),
            );
        }

        // A flag byte can cover up to 8 transactions; bound the
        // allocation generously without trusting the wire value blindly.
        let max_flag_bytes = (transaction_count as usize).div_ceil(8) + 1;
        let flag_byte_count = VarInt::consensus_decode(reader)?.0 as usize;
        if flag_byte_count > max_flag_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{flag_byte_count} flag bytes exceeds expected maximum {max_flag_bytes}"),
            ));
        }
        let mut flag_bytes = vec![0u8; flag_byte_count];
        reader.read_exact(&mut flag_bytes)?;

        Ok(PartialMerkleTree { transaction_count, hashes, bits: unpack_bits(&flag_bytes) })
    }
}

struct Builder<'a> {
    transaction_count: u32,
    max_height: u32,
    all_hashes: &'a [Sha256dHash],
    all_matches: &'a [bool],
    hashes: Vec<Sha256dHash>,
    bits: Vec<bool>,
}

impl<'a> Builder<'a> {
    fn parent_of_match(&self, height: u32, pos: u32) -> bool {
        let shift = self.max_height - height;
        let begin = (pos as u64) << shift;
        let end = std::cmp::min(self.transaction_count as u64, ((pos as u64) + 1) << shift);
        (begin..end).any(|i| self.all_matches[i as usize])
    }

    fn branch_hash(&self, height: u32, pos: u32) -> Sha256dHash {
        if height == self.max_height {
            return self.all_hashes[pos as usize];
        }
        let left = self.branch_hash(height + 1, pos * 2);
        let width_below = tree_width(self.transaction_count, self.max_height, height + 1);
        let right =
            if pos * 2 + 1 < width_below { self.branch_hash(height + 1, pos * 2 + 1) } else { left };
        merkle_node_hash(&left, &right)
    }

    fn build_branch(&mut self, height: u32, pos: u32) {
        let flag = self.parent_of_match(height, pos);
        self.bits.push(flag);

        if !flag || height == self.max_height {
            self.hashes.push(self.branch_hash(height, pos));
            return;
        }

        self.build_branch(height + 1, pos * 2);
        let width_below = tree_width(self.transaction_count, self.max_height, height + 1);
        if pos * 2 + 1 < width_below {
            self.build_branch(height + 1, pos * 2 + 1);
        }
    }
}

struct Parser<'a> {
    transaction_count: u32,
    max_height: u32,
    hashes: &'a [Sha256dHash],
    bits: &'a [bool],
    hash_cursor: usize,
    bit_cursor: usize,
    matches: Vec<(u32, Sha256dHash)>,
}

impl<'a> Parser<'a> {
    fn next_bit(&mut self) -> Result<bool, MerkleBlockError> {
        let bit = *self
            .bits
            .get(self.bit_cursor)
            .ok_or_else(|| MerkleBlockError::Io("ran out of flag bits".to_string()))?;
        self.bit_cursor += 1;
        Ok(bit)
    }

    fn next_hash(&mut self) -> Result<Sha256dHash, MerkleBlockError> {
        let hash = *self.hashes.get(self.hash_cursor).ok_or(MerkleBlockError::HashUnderflow)?;
        self.hash_cursor += 1;
        Ok(hash)
    }

    fn parse_branch(&mut self, height: u32, pos: u32) -> Result<Sha256dHash, MerkleBlockError> {
        let flag = self.next_bit()?;

        if height == self.max_height || !flag {
            let hash = self.next_hash()?;
            if height == self.max_height && flag {
                self.matches.push((pos, hash));
            }
            return Ok(hash);
        }

        let left = self.parse_branch(height + 1, pos * 2)?;
        let width_below = tree_width(self.transaction_count, self.max_height, height + 1);
        let has_right_child = pos * 2 + 1 < width_below;
        let right = if has_right_child { self.parse_branch(height + 1, pos * 2 + 1)? } else { left };

        if has_right_child && left == right {
            return Err(MerkleBlockError::DuplicateSibling);
        }
        Ok(merkle_node_hash(&left, &right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::double_sha256;

    fn h(label: &str) -> Sha256dHash {
        double_sha256(label.as_bytes())
    }

    #[test]
    fn round_trip_all_matched() {
        let hashes = vec![h("one"), h("two"), h("three"), h("four")];
        let matches = vec![true; 4];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        let parsed = tree.parse().unwrap();

        assert_eq!(parsed.matched_hashes(), hashes);

        let h01 = merkle_node_hash(&hashes[0], &hashes[1]);
        let h23 = merkle_node_hash(&hashes[2], &hashes[3]);
        let root = merkle_node_hash(&h01, &h23);
        assert_eq!(parsed.root, root);
    }

    #[test]
    fn round_trip_single_transaction_block() {
        let hashes = vec![h("solo")];
        let matches = vec![true];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        assert_eq!(tree.bits, vec![true]);
        assert_eq!(tree.hashes, hashes);

        let parsed = tree.parse().unwrap();
        assert_eq!(parsed.root, hashes[0]);
        assert_eq!(parsed.matched_hashes(), hashes);
    }

    #[test]
    fn odd_width_duplicates_the_last_node() {
        // n == 3, only tx0 matched: the encoded hashes are tx0, tx1, and
        // the level-1 right node, which duplicates tx2 against itself.
        let hashes = vec![h("zero"), h("one"), h("two")];
        let matches = vec![true, false, false];

        let tree = PartialMerkleTree::build(&hashes, &matches);

        let dup_right = merkle_node_hash(&hashes[2], &hashes[2]);
        assert_eq!(tree.hashes, vec![hashes[0], hashes[1], dup_right]);
        assert_eq!(tree.bits, vec![true, true, true, false, false]);

        let parsed = tree.parse().unwrap();
        let inner_01 = merkle_node_hash(&hashes[0], &hashes[1]);
        let expected_root = merkle_node_hash(&inner_01, &dup_right);
        assert_eq!(parsed.root, expected_root);
        assert_eq!(parsed.matched_hashes(), vec![hashes[0]]);
    }

    #[test]
    fn no_matches_yields_single_summary_hash() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d")];
        let matches = vec![false; 4];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        assert_eq!(tree.bits, vec![false]);
        assert_eq!(tree.hashes.len(), 1);

        let parsed = tree.parse().unwrap();
        assert!(parsed.matches.is_empty());

        let h01 = merkle_node_hash(&hashes[0], &hashes[1]);
        let h23 = merkle_node_hash(&hashes[2], &hashes[3]);
        assert_eq!(parsed.root, merkle_node_hash(&h01, &h23));
    }

    #[test]
    fn matches_extracted_in_ascending_index_order() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d"), h("e")];
        let matches = vec![false, true, false, true, true];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        let parsed = tree.parse().unwrap();

        assert_eq!(
            parsed.matches,
            vec![(1, hashes[1]), (3, hashes[3]), (4, hashes[4])]
        );
    }

    #[test]
    fn serialize_roundtrip() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d"), h("e"), h("f"), h("g")];
        let matches = vec![false, true, false, false, true, false, false];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        let bytes = tree.serialize();
        let back = PartialMerkleTree::deserialize(&bytes).unwrap();
        assert_eq!(tree, back);
    }

    #[test]
    fn padding_tolerance_extra_zero_bits_are_fine() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d")];
        let matches = vec![true, false, false, false];

        let mut tree = PartialMerkleTree::build(&hashes, &matches);
        let original_len = tree.bits.len();
        // pad out to a full byte boundary with zeros, as the wire format would.
        while tree.bits.len() % 8 != 0 {
            tree.bits.push(false);
        }
        assert!(tree.bits.len() > original_len);

        let parsed = tree.parse().unwrap();
        assert_eq!(parsed.matched_hashes(), vec![hashes[0]]);
    }

    #[test]
    fn padding_tolerance_rejects_over_a_byte_of_slack() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d")];
        let matches = vec![true, false, false, false];

        let mut tree = PartialMerkleTree::build(&hashes, &matches);
        for _ in 0..9 {
            tree.bits.push(false);
        }

        assert_eq!(tree.parse(), Err(MerkleBlockError::BitOverflow(9)));
    }

    #[test]
    fn padding_tolerance_rejects_nonzero_padding() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d")];
        let matches = vec![true, false, false, false];

        let mut tree = PartialMerkleTree::build(&hashes, &matches);
        tree.bits.push(true);

        assert_eq!(tree.parse(), Err(MerkleBlockError::MalformedPadding));
    }

    #[test]
    fn duplicate_sibling_with_genuine_right_child_is_rejected() {
        // Four transactions, craft a tree whose right leaf pair is
        // forced to carry the same hash despite both existing for real.
        let hashes = vec![h("a"), h("a"), h("c"), h("d")];
        let matches = vec![true, true, false, false];

        let tree = PartialMerkleTree::build(&hashes, &matches);
        assert_eq!(tree.parse(), Err(MerkleBlockError::DuplicateSibling));
    }

    #[test]
    fn hash_overflow_rejects_leftover_hashes() {
        let hashes = vec![h("a"), h("b"), h("c"), h("d")];
        let matches = vec![false; 4];

        let mut tree = PartialMerkleTree::build(&hashes, &matches);
        tree.hashes.push(h("extra"));

        assert!(matches!(tree.parse(), Err(MerkleBlockError::HashOverflow(1))));
    }

    #[test]
    fn no_transactions_is_rejected() {
        let tree = PartialMerkleTree { transaction_count: 0, hashes: vec![], bits: vec![] };
        assert_eq!(tree.parse(), Err(MerkleBlockError::NoTransactions));
    }

    #[test]
    fn decode_rejects_absurd_transaction_count_before_allocating() {
        // transaction_count alone must be rejected before hash_count/flag
        // bytes are ever looked at, so a short, otherwise-empty message
        // claiming billions of transactions can't force a huge allocation.
        let mut buf = Vec::new();
        u32::MAX.consensus_encode(&mut buf).unwrap();

        let mut cursor = &buf[..];
        let err = PartialMerkleTree::consensus_decode(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
