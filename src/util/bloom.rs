//! # Bloom Filters
//!
//! A Bloom filter is a bit-field in which bits are set based on feeding a
//! data element to a set of different hash functions. The number of hash
//! functions is itself a filter parameter. BIP37 mandates the 32-bit
//! variant (v3) of the Murmur hash function with a tweak folded into each
//! function's seed.
//!
//! Kept from the teacher's original `util/bloom.rs`: the bit-addressing
//! scheme (`BIT_MASK`/shift) and the `fmt::Binary` debug impl. Everything
//! else — the wire decode path, `hash_funcs`/`filter_size` caps raised to
//! the real BIP37 limits, the transaction-scanning operations, and
//! serialization — is new.

use std::fmt;
use std::io;

use bitcoin_hashes::Hash as _;

use crate::consensus::encode::{read_varint_bytes, write_varint_bytes, Decodable, Encodable};
use crate::error::BloomError;
use crate::hash::Sha256dHash;
use crate::murmur3::murmur3_32;
use crate::tx::{OutPoint, Transaction};

/// BIP37's cap on filter size: 36 000 bytes.
pub const MAX_BLOOM_FILTER_SIZE: usize = 36_000;
/// BIP37's cap on hash function count.
pub const MAX_HASH_FUNCS: u32 = 50;

const LN2_SQUARED: f64 = std::f64::consts::LN_2 * std::f64::consts::LN_2;
const LN2: f64 = std::f64::consts::LN_2;
/// The multiplier BIP37 fixes for folding the hash-function index into a
/// MurmurHash3 seed.
const SEED_COEF: u32 = 0xFBA4C795;
const BIT_MASK: [u8; 8] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];

/// Controls which matched outputs `BloomFilter::update` auto-adds to the
/// filter (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateFlags {
    /// Never auto-update.
    None = 0,
    /// Auto-add any matching output's outpoint.
    All = 1,
    /// Auto-add only for pay-to-pubkey and bare-multisig outputs.
    P2PubkeyOnly = 2,
}

impl UpdateFlags {
    fn from_u8(v: u8) -> Result<Self, BloomError> {
        match v {
            0 => Ok(UpdateFlags::None),
            1 => Ok(UpdateFlags::All),
            2 => Ok(UpdateFlags::P2PubkeyOnly),
            other => Err(BloomError::UnknownFlags(other)),
        }
    }
}

/// A BIP37 Bloom filter.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    data: Vec<u8>,
    hash_funcs: u32,
    tweak: u32,
    flags: UpdateFlags,
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("size_bytes", &self.data.len())
            .field("hash_funcs", &self.hash_funcs)
            .field("tweak", &self.tweak)
            .field("flags", &self.flags)
            .finish()
    }
}

impl fmt::Binary for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.data {
            write!(f, "{:08b} ", byte)?;
        }
        Ok(())
    }
}

impl BloomFilter {
    /// Sizes a new, empty filter for `n_elements` items at false-positive
    /// rate `fp_rate` (spec.md §4.1, "by sizing"). `tweak` randomises the
    /// hash outputs between clients; `flags` governs auto-update on scan.
    pub fn new(n_elements: u32, fp_rate: f64, tweak: u32, flags: UpdateFlags) -> Self {
        // Guard against n_elements == 0, which the sizing formula can't
        // divide by; treat it the same as wanting room for one element.
        let n = f64::from(n_elements.max(1));

        let size_bytes = (-1.0 / LN2_SQUARED * n * fp_rate.ln() / 8.0) as i64;
        let size_bytes = size_bytes.clamp(1, MAX_BLOOM_FILTER_SIZE as i64) as usize;

        let hash_funcs = (size_bytes as f64 * 8.0 * LN2 / n) as i64;
        let hash_funcs = hash_funcs.clamp(1, MAX_HASH_FUNCS as i64) as u32;

        log::debug!(
            "sized bloom filter: n={n_elements} p={fp_rate} -> {size_bytes} bytes, {hash_funcs} hash funcs"
        );

        BloomFilter {
            data: vec![0u8; size_bytes],
            hash_funcs,
            tweak,
            flags,
        }
    }

    /// Like [`BloomFilter::new`], but chooses `tweak` at random rather than
    /// letting the caller pick one — the common case for a client that has
    /// no reason to control its own false-positive pattern across peers.
    pub fn new_with_random_tweak(n_elements: u32, fp_rate: f64, flags: UpdateFlags) -> Self {
        Self::new(n_elements, fp_rate, rand::random(), flags)
    }

    /// Builds a filter directly from its wire-level parts, validating the
    /// BIP37 invariants (spec.md §4.1, "by wire decoding").
    pub fn from_parts(
        data: Vec<u8>,
        hash_funcs: u32,
        tweak: u32,
        flags: u8,
    ) -> Result<Self, BloomError> {
        if data.is_empty() || data.len() > MAX_BLOOM_FILTER_SIZE {
            let err = BloomError::FilterSizeOutOfRange(data.len());
            log::warn!("rejecting filterload: {err}");
            return Err(err);
        }
        if hash_funcs == 0 || hash_funcs > MAX_HASH_FUNCS {
            let err = BloomError::TooManyHashFuncs(hash_funcs);
            log::warn!("rejecting filterload: {err}");
            return Err(err);
        }
        let flags = match UpdateFlags::from_u8(flags) {
            Ok(flags) => flags,
            Err(err) => {
                log::warn!("rejecting filterload: {err}");
                return Err(err);
            }
        };
        Ok(BloomFilter { data, hash_funcs, tweak, flags })
    }

    pub fn hash_funcs(&self) -> u32 {
        self.hash_funcs
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    /// The filter's bit vector, `filter_size` bytes long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The `k`-th hash function's bit index for `data` (spec.md §4.1).
    fn bit_index(&self, k: u32, data: &[u8]) -> u32 {
        let seed = k.wrapping_mul(SEED_COEF).wrapping_add(self.tweak);
        let hash = murmur3_32(data, seed).expect("murmur3 over an in-memory slice cannot fail");
        hash % (self.data.len() as u32 * 8)
    }

    /// Adds a raw byte string to the filter.
    pub fn insert(&mut self, data: &[u8]) {
        for k in 0..self.hash_funcs {
            let index = self.bit_index(k, data);
            let (byte, bit) = (index as usize >> 3, index & 7);
            self.data[byte] |= BIT_MASK[bit as usize];
        }
        log::trace!("inserted {} bytes into bloom filter", data.len());
    }

    /// True iff all `hash_funcs` bits for `data` are set.
    pub fn contains(&self, data: &[u8]) -> bool {
        (0..self.hash_funcs).all(|k| {
            let index = self.bit_index(k, data);
            let (byte, bit) = (index as usize >> 3, index & 7);
            self.data[byte] & BIT_MASK[bit as usize] != 0
        })
    }

    /// Adds a 32-byte digest (e.g. a `tx_id`) to the filter.
    pub fn insert_hash(&mut self, hash: &Sha256dHash) {
        self.insert(hash.as_byte_array());
    }

    pub fn contains_hash(&self, hash: &Sha256dHash) -> bool {
        self.contains(hash.as_byte_array())
    }

    /// Adds an outpoint's canonical `tx_id ++ LE_u32(vout)` serialization.
    pub fn insert_outpoint(&mut self, outpoint: &OutPoint) {
        self.insert(&outpoint.to_bytes());
    }

    pub fn contains_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.contains(&outpoint.to_bytes())
    }

    /// True iff `t` matches this filter by any of the rules in spec.md
    /// §4.1: its own `tx_id`, an output push-data constant, a spent
    /// outpoint, or an input push-data constant.
    pub fn is_relevant(&self, tx: &Transaction) -> bool {
        if self.contains_hash(&tx.tx_id()) {
            return true;
        }
        for output in &tx.outputs {
            if output.script_pubkey.push_data().any(|d| self.contains(&d)) {
                return true;
            }
        }
        for input in &tx.inputs {
            if self.contains_outpoint(&input.previous_output) {
                return true;
            }
            if input.script_sig.push_data().any(|d| self.contains(&d)) {
                return true;
            }
        }
        false
    }

    /// Returns a copy of this filter with `t`'s matched outpoints (and,
    /// unless `flags` is `None`, `t`'s own `tx_id`) auto-added, per
    /// spec.md §4.1 and the Open Question resolution in SPEC_FULL.md:
    /// this is a pure operation, never combined with `is_relevant`.
    pub fn update(&self, tx: &Transaction) -> BloomFilter {
        let mut updated = self.clone();
        if self.flags == UpdateFlags::None {
            return updated;
        }

        let tx_id = tx.tx_id();
        for (i, output) in tx.outputs.iter().enumerate() {
            let matched = output.script_pubkey.push_data().any(|d| self.contains(&d));
            if !matched {
                continue;
            }
            let should_insert = match self.flags {
                UpdateFlags::None => false,
                UpdateFlags::All => true,
                UpdateFlags::P2PubkeyOnly => {
                    output.script_pubkey.is_pay_to_public_key()
                        || output.script_pubkey.is_multisig_script()
                }
            };
            if should_insert {
                updated.insert_outpoint(&OutPoint { tx_id, vout: i as u32 });
            }
        }
        updated.insert_hash(&tx_id);
        updated
    }

    /// `varint(filter_size) ++ data ++ u32(hash_funcs) ++ u32(tweak) ++ u8(flags)`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 16);
        self.consensus_encode(&mut buf).expect("writing to a Vec cannot fail");
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BloomError> {
        let mut cursor = bytes;
        Self::consensus_decode(&mut cursor).map_err(|e| BloomError::Io(e.to_string()))
    }
}

impl Encodable for BloomFilter {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut n = write_varint_bytes(writer, &self.data)?;
        n += self.hash_funcs.consensus_encode(writer)?;
        n += self.tweak.consensus_encode(writer)?;
        n += (self.flags as u8).consensus_encode(writer)?;
        Ok(n)
    }
}

impl Decodable for BloomFilter {
    fn consensus_decode<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let data = read_varint_bytes(reader, MAX_BLOOM_FILTER_SIZE)?;
        let hash_funcs = u32::consensus_decode(reader)?;
        let tweak = u32::consensus_decode(reader)?;
        let flags = u8::consensus_decode(reader)?;
        BloomFilter::from_parts(data, hash_funcs, tweak, flags)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}
