//! The 32-bit single-stream MurmurHash3 variant BIP37 mandates (spec.md
//! §4.1, §4.3), backed by the `murmur3` crate the same way
//! `parity-bitcoin`'s and `rand-chain`'s `connection_filter.rs` call
//! `murmur3_32(&mut data.as_ref(), seed)`.
//!
//! No intermediate hex round-trip (§9 design note) — the hash stays an
//! unsigned `u32` from the crate call straight through to the modulo in
//! `util::bloom`.

/// Hashes `data` with the given 32-bit seed.
///
/// `murmur3::murmur3_32` only fails if the reader fails; a byte slice
/// never does, so this can't realistically fail, but we surface the
/// `io::Error` rather than unwrap to keep the boundary honest.
pub fn murmur3_32(data: &[u8], seed: u32) -> std::io::Result<u32> {
    let mut cursor = data;
    ::murmur3::murmur3_32(&mut cursor, seed)
}
