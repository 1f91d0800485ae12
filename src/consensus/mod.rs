//! Consensus-level wire encoding: the compact varint and the
//! `Encodable`/`Decodable` traits this core's own structures implement.
//!
//! Generic message framing (the `filterload`/`merkleblock` envelopes) and
//! the transaction/script wire format are out of scope (spec.md §1); this
//! module only carries what `util::bloom` and `merkle::partial_tree` need
//! to serialize themselves.

pub mod encode;

pub use encode::{Decodable, Encodable, VarInt};
