//! Wire message envelopes built on top of the filtering core.

pub mod message_filter;

pub use message_filter::{FilterAddMessage, FilterLoadMessage, MerkleBlockMessage};
