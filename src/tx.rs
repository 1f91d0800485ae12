//! Minimal read-only transaction/script model.
//!
//! spec.md treats the transaction and script data model as an external
//! collaborator, consumed only through `tx_id`/`outputs`/`inputs` and a
//! script's push-data constants. This module is that collaborator: just
//! enough to drive `util::bloom`'s scanning operations, grounded on
//! `parity-bitcoin`'s `script::Script` iterator-of-`Instruction` shape
//! (as used by its `connection_filter.rs`). No signing, no validation,
//! no interpreter.

use bitcoin_hashes::Hash as _;

use crate::hash::{double_sha256, Sha256dHash};

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

/// A single decoded script element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    /// `Some` for push operations; the pushed bytes are the "push-data
    /// constant" spec.md's scanning rules check against the filter.
    pub data: Option<Vec<u8>>,
}

/// A raw output/input script, iterated lazily.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn iter(&self) -> ScriptIter<'_> {
        ScriptIter { data: &self.0, pos: 0 }
    }

    /// The script's push-data constants, in order, opcodes dropped.
    pub fn push_data(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.iter().filter_map(|i| i.ok()?.data)
    }

    /// `<pubkey> OP_CHECKSIG` — pay-to-pubkey.
    pub fn is_pay_to_public_key(&self) -> bool {
        let ins: Vec<Instruction> = self.iter().filter_map(|i| i.ok()).collect();
        matches!(
            &ins[..],
            [Instruction { data: Some(pk), .. }, Instruction { opcode: OP_CHECKSIG, data: None }]
                if pk.len() == 33 || pk.len() == 65
        )
    }

    /// `OP_<m> <pubkey>... OP_<n> OP_CHECKMULTISIG` — bare multisig.
    pub fn is_multisig_script(&self) -> bool {
        let ins: Vec<Instruction> = self.iter().filter_map(|i| i.ok()).collect();
        if ins.len() < 4 {
            return false;
        }
        let Some(first) = ins.first() else { return false };
        let Some(last) = ins.last() else { return false };
        let Some(second_last) = ins.get(ins.len() - 2) else { return false };
        if !(OP_1..=OP_16).contains(&first.opcode) || first.data.is_some() {
            return false;
        }
        if last.opcode != OP_CHECKMULTISIG {
            return false;
        }
        if !(OP_1..=OP_16).contains(&second_last.opcode) || second_last.data.is_some() {
            return false;
        }
        let pubkeys = &ins[1..ins.len() - 2];
        pubkeys
            .iter()
            .all(|i| matches!(&i.data, Some(d) if d.len() == 33 || d.len() == 65))
    }
}

pub struct ScriptIter<'a> {
    data: &'a [u8],
    pos: usize,
}

/// A malformed script (truncated push) stops iteration with this error
/// rather than panicking; `Script::push_data`/the `is_*` checks simply
/// ignore elements that don't parse (`filter_map(|i| i.ok())`, matching
/// `parity-bitcoin`'s pattern).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptError;

impl<'a> Iterator for ScriptIter<'a> {
    type Item = Result<Instruction, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let opcode = self.data[self.pos];
        self.pos += 1;

        let push_len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => {
                let len = *self.data.get(self.pos)? as usize;
                self.pos += 1;
                Some(len)
            }
            OP_PUSHDATA2 => {
                let bytes = self.data.get(self.pos..self.pos + 2)?;
                self.pos += 2;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
            }
            OP_PUSHDATA4 => {
                let bytes = self.data.get(self.pos..self.pos + 4)?;
                self.pos += 4;
                Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
            }
            _ => None,
        };

        match push_len {
            Some(len) => {
                let Some(data) = self.data.get(self.pos..self.pos + len) else {
                    self.pos = self.data.len();
                    return Some(Err(ScriptError));
                };
                self.pos += len;
                Some(Ok(Instruction { opcode, data: Some(data.to_vec()) }))
            }
            None => Some(Ok(Instruction { opcode, data: None })),
        }
    }
}

/// Identifies a specific output: the pair (transaction-id, output-index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_id: Sha256dHash,
    pub vout: u32,
}

impl OutPoint {
    /// `tx_id ++ LE_u32(vout)` (spec.md §4.1).
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut buf = [0u8; 36];
        buf[..32].copy_from_slice(self.tx_id.as_byte_array());
        buf[32..].copy_from_slice(&self.vout.to_le_bytes());
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// A stand-in consensus serialization, sufficient to derive a
    /// deterministic `tx_id` for tests; not the real Bitcoin tx wire
    /// format (out of scope, spec.md §1).
    fn digest_preimage(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(&input.previous_output.to_bytes());
            buf.extend_from_slice(&input.script_sig.0);
        }
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            buf.extend_from_slice(&output.script_pubkey.0);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn tx_id(&self) -> Sha256dHash {
        double_sha256(&self.digest_preimage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_iter_parses_direct_push() {
        let script = Script::new(vec![0x03, 0xAA, 0xBB, 0xCC]);
        let ins: Vec<_> = script.iter().filter_map(|i| i.ok()).collect();
        assert_eq!(ins, vec![Instruction { opcode: 3, data: Some(vec![0xAA, 0xBB, 0xCC]) }]);
    }

    #[test]
    fn script_iter_parses_pushdata1() {
        let script = Script::new(vec![OP_PUSHDATA1, 0x02, 0x11, 0x22]);
        let ins: Vec<_> = script.iter().filter_map(|i| i.ok()).collect();
        assert_eq!(ins, vec![Instruction { opcode: OP_PUSHDATA1, data: Some(vec![0x11, 0x22]) }]);
    }

    #[test]
    fn truncated_push_does_not_panic() {
        let script = Script::new(vec![0x05, 0xAA]);
        let ins: Vec<_> = script.iter().collect();
        assert_eq!(ins, vec![Err(ScriptError)]);
    }

    #[test]
    fn p2pk_script_is_recognised() {
        let mut bytes = vec![33u8];
        bytes.extend(std::iter::repeat(0x02).take(33));
        bytes.push(OP_CHECKSIG);
        assert!(Script::new(bytes).is_pay_to_public_key());
    }

    #[test]
    fn bare_multisig_is_recognised() {
        let mut bytes = vec![OP_1];
        for _ in 0..2 {
            bytes.push(33);
            bytes.extend(std::iter::repeat(0x03).take(33));
        }
        bytes.push(OP_1 + 1);
        bytes.push(OP_CHECKMULTISIG);
        assert!(Script::new(bytes).is_multisig_script());
    }

    #[test]
    fn p2pkh_is_neither_p2pk_nor_multisig() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let mut bytes = vec![0x76, 0xa9, 20];
        bytes.extend(std::iter::repeat(0xAB).take(20));
        bytes.push(0x88);
        bytes.push(OP_CHECKSIG);
        let script = Script::new(bytes);
        assert!(!script.is_pay_to_public_key());
        assert!(!script.is_multisig_script());
    }
}
