//! Transaction encoding and content addressing
//!
//! A transaction serializes to one wire list in a fixed field order, and
//! its content address is the leading bytes of a SHA-256 digest over that
//! encoding. Identical fields always produce identical bytes and an
//! identical address; the address is derived on demand, never stored
//! apart from the fields it depends on.

use crate::wire::{self, WireValue};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Content addresses are the leading 19 bytes of the SHA-256 digest.
pub const ADDRESS_LEN: usize = 19;

/// Placeholder for the previous-transaction reference, until chaining
/// lands.
const PREV_TX_PLACEHOLDER: &str = "0";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown instruction mnemonic: {0}")]
    UnknownInstruction(String),
}

/// A value transfer with an optional program attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub sender: String,
    pub recipient: u64,
    pub value: u64,
    pub fee: u64,
    /// Compiled instructions, one byte-string per instruction.
    pub instructions: Vec<Vec<u8>>,
}

impl Transaction {
    /// Build a transaction, compiling `source` mnemonics into the
    /// instruction list.
    pub fn new(
        sender: impl Into<String>,
        recipient: u64,
        value: u64,
        fee: u64,
        source: &[&str],
    ) -> Result<Self, TransactionError> {
        let instructions = source
            .iter()
            .map(|mnemonic| compile_instruction(mnemonic))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sender: sender.into(),
            recipient,
            value,
            fee,
            instructions,
        })
    }

    /// Canonical encoding: previous-transaction placeholder, sender,
    /// then recipient, value and fee in numeric textual form, then the
    /// instruction list. The order is fixed; nothing here depends on
    /// map iteration.
    pub fn encode(&self) -> Vec<u8> {
        let instructions = WireValue::list(
            self.instructions
                .iter()
                .map(|i| WireValue::bytes(i.clone()))
                .collect(),
        );
        let fields = WireValue::list(vec![
            WireValue::string(PREV_TX_PLACEHOLDER),
            WireValue::string(&self.sender),
            WireValue::string(&self.recipient.to_string()),
            WireValue::string(&self.value.to_string()),
            WireValue::string(&self.fee.to_string()),
            instructions,
        ]);
        wire::encode(&fields)
    }

    /// Content address: the first [`ADDRESS_LEN`] bytes of the SHA-256
    /// digest over the canonical encoding.
    pub fn derive_address(&self) -> [u8; ADDRESS_LEN] {
        let digest = Sha256::digest(self.encode());
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&digest[..ADDRESS_LEN]);
        addr
    }

    /// Hex form of the content address, for logs and display.
    pub fn address_hex(&self) -> String {
        hex::encode(self.derive_address())
    }
}

/// Compile one instruction mnemonic to its byte form. Decimal literals
/// compile to their minimal big-endian encoding (push data); everything
/// else must be an opcode from the table.
pub fn compile_instruction(mnemonic: &str) -> Result<Vec<u8>, TransactionError> {
    if let Ok(literal) = mnemonic.parse::<u64>() {
        return Ok(match WireValue::uint(literal) {
            WireValue::Bytes(b) => b,
            WireValue::List(_) => Vec::new(),
        });
    }

    let opcode = match mnemonic {
        "STOP" => 0x00,
        "ADD" => 0x10,
        "MUL" => 0x11,
        "SUB" => 0x12,
        "DIV" => 0x13,
        "MOD" => 0x14,
        "NEG" => 0x15,
        "LT" => 0x20,
        "GT" => 0x21,
        "EQ" => 0x22,
        "NOT" => 0x23,
        "SHA256" => 0x30,
        "PUSH" => 0x40,
        "POP" => 0x41,
        "LOAD" => 0x50,
        "STORE" => 0x51,
        other => return Err(TransactionError::UnknownInstruction(other.to_string())),
    };
    Ok(vec![opcode])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new("abcdef0123456789", 7, 100, 3, &["PUSH", "1", "PUSH", "2", "ADD"])
            .unwrap()
    }

    #[test]
    fn identical_fields_encode_identically() {
        let a = sample();
        let b = sample();
        assert_eq!(a.encode(), b.encode());
        assert_eq!(a.derive_address(), b.derive_address());
    }

    #[test]
    fn every_field_feeds_the_address() {
        let base = sample();
        let mut variants = Vec::new();

        let mut t = sample();
        t.sender = "ffffff0123456789".to_string();
        variants.push(t);

        let mut t = sample();
        t.recipient = 8;
        variants.push(t);

        let mut t = sample();
        t.value = 101;
        variants.push(t);

        let mut t = sample();
        t.fee = 4;
        variants.push(t);

        let mut t = sample();
        t.instructions.push(vec![0x00]);
        variants.push(t);

        let base_addr = base.derive_address();
        for variant in &variants {
            assert_ne!(variant.derive_address(), base_addr);
        }

        // The variants also differ pairwise.
        for (i, a) in variants.iter().enumerate() {
            for b in &variants[i + 1..] {
                assert_ne!(a.derive_address(), b.derive_address());
            }
        }
    }

    #[test]
    fn address_is_19_bytes_and_hex_is_38_chars() {
        let tx = sample();
        assert_eq!(tx.derive_address().len(), ADDRESS_LEN);
        assert_eq!(tx.address_hex().len(), ADDRESS_LEN * 2);
    }

    #[test]
    fn encoding_has_the_canonical_field_order() {
        let tx = sample();
        let (fields, _) = wire::decode(&tx.encode(), 0).unwrap();

        assert_eq!(fields.len(), 6);
        assert_eq!(fields.get(0).as_str(), "0");
        assert_eq!(fields.get(1).as_str(), "abcdef0123456789");
        assert_eq!(fields.get(2).as_str(), "7");
        assert_eq!(fields.get(3).as_str(), "100");
        assert_eq!(fields.get(4).as_str(), "3");
        assert_eq!(fields.get(5).len(), 5);
    }

    #[test]
    fn literals_compile_to_minimal_big_endian() {
        assert_eq!(compile_instruction("0").unwrap(), Vec::<u8>::new());
        assert_eq!(compile_instruction("255").unwrap(), vec![0xff]);
        assert_eq!(compile_instruction("256").unwrap(), vec![0x01, 0x00]);
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        assert_eq!(
            compile_instruction("FROBNICATE"),
            Err(TransactionError::UnknownInstruction("FROBNICATE".to_string()))
        );
    }
}
