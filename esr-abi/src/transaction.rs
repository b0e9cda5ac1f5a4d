//! Transactions and their wire form.
//!
//! The header layout is fixed: expiration, the 16-bit reference block
//! number, the 32-bit reference block prefix, then the resource limits.
//! A header whose expiration, `ref_block_num` and `ref_block_prefix` are
//! all zero is the *null header*, the marker a signing request uses to
//! say "fill these in at resolution time".

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::bytes::{sha256, Bytes, Checksum256};
use crate::ser::{BinaryReader, BinaryWriter, CodecError, Pack, Unpack};
use crate::time::TimePointSec;

/// An opaque (type, data) transaction extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionExtension {
    /// Extension type tag.
    pub r#type: u16,
    /// Extension payload.
    pub data: Bytes,
}

impl Pack for TransactionExtension {
    fn pack(&self, w: &mut BinaryWriter) {
        self.r#type.pack(w);
        self.data.pack(w);
    }
}

impl Unpack for TransactionExtension {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            r#type: u16::unpack(r)?,
            data: Bytes::unpack(r)?,
        })
    }
}

/// A chain transaction: TAPoS header, resource limits and action vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// When the transaction stops being valid.
    pub expiration: TimePointSec,
    /// Low 16 bits of the reference block number.
    pub ref_block_num: u16,
    /// Checksum prefix of the reference block id.
    pub ref_block_prefix: u32,
    /// Upper bound on net usage, in 8-byte words; `varuint32` on the wire.
    #[serde(default)]
    pub max_net_usage_words: u32,
    /// Upper bound on cpu usage, in milliseconds.
    #[serde(default)]
    pub max_cpu_usage_ms: u8,
    /// Delay before execution, in seconds; `varuint32` on the wire.
    #[serde(default)]
    pub delay_sec: u32,
    /// Context-free actions.
    #[serde(default)]
    pub context_free_actions: Vec<Action>,
    /// Ordinary actions, in execution order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Protocol extensions.
    #[serde(default)]
    pub transaction_extensions: Vec<TransactionExtension>,
}

impl Transaction {
    /// Builds a transaction with the null header and the given actions.
    #[must_use]
    pub fn with_actions(actions: Vec<Action>) -> Self {
        Self {
            actions,
            ..Self::default()
        }
    }

    /// Returns `true` when expiration, `ref_block_num` and
    /// `ref_block_prefix` are all zero.
    #[must_use]
    pub fn has_null_header(&self) -> bool {
        self.expiration == TimePointSec::ZERO
            && self.ref_block_num == 0
            && self.ref_block_prefix == 0
    }

    /// The transaction id: SHA-256 of the serialized transaction.
    #[must_use]
    pub fn id(&self) -> Checksum256 {
        sha256(&self.packed())
    }
}

impl Pack for Transaction {
    fn pack(&self, w: &mut BinaryWriter) {
        self.expiration.pack(w);
        self.ref_block_num.pack(w);
        self.ref_block_prefix.pack(w);
        w.write_varuint32(self.max_net_usage_words);
        self.max_cpu_usage_ms.pack(w);
        w.write_varuint32(self.delay_sec);
        self.context_free_actions.pack(w);
        self.actions.pack(w);
        self.transaction_extensions.pack(w);
    }
}

impl Unpack for Transaction {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            expiration: TimePointSec::unpack(r)?,
            ref_block_num: u16::unpack(r)?,
            ref_block_prefix: u32::unpack(r)?,
            max_net_usage_words: r.read_varuint32()?,
            max_cpu_usage_ms: u8::unpack(r)?,
            delay_sec: r.read_varuint32()?,
            context_free_actions: Vec::unpack(r)?,
            actions: Vec::unpack(r)?,
            transaction_extensions: Vec::unpack(r)?,
        })
    }
}
