//! Chain identifiers and the well-known alias table.
//!
//! A [`ChainId`] is the 32-byte id of a specific chain. On the wire a
//! request carries a [`ChainIdVariant`]: either a one-byte [`ChainAlias`]
//! for the chains everyone knows, or the raw 32 bytes. Alias `0`
//! ([`ChainAlias::Unknown`]) is the multi-chain marker, meaning "any
//! chain", to be narrowed by the `chain_ids` info entry or by the wallet
//! at resolution time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use esr_abi::{
    BinaryReader, BinaryWriter, Checksum256, ChecksumError, CodecError, Pack, Unpack,
};

use crate::error::RequestError;

/// The well-known chains, by wire alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChainAlias {
    /// Multi-chain / not in the table.
    Unknown = 0,
    Eos = 1,
    Telos = 2,
    Jungle = 3,
    Kylin = 4,
    Worbli = 5,
    Bos = 6,
    Meetone = 7,
    Insights = 8,
    Beos = 9,
    Wax = 10,
    Proton = 11,
    Fio = 12,
}

/// The alias table. Row order matches the wire alias values.
const CHAIN_IDS: &[(ChainAlias, &str)] = &[
    (
        ChainAlias::Eos,
        "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906",
    ),
    (
        ChainAlias::Telos,
        "4667b205c6838ef70ff7988f6e8257e8be0e1284a2f59699054a018f743b1d11",
    ),
    (
        ChainAlias::Jungle,
        "e70aaab8997e1dfce58fbfac80cbbb8fecec7b99cf982a9444273cbc64c41473",
    ),
    (
        ChainAlias::Kylin,
        "5fff1dae8dc8e2fc4d5b23b2c7665c97f9e9d8edf2b6485a86ba311c25639191",
    ),
    (
        ChainAlias::Worbli,
        "73647cde120091e0a4b85bced2f3cfdb3041e266cbbe95cee59b73235a1b3b6f",
    ),
    (
        ChainAlias::Bos,
        "d5a3d18fbb3c084e3b1f3fa98c21014b5f3db536cc15d08f9f6479517c6a3d86",
    ),
    (
        ChainAlias::Meetone,
        "cfe6486a83bad4962f232d48003b1824ab5665c36778141034d75e57b956e422",
    ),
    (
        ChainAlias::Insights,
        "b042025541e25a472bffde2d62edd457b7e70cee943412b1ea0f044f88591664",
    ),
    (
        ChainAlias::Beos,
        "b912d19a6abd2b1b05611ae5be473355d64d95aeff0c09bedc8c166cd6468fe4",
    ),
    (
        ChainAlias::Wax,
        "1064487b3cd1a897ce03ae5b6a865651747e2e152090f99c1d19d44e01aea5a4",
    ),
    (
        ChainAlias::Proton,
        "384da888112027f0321850a169f737c33e53b388aad48b5adace4bab97f437e0",
    ),
    (
        ChainAlias::Fio,
        "21dcae42c0182200e93f954a074011f9048a7624c6fe81d3c9541a614a88bd1c",
    ),
];

impl ChainAlias {
    /// Looks up an alias by its wire value.
    #[must_use]
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            _ => CHAIN_IDS
                .iter()
                .find(|(alias, _)| *alias as u8 == value)
                .map(|(alias, _)| *alias),
        }
    }

    /// The chain id this alias stands for; `None` for
    /// [`ChainAlias::Unknown`].
    #[must_use]
    pub fn chain_id(self) -> Option<ChainId> {
        CHAIN_IDS
            .iter()
            .find(|(alias, _)| *alias == self)
            .map(|(_, hex)| hex.parse().expect("alias table holds valid hex"))
    }

    /// The display name, e.g. `"EOS"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Eos => "EOS",
            Self::Telos => "TELOS",
            Self::Jungle => "JUNGLE",
            Self::Kylin => "KYLIN",
            Self::Worbli => "WORBLI",
            Self::Bos => "BOS",
            Self::Meetone => "MEETONE",
            Self::Insights => "INSIGHTS",
            Self::Beos => "BEOS",
            Self::Wax => "WAX",
            Self::Proton => "PROTON",
            Self::Fio => "FIO",
        }
    }
}

impl fmt::Display for ChainAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete 32-byte chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(Checksum256);

impl ChainId {
    /// Wraps raw id bytes.
    #[must_use]
    pub const fn new(id: Checksum256) -> Self {
        Self(id)
    }

    /// Builds a chain id from a table alias.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownAlias`] for values outside the table
    /// and for alias `0`, which names no single chain.
    pub fn from_alias(alias: u8) -> Result<Self, RequestError> {
        ChainAlias::from_value(alias)
            .and_then(ChainAlias::chain_id)
            .ok_or(RequestError::UnknownAlias(alias))
    }

    /// The raw id bytes.
    #[must_use]
    pub const fn checksum(&self) -> &Checksum256 {
        &self.0
    }

    /// The alias this id maps to, or [`ChainAlias::Unknown`] when the id
    /// is not in the table.
    #[must_use]
    pub fn chain_name(&self) -> ChainAlias {
        CHAIN_IDS
            .iter()
            .find(|(_, hex)| hex.parse::<Self>().ok().as_ref() == Some(self))
            .map_or(ChainAlias::Unknown, |(alias, _)| *alias)
    }

    /// The compact wire form: the alias when one exists, the raw bytes
    /// otherwise.
    #[must_use]
    pub fn chain_variant(&self) -> ChainIdVariant {
        match self.chain_name() {
            ChainAlias::Unknown => ChainIdVariant::Id(*self),
            alias => ChainIdVariant::Alias(alias),
        }
    }
}

impl From<Checksum256> for ChainId {
    fn from(id: Checksum256) -> Self {
        Self(id)
    }
}

impl From<[u8; 32]> for ChainId {
    fn from(id: [u8; 32]) -> Self {
        Self(Checksum256(id))
    }
}

impl FromStr for ChainId {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Pack for ChainId {
    fn pack(&self, w: &mut BinaryWriter) {
        self.0.pack(w);
    }
}

impl Unpack for ChainId {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self(Checksum256::unpack(r)?))
    }
}

/// The wire form of a chain reference: tag 0 = alias, tag 1 = raw id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainIdVariant {
    /// A table alias; `Unknown` marks a multi-chain request.
    Alias(ChainAlias),
    /// A raw 32-byte id.
    Id(ChainId),
}

impl ChainIdVariant {
    /// The concrete chain id, if this names one.
    #[must_use]
    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Self::Alias(alias) => alias.chain_id(),
            Self::Id(id) => Some(*id),
        }
    }

    /// Returns `true` for the multi-chain marker (alias 0).
    #[must_use]
    pub const fn is_multi_chain(&self) -> bool {
        matches!(self, Self::Alias(ChainAlias::Unknown))
    }
}

impl Serialize for ChainAlias {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for ChainAlias {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::from_value(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown chain alias {value}")))
    }
}

/// JSON form mirrors the wire variant: `["chain_alias", 1]` or
/// `["chain_id", "aca3…"]`.
impl Serialize for ChainIdVariant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Alias(alias) => ("chain_alias", *alias as u8).serialize(serializer),
            Self::Id(id) => ("chain_id", id.to_string()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ChainIdVariant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, value) = <(String, serde_json::Value)>::deserialize(deserializer)?;
        match tag.as_str() {
            "chain_alias" => {
                let alias: ChainAlias =
                    serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(Self::Alias(alias))
            }
            "chain_id" => {
                let id: ChainId =
                    serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(Self::Id(id))
            }
            other => Err(serde::de::Error::custom(format!(
                "unknown chain id variant {other:?}"
            ))),
        }
    }
}

impl From<ChainAlias> for ChainIdVariant {
    fn from(alias: ChainAlias) -> Self {
        Self::Alias(alias)
    }
}

impl From<ChainId> for ChainIdVariant {
    fn from(id: ChainId) -> Self {
        id.chain_variant()
    }
}

impl Pack for ChainIdVariant {
    fn pack(&self, w: &mut BinaryWriter) {
        match self {
            Self::Alias(alias) => {
                w.write_varuint32(0);
                w.write_u8(*alias as u8);
            }
            Self::Id(id) => {
                w.write_varuint32(1);
                id.pack(w);
            }
        }
    }
}

impl Unpack for ChainIdVariant {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        match r.read_varuint32()? {
            0 => {
                let value = r.read_u8()?;
                let alias = ChainAlias::from_value(value).ok_or(
                    CodecError::UnknownVariantTag {
                        type_name: "ChainAlias",
                        tag: u32::from(value),
                    },
                )?;
                Ok(Self::Alias(alias))
            }
            1 => Ok(Self::Id(ChainId::unpack(r)?)),
            tag => Err(CodecError::UnknownVariantTag {
                type_name: "ChainIdVariant",
                tag,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EOS_HEX: &str =
        "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906";
    const WAX_HEX: &str =
        "1064487b3cd1a897ce03ae5b6a865651747e2e152090f99c1d19d44e01aea5a4";

    #[test]
    fn alias_to_id() {
        assert_eq!(ChainAlias::Eos.chain_id().unwrap().to_string(), EOS_HEX);
        assert_eq!(ChainAlias::Wax.chain_id().unwrap().to_string(), WAX_HEX);
        assert!(ChainAlias::Unknown.chain_id().is_none());
    }

    #[test]
    fn id_to_alias() {
        let eos: ChainId = EOS_HEX.parse().unwrap();
        assert_eq!(eos.chain_name(), ChainAlias::Eos);

        let other: ChainId = ChainId::from([7u8; 32]);
        assert_eq!(other.chain_name(), ChainAlias::Unknown);
    }

    #[test]
    fn unknown_alias_fails() {
        assert!(matches!(
            ChainId::from_alias(200),
            Err(RequestError::UnknownAlias(200))
        ));
        assert!(matches!(
            ChainId::from_alias(0),
            Err(RequestError::UnknownAlias(0))
        ));
        assert!(ChainId::from_alias(10).is_ok());
    }

    #[test]
    fn variant_prefers_alias() {
        let eos: ChainId = EOS_HEX.parse().unwrap();
        assert_eq!(eos.chain_variant(), ChainIdVariant::Alias(ChainAlias::Eos));

        let other = ChainId::from([7u8; 32]);
        assert_eq!(other.chain_variant(), ChainIdVariant::Id(other));
    }

    #[test]
    fn variant_wire_form() {
        let alias = ChainIdVariant::Alias(ChainAlias::Wax);
        assert_eq!(alias.packed(), vec![0, 10]);
        assert_eq!(ChainIdVariant::unpack_bytes(&[0, 10]).unwrap(), alias);

        let id = ChainIdVariant::Id(ChainId::from([7u8; 32]));
        let packed = id.packed();
        assert_eq!(packed.len(), 33);
        assert_eq!(packed[0], 1);
        assert_eq!(ChainIdVariant::unpack_bytes(&packed).unwrap(), id);
    }

    #[test]
    fn multi_chain_marker() {
        assert!(ChainIdVariant::Alias(ChainAlias::Unknown).is_multi_chain());
        assert!(!ChainIdVariant::Alias(ChainAlias::Eos).is_multi_chain());
    }
}
