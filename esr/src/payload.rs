//! The request payload: everything between the frame header and the
//! optional signature trailer.
//!
//! Protocol versions 2 and 3 share the payload layout and differ only in
//! the identity body: v2 carries an optional permission, v3 adds a scope
//! name in front of it. The two bodies are kept as distinct types and the
//! codec dispatches on the version carried in the frame header.

use serde::{Deserialize, Serialize};

use esr_abi::{
    Abi, Action, BinaryReader, BinaryWriter, Bytes, CodecError, Name, Pack,
    PermissionLevel, Signature, Transaction, Unpack,
};

use crate::chain::ChainIdVariant;

/// The protocol versions this implementation speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// The widely deployed revision.
    V2 = 2,
    /// Adds scoped identity requests and multi-chain support.
    V3 = 3,
}

impl ProtocolVersion {
    /// Maps a frame header version value, if supported.
    #[must_use]
    pub const fn from_value(value: u8) -> Option<Self> {
        match value {
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// The wire value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// The request flag byte.
///
/// Bit 0 requests a broadcast after signing, bit 1 marks the callback as
/// background. The remaining bits are reserved but round-trip unchanged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlags(pub u8);

impl RequestFlags {
    /// Broadcast the signed transaction.
    pub const BROADCAST: u8 = 1 << 0;
    /// Deliver the callback in the background.
    pub const BACKGROUND: u8 = 1 << 1;

    /// Returns `true` if the broadcast bit is set.
    #[must_use]
    pub const fn broadcast(self) -> bool {
        self.0 & Self::BROADCAST != 0
    }

    /// Returns `true` if the background bit is set.
    #[must_use]
    pub const fn background(self) -> bool {
        self.0 & Self::BACKGROUND != 0
    }

    /// Sets or clears the broadcast bit.
    pub fn set_broadcast(&mut self, on: bool) {
        if on {
            self.0 |= Self::BROADCAST;
        } else {
            self.0 &= !Self::BROADCAST;
        }
    }

    /// Sets or clears the background bit.
    pub fn set_background(&mut self, on: bool) {
        if on {
            self.0 |= Self::BACKGROUND;
        } else {
            self.0 &= !Self::BACKGROUND;
        }
    }
}

impl Pack for RequestFlags {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u8(self.0);
    }
}

impl Unpack for RequestFlags {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self(r.read_u8()?))
    }
}

/// A (key, raw bytes) metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoPair {
    /// UTF-8 key; not required to be unique.
    pub key: String,
    /// Raw value bytes; interpretation is up to the reader.
    pub value: Bytes,
}

impl Pack for InfoPair {
    fn pack(&self, w: &mut BinaryWriter) {
        self.key.pack(w);
        self.value.pack(w);
    }
}

impl Unpack for InfoPair {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            key: String::unpack(r)?,
            value: Bytes::unpack(r)?,
        })
    }
}

/// The v2 identity body: just an optional permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityV2 {
    /// The requested permission, or `None` to let the signer choose.
    pub permission: Option<PermissionLevel>,
}

impl Pack for IdentityV2 {
    fn pack(&self, w: &mut BinaryWriter) {
        self.permission.pack(w);
    }
}

impl Unpack for IdentityV2 {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            permission: Option::unpack(r)?,
        })
    }
}

/// The v3 identity body: a scope the attestation is bound to, plus the
/// optional permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityV3 {
    /// The scope the proof is valid for.
    pub scope: Name,
    /// The requested permission, or `None` to let the signer choose.
    pub permission: Option<PermissionLevel>,
}

impl Pack for IdentityV3 {
    fn pack(&self, w: &mut BinaryWriter) {
        self.scope.pack(w);
        self.permission.pack(w);
    }
}

impl Unpack for IdentityV3 {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            scope: Name::unpack(r)?,
            permission: Option::unpack(r)?,
        })
    }
}

/// A version-tagged identity body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityBody {
    /// Version 2 layout.
    V2(IdentityV2),
    /// Version 3 layout.
    V3(IdentityV3),
}

impl IdentityBody {
    /// The requested permission, independent of layout.
    #[must_use]
    pub const fn permission(&self) -> Option<PermissionLevel> {
        match self {
            Self::V2(body) => body.permission,
            Self::V3(body) => body.permission,
        }
    }

    /// The scope, when the layout carries one.
    #[must_use]
    pub const fn scope(&self) -> Option<Name> {
        match self {
            Self::V2(_) => None,
            Self::V3(body) => Some(body.scope),
        }
    }
}

/// The request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestVariant {
    /// Tag 0: a single action.
    Action(Action),
    /// Tag 1: a sequence of actions sharing one null-header transaction.
    Actions(Vec<Action>),
    /// Tag 2: a full transaction, possibly with a null header.
    Transaction(Transaction),
    /// Tag 3: an identity attestation request.
    Identity(IdentityBody),
}

impl RequestVariant {
    /// Returns `true` for identity requests.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    fn pack(&self, version: ProtocolVersion, w: &mut BinaryWriter) {
        match self {
            Self::Action(action) => {
                w.write_varuint32(0);
                action.pack(w);
            }
            Self::Actions(actions) => {
                w.write_varuint32(1);
                actions.pack(w);
            }
            Self::Transaction(tx) => {
                w.write_varuint32(2);
                tx.pack(w);
            }
            Self::Identity(body) => {
                w.write_varuint32(3);
                match (version, body) {
                    (ProtocolVersion::V2, IdentityBody::V2(v2)) => v2.pack(w),
                    (ProtocolVersion::V3, IdentityBody::V3(v3)) => v3.pack(w),
                    // an identity body always matches its payload version;
                    // pack the layout the version dictates regardless
                    (ProtocolVersion::V2, IdentityBody::V3(v3)) => IdentityV2 {
                        permission: v3.permission,
                    }
                    .pack(w),
                    (ProtocolVersion::V3, IdentityBody::V2(v2)) => IdentityV3 {
                        scope: Name::ZERO,
                        permission: v2.permission,
                    }
                    .pack(w),
                }
            }
        }
    }

    fn unpack(
        version: ProtocolVersion,
        r: &mut BinaryReader<'_>,
    ) -> Result<Self, CodecError> {
        match r.read_varuint32()? {
            0 => Ok(Self::Action(Action::unpack(r)?)),
            1 => Ok(Self::Actions(Vec::unpack(r)?)),
            2 => Ok(Self::Transaction(Transaction::unpack(r)?)),
            3 => Ok(Self::Identity(match version {
                ProtocolVersion::V2 => IdentityBody::V2(IdentityV2::unpack(r)?),
                ProtocolVersion::V3 => IdentityBody::V3(IdentityV3::unpack(r)?),
            })),
            tag => Err(CodecError::UnknownVariantTag {
                type_name: "RequestVariant",
                tag,
            }),
        }
    }
}

/// The payload carried inside a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// The chain this request targets, or the multi-chain marker.
    pub chain_id: ChainIdVariant,
    /// The request body.
    pub req: RequestVariant,
    /// The flag byte.
    pub flags: RequestFlags,
    /// Callback URL template; empty means no callback.
    pub callback: String,
    /// Metadata pairs.
    pub info: Vec<InfoPair>,
}

impl RequestPayload {
    /// Serializes the payload under the given protocol version.
    pub fn pack(&self, version: ProtocolVersion, w: &mut BinaryWriter) {
        self.chain_id.pack(w);
        self.req.pack(version, w);
        self.flags.pack(w);
        self.callback.pack(w);
        self.info.pack(w);
    }

    /// Convenience: the payload bytes under `version`.
    #[must_use]
    pub fn packed(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        self.pack(version, &mut w);
        w.into_bytes()
    }

    /// Deserializes a payload under the given protocol version.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] on truncated or structurally invalid data.
    pub fn unpack(
        version: ProtocolVersion,
        r: &mut BinaryReader<'_>,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            chain_id: ChainIdVariant::unpack(r)?,
            req: RequestVariant::unpack(version, r)?,
            flags: RequestFlags::unpack(r)?,
            callback: String::unpack(r)?,
            info: Vec::unpack(r)?,
        })
    }
}

/// The originator signature appended after the payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestSignature {
    /// The account that vouches for the request.
    pub signer: Name,
    /// Signature over the request digest.
    pub signature: Signature,
}

impl Pack for RequestSignature {
    fn pack(&self, w: &mut BinaryWriter) {
        self.signer.pack(w);
        self.signature.pack(w);
    }
}

impl Unpack for RequestSignature {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            signer: Name::unpack(r)?,
            signature: Signature::unpack(r)?,
        })
    }
}

/// The ABI describing the synthetic identity action under protocol `version`.
#[must_use]
pub fn identity_abi(version: ProtocolVersion) -> Abi {
    let fields = match version {
        ProtocolVersion::V2 => r#"[
            {"name": "permission", "type": "permission_level?"}
        ]"#,
        ProtocolVersion::V3 => r#"[
            {"name": "scope", "type": "name"},
            {"name": "permission", "type": "permission_level?"}
        ]"#,
    };
    let json = format!(
        r#"{{
            "version": "eosio::abi/1.1",
            "structs": [
                {{"name": "permission_level", "base": "", "fields": [
                    {{"name": "actor", "type": "name"}},
                    {{"name": "permission", "type": "name"}}
                ]}},
                {{"name": "identity", "base": "", "fields": {fields}}}
            ],
            "actions": [{{"name": "identity", "type": "identity"}}]
        }}"#
    );
    Abi::from_json(&json).expect("identity ABI is well-formed")
}
