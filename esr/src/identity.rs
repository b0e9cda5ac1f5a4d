//! Identity proofs: off-chain attestations of account control.
//!
//! A proof carries everything needed to reconstruct the synthetic identity
//! transaction the signer signed, so a verifier can recover the public key
//! and check it against the account's authority without any chain access.
//!
//! The text form is `"EOSIO " + base64u(serialized proof)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use esr_abi::{
    sha256, Action, BinaryReader, BinaryWriter, Bytes, Checksum256, CodecError,
    Name, Pack, PermissionLevel, PublicKey, Signature, TimePointSec, Transaction,
    Unpack,
};

use crate::chain::ChainId;
use crate::error::RequestError;
use crate::payload::IdentityV3;
use crate::request::identity_action_name;

/// A weighted key in an account authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWeight {
    /// The public key.
    pub key: PublicKey,
    /// The weight this key contributes toward the threshold.
    pub weight: u16,
}

/// An account authority: weighted keys and the threshold a signature set
/// must reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// The weight sum required.
    pub threshold: u32,
    /// The keys and their weights.
    pub keys: Vec<KeyWeight>,
}

impl Authority {
    /// An authority satisfied by exactly `key`.
    #[must_use]
    pub fn single(key: PublicKey) -> Self {
        Self {
            threshold: 1,
            keys: vec![KeyWeight { key, weight: 1 }],
        }
    }

    /// Whether `key` alone carries enough weight to meet the threshold.
    #[must_use]
    pub fn key_meets_threshold(&self, key: &PublicKey) -> bool {
        self.keys
            .iter()
            .filter(|kw| kw.key == *key)
            .any(|kw| u32::from(kw.weight) >= self.threshold)
    }
}

/// A portable attestation that `signer` controlled an account on
/// `chain_id`, bound to `scope`, valid until `expiration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityProof {
    /// The chain the attestation is bound to.
    pub chain_id: ChainId,
    /// The application scope the attestation is bound to.
    pub scope: Name,
    /// When the attestation stops being acceptable.
    pub expiration: TimePointSec,
    /// The attested permission.
    pub signer: PermissionLevel,
    /// The signature over the synthetic identity transaction.
    pub signature: Signature,
}

impl IdentityProof {
    /// The transaction this proof attests a signature over.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        // the packed v3 identity body is byte-identical to encoding
        // {scope, permission} under the built-in identity ABI
        let body = IdentityV3 {
            scope: self.scope,
            permission: Some(self.signer),
        };
        Transaction {
            expiration: self.expiration,
            actions: vec![Action {
                account: Name::ZERO,
                name: identity_action_name(),
                authorization: vec![self.signer],
                data: Bytes(body.packed()),
            }],
            ..Transaction::default()
        }
    }

    /// The digest the proof signature covers.
    #[must_use]
    pub fn signing_digest(&self) -> Checksum256 {
        let mut data = Vec::new();
        data.extend_from_slice(self.chain_id.checksum().as_bytes());
        data.extend_from_slice(&self.transaction().packed());
        data.extend_from_slice(&[0u8; 32]);
        sha256(&data)
    }

    /// Recovers the public key that signed this proof.
    ///
    /// # Errors
    ///
    /// Propagates signature recovery failures.
    pub fn recover(&self) -> Result<PublicKey, RequestError> {
        Ok(self.signature.recover(&self.signing_digest())?)
    }

    /// Verifies the proof against an authority at a given time: the proof
    /// must not have expired and the recovered key alone must satisfy the
    /// authority's threshold.
    #[must_use]
    pub fn verify(&self, authority: &Authority, now: TimePointSec) -> bool {
        if now >= self.expiration {
            return false;
        }
        self.recover()
            .map(|key| authority.key_meets_threshold(&key))
            .unwrap_or(false)
    }
}

impl Pack for IdentityProof {
    fn pack(&self, w: &mut BinaryWriter) {
        self.chain_id.pack(w);
        self.scope.pack(w);
        self.expiration.pack(w);
        self.signer.pack(w);
        self.signature.pack(w);
    }
}

impl Unpack for IdentityProof {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            chain_id: ChainId::unpack(r)?,
            scope: Name::unpack(r)?,
            expiration: TimePointSec::unpack(r)?,
            signer: PermissionLevel::unpack(r)?,
            signature: Signature::unpack(r)?,
        })
    }
}

impl fmt::Display for IdentityProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EOSIO {}", crate::base64u::encode(&self.packed()))
    }
}

impl FromStr for IdentityProof {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix("EOSIO ").ok_or(RequestError::BadProof)?;
        let data = crate::base64u::decode(body).map_err(|_| RequestError::BadProof)?;
        Self::unpack_bytes(&data).map_err(|_| RequestError::BadProof)
    }
}

impl Serialize for IdentityProof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IdentityProof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The raw bytes stripped of the transport conveniences; used by wallets
/// that store proofs compactly.
impl From<IdentityProof> for Bytes {
    fn from(proof: IdentityProof) -> Self {
        Self(proof.packed())
    }
}
