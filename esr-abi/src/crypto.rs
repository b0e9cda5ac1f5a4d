//! K1 keys and recoverable signatures with their textual forms.
//!
//! Keys and signatures travel as `PUB_K1_…`, `PVT_K1_…` and `SIG_K1_…`
//! strings: base58 over the raw bytes plus a four-byte RIPEMD-160 checksum
//! salted with the curve suffix. The legacy `EOS…` public key form (no
//! suffix in the checksum) and WIF private keys (`5…`, double-SHA-256
//! checksum) are accepted on parse for compatibility with older tooling.
//!
//! Signing and recovery use the global secp256k1 context. Signatures are
//! ground to the canonical form older chain validators insist on by
//! retrying with a counter as extra nonce data.

use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, SecretKey, SECP256K1};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::{Digest, Sha256};

use crate::bytes::Checksum256;
use crate::ser::{BinaryReader, BinaryWriter, CodecError, Pack, Unpack};

/// Errors raised by key and signature handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// The string is not a recognised public key form.
    #[error("expected public key")]
    ExpectedPublicKey,
    /// The string is not a recognised private key form.
    #[error("expected private key")]
    ExpectedPrivateKey,
    /// The string is not a recognised signature form.
    #[error("expected signature")]
    ExpectedSignature,
    /// The base58 payload or its checksum is invalid.
    #[error("invalid key data")]
    InvalidKey,
    /// Signing and recovery are implemented for K1 only.
    #[error("operation not supported for {0:?} keys")]
    UnsupportedKeyType(KeyType),
    /// The underlying curve library rejected the data.
    #[error("secp256k1: {0}")]
    Secp256k1(#[from] secp256k1::Error),
}

/// The signature scheme a key or signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// secp256k1.
    K1,
    /// secp256r1; carried on the wire but not operated on here.
    R1,
}

impl KeyType {
    const fn suffix(self) -> &'static str {
        match self {
            Self::K1 => "K1",
            Self::R1 => "R1",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::K1 => 0,
            Self::R1 => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Self::K1),
            1 => Ok(Self::R1),
            _ => Err(CodecError::UnknownVariantTag {
                type_name: "KeyType",
                tag: u32::from(tag),
            }),
        }
    }
}

const BASE58_CHARS: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58_digit(c: u8) -> Option<u16> {
    BASE58_CHARS.iter().position(|&x| x == c).map(|p| p as u16)
}

fn base58_decode(s: &str) -> Option<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    for c in s.bytes() {
        let mut carry = base58_digit(c)?;
        for byte in &mut out {
            let x = u16::from(*byte) * 58 + carry;
            *byte = (x & 0xff) as u8;
            carry = x >> 8;
        }
        while carry > 0 {
            out.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    out.extend(s.bytes().take_while(|&c| c == b'1').map(|_| 0));
    out.reverse();
    Some(out)
}

fn base58_encode(bytes: &[u8]) -> String {
    let mut out: Vec<u8> = Vec::new();
    for &byte in bytes {
        let mut carry = u16::from(byte);
        for digit in &mut out {
            let x = (u16::from(*digit) << 8) + carry;
            *digit = (x % 58) as u8;
            carry = x / 58;
        }
        while carry > 0 {
            out.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    let leading = bytes.iter().take_while(|&&b| b == 0).count();
    let mut s = String::with_capacity(out.len() + leading);
    s.extend(std::iter::repeat('1').take(leading));
    s.extend(out.iter().rev().map(|&d| BASE58_CHARS[d as usize] as char));
    s
}

fn ripemd_checksum(data: &[u8], suffix: &str) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(suffix.as_bytes());
    let digest = hasher.finalize();
    digest[..4].try_into().unwrap()
}

fn sha256d_checksum(data: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(data));
    digest[..4].try_into().unwrap()
}

/// Decodes a `<base58>` blob of `SIZE` bytes followed by a four-byte
/// ripemd checksum salted with `suffix`.
fn decode_checked<const SIZE: usize>(s: &str, suffix: &str) -> Option<[u8; SIZE]> {
    let raw = base58_decode(s)?;
    if raw.len() != SIZE + 4 {
        return None;
    }
    let (data, check) = raw.split_at(SIZE);
    if ripemd_checksum(data, suffix) != check {
        return None;
    }
    data.try_into().ok()
}

fn encode_checked(data: &[u8], suffix: &str) -> String {
    let mut whole = data.to_vec();
    whole.extend_from_slice(&ripemd_checksum(data, suffix));
    base58_encode(&whole)
}

/// A compressed public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct PublicKey {
    /// The signature scheme.
    pub key_type: KeyType,
    /// 33 bytes of compressed point data.
    pub data: [u8; 33],
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = self.key_type.suffix();
        write!(f, "PUB_{}_{}", suffix, encode_checked(&self.data, suffix))
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("PUB_K1_") {
            let data = decode_checked::<33>(rest, "K1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::K1, data });
        }
        if let Some(rest) = s.strip_prefix("PUB_R1_") {
            let data = decode_checked::<33>(rest, "R1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::R1, data });
        }
        // legacy form: "EOS" prefix, checksum without a curve suffix
        if let Some(rest) = s.strip_prefix("EOS") {
            let data = decode_checked::<33>(rest, "").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::K1, data });
        }
        Err(CryptoError::ExpectedPublicKey)
    }
}

impl Pack for PublicKey {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u8(self.key_type.tag());
        w.write_raw(&self.data);
    }
}

impl Unpack for PublicKey {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let key_type = KeyType::from_tag(r.read_u8()?)?;
        let data = r.read_exact(33)?.try_into().unwrap();
        Ok(Self { key_type, data })
    }
}

/// A recoverable signature: one recovery byte plus `r || s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct Signature {
    /// The signature scheme.
    pub key_type: KeyType,
    /// `[recovery, r(32), s(32)]`.
    pub data: [u8; 65],
}

impl Signature {
    /// Recovers the public key that produced this signature over `digest`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] for R1 signatures and
    /// [`CryptoError::Secp256k1`] when the data does not describe a point.
    pub fn recover(&self, digest: &Checksum256) -> Result<PublicKey, CryptoError> {
        if self.key_type != KeyType::K1 {
            return Err(CryptoError::UnsupportedKeyType(self.key_type));
        }
        let recid = i32::from(self.data[0].wrapping_sub(31));
        let recid = RecoveryId::from_i32(recid)?;
        let sig = RecoverableSignature::from_compact(&self.data[1..], recid)?;
        let msg = Message::from_digest(*digest.as_bytes());
        let key = SECP256K1.recover_ecdsa(&msg, &sig)?;
        Ok(PublicKey {
            key_type: KeyType::K1,
            data: key.serialize(),
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = self.key_type.suffix();
        write!(f, "SIG_{}_{}", suffix, encode_checked(&self.data, suffix))
    }
}

impl FromStr for Signature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("SIG_K1_") {
            let data = decode_checked::<65>(rest, "K1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::K1, data });
        }
        if let Some(rest) = s.strip_prefix("SIG_R1_") {
            let data = decode_checked::<65>(rest, "R1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::R1, data });
        }
        Err(CryptoError::ExpectedSignature)
    }
}

impl Pack for Signature {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u8(self.key_type.tag());
        w.write_raw(&self.data);
    }
}

impl Unpack for Signature {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let key_type = KeyType::from_tag(r.read_u8()?)?;
        let data = r.read_exact(65)?.try_into().unwrap();
        Ok(Self { key_type, data })
    }
}

/// A secret key.
#[derive(Clone, Copy, PartialEq, Eq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct PrivateKey {
    /// The signature scheme.
    pub key_type: KeyType,
    /// 32 bytes of scalar data.
    pub data: [u8; 32],
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never leak key material through Debug output
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Derives the matching public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] for R1 keys and
    /// [`CryptoError::Secp256k1`] for out-of-range scalars.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        let secret = self.to_secret()?;
        Ok(PublicKey {
            key_type: KeyType::K1,
            data: secret.public_key(SECP256K1).serialize(),
        })
    }

    /// Signs a 32-byte digest, producing a canonical recoverable signature.
    ///
    /// Signing is deterministic per digest: extra nonce data is bumped
    /// until the signature passes the canonical form check.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] for R1 keys and
    /// [`CryptoError::Secp256k1`] for invalid key material.
    pub fn sign(&self, digest: &Checksum256) -> Result<Signature, CryptoError> {
        let secret = self.to_secret()?;
        let msg = Message::from_digest(*digest.as_bytes());
        let mut attempt: u32 = 0;
        loop {
            let sig = if attempt == 0 {
                SECP256K1.sign_ecdsa_recoverable(&msg, &secret)
            } else {
                let mut noncedata = [0u8; 32];
                noncedata[..4].copy_from_slice(&attempt.to_le_bytes());
                SECP256K1.sign_ecdsa_recoverable_with_noncedata(&msg, &secret, &noncedata)
            };
            let (recid, compact) = sig.serialize_compact();
            if is_canonical(&compact) {
                let mut data = [0u8; 65];
                #[allow(clippy::cast_sign_loss)]
                let recovery = recid.to_i32() as u8;
                data[0] = recovery + 31;
                data[1..].copy_from_slice(&compact);
                return Ok(Signature {
                    key_type: KeyType::K1,
                    data,
                });
            }
            attempt += 1;
        }
    }

    fn to_secret(&self) -> Result<SecretKey, CryptoError> {
        if self.key_type != KeyType::K1 {
            return Err(CryptoError::UnsupportedKeyType(self.key_type));
        }
        Ok(SecretKey::from_slice(&self.data)?)
    }
}

/// The canonical form check older chain validators apply: neither scalar
/// may have the high bit set or a redundant leading zero byte.
fn is_canonical(compact: &[u8; 64]) -> bool {
    compact[0] & 0x80 == 0
        && !(compact[0] == 0 && compact[1] & 0x80 == 0)
        && compact[32] & 0x80 == 0
        && !(compact[32] == 0 && compact[33] & 0x80 == 0)
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = self.key_type.suffix();
        write!(f, "PVT_{}_{}", suffix, encode_checked(&self.data, suffix))
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("PVT_K1_") {
            let data = decode_checked::<32>(rest, "K1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::K1, data });
        }
        if let Some(rest) = s.strip_prefix("PVT_R1_") {
            let data = decode_checked::<32>(rest, "R1").ok_or(CryptoError::InvalidKey)?;
            return Ok(Self { key_type: KeyType::R1, data });
        }
        // WIF: 0x80-prefixed payload with a double-SHA-256 checksum
        if s.starts_with('5') {
            let raw = base58_decode(s).ok_or(CryptoError::InvalidKey)?;
            if raw.len() != 37 || raw[0] != 0x80 {
                return Err(CryptoError::InvalidKey);
            }
            let (payload, check) = raw.split_at(33);
            if sha256d_checksum(payload) != check {
                return Err(CryptoError::InvalidKey);
            }
            return Ok(Self {
                key_type: KeyType::K1,
                data: payload[1..].try_into().unwrap(),
            });
        }
        Err(CryptoError::ExpectedPrivateKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::sha256;

    fn test_key() -> PrivateKey {
        PrivateKey {
            key_type: KeyType::K1,
            data: {
                let mut data = [0u8; 32];
                data[31] = 1;
                data
            },
        }
    }

    #[test]
    fn key_string_roundtrip() {
        let key = test_key();
        let text = key.to_string();
        assert!(text.starts_with("PVT_K1_"));
        assert_eq!(text.parse::<PrivateKey>().unwrap(), key);

        let public = key.public_key().unwrap();
        let text = public.to_string();
        assert!(text.starts_with("PUB_K1_"));
        assert_eq!(text.parse::<PublicKey>().unwrap(), public);
    }

    #[test]
    fn wif_and_legacy_forms() {
        let key: PrivateKey = "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3"
            .parse()
            .unwrap();
        let public = key.public_key().unwrap();
        let legacy: PublicKey = "EOS6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5GDW5CV"
            .parse()
            .unwrap();
        assert_eq!(public, legacy);
    }

    #[test]
    fn sign_and_recover() {
        let key = test_key();
        let digest = sha256(b"hello");
        let sig = key.sign(&digest).unwrap();
        assert!(is_canonical(&sig.data[1..].try_into().unwrap()));
        assert_eq!(sig.recover(&digest).unwrap(), key.public_key().unwrap());
        // a different digest recovers a different key
        assert_ne!(
            sig.recover(&sha256(b"goodbye")).unwrap(),
            key.public_key().unwrap()
        );
    }

    #[test]
    fn signature_string_roundtrip() {
        let sig = test_key().sign(&sha256(b"payload")).unwrap();
        let text = sig.to_string();
        assert!(text.starts_with("SIG_K1_"));
        assert_eq!(text.parse::<Signature>().unwrap(), sig);
    }

    #[test]
    fn wire_roundtrip() {
        let key = test_key().public_key().unwrap();
        let packed = key.packed();
        assert_eq!(packed.len(), 34);
        assert_eq!(PublicKey::unpack_bytes(&packed).unwrap(), key);

        let sig = test_key().sign(&sha256(b"x")).unwrap();
        let packed = sig.packed();
        assert_eq!(packed.len(), 66);
        assert_eq!(Signature::unpack_bytes(&packed).unwrap(), sig);
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut text = test_key().public_key().unwrap().to_string();
        text.pop();
        text.push('1');
        assert!(text.parse::<PublicKey>().is_err());
        assert!("PUB_K1_".parse::<PublicKey>().is_err());
        assert!("garbage".parse::<PublicKey>().is_err());
    }
}
