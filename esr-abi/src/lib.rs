//! Chain primitives and the ABI-driven binary codec used by the signing
//! request protocol.
//!
//! This crate defines the serialization-level building blocks shared by the
//! whole `esr` stack. It has minimal dependencies and is intended to be the
//! "lingua franca" crate: everything that touches the wire (names, assets,
//! timestamps, actions, transactions, contract ABIs) lives here, while the
//! protocol logic (framing, resolution, callbacks) lives in the `esr` crate.
//!
//! # Modules
//!
//! - [`name`] — base-32 packed 64-bit account names
//! - [`asset`] — token quantities and symbols
//! - [`time`] — second-resolution timestamps
//! - [`bytes`] — raw byte blobs, 32-byte checksums, SHA-256
//! - [`ser`] — the little-endian binary writer/reader and [`Pack`]/[`Unpack`]
//! - [`crypto`] — K1 keys and recoverable signatures with their text forms
//! - [`value`] — the [`AbiValue`] tagged-union value tree
//! - [`abi`] — contract ABIs and type-directed encode/decode of action data
//! - [`action`], [`transaction`] — actions, permission levels, transactions

pub mod abi;
pub mod action;
pub mod asset;
pub mod bytes;
pub mod crypto;
pub mod name;
pub mod ser;
pub mod time;
pub mod transaction;
pub mod value;

pub use abi::{Abi, AbiError};
pub use action::{Action, PermissionLevel};
pub use asset::{Asset, AssetError, Symbol};
pub use bytes::{sha256, Bytes, Checksum256, ChecksumError};
pub use crypto::{CryptoError, KeyType, PrivateKey, PublicKey, Signature};
pub use name::{Name, NameError};
pub use ser::{BinaryReader, BinaryWriter, CodecError, Pack, Unpack};
pub use time::TimePointSec;
pub use transaction::{Transaction, TransactionExtension};
pub use value::AbiValue;
