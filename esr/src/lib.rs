//! EOSIO Signing Request (ESR) protocol.
//!
//! A signing request carries a proposed transaction (or an identity
//! attestation request) from an application to a wallet, together with
//! enough metadata for the wallet to complete, sign, broadcast and call
//! back without further negotiation. This crate implements the whole
//! protocol core: the compact binary wire format with optional compression
//! and originator signature, the `esr:` text carrier, the resolution state
//! machine, callback templating and identity proofs.
//!
//! # Modules
//!
//! - [`request`] — [`SigningRequest`]: builder, framing, queries, mutators
//! - [`resolve`] — resolution into a signable transaction and callbacks
//! - [`identity`] — identity proofs and authority verification
//! - [`chain`] — chain ids and the well-known alias table
//! - [`payload`] — the versioned wire payload (v2 and v3)
//! - [`abi_provider`] / [`signer`] / [`compression`] — the collaborator
//!   seams: ABI fetching, originator signing, frame compression
//! - [`base64u`] — the URL-safe unpadded base64 variant
//!
//! # Example
//!
//! Building, encoding and re-decoding a request:
//!
//! ```no_run
//! use esr::{RequestArgs, RequestOptions, SigningRequest};
//!
//! # fn main() -> Result<(), esr::RequestError> {
//! let args = RequestArgs {
//!     transaction: Some(esr::ProposedTransaction::default()),
//!     ..RequestArgs::default()
//! };
//! let request = SigningRequest::create_sync(
//!     args,
//!     &RequestOptions::default(),
//!     &esr::AbiMap::new(),
//! )?;
//! let uri = request.to_string();
//! let decoded = SigningRequest::from_uri(&uri, &RequestOptions::default())?;
//! assert_eq!(decoded, request);
//! # Ok(())
//! # }
//! ```

pub mod abi_provider;
pub mod base64u;
pub mod chain;
pub mod compression;
pub mod error;
pub mod identity;
pub mod payload;
pub mod request;
pub mod resolve;
pub mod signer;

pub use abi_provider::{AbiMap, AbiProvider, StaticAbiProvider};
pub use chain::{ChainAlias, ChainId, ChainIdVariant};
pub use compression::{Compressor, DeflateCompressor};
pub use error::{ProviderError, RequestError};
pub use identity::{Authority, IdentityProof, KeyWeight};
pub use payload::{
    IdentityBody, IdentityV2, IdentityV3, InfoPair, ProtocolVersion, RequestFlags,
    RequestPayload, RequestSignature, RequestVariant,
};
pub use request::{
    placeholder_auth, ActionData, CallbackInit, ChainArg, EncodeOptions,
    IdentityArgs, InfoValue, ProposedAction, ProposedTransaction, RequestArgs,
    RequestOptions, SigningRequest, CHAIN_IDS_KEY, PLACEHOLDER_NAME,
    PLACEHOLDER_PERMISSION,
};
pub use resolve::{
    CallbackPayload, ResolvedAction, ResolvedCallback, ResolvedRequest,
    ResolvedTransaction, TransactionContext,
};
pub use signer::SignatureProvider;

/// Re-export of the primitives crate.
pub use esr_abi;

/// MIME type for signing request payloads.
pub const MIME_TYPE: &str = "application/eosio-signing-request";

/// File extension for stored signing requests.
pub const FILE_EXTENSION: &str = ".esr";
