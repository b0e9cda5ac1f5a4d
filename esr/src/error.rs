//! Error types for the signing request protocol.

use esr_abi::{AbiError, CodecError, CryptoError, Name};

/// Errors produced by providers plugged into the protocol core; they are
/// propagated unchanged.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong building, decoding, resolving or signing
/// a request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RequestError {
    /// The textual carrier does not start with a known URI scheme.
    #[error("unknown URI scheme")]
    InvalidScheme,

    /// The carrier body is not valid base64u.
    #[error("malformed request URI: {0}")]
    InvalidUri(#[from] base64::DecodeError),

    /// The frame header declares a version other than 2 or 3.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// The frame is compressed but no compressor was supplied.
    #[error("compressed request but no compressor available")]
    MissingCompressor,

    /// The payload bytes are structurally invalid.
    #[error("invalid request data: {0}")]
    Decode(#[from] CodecError),

    /// The builder needs exactly one of action, actions, transaction or
    /// identity.
    #[error("expected exactly one of action, actions, transaction or identity")]
    InvalidDescriptor,

    /// Action data needs ABI encoding but no provider was supplied.
    #[error("missing ABI provider")]
    MissingAbiProvider,

    /// No ABI was supplied for a required account.
    #[error("missing ABI for account {0}")]
    MissingAbi(Name),

    /// The chain alias is not in the alias table.
    #[error("unknown chain alias {0}")]
    UnknownAlias(u8),

    /// The resolution context cannot fill a null transaction header.
    #[error("missing TAPoS values in transaction context")]
    MissingTapos,

    /// A multi-chain request was resolved without a usable chain choice.
    #[error("invalid chain for request")]
    BadChain,

    /// Identity requests can never be broadcast.
    #[error("identity requests cannot be broadcast")]
    IdentityBroadcast,

    /// The operation is only defined for identity requests.
    #[error("not an identity request")]
    NotIdentity,

    /// A callback needs at least one signature.
    #[error("callback requires at least one signature")]
    NeedSignature,

    /// The identity proof string is malformed.
    #[error("malformed identity proof")]
    BadProof,

    /// ABI-level encode or decode failure.
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// Key or signature handling failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An external provider (ABI, compressor, signature) failed.
    #[error("provider error: {0}")]
    Provider(#[source] ProviderError),
}

impl RequestError {
    /// Wraps a provider failure for propagation.
    #[must_use]
    pub fn provider<E: Into<ProviderError>>(err: E) -> Self {
        Self::Provider(err.into())
    }
}
