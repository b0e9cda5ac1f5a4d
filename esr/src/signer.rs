//! The signature provider seam.

use esr_abi::{Checksum256, Name, PrivateKey};

use crate::error::ProviderError;
use crate::payload::RequestSignature;

/// Produces an originator signature over a 32-byte request digest.
pub trait SignatureProvider: Send + Sync {
    /// Signs `digest`, returning the signer name and signature.
    ///
    /// # Errors
    ///
    /// Implementation-defined; propagated to the caller unchanged.
    fn sign(&self, digest: &Checksum256) -> Result<RequestSignature, ProviderError>;
}

/// The obvious provider: a name vouching with a private key.
impl SignatureProvider for (Name, PrivateKey) {
    fn sign(&self, digest: &Checksum256) -> Result<RequestSignature, ProviderError> {
        Ok(RequestSignature {
            signer: self.0,
            signature: self.1.sign(digest)?,
        })
    }
}
