//! Frame compression.
//!
//! The frame body may be raw-DEFLATE compressed (no zlib wrapper, no
//! checksum). Compression is pluggable through the [`Compressor`] trait so
//! embedders can bring their own codec; [`DeflateCompressor`] is the
//! flate2-backed implementation used by default.

use std::io::Read;

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;

use crate::error::ProviderError;

/// Raw DEFLATE / INFLATE over byte arrays.
pub trait Compressor: Send + Sync {
    /// Compresses `data` with raw DEFLATE.
    ///
    /// # Errors
    ///
    /// Implementation-defined; errors are treated as "do not compress" on
    /// encode and propagated on decode.
    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Decompresses raw-DEFLATE `data`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically corrupt input.
    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>, ProviderError>;
}

/// The flate2-backed [`Compressor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateCompressor;

/// A shared instance, usable as the default `&dyn Compressor`.
pub static DEFLATE: DeflateCompressor = DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let mut out = Vec::new();
        DeflateEncoder::new(data, Compression::default()).read_to_end(&mut out)?;
        Ok(out)
    }

    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let mut out = Vec::new();
        DeflateDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}
