//! The URL-safe unpadded base64 variant used by the text carrier.
//!
//! Encoding always produces the `-`/`_` alphabet with no padding. Decoding
//! additionally accepts `+` and `/` (the standard alphabet) and ignores any
//! `=` padding, so request strings survive naive URL re-encoders.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encodes bytes as unpadded URL-safe base64.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes base64, tolerating both alphabets and optional padding.
///
/// # Errors
///
/// Returns the underlying decode error for characters outside either
/// alphabet or an impossible length.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = data
        .chars()
        .filter(|&c| c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized)
}
