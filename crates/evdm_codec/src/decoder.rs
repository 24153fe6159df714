//! CBOR decoder.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;

/// Decodes a value from CBOR bytes.
///
/// The whole input must be consumed by the value.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] for malformed input or a type
/// mismatch, and [`CodecError::TrailingBytes`] if input remains.
pub fn from_cbor<T>(bytes: &[u8]) -> CodecResult<T>
where
    T: DeserializeOwned,
{
    let mut reader = bytes;
    let value = ciborium::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    Ok(value)
}

/// Types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decodes a value from bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
