//! Value codec collaborators.
//!
//! The cache never stores a live `V`: on `put` the value is serialized and
//! the resulting bytes compressed; on `get` the stored bytes are
//! uncompressed and deserialized. Both halves are pluggable:
//!
//! - [`Codec`] turns values into byte strings and back, with the law
//!   `deserialize(serialize(v)) == v` for every supported value.
//! - [`Compression`] shrinks opaque byte strings, with the law
//!   `uncompress(compress(b)) == b`.
//!
//! The defaults are [`Bincode`] and [`Lz4`]. Numeric scalars, byte strings
//! and user-defined types are all covered by the same serde bounds; the
//! cache itself is oblivious to which kind it is storing.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Serializes values to byte strings and back.
pub trait Codec {
    /// Encodes `value` into bytes.
    fn serialize<V: Serialize>(value: &V) -> Result<Vec<u8>, CodecError>;

    /// Decodes a value previously produced by [`Codec::serialize`].
    fn deserialize<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, CodecError>;
}

/// Compresses opaque byte strings.
pub trait Compression {
    /// Compresses `bytes`.
    fn compress(bytes: &[u8]) -> Vec<u8>;

    /// Reverses [`Compression::compress`].
    fn uncompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Default codec backed by bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bincode;

impl Codec for Bincode {
    fn serialize<V: Serialize>(value: &V) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(CodecError::Serialize)
    }

    fn deserialize<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Deserialize)
    }
}

/// Default compressor: LZ4 block format with the uncompressed size
/// prepended, so decompression needs no out-of-band length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

impl Compression for Lz4 {
    fn compress(bytes: &[u8]) -> Vec<u8> {
        lz4_flex::compress_prepend_size(bytes)
    }

    fn uncompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(bytes).map_err(CodecError::Decompress)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        hits: u64,
        flags: Vec<bool>,
    }

    fn roundtrip<V: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug>(value: V) {
        let stored = Lz4::compress(&Bincode::serialize(&value).unwrap());
        let restored: V = Bincode::deserialize(&Lz4::uncompress(&stored).unwrap()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn roundtrip_numeric_scalars() {
        roundtrip(2606i32);
        roundtrip(u64::MAX);
        roundtrip(-1.5f64);
    }

    #[test]
    fn roundtrip_byte_strings() {
        roundtrip(String::from("hello cache"));
        roundtrip(vec![0u8, 1, 2, 255]);
        roundtrip(Vec::<u8>::new());
    }

    #[test]
    fn roundtrip_opaque_user_type() {
        roundtrip(Session {
            user: "ada".into(),
            hits: 42,
            flags: vec![true, false, true],
        });
    }

    #[test]
    fn compression_shrinks_repetitive_payloads() {
        let payload = vec![7u8; 64 * 1024];
        let compressed = Lz4::compress(&payload);
        assert!(compressed.len() < payload.len());
        assert_eq!(Lz4::uncompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn uncompress_rejects_garbage() {
        // A size header promising more data than the truncated block holds.
        let garbage = vec![64, 0, 0, 0, 0xff];
        assert!(matches!(
            Lz4::uncompress(&garbage),
            Err(CodecError::Decompress(_))
        ));
    }

    #[test]
    fn deserialize_rejects_truncated_input() {
        let bytes = Bincode::serialize(&String::from("truncate me")).unwrap();
        assert!(matches!(
            Bincode::deserialize::<String>(&bytes[..bytes.len() - 1]),
            Err(CodecError::Deserialize(_))
        ));
    }
}
