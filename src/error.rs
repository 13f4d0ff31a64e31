//! Error types for the lfru library.
//!
//! The taxonomy is deliberately small: a `get` miss is `Ok(None)` rather
//! than an error, and `remove` of an absent key returns `false`. Only codec
//! round-trips and over-ambitious resizes can actually fail, and those
//! surface through the enums below.

use thiserror::Error;

/// Failures raised by the value codec collaborators.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized before storage.
    #[error("value serialization failed: {0}")]
    Serialize(#[source] bincode::Error),

    /// Stored bytes could not be deserialized back into the value type.
    #[error("value deserialization failed: {0}")]
    Deserialize(#[source] bincode::Error),

    /// Stored payload is not a valid compressed block.
    #[error("stored payload failed to decompress: {0}")]
    Decompress(#[source] lz4_flex::block::DecompressError),
}

/// Failures surfaced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A codec collaborator failed; the cache state is unchanged.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// `resize` was rejected because the estimated footprint of the
    /// requested capacity exceeds the available memory.
    #[error(
        "resize to {requested} entries rejected: \
         estimated footprint {required_bytes} bytes, {available_bytes} bytes available"
    )]
    CapacityRejected {
        /// The capacity that was requested.
        requested: usize,
        /// Rough minimum footprint of `requested` entries.
        required_bytes: u64,
        /// What the memory probe reported as free.
        available_bytes: u64,
    },
}
