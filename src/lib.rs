//! lfru: bounded in-memory key/value cache with LFRU eviction and TTL
//! expiration.
//!
//! Values are stored serialized and compressed. Eviction removes the
//! least-recently-used key inside the least-frequently-used bucket; a
//! background reaper sweeps expired entries. The whole cache sits behind
//! one coarse mutex and is safe to share across threads.

pub mod builder;
pub mod cache;
pub mod codec;
pub mod ds;
pub mod error;
pub mod mem;
mod reaper;

pub use builder::MemCacheBuilder;
pub use cache::MemCache;
pub use codec::{Bincode, Codec, Compression, Lz4};
pub use error::{CacheError, CodecError};
pub use mem::{MemoryProbe, SystemMemoryProbe};
