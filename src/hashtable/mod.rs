//! Hash-table sets.
//!
//! Five designs, all partitioning keys by their low bits (or by modulus for
//! the server variant):
//!
//! - [`java::JavaHashTable`]: segmented in the style of the classic
//!   `ConcurrentHashMap`, one lock and one chained table per segment,
//!   per-segment rehash that doubles the bucket count in place.
//! - [`cow::CowHashTable`]: each bucket is an immutable entry array
//!   republished on every write.
//! - [`optik::OptikHashTable`]: one sorted list per bucket, validated by a
//!   single bucket-level versioned lock.
//! - [`locked::LockedHashTable`]: plain mutex-per-bucket map, the baseline
//!   the message-passing variant is compared against.
//! - [`server::ServerHashTable`]: one worker thread per bucket; operations
//!   are messages with per-request reply channels, so bucket state is never
//!   shared.

pub mod cow;
pub mod java;
pub mod locked;
pub mod optik;
pub mod server;

pub use cow::CowHashTable;
pub use java::JavaHashTable;
pub use locked::LockedHashTable;
pub use optik::OptikHashTable;
pub use server::ServerHashTable;
