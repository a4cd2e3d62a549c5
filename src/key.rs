//! Key and value types shared by every structure.
//!
//! Keys and values are signed 64-bit integers. The two extreme values are
//! reserved as sentinels: `KEY_MIN` anchors list and skip-list heads,
//! `KEY_MAX` anchors tails. User keys must lie strictly between them.

/// Key type of every set in the suite.
pub type Key = i64;

/// Opaque payload stored alongside a key.
pub type Val = i64;

/// Sentinel key of head nodes; strictly less than any user key.
pub const KEY_MIN: Key = i64::MIN;

/// Sentinel key of tail nodes; strictly greater than any user key.
pub const KEY_MAX: Key = i64::MAX;
