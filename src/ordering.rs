//! Standard memory orderings for concurrent node access.
//!
//! These constants keep ordering usage consistent across the structures and
//! make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading next-pointers and flags during optimistic traversal.
/// Pairs with writers' Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing a node or flag under a held lock.
/// Pairs with readers' Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for the CAS that marks or unlinks a node. The mark bit carries
/// the linearization point, so it stays sequentially consistent.
pub const MARK_ORD: Ordering = Ordering::SeqCst;

/// Ordering for relaxed accesses within a locked region or on
/// pre-publication nodes.
pub const RELAXED: Ordering = Ordering::Relaxed;
