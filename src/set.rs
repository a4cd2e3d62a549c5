//! The uniform key/value set interface every structure implements.

use crate::key::{Key, Val};

/// A concurrent mapping from [`Key`] to [`Val`].
///
/// # Contract
///
/// - `find(k)` returns `Some(v)` iff a prior successful `insert(k, v)` has
///   not since been undone by `delete(k)`.
/// - `insert(k, v)` returns `true` iff `k` was absent; a duplicate insert is
///   a no-op.
/// - `delete(k)` returns the value present at the time of removal, `None` if
///   `k` was absent.
/// - `size()` is an O(n) traversal. It may be approximate while operations
///   are in flight but is exact in quiescence.
///
/// All operations are linearizable per key. Queues and stacks reuse the
/// interface as FIFO/LIFO containers: their `delete` ignores its argument
/// (dequeue head / pop top) and their `find` is not meaningful, which they
/// advertise through [`ConcurrentSet::find_is_def`]. The priority queue's
/// `delete` removes the minimum key.
pub trait ConcurrentSet: Send + Sync {
    /// Look up `key`.
    fn find(&self, key: Key) -> Option<Val>;

    /// Insert `key -> val` if absent; returns whether the insert took.
    fn insert(&self, key: Key, val: Val) -> bool;

    /// Remove `key`, returning the removed value.
    fn delete(&self, key: Key) -> Option<Val>;

    /// Number of live entries.
    fn size(&self) -> usize;

    /// Whether `find` is semantically meaningful for this structure.
    ///
    /// `false` for queues and stacks, where `find` trivially reports
    /// presence. The benchmark harness forces a 100% update mix for such
    /// structures.
    fn find_is_def(&self) -> bool {
        true
    }
}
