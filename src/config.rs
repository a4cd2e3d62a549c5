//! Per-structure construction parameters.
//!
//! The benchmark harness derives these from its command line once and hands
//! the record to every constructor; nothing reads process-wide state after
//! construction.

/// Hard cap on skip-list height, matching the width of the level arrays
/// carried on each search.
pub const LEVEL_CAP: usize = 64;

/// Cap accepted by the Pugh and sequential skip lists. Their search state
/// still uses [`LEVEL_CAP`]-sized arrays so the two caps cannot drift apart.
pub const LEVEL_CAP_SMALL: usize = 32;

/// Construction-time configuration shared by all structures.
///
/// Skip lists read `level_max`; hash tables read `capacity`, `concurrency`
/// and `buckets`. A structure ignores the fields it has no use for.
#[derive(Debug, Clone, Copy)]
pub struct SetConfig {
    /// Tallest tower a skip-list node may receive. Usually `log2(initial)`.
    pub level_max: usize,
    /// Total bucket capacity of the segmented hash table.
    pub capacity: usize,
    /// Segment count of the segmented hash table; must be a power of two.
    pub concurrency: usize,
    /// Bucket count of the non-segmented hash tables; must be a power of two.
    pub buckets: usize,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            level_max: 16,
            capacity: 1024,
            concurrency: 512,
            buckets: 64,
        }
    }
}

impl SetConfig {
    /// Config sized for an expected initial population.
    ///
    /// Rounds nothing; callers are expected to pass powers of two where a
    /// structure requires them (the harness rounds up before calling).
    #[must_use]
    pub fn for_initial(initial: usize) -> Self {
        Self {
            level_max: usize::max(1, initial.next_power_of_two().trailing_zeros() as usize),
            capacity: initial,
            ..Self::default()
        }
    }
}
