//! FIFO queues.
//!
//! All variants are dummy-head Michael-Scott queues exposed through the
//! common set interface: `insert` enqueues, `delete` dequeues (its key is
//! ignored), `find` is not meaningful.
//!
//! - [`ms::MsQueue`]: the lock-free original with tail helping.
//! - [`ms_lock::MsLockQueue`]: one mutex each for head and tail.
//! - [`optik::OptikQueue`]: locked enqueue, optimistic version-validated
//!   dequeue.
//! - [`optik::OptikLfQueue`]: lock-free enqueue, optimistic dequeue.

pub mod ms;
pub mod ms_lock;
pub mod optik;

pub use ms::MsQueue;
pub use ms_lock::MsLockQueue;
pub use optik::{OptikLfQueue, OptikQueue};
