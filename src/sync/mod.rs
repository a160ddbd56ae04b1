//! Synchronization support for the scheduler.
//!
//! The scheduler serializes all shared mutable state behind a single
//! [`ContendedMutex`]; the `lock-metrics` feature turns it into a
//! contention-instrumented lock whose snapshot the tests (and operators)
//! can read.

mod contended_mutex;

pub use contended_mutex::{ContendedMutex, ContendedMutexGuard, LockMetricsSnapshot};
