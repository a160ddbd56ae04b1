//! Completion scheduler for networking/IO runtimes.
//!
//! `opsched` multiplexes an unbounded set of completion handlers (user
//! callbacks resulting from asynchronous IO, timers, or explicit posts)
//! across a pool of worker threads, cooperating with a single blocking
//! reactor task (the OS event demultiplexer). Worker threads are whatever
//! threads call the drive methods; the scheduler never spawns any.
//!
//! # Architecture
//!
//! ```text
//! producers ──► Scheduler::dispatch / post_* ──► main op queue (mutex)
//!                                                    │
//!                        ┌───────────────────────────┤
//!                        ▼                           ▼
//!               worker pops handler          worker pops sentinel
//!               runs it unlocked             drives Reactor::run
//!               (continuations go to         harvested completions
//!                the private queue)          splice back, sentinel
//!                                            re-queued
//! ```
//!
//! Exactly one worker drives the reactor at a time: the right to do so is
//! the sentinel operation popped from the main queue. Posts from outside
//! the pool either wake a sleeping worker or interrupt the reactor, so new
//! work is never stuck behind a blocking poll.
//!
//! # Example
//!
//! ```
//! use opsched::{ConcurrencyHint, ExecutionContext, Operation, Scheduler};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let context = Arc::new(ExecutionContext::new());
//! let scheduler = Scheduler::new(context, ConcurrencyHint::single_threaded());
//!
//! let completed = Arc::new(AtomicUsize::new(0));
//! for _ in 0..3 {
//!     let completed = Arc::clone(&completed);
//!     scheduler.post_immediate_completion(
//!         Operation::new(move |_scheduler, _result| {
//!             completed.fetch_add(1, Ordering::SeqCst);
//!         }),
//!         false,
//!     );
//! }
//!
//! assert_eq!(scheduler.run(), 3);
//! assert_eq!(completed.load(Ordering::SeqCst), 3);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod op;
pub mod reactor;
pub mod scheduler;
pub mod sync;

pub(crate) mod tracing_compat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::ConcurrencyHint;
pub use context::ExecutionContext;
pub use error::{Error, ErrorKind};
pub use op::{Handler, OpQueue, Operation};
pub use reactor::{LabReactor, Reactor};
pub use scheduler::Scheduler;
