//! Reactor abstraction.
//!
//! The scheduler drives exactly one reactor: the OS event demultiplexer
//! (epoll/kqueue/IOCP) or, in tests, the deterministic [`LabReactor`]. The
//! scheduler only needs the two entry points below; registration of IO
//! sources, timers and the rest of a real reactor's surface belong to the
//! layers above and are not part of this crate.

pub mod lab;

pub use lab::LabReactor;

use crate::op::OpQueue;
use std::time::Duration;

/// The blocking event-demultiplexer the scheduler cooperates with.
///
/// At most one worker calls [`run`](Reactor::run) at a time; that exclusion
/// is enforced by the scheduler, not the reactor. [`interrupt`](Reactor::interrupt)
/// may be called from any thread at any time.
pub trait Reactor: Send + Sync {
    /// Harvests ready completions into `ops`, blocking up to `timeout`.
    ///
    /// `None` blocks until completions arrive or [`interrupt`](Reactor::interrupt)
    /// is called; `Some(Duration::ZERO)` polls without blocking. A return
    /// with an empty `ops` carries no meaning beyond "re-check the queues".
    fn run(&self, timeout: Option<Duration>, ops: &mut OpQueue);

    /// Forces an in-progress [`run`](Reactor::run) to return promptly. An
    /// interrupt delivered while no `run` is in progress makes the next
    /// `run` return immediately instead.
    fn interrupt(&self);
}
