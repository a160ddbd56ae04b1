//! Completion records.
//!
//! An [`Operation`] is an opaque unit of completed (or about-to-complete)
//! work: a boxed handler plus the completion payload the producer attached
//! to it. Operations live in exactly one [`OpQueue`] at a time; ownership of
//! the box is the membership token, so the "one queue" invariant cannot be
//! violated without a move.
//!
//! Completing an operation consumes it. Dropping an operation without
//! completing it releases the handler uninvoked — that is the destroy path
//! taken during shutdown and abandonment.

pub mod queue;

pub use queue::OpQueue;

use crate::error::Error;
use crate::scheduler::Scheduler;
use core::fmt;

/// A completion handler.
///
/// Implementations receive the scheduler that invoked them (so they can post
/// follow-up work) and the completion payload: `Ok(task_result)` for a
/// successful completion, `Err` when the producer recorded a failure.
pub trait Handler: Send {
    /// Invokes the handler, consuming it.
    fn complete(self: Box<Self>, scheduler: &Scheduler, result: Result<usize, Error>);
}

/// Adapter so plain closures can be posted without a named handler type.
struct ClosureHandler<F>(F);

impl<F> Handler for ClosureHandler<F>
where
    F: FnOnce(&Scheduler, Result<usize, Error>) + Send,
{
    fn complete(self: Box<Self>, scheduler: &Scheduler, result: Result<usize, Error>) {
        let ClosureHandler(f) = *self;
        f(scheduler, result);
    }
}

enum OpKind {
    /// Reactor-drive token: its presence in the main queue is the right to
    /// run the reactor. Never completed.
    Task,
    Handler(Box<dyn Handler>),
}

/// A queued completion record.
pub struct Operation {
    /// Embedded queue link. Owned by the queue the operation sits in.
    pub(crate) next: Option<Box<Operation>>,
    result: Result<usize, Error>,
    kind: OpKind,
}

impl Operation {
    /// Creates an operation from a closure.
    #[must_use]
    pub fn new<F>(f: F) -> Box<Self>
    where
        F: FnOnce(&Scheduler, Result<usize, Error>) + Send + 'static,
    {
        Self::from_handler(ClosureHandler(f))
    }

    /// Creates an operation from a [`Handler`] implementation.
    #[must_use]
    pub fn from_handler(handler: impl Handler + 'static) -> Box<Self> {
        Box::new(Self {
            next: None,
            result: Ok(0),
            kind: OpKind::Handler(Box::new(handler)),
        })
    }

    /// Creates the reactor-task sentinel. One per scheduler.
    pub(crate) fn task_sentinel() -> Box<Self> {
        Box::new(Self {
            next: None,
            result: Ok(0),
            kind: OpKind::Task,
        })
    }

    /// Records the completion payload. Producers (reactors) call this before
    /// handing the operation to the scheduler.
    pub fn set_result(&mut self, result: Result<usize, Error>) {
        self.result = result;
    }

    /// Returns the recorded completion payload.
    #[must_use]
    pub fn result(&self) -> &Result<usize, Error> {
        &self.result
    }

    /// Returns true for the reactor-task sentinel.
    pub(crate) fn is_task(&self) -> bool {
        matches!(self.kind, OpKind::Task)
    }

    /// Invokes and consumes the handler. The sentinel is never completed.
    pub(crate) fn complete(self: Box<Self>, scheduler: &Scheduler) {
        let Self { kind, result, .. } = *self;
        match kind {
            OpKind::Handler(handler) => handler.complete(scheduler, result),
            OpKind::Task => debug_assert!(false, "reactor sentinel must not be completed"),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OpKind::Task => "task",
            OpKind::Handler(_) => "handler",
        };
        f.debug_struct("Operation")
            .field("kind", &kind)
            .field("queued", &self.next.is_some())
            .finish()
    }
}
