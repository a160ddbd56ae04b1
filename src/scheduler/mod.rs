//! The completion scheduler.
//!
//! The scheduler multiplexes completion handlers across any number of
//! worker threads (threads that call a drive method) while cooperating with
//! a single blocking [`Reactor`]. All shared state sits behind one mutex:
//! the main operation queue, the lifecycle flags and the reactor handle.
//! The outstanding-work counter is atomic and read without the lock.
//!
//! # The reactor token
//!
//! The reactor is represented in the main queue by a sentinel operation.
//! Whichever worker pops the sentinel owns the right to call
//! [`Reactor::run`]; a scope guard re-queues the sentinel (and splices the
//! harvested completions) when the reactor returns, handing the right back
//! to the pool. At most one worker drives the reactor at any instant, by
//! construction.
//!
//! # Fast paths
//!
//! Posts made from inside a handler (continuations), and all posts in
//! single-threaded mode, land on the posting worker's private queue without
//! touching the mutex or the wake-up event. Private queues are spliced back
//! onto the main queue by the same scope guards, so a continuation runs on
//! its poster's thread after everything that was already queued.
//!
//! # Shutdown
//!
//! `shutdown` is terminal: every queued operation is released without being
//! invoked, the reactor handle is dropped, and later posts are ignored.

mod call_stack;
mod wakeup;

use crate::config::ConcurrencyHint;
use crate::context::ExecutionContext;
use crate::op::{OpQueue, Operation};
use crate::reactor::Reactor;
use crate::sync::{ContendedMutex, ContendedMutexGuard, LockMetricsSnapshot};
use crate::tracing_compat::{debug, trace, warn};
use self::call_stack::{FrameGuard, ThreadInfo};
use self::wakeup::WakeupEvent;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State protected by the scheduler mutex.
struct Shared {
    /// Main operation queue: real completions interleaved with the reactor
    /// sentinel. Queue order is completion order.
    op_queue: OpQueue,
    /// Drive loops exit when set; cleared by `restart`.
    stopped: bool,
    /// Terminal flag; once set no further posts are honored.
    shutdown: bool,
    /// True when the reactor is either not running or has already been
    /// asked to return as soon as possible.
    task_interrupted: bool,
    /// The reactor, installed lazily by `init_task`.
    task: Option<Arc<dyn Reactor>>,
}

type SharedGuard<'a> = ContendedMutexGuard<'a, Shared>;

/// Completion scheduler for a pool of worker threads and one reactor.
///
/// The scheduler never creates threads; any thread that calls
/// [`run`](Scheduler::run), [`run_one`](Scheduler::run_one),
/// [`wait_one`](Scheduler::wait_one), [`poll`](Scheduler::poll) or
/// [`poll_one`](Scheduler::poll_one) becomes a worker for the duration of
/// the call.
pub struct Scheduler {
    context: Arc<ExecutionContext>,
    hint: ConcurrencyHint,
    /// Derived from the hint at construction; enables the thread-local
    /// fast paths and elides cross-thread wake-ups.
    one_thread: bool,
    /// Posted-but-not-yet-completed work units. Drive methods stop the
    /// scheduler when this reaches zero.
    outstanding_work: AtomicUsize,
    shared: ContendedMutex<Shared>,
    wakeup: WakeupEvent,
}

impl Scheduler {
    /// Creates a scheduler bound to `context`, configured by `hint`.
    #[must_use]
    pub fn new(context: Arc<ExecutionContext>, hint: ConcurrencyHint) -> Self {
        Self {
            context,
            hint,
            one_thread: hint.is_single_threaded(),
            outstanding_work: AtomicUsize::new(0),
            shared: ContendedMutex::new(
                "scheduler",
                Shared {
                    op_queue: OpQueue::new(),
                    stopped: false,
                    shutdown: false,
                    task_interrupted: true,
                    task: None,
                },
            ),
            wakeup: WakeupEvent::new(),
        }
    }

    /// Returns the concurrency hint this scheduler was configured with.
    #[must_use]
    pub fn concurrency_hint(&self) -> ConcurrencyHint {
        self.hint
    }

    /// Returns the execution context this scheduler is bound to.
    #[must_use]
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Returns the current outstanding-work count.
    #[must_use]
    pub fn outstanding_work(&self) -> usize {
        self.outstanding_work.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of scheduler-mutex contention metrics (all zeros
    /// unless the `lock-metrics` feature is enabled).
    #[must_use]
    pub fn lock_metrics(&self) -> LockMetricsSnapshot {
        self.shared.snapshot()
    }

    /// Installs the reactor on first use and queues the reactor sentinel.
    ///
    /// Idempotent; ignored after `shutdown`.
    pub fn init_task(&self) {
        let mut lock = self.shared.lock();
        if lock.shutdown || lock.task.is_some() {
            return;
        }
        debug!("installing reactor task");
        lock.task = Some(self.context.reactor());
        lock.op_queue.push(Operation::task_sentinel());
        self.wake_one_thread_and_unlock(lock);
    }

    /// Shuts the scheduler down: releases every queued handler without
    /// invoking it and drops the reactor handle. Terminal and one-shot.
    pub fn shutdown(&self) {
        let mut lock = self.shared.lock();
        lock.shutdown = true;
        let mut pending = OpQueue::new();
        pending.splice(&mut lock.op_queue);
        lock.task = None;
        drop(lock);
        debug!(destroyed = pending.len(), "scheduler shut down");
        // Dropping the detached queue releases the handlers uninvoked.
        drop(pending);
    }

    // ── Drive methods ─────────────────────────────────────────────────────

    /// Runs handlers until the scheduler is stopped or runs out of work.
    /// Returns the number of handlers completed by this call.
    pub fn run(&self) -> usize {
        if self.outstanding_work.load(Ordering::SeqCst) == 0 {
            self.stop();
            return 0;
        }

        let this_thread = Rc::new(ThreadInfo::new());
        let _frame = FrameGuard::push(self.key(), Rc::clone(&this_thread));

        let mut n: usize = 0;
        loop {
            let lock = self.shared.lock();
            if self.do_run_one(lock, &this_thread) == 0 {
                break;
            }
            n = n.saturating_add(1);
        }
        n
    }

    /// Runs at most one handler, blocking until one is available, the
    /// scheduler is stopped, or it runs out of work.
    pub fn run_one(&self) -> usize {
        if self.outstanding_work.load(Ordering::SeqCst) == 0 {
            self.stop();
            return 0;
        }

        let this_thread = Rc::new(ThreadInfo::new());
        let _frame = FrameGuard::push(self.key(), Rc::clone(&this_thread));

        let lock = self.shared.lock();
        self.do_run_one(lock, &this_thread)
    }

    /// Runs at most one handler, blocking at most `timeout`.
    ///
    /// After its single bounded wait the queue is re-checked at most once
    /// (the reactor may be driven once with the remaining budget); if no
    /// real handler surfaced by then, returns 0.
    pub fn wait_one(&self, timeout: Duration) -> usize {
        if self.outstanding_work.load(Ordering::SeqCst) == 0 {
            self.stop();
            return 0;
        }

        let this_thread = Rc::new(ThreadInfo::new());
        let _frame = FrameGuard::push(self.key(), Rc::clone(&this_thread));

        let lock = self.shared.lock();
        self.do_wait_one(lock, &this_thread, timeout)
    }

    /// Runs all handlers that are ready to run without blocking. Returns
    /// the number completed.
    pub fn poll(&self) -> usize {
        if self.outstanding_work.load(Ordering::SeqCst) == 0 {
            self.stop();
            return 0;
        }

        let this_thread = Rc::new(ThreadInfo::new());
        let frame = FrameGuard::push(self.key(), Rc::clone(&this_thread));

        let mut lock = self.shared.lock();
        self.splice_outer_private_queue(&mut lock, &frame);

        let mut n: usize = 0;
        loop {
            if self.do_poll_one(lock, &this_thread) == 0 {
                break;
            }
            n = n.saturating_add(1);
            lock = self.shared.lock();
        }
        n
    }

    /// Runs at most one ready handler without blocking.
    pub fn poll_one(&self) -> usize {
        if self.outstanding_work.load(Ordering::SeqCst) == 0 {
            self.stop();
            return 0;
        }

        let this_thread = Rc::new(ThreadInfo::new());
        let frame = FrameGuard::push(self.key(), Rc::clone(&this_thread));

        let mut lock = self.shared.lock();
        self.splice_outer_private_queue(&mut lock, &frame);

        self.do_poll_one(lock, &this_thread)
    }

    /// Stops the scheduler: drive methods return as soon as the running
    /// handler (if any) finishes, until `restart` is called. Idempotent.
    pub fn stop(&self) {
        let mut lock = self.shared.lock();
        self.stop_all_threads(&mut lock);
    }

    /// Returns whether the scheduler is stopped.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Clears the stopped state so drive methods can be called again. Does
    /// not touch the outstanding-work count. Idempotent.
    pub fn restart(&self) {
        debug!("scheduler restart");
        self.shared.lock().stopped = false;
    }

    // ── Posting ───────────────────────────────────────────────────────────

    /// Accounts a new unit of outstanding work.
    pub fn work_started(&self) {
        self.outstanding_work.fetch_add(1, Ordering::SeqCst);
    }

    /// Retires a unit of outstanding work; stops the scheduler when the
    /// count reaches zero.
    pub fn work_finished(&self) {
        let previous = self.outstanding_work.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "work_finished without matching work_started");
        if previous == 1 {
            self.stop();
        }
    }

    /// Offsets the work-unit decrement of the enclosing handler's cleanup.
    ///
    /// Call from inside a handler that takes over an outstanding obligation
    /// (so completing the handler must not retire the unit). Must be called
    /// from a worker of this scheduler.
    pub fn compensating_work_started(&self) {
        let info = call_stack::contains(self.key());
        debug_assert!(
            info.is_some(),
            "compensating_work_started requires a worker context"
        );
        if let Some(info) = info {
            info.private_outstanding_work
                .set(info.private_outstanding_work.get() + 1);
        }
    }

    /// Posts a new operation, accounting a new work unit.
    ///
    /// When `is_continuation` is true (the post is made from inside a
    /// handler running on this scheduler), or in single-threaded mode, the
    /// operation goes to the posting worker's private queue: no lock, no
    /// wake-up.
    pub fn post_immediate_completion(&self, op: Box<Operation>, is_continuation: bool) {
        if self.one_thread || is_continuation {
            if let Some(info) = call_stack::contains(self.key()) {
                trace!("continuation post on private queue");
                info.private_outstanding_work
                    .set(info.private_outstanding_work.get() + 1);
                info.private_op_queue.borrow_mut().push(op);
                return;
            }
        }

        let mut lock = self.shared.lock();
        if lock.shutdown {
            drop(lock);
            warn!("post_immediate_completion after shutdown, operation destroyed");
            return;
        }
        self.work_started();
        lock.op_queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Posts an operation whose work unit was already accounted when it was
    /// first scheduled (reactor re-posts and the like).
    pub fn post_deferred_completion(&self, op: Box<Operation>) {
        if self.one_thread {
            if let Some(info) = call_stack::contains(self.key()) {
                info.private_op_queue.borrow_mut().push(op);
                return;
            }
        }

        let mut lock = self.shared.lock();
        if lock.shutdown {
            drop(lock);
            warn!("post_deferred_completion after shutdown, operation destroyed");
            return;
        }
        lock.op_queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Bulk variant of [`post_deferred_completion`](Self::post_deferred_completion).
    /// No-op on an empty queue.
    pub fn post_deferred_completions(&self, ops: &mut OpQueue) {
        if ops.is_empty() {
            return;
        }
        if self.one_thread {
            if let Some(info) = call_stack::contains(self.key()) {
                info.private_op_queue.borrow_mut().splice(ops);
                return;
            }
        }

        let mut lock = self.shared.lock();
        if lock.shutdown {
            drop(lock);
            warn!("post_deferred_completions after shutdown, operations destroyed");
            drop(std::mem::take(ops));
            return;
        }
        lock.op_queue.splice(ops);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Posts an operation on the slow path unconditionally: accounts a work
    /// unit, queues on the main queue, and wakes a worker (or interrupts
    /// the reactor).
    pub fn dispatch(&self, op: Box<Operation>) {
        let mut lock = self.shared.lock();
        if lock.shutdown {
            drop(lock);
            warn!("dispatch after shutdown, operation destroyed");
            return;
        }
        self.work_started();
        lock.op_queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Detaches the given operations from the scheduler without invoking
    /// them. The operations never run; their handlers are released when the
    /// detached queue goes away. The caller remains responsible for any
    /// outstanding-work accounting attached to them.
    pub fn abandon_operations(&self, ops: &mut OpQueue) {
        let mut abandoned = OpQueue::new();
        abandoned.splice(ops);
    }

    // ── Core ──────────────────────────────────────────────────────────────

    /// Identity key for the thread-local call stack. Stable while any drive
    /// call borrows `self`.
    fn key(&self) -> usize {
        std::ptr::addr_of!(*self) as usize
    }

    /// Splices the next-outer drive frame's private queue onto the main
    /// queue, so nested polls cannot starve continuations the outer frame
    /// already holds. Single-threaded mode only.
    fn splice_outer_private_queue(&self, lock: &mut SharedGuard<'_>, frame: &FrameGuard) {
        if self.one_thread {
            if let Some(outer) = frame.next_by_key() {
                lock.op_queue.splice(&mut outer.private_op_queue.borrow_mut());
            }
        }
    }

    fn do_run_one<'a>(&'a self, mut lock: SharedGuard<'a>, this_thread: &ThreadInfo) -> usize {
        loop {
            if lock.stopped {
                return 0;
            }

            if lock.op_queue.is_empty() {
                self.wakeup.clear(&lock);
                self.wakeup.wait(&mut lock);
                continue;
            }

            let op = lock.op_queue.pop().expect("queue is non-empty");
            let more_handlers = !lock.op_queue.is_empty();

            if op.is_task() {
                // If other work is already queued, the reactor must return
                // promptly.
                lock.task_interrupted = more_handlers;
                let task = lock.task.clone();

                if more_handlers && !self.one_thread {
                    self.wakeup.unlock_and_signal_one(lock);
                } else {
                    drop(lock);
                }

                trace!(more_handlers, "driving reactor");
                {
                    let mut cleanup = TaskCleanup::new(self, this_thread, op);
                    if let Some(task) = &task {
                        let block = if more_handlers {
                            Some(Duration::ZERO)
                        } else {
                            None
                        };
                        // May unwind; the cleanup guard still splices and
                        // re-queues the sentinel.
                        task.run(block, cleanup.harvest_queue());
                    }
                }

                lock = self.shared.lock();
            } else {
                if more_handlers && !self.one_thread {
                    self.wake_one_thread_and_unlock(lock);
                } else {
                    drop(lock);
                }

                // The guard retires the work unit and splices continuation
                // posts even when the handler unwinds.
                let _cleanup = WorkCleanup::new(self, this_thread);
                op.complete(self);
                return 1;
            }
        }
    }

    fn do_wait_one<'a>(
        &'a self,
        mut lock: SharedGuard<'a>,
        this_thread: &ThreadInfo,
        mut timeout: Duration,
    ) -> usize {
        if lock.stopped {
            return 0;
        }

        if lock.op_queue.is_empty() {
            self.wakeup.clear(&lock);
            self.wakeup.wait_for(&mut lock, timeout);
            // Wait at most once; any further blocking budget goes to the
            // reactor below.
            timeout = Duration::ZERO;
        }

        if lock.op_queue.front().is_some_and(Operation::is_task) {
            let op = lock.op_queue.pop().expect("front was the sentinel");
            let more_handlers = !lock.op_queue.is_empty();

            lock.task_interrupted = more_handlers;
            let task = lock.task.clone();

            if more_handlers && !self.one_thread {
                self.wakeup.unlock_and_signal_one(lock);
            } else {
                drop(lock);
            }

            {
                let mut cleanup = TaskCleanup::new(self, this_thread, op);
                if let Some(task) = &task {
                    let block = if more_handlers {
                        Duration::ZERO
                    } else {
                        timeout
                    };
                    task.run(Some(block), cleanup.harvest_queue());
                }
            }

            lock = self.shared.lock();
            if lock.op_queue.front().is_some_and(Operation::is_task) {
                // The reactor produced nothing; give up, but pass the
                // signal on in case another worker can make progress.
                if let Some(lock) = self.wakeup.maybe_unlock_and_signal_one(lock) {
                    drop(lock);
                }
                return 0;
            }
        }

        let Some(op) = lock.op_queue.pop() else {
            return 0;
        };
        let more_handlers = !lock.op_queue.is_empty();

        if more_handlers && !self.one_thread {
            self.wake_one_thread_and_unlock(lock);
        } else {
            drop(lock);
        }

        let _cleanup = WorkCleanup::new(self, this_thread);
        op.complete(self);
        1
    }

    fn do_poll_one<'a>(&'a self, mut lock: SharedGuard<'a>, this_thread: &ThreadInfo) -> usize {
        if lock.stopped {
            return 0;
        }

        if lock.op_queue.front().is_some_and(Operation::is_task) {
            let op = lock.op_queue.pop().expect("front was the sentinel");
            let task = lock.task.clone();
            drop(lock);

            {
                let mut cleanup = TaskCleanup::new(self, this_thread, op);
                if let Some(task) = &task {
                    task.run(Some(Duration::ZERO), cleanup.harvest_queue());
                }
            }

            lock = self.shared.lock();
            if lock.op_queue.front().is_some_and(Operation::is_task) {
                // Nothing but the sentinel: emit a best-effort wake so a
                // sleeping worker re-checks, and report no progress.
                if let Some(lock) = self.wakeup.maybe_unlock_and_signal_one(lock) {
                    drop(lock);
                }
                return 0;
            }
        }

        let Some(op) = lock.op_queue.pop() else {
            return 0;
        };
        let more_handlers = !lock.op_queue.is_empty();

        if more_handlers && !self.one_thread {
            self.wake_one_thread_and_unlock(lock);
        } else {
            drop(lock);
        }

        let _cleanup = WorkCleanup::new(self, this_thread);
        op.complete(self);
        1
    }

    /// Wakes one sleeping worker if there is one; otherwise interrupts the
    /// reactor so it re-enters the loop and picks up the new work. Either
    /// way the lock is released. This is the single decision point that
    /// prevents head-of-line blocking behind a sleeping reactor.
    fn wake_one_thread_and_unlock(&self, lock: SharedGuard<'_>) {
        if let Some(mut lock) = self.wakeup.maybe_unlock_and_signal_one(lock) {
            if !lock.task_interrupted {
                if let Some(task) = lock.task.clone() {
                    lock.task_interrupted = true;
                    task.interrupt();
                }
            }
        }
    }

    fn stop_all_threads(&self, lock: &mut SharedGuard<'_>) {
        if !lock.stopped {
            debug!("scheduler stop");
        }
        lock.stopped = true;
        self.wakeup.signal_all(lock);

        if !lock.task_interrupted {
            if let Some(task) = lock.task.clone() {
                lock.task_interrupted = true;
                task.interrupt();
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("one_thread", &self.one_thread)
            .field("outstanding_work", &self.outstanding_work())
            .finish_non_exhaustive()
    }
}

/// Scope guard for a worker that drove the reactor: folds the private work
/// count into the shared counter, splices harvested completions and
/// continuation posts onto the main queue, and re-queues the reactor
/// sentinel. Runs on every exit path, including unwinds out of
/// [`Reactor::run`].
struct TaskCleanup<'a> {
    scheduler: &'a Scheduler,
    this_thread: &'a ThreadInfo,
    task_op: Option<Box<Operation>>,
    harvested: OpQueue,
}

impl<'a> TaskCleanup<'a> {
    fn new(scheduler: &'a Scheduler, this_thread: &'a ThreadInfo, task_op: Box<Operation>) -> Self {
        debug_assert!(task_op.is_task(), "task cleanup guards the sentinel");
        Self {
            scheduler,
            this_thread,
            task_op: Some(task_op),
            harvested: OpQueue::new(),
        }
    }

    /// The queue the reactor appends ready completions to.
    fn harvest_queue(&mut self) -> &mut OpQueue {
        &mut self.harvested
    }
}

impl Drop for TaskCleanup<'_> {
    fn drop(&mut self) {
        let private_work = self.this_thread.private_outstanding_work.replace(0);
        if private_work > 0 {
            self.scheduler
                .outstanding_work
                .fetch_add(private_work, Ordering::SeqCst);
        }

        let mut lock = self.scheduler.shared.lock();
        lock.task_interrupted = true;
        lock.op_queue.splice(&mut self.harvested);
        lock.op_queue
            .splice(&mut self.this_thread.private_op_queue.borrow_mut());
        if let Some(op) = self.task_op.take() {
            lock.op_queue.push(op);
        }
    }
}

/// Scope guard for a worker completing one real operation: reconciles the
/// private work count against the completed unit (calling
/// [`Scheduler::work_finished`] when nothing offsets it) and splices
/// continuation posts onto the main queue. Runs even when the handler
/// unwinds.
struct WorkCleanup<'a> {
    scheduler: &'a Scheduler,
    this_thread: &'a ThreadInfo,
}

impl<'a> WorkCleanup<'a> {
    fn new(scheduler: &'a Scheduler, this_thread: &'a ThreadInfo) -> Self {
        Self {
            scheduler,
            this_thread,
        }
    }
}

impl Drop for WorkCleanup<'_> {
    fn drop(&mut self) {
        let private_work = self.this_thread.private_outstanding_work.replace(0);
        if private_work > 1 {
            // One unit pays for the operation just completed.
            self.scheduler
                .outstanding_work
                .fetch_add(private_work - 1, Ordering::SeqCst);
        } else if private_work == 0 {
            self.scheduler.work_finished();
        }

        let mut private_queue = self.this_thread.private_op_queue.borrow_mut();
        if !private_queue.is_empty() {
            let mut lock = self.scheduler.shared.lock();
            lock.op_queue.splice(&mut private_queue);
        }
    }
}
