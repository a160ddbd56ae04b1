//! Deterministic lab reactor.
//!
//! The lab reactor provides a controllable, deterministic completion source
//! for testing the scheduler without OS-level polling. Tests inject
//! completions (with success or failure payloads) and the reactor hands
//! them to whichever worker is driving it, honoring the blocking contract
//! of [`Reactor::run`] including the interrupt latch.

use super::Reactor;
use crate::error::Error;
use crate::op::{Operation, OpQueue};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Deterministic reactor implementation for tests and examples.
#[derive(Debug)]
pub struct LabReactor {
    state: Mutex<LabState>,
    cond: Condvar,
    run_calls: AtomicUsize,
    interrupt_calls: AtomicUsize,
}

#[derive(Debug, Default)]
struct LabState {
    /// Injected completions pending harvest.
    ready: OpQueue,
    /// Interrupt latch: set by `interrupt`, consumed by the next `run`.
    interrupted: bool,
}

impl LabReactor {
    /// Creates a new lab reactor with no pending completions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LabState::default()),
            cond: Condvar::new(),
            run_calls: AtomicUsize::new(0),
            interrupt_calls: AtomicUsize::new(0),
        }
    }

    /// Injects a ready operation; the next (or current) `run` harvests it.
    pub fn inject(&self, op: Box<Operation>) {
        let mut state = self.state.lock();
        state.ready.push(op);
        self.cond.notify_all();
    }

    /// Injects a completion with an explicit payload.
    pub fn inject_completion(
        &self,
        mut op: Box<Operation>,
        result: Result<usize, Error>,
    ) {
        op.set_result(result);
        self.inject(op);
    }

    /// Number of pending (injected but unharvested) completions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Number of times `run` has been entered.
    #[must_use]
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::Relaxed)
    }

    /// Number of times `interrupt` has been called.
    #[must_use]
    pub fn interrupt_calls(&self) -> usize {
        self.interrupt_calls.load(Ordering::Relaxed)
    }
}

impl Default for LabReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for LabReactor {
    fn run(&self, timeout: Option<Duration>, ops: &mut OpQueue) {
        self.run_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        match timeout {
            Some(bound) if bound.is_zero() => {}
            Some(bound) => {
                let deadline = Instant::now().checked_add(bound);
                while state.ready.is_empty() && !state.interrupted {
                    match deadline {
                        Some(deadline) => {
                            if self.cond.wait_until(&mut state, deadline).timed_out() {
                                break;
                            }
                        }
                        // Timeout too large to represent; treat as unbounded.
                        None => self.cond.wait(&mut state),
                    }
                }
            }
            None => {
                while state.ready.is_empty() && !state.interrupted {
                    self.cond.wait(&mut state);
                }
            }
        }
        state.interrupted = false;
        ops.splice(&mut state.ready);
    }

    fn interrupt(&self) {
        self.interrupt_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.interrupted = true;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn nonblocking_run_harvests_injected_completions() {
        let reactor = LabReactor::new();
        reactor.inject(Operation::new(|_, _| {}));
        reactor.inject(Operation::new(|_, _| {}));
        assert_eq!(reactor.pending(), 2);

        let mut ops = OpQueue::new();
        reactor.run(Some(Duration::ZERO), &mut ops);
        assert_eq!(ops.len(), 2);
        assert_eq!(reactor.pending(), 0);
        assert_eq!(reactor.run_calls(), 1);
    }

    #[test]
    fn nonblocking_run_with_nothing_ready_returns_empty() {
        let reactor = LabReactor::new();
        let mut ops = OpQueue::new();
        reactor.run(Some(Duration::ZERO), &mut ops);
        assert!(ops.is_empty());
    }

    #[test]
    fn bounded_run_times_out_without_completions() {
        let reactor = LabReactor::new();
        let mut ops = OpQueue::new();
        let start = Instant::now();
        reactor.run(Some(Duration::from_millis(20)), &mut ops);
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(ops.is_empty());
    }

    #[test]
    fn unbounded_run_returns_when_completion_arrives() {
        let reactor = Arc::new(LabReactor::new());
        let reactor2 = Arc::clone(&reactor);

        let injector = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            reactor2.inject(Operation::new(|_, _| {}));
        });

        let mut ops = OpQueue::new();
        reactor.run(None, &mut ops);
        assert_eq!(ops.len(), 1);
        injector.join().expect("injector should finish");
    }

    #[test]
    fn interrupt_forces_blocking_run_to_return() {
        let reactor = Arc::new(LabReactor::new());
        let reactor2 = Arc::clone(&reactor);

        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            reactor2.interrupt();
        });

        let mut ops = OpQueue::new();
        reactor.run(None, &mut ops);
        assert!(ops.is_empty());
        assert_eq!(reactor.interrupt_calls(), 1);
        interrupter.join().expect("interrupter should finish");
    }

    #[test]
    fn interrupt_latch_covers_the_next_run() {
        let reactor = LabReactor::new();
        reactor.interrupt();

        // The pending interrupt makes this unbounded run return immediately.
        let mut ops = OpQueue::new();
        let start = Instant::now();
        reactor.run(None, &mut ops);
        assert!(start.elapsed() < Duration::from_secs(1));

        // The latch is consumed: a bounded run now waits again.
        let start = Instant::now();
        reactor.run(Some(Duration::from_millis(20)), &mut ops);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn injected_payload_is_preserved() {
        let reactor = LabReactor::new();
        reactor.inject_completion(Operation::new(|_, _| {}), Ok(512));

        let mut ops = OpQueue::new();
        reactor.run(Some(Duration::ZERO), &mut ops);
        let op = ops.pop().expect("one completion harvested");
        assert_eq!(*op.result(), Ok(512));
    }
}
