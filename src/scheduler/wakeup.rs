//! Wake-up event for idle workers.
//!
//! A condition primitive paired with the scheduler mutex. The state word
//! packs a sticky signal bit (bit 0) with a waiter count (remaining bits,
//! in units of two); every mutation happens while the paired lock is held,
//! which is what makes the "is anybody actually waiting" check in
//! [`WakeupEvent::maybe_unlock_and_signal_one`] race-free.
//!
//! The signal is level-triggered: once set, waits fall straight through
//! until [`WakeupEvent::clear`] is called. The scheduler clears before each
//! idle wait.

use crate::sync::ContendedMutexGuard;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Condvar;
use std::time::Duration;

const SIGNAL_BIT: usize = 1;
const WAITER_UNIT: usize = 2;

/// Condition-variable-like primitive with unlock-and-signal semantics.
#[derive(Debug, Default)]
pub(crate) struct WakeupEvent {
    cond: Condvar,
    state: AtomicUsize,
}

impl WakeupEvent {
    pub(crate) fn new() -> Self {
        Self {
            cond: Condvar::new(),
            state: AtomicUsize::new(0),
        }
    }

    /// Clears any pending signal; the next `wait` will block.
    pub(crate) fn clear<T>(&self, _lock: &ContendedMutexGuard<'_, T>) {
        self.state.fetch_and(!SIGNAL_BIT, Ordering::Relaxed);
    }

    /// Wakes all waiters. The lock remains held.
    pub(crate) fn signal_all<T>(&self, _lock: &ContendedMutexGuard<'_, T>) {
        self.state.fetch_or(SIGNAL_BIT, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Releases the lock and wakes one waiter. The signal is always left
    /// set, so a worker that was between queue check and wait still sees it.
    pub(crate) fn unlock_and_signal_one<T>(&self, lock: ContendedMutexGuard<'_, T>) {
        let state = self.state.fetch_or(SIGNAL_BIT, Ordering::Relaxed) | SIGNAL_BIT;
        let have_waiters = state > SIGNAL_BIT;
        drop(lock);
        if have_waiters {
            self.cond.notify_one();
        }
    }

    /// Wakes one waiter only if at least one is blocked, releasing the lock
    /// in that case and returning `None`. When nobody is waiting the signal
    /// is still left set and the held lock is handed back.
    #[must_use]
    pub(crate) fn maybe_unlock_and_signal_one<'a, T>(
        &self,
        lock: ContendedMutexGuard<'a, T>,
    ) -> Option<ContendedMutexGuard<'a, T>> {
        let state = self.state.fetch_or(SIGNAL_BIT, Ordering::Relaxed) | SIGNAL_BIT;
        if state > SIGNAL_BIT {
            drop(lock);
            self.cond.notify_one();
            None
        } else {
            Some(lock)
        }
    }

    /// Blocks until signaled, atomically releasing the lock while waiting
    /// and reacquiring it before returning.
    pub(crate) fn wait<T>(&self, lock: &mut ContendedMutexGuard<'_, T>) {
        while self.state.load(Ordering::Relaxed) & SIGNAL_BIT == 0 {
            self.state.fetch_add(WAITER_UNIT, Ordering::Relaxed);
            lock.wait_on(&self.cond);
            self.state.fetch_sub(WAITER_UNIT, Ordering::Relaxed);
        }
    }

    /// Like [`wait`](Self::wait), but waits at most once and at most
    /// `timeout`. Returns whether the event is signaled.
    pub(crate) fn wait_for<T>(
        &self,
        lock: &mut ContendedMutexGuard<'_, T>,
        timeout: Duration,
    ) -> bool {
        if self.state.load(Ordering::Relaxed) & SIGNAL_BIT == 0 {
            self.state.fetch_add(WAITER_UNIT, Ordering::Relaxed);
            lock.wait_timeout_on(&self.cond, timeout);
            self.state.fetch_sub(WAITER_UNIT, Ordering::Relaxed);
        }
        self.state.load(Ordering::Relaxed) & SIGNAL_BIT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ContendedMutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn signal_then_wait_falls_through() {
        let m = ContendedMutex::new("test", ());
        let event = WakeupEvent::new();

        let mut lock = m.lock();
        event.signal_all(&lock);
        // Signal is sticky: wait must return without blocking.
        event.wait(&mut lock);
    }

    #[test]
    fn clear_makes_wait_for_block_until_timeout() {
        let m = ContendedMutex::new("test", ());
        let event = WakeupEvent::new();

        let mut lock = m.lock();
        event.signal_all(&lock);
        event.clear(&lock);

        let start = Instant::now();
        let signaled = event.wait_for(&mut lock, Duration::from_millis(20));
        assert!(!signaled, "cleared event must not report a signal");
        assert!(
            start.elapsed() >= Duration::from_millis(10),
            "wait_for should have blocked for the timeout"
        );
    }

    #[test]
    fn maybe_signal_returns_lock_when_nobody_waits() {
        let m = ContendedMutex::new("test", 5);
        let event = WakeupEvent::new();

        let lock = m.lock();
        let lock = event
            .maybe_unlock_and_signal_one(lock)
            .expect("no waiter, guard must be handed back");
        assert_eq!(*lock, 5, "lock still held and usable");
    }

    #[test]
    fn maybe_signal_wakes_a_blocked_waiter() {
        let shared = Arc::new((ContendedMutex::new("test", ()), WakeupEvent::new()));
        let woken = Arc::new(AtomicBool::new(false));

        let shared2 = Arc::clone(&shared);
        let woken2 = Arc::clone(&woken);
        let waiter = thread::spawn(move || {
            let (m, event) = &*shared2;
            let mut lock = m.lock();
            event.clear(&lock);
            event.wait(&mut lock);
            woken2.store(true, Ordering::SeqCst);
        });

        // Give the waiter time to park.
        thread::sleep(Duration::from_millis(20));

        let (m, event) = &*shared;
        let lock = m.lock();
        let handed_back = event.maybe_unlock_and_signal_one(lock);
        assert!(handed_back.is_none(), "a parked waiter must be woken");

        waiter.join().expect("waiter should wake");
        assert!(woken.load(Ordering::SeqCst));
    }

    #[test]
    fn unlock_and_signal_one_always_sets_the_signal() {
        let m = ContendedMutex::new("test", ());
        let event = WakeupEvent::new();

        // No waiter: the signal must still latch for the next wait.
        let lock = m.lock();
        event.unlock_and_signal_one(lock);

        let mut lock = m.lock();
        event.wait(&mut lock);
    }

    #[test]
    fn signal_all_wakes_every_waiter() {
        let shared = Arc::new((ContendedMutex::new("test", ()), WakeupEvent::new()));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let (m, event) = &*shared;
                    let mut lock = m.lock();
                    event.wait(&mut lock);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let (m, event) = &*shared;
        let lock = m.lock();
        event.signal_all(&lock);
        drop(lock);

        for waiter in waiters {
            waiter.join().expect("every waiter should wake");
        }
    }
}
