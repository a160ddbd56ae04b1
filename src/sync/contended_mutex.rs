//! Feature-gated contention-instrumented mutex.
//!
//! When the `lock-metrics` feature is enabled, `ContendedMutex<T>` wraps
//! `std::sync::Mutex<T>` and tracks acquisitions, contended acquisitions and
//! wait time. When disabled, it is a plain wrapper with no counters.
//!
//! The guard exposes crate-internal condition-variable hooks
//! ([`ContendedMutexGuard::wait_on`], [`ContendedMutexGuard::wait_timeout_on`])
//! so the scheduler's wake-up event can block while atomically releasing
//! this lock.

/// Snapshot of lock contention metrics.
///
/// All fields are zero when the `lock-metrics` feature is disabled.
#[derive(Debug, Clone, Default)]
pub struct LockMetricsSnapshot {
    /// Human-readable name for this lock.
    pub name: &'static str,
    /// Total number of successful lock acquisitions.
    pub acquisitions: u64,
    /// Number of acquisitions where the lock was already held.
    pub contentions: u64,
    /// Cumulative nanoseconds spent waiting to acquire the lock.
    pub wait_ns: u64,
    /// Maximum single wait duration in nanoseconds.
    pub max_wait_ns: u64,
}

// ── Instrumented implementation ───────────────────────────────────────────

#[cfg(feature = "lock-metrics")]
mod inner {
    use super::LockMetricsSnapshot;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::{Duration, Instant};

    #[derive(Debug, Default)]
    struct Metrics {
        acquisitions: AtomicU64,
        contentions: AtomicU64,
        wait_ns: AtomicU64,
        max_wait_ns: AtomicU64,
    }

    impl Metrics {
        fn update_max(current: &AtomicU64, value: u64) {
            let mut old = current.load(Ordering::Relaxed);
            while value > old {
                match current.compare_exchange_weak(old, value, Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => break,
                    Err(actual) => old = actual,
                }
            }
        }
    }

    /// Contention-instrumented mutex.
    #[derive(Debug)]
    pub struct ContendedMutex<T> {
        inner: Mutex<T>,
        metrics: Metrics,
        name: &'static str,
    }

    impl<T> ContendedMutex<T> {
        /// Creates a new instrumented mutex with the given name and value.
        pub fn new(name: &'static str, value: T) -> Self {
            Self {
                inner: Mutex::new(value),
                metrics: Metrics::default(),
                name,
            }
        }

        /// Acquires the mutex, tracking contention. Poison is recovered: a
        /// panicking completion handler never runs while this lock is held,
        /// so the protected state stays consistent across unwinds.
        pub fn lock(&self) -> ContendedMutexGuard<'_, T> {
            let start = Instant::now();

            let (guard, contended) = match self.inner.try_lock() {
                Ok(guard) => (guard, false),
                Err(std::sync::TryLockError::Poisoned(poison)) => (poison.into_inner(), false),
                Err(std::sync::TryLockError::WouldBlock) => (
                    self.inner.lock().unwrap_or_else(PoisonError::into_inner),
                    true,
                ),
            };

            let wait_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
            self.metrics.acquisitions.fetch_add(1, Ordering::Relaxed);
            self.metrics.wait_ns.fetch_add(wait_ns, Ordering::Relaxed);
            Metrics::update_max(&self.metrics.max_wait_ns, wait_ns);
            if contended {
                self.metrics.contentions.fetch_add(1, Ordering::Relaxed);
            }

            ContendedMutexGuard { guard: Some(guard) }
        }

        /// Returns a snapshot of the current metrics.
        pub fn snapshot(&self) -> LockMetricsSnapshot {
            LockMetricsSnapshot {
                name: self.name,
                acquisitions: self.metrics.acquisitions.load(Ordering::Relaxed),
                contentions: self.metrics.contentions.load(Ordering::Relaxed),
                wait_ns: self.metrics.wait_ns.load(Ordering::Relaxed),
                max_wait_ns: self.metrics.max_wait_ns.load(Ordering::Relaxed),
            }
        }

        /// Returns the lock name.
        pub fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Guard for [`ContendedMutex`].
    pub struct ContendedMutexGuard<'a, T> {
        guard: Option<MutexGuard<'a, T>>,
    }

    impl<T> ContendedMutexGuard<'_, T> {
        /// Blocks on `cond`, atomically releasing the lock and reacquiring
        /// it before returning.
        pub(crate) fn wait_on(&mut self, cond: &Condvar) {
            let inner = self.guard.take().expect("guard used after wait");
            let inner = cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
            self.guard = Some(inner);
        }

        /// Bounded [`wait_on`](Self::wait_on); may also return on timeout or
        /// spuriously.
        pub(crate) fn wait_timeout_on(&mut self, cond: &Condvar, timeout: Duration) {
            let inner = self.guard.take().expect("guard used after wait");
            let (inner, _timed_out) = cond
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            self.guard = Some(inner);
        }
    }

    impl<T> std::ops::Deref for ContendedMutexGuard<'_, T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.guard.as_ref().expect("guard used after wait")
        }
    }

    impl<T> std::ops::DerefMut for ContendedMutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            self.guard.as_mut().expect("guard used after wait")
        }
    }

    impl<T: std::fmt::Debug> std::fmt::Debug for ContendedMutexGuard<'_, T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ContendedMutexGuard")
                .field("data", &self.guard)
                .finish()
        }
    }
}

// ── No-op implementation (feature disabled) ───────────────────────────────

#[cfg(not(feature = "lock-metrics"))]
mod inner {
    use super::LockMetricsSnapshot;
    use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    /// Plain mutex wrapper (metrics disabled).
    #[derive(Debug)]
    pub struct ContendedMutex<T> {
        inner: Mutex<T>,
        name: &'static str,
    }

    impl<T> ContendedMutex<T> {
        /// Creates a new mutex with the given name and value.
        #[inline]
        pub fn new(name: &'static str, value: T) -> Self {
            Self {
                inner: Mutex::new(value),
                name,
            }
        }

        /// Acquires the mutex (no instrumentation). Poison is recovered: a
        /// panicking completion handler never runs while this lock is held,
        /// so the protected state stays consistent across unwinds.
        #[inline]
        pub fn lock(&self) -> ContendedMutexGuard<'_, T> {
            ContendedMutexGuard {
                guard: Some(self.inner.lock().unwrap_or_else(PoisonError::into_inner)),
            }
        }

        /// Returns an empty snapshot (metrics disabled).
        pub fn snapshot(&self) -> LockMetricsSnapshot {
            LockMetricsSnapshot {
                name: self.name,
                ..LockMetricsSnapshot::default()
            }
        }

        /// Returns the lock name.
        pub fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Guard for [`ContendedMutex`].
    pub struct ContendedMutexGuard<'a, T> {
        guard: Option<MutexGuard<'a, T>>,
    }

    impl<T> ContendedMutexGuard<'_, T> {
        /// Blocks on `cond`, atomically releasing the lock and reacquiring
        /// it before returning.
        pub(crate) fn wait_on(&mut self, cond: &Condvar) {
            let inner = self.guard.take().expect("guard used after wait");
            let inner = cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
            self.guard = Some(inner);
        }

        /// Bounded [`wait_on`](Self::wait_on); may also return on timeout or
        /// spuriously.
        pub(crate) fn wait_timeout_on(&mut self, cond: &Condvar, timeout: Duration) {
            let inner = self.guard.take().expect("guard used after wait");
            let (inner, _timed_out) = cond
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            self.guard = Some(inner);
        }
    }

    impl<T> std::ops::Deref for ContendedMutexGuard<'_, T> {
        type Target = T;
        #[inline]
        fn deref(&self) -> &T {
            self.guard.as_ref().expect("guard used after wait")
        }
    }

    impl<T> std::ops::DerefMut for ContendedMutexGuard<'_, T> {
        #[inline]
        fn deref_mut(&mut self) -> &mut T {
            self.guard.as_mut().expect("guard used after wait")
        }
    }

    impl<T: std::fmt::Debug> std::fmt::Debug for ContendedMutexGuard<'_, T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ContendedMutexGuard")
                .field("data", &self.guard)
                .finish()
        }
    }
}

pub use inner::{ContendedMutex, ContendedMutexGuard};
