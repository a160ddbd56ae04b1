//! Shared helpers for integration tests.
#![allow(dead_code)]

use opsched::{Error, Operation, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

/// Installs a test-writer tracing subscriber once per process.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Counts completions and destructions of the operations built from it.
///
/// Every probe-built operation bumps `completed` when its handler runs and
/// `destroyed` when it is released without running (shutdown, abandonment).
#[derive(Debug, Default)]
pub struct OpProbe {
    completed: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

struct Tracked {
    completed: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
    invoked: bool,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if self.invoked {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl OpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an operation tracked by this probe.
    pub fn op(&self) -> Box<Operation> {
        self.op_with(|_, _| {})
    }

    /// Builds a tracked operation that also runs `f` when completed.
    pub fn op_with<F>(&self, f: F) -> Box<Operation>
    where
        F: FnOnce(&Scheduler, Result<usize, Error>) + Send + 'static,
    {
        let mut tracked = Tracked {
            completed: Arc::clone(&self.completed),
            destroyed: Arc::clone(&self.destroyed),
            invoked: false,
        };
        Operation::new(move |scheduler, result| {
            tracked.invoked = true;
            f(scheduler, result);
        })
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Polls `cond` until it holds or `timeout` elapses. Returns the final
/// evaluation.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
