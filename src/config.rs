//! Scheduler configuration types.
//!
//! The concurrency hint tells the scheduler how many threads are expected to
//! drive it, and whether the caller has opted out of internal locking for
//! the scheduler or the reactor. The scheduler derives its single-threaded
//! fast-path mode from it at construction and never re-reads it.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `threads` | 0 (unspecified, treated as "many") |
//! | `scheduler_locking` | true |
//! | `reactor_locking` | true |

use crate::error::{Error, ErrorKind};
use std::str::FromStr;

/// Environment variable consulted by [`ConcurrencyHint::from_env`].
pub const CONCURRENCY_HINT_ENV: &str = "OPSCHED_CONCURRENCY_HINT";

/// Decoded concurrency hint.
///
/// A hint of exactly one thread, or any hint that declares the scheduler or
/// the reactor non-locking, puts the scheduler into single-threaded mode:
/// thread-local fast paths are enabled and cross-thread wake-ups are elided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyHint {
    threads: usize,
    scheduler_locking: bool,
    reactor_locking: bool,
}

impl ConcurrencyHint {
    /// The default hint: unspecified thread count, full locking.
    pub const DEFAULT: Self = Self {
        threads: 0,
        scheduler_locking: true,
        reactor_locking: true,
    };

    /// Creates a hint for the given expected number of driving threads.
    ///
    /// `0` means "unspecified" and is treated as multi-threaded.
    #[must_use]
    pub const fn new(threads: usize) -> Self {
        Self {
            threads,
            scheduler_locking: true,
            reactor_locking: true,
        }
    }

    /// Creates a hint declaring that exactly one thread will drive the
    /// scheduler.
    #[must_use]
    pub const fn single_threaded() -> Self {
        Self::new(1)
    }

    /// Declares that the scheduler needs no internal locking. Implies
    /// single-threaded mode.
    #[must_use]
    pub const fn without_scheduler_locking(mut self) -> Self {
        self.scheduler_locking = false;
        self
    }

    /// Declares that the reactor needs no internal locking. Implies
    /// single-threaded mode for the scheduler as well.
    #[must_use]
    pub const fn without_reactor_locking(mut self) -> Self {
        self.reactor_locking = false;
        self
    }

    /// Returns the declared thread count (0 = unspecified).
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Returns whether the scheduler was asked to lock internally.
    #[must_use]
    pub const fn scheduler_locking(&self) -> bool {
        self.scheduler_locking
    }

    /// Returns whether the reactor was asked to lock internally.
    #[must_use]
    pub const fn reactor_locking(&self) -> bool {
        self.reactor_locking
    }

    /// Returns whether this hint selects single-threaded mode.
    #[must_use]
    pub const fn is_single_threaded(&self) -> bool {
        self.threads == 1 || !self.scheduler_locking || !self.reactor_locking
    }

    /// Reads a hint from [`CONCURRENCY_HINT_ENV`].
    ///
    /// Returns `Ok(None)` when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Config`] when the variable is set but malformed.
    pub fn from_env() -> Result<Option<Self>, Error> {
        match std::env::var(CONCURRENCY_HINT_ENV) {
            Ok(raw) => raw.parse().map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::with_message(
                ErrorKind::Config,
                format!("{CONCURRENCY_HINT_ENV} is not valid unicode"),
            )),
        }
    }
}

impl Default for ConcurrencyHint {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for ConcurrencyHint {
    type Err = Error;

    /// Accepts a thread count (`"1"`, `"8"`) or one of the protocol words:
    /// `"safe"` (full locking), `"unsafe"` (no locking anywhere),
    /// `"unsafe-io"` (reactor locking elided only).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::DEFAULT),
            "unsafe" => Ok(Self::DEFAULT
                .without_scheduler_locking()
                .without_reactor_locking()),
            "unsafe-io" | "unsafe_io" => Ok(Self::DEFAULT.without_reactor_locking()),
            other => other.parse::<usize>().map(Self::new).map_err(|_| {
                Error::with_message(
                    ErrorKind::Config,
                    format!("invalid concurrency hint {other:?}"),
                )
            }),
        }
    }
}
