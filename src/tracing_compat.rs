//! Logging facade over the `tracing` crate.
//!
//! When the `tracing` feature is enabled (the default), this module
//! re-exports the `tracing` macros. When disabled, the same names resolve to
//! no-op macros so call sites compile away without conditional compilation.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
mod noop {
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }
    macro_rules! warn_noop {
        ($($arg:tt)*) => {};
    }

    pub(crate) use debug;
    pub(crate) use trace;
    pub(crate) use warn_noop as warn;
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop::{debug, trace, warn};
