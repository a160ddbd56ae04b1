//! Error types for the scheduler.
//!
//! The scheduler itself never fabricates errors: drive methods return
//! completion counts, and any error a handler observes was placed into the
//! operation by its producer (typically the reactor harvesting a failed or
//! cancelled IO). The kinds here cover the few places the crate itself is
//! fallible (configuration parsing) plus the payloads a reactor delivers.

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration error (malformed concurrency hint, bad env var).
    Config,
    /// IO-level failure delivered with a harvested completion.
    Io,
    /// The underlying operation was cancelled before it could complete.
    Cancelled,
    /// The scheduler has been shut down; no further work is honored.
    Shutdown,
}

impl ErrorKind {
    /// Returns a stable human-readable name for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced by this crate or delivered alongside a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
}

impl Error {
    /// Creates a new error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a new error of the given kind with a descriptive message.
    #[must_use]
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::with_message(ErrorKind::Config, "bad hint");
        assert_eq!(err.to_string(), "config: bad hint");

        let bare = Error::new(ErrorKind::Shutdown);
        assert_eq!(bare.to_string(), "shutdown");
    }

    #[test]
    fn kind_round_trips() {
        for kind in [
            ErrorKind::Config,
            ErrorKind::Io,
            ErrorKind::Cancelled,
            ErrorKind::Shutdown,
        ] {
            let err = Error::new(kind);
            assert_eq!(err.kind(), kind);
            assert_eq!(err.kind().to_string(), kind.as_str());
        }
    }

    #[test]
    fn cancelled_predicate() {
        assert!(Error::new(ErrorKind::Cancelled).is_cancelled());
        assert!(!Error::new(ErrorKind::Io).is_cancelled());
    }
}
