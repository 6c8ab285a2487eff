//! Error types for the fan-out registry and the broker crates built on it.
//!
//! Follows the root `Error` struct + error kind enum pattern: the kind tree
//! categorizes the failure for callers while `source` preserves the
//! underlying error for diagnostics.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for registry operations.
/// Holds the error kind and an optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors across the fan-out crates.
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Admission(AdmissionErrorKind),
    Encoding,
    Transport(TransportErrorKind),
    Handler,
}

/// Errors from the admission check performed before a connection is indexed.
/// Admission failures are all-or-nothing: nothing is mutated.
#[derive(Debug, PartialEq, Eq)]
pub enum AdmissionErrorKind {
    /// The user already holds `max_connections_per_user` connections.
    QuotaExceeded,
    /// The connection id is already present in the registry.
    DuplicateId,
}

/// Errors from the transport write path.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The transport's send hook returned an error; the connection is dead.
    WriteFailed,
    /// The connection was already removed when the send was attempted.
    Closed,
}

impl Error {
    /// Whether this error identifies a dead transport whose connection
    /// should be removed from the registry.
    pub fn is_write_failure(&self) -> bool {
        self.error_kind == ErrorKind::Transport(TransportErrorKind::WriteFailed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Admission(kind) => write!(f, "Admission error: {:?}", kind),
            ErrorKind::Encoding => write!(f, "Encoding error"),
            ErrorKind::Transport(kind) => write!(f, "Transport error: {:?}", kind),
            ErrorKind::Handler => write!(f, "Handler error"),
        }?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Transport(TransportErrorKind::WriteFailed),
        }
    }
}

/// Helper function to create admission errors.
pub fn admission_error(kind: AdmissionErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Admission(kind),
    }
}

/// Helper function to create encoding errors.
pub fn encoding_error(source: impl StdError + Send + Sync + 'static) -> Error {
    Error {
        source: Some(Box::new(source)),
        error_kind: ErrorKind::Encoding,
    }
}

/// Helper function to create transport errors without an underlying source.
pub fn transport_error(kind: TransportErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Transport(kind),
    }
}

/// Helper function to create handler errors.
pub fn handler_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Handler,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_source() {
        let err = admission_error(AdmissionErrorKind::QuotaExceeded, "user u1 at quota");
        let rendered = err.to_string();
        assert!(rendered.contains("QuotaExceeded"), "got: {rendered}");
        assert!(rendered.contains("user u1 at quota"), "got: {rendered}");
    }

    #[test]
    fn io_errors_map_to_write_failures() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone");
        let err: Error = io_err.into();
        assert!(err.is_write_failure());
    }

    #[test]
    fn closed_transport_is_not_a_write_failure() {
        let err = transport_error(TransportErrorKind::Closed, "connection is closed");
        assert!(!err.is_write_failure());
        assert_eq!(
            err.error_kind,
            ErrorKind::Transport(TransportErrorKind::Closed)
        );
    }
}
