//! Error taxonomy shared by every archivist crate.
//!
//! Every stage of the pipeline captures at most one [`Error`] and derives its
//! retry decision from the error's [`Kind`] (spec §7). `Kind` is deliberately
//! small and closed: new failure modes should be mapped onto one of these six
//! buckets rather than growing the enum, since the bucket is what downstream
//! code (retry, status, note) actually branches on.

use std::fmt;

/// The six failure buckets named in the design's error-handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Network reset, 5xx from the catalog, object-store 503, etc.
    Transient,
    /// The remote side told us the thing we asked for doesn't exist.
    NotFound,
    /// Bad BagIt, bad access value, missing title, checksum mismatch.
    Validation,
    /// Local vs. remote digest mismatch after a transfer.
    Integrity,
    /// Missing credentials, unreachable catalog, bad config value.
    Configuration,
    /// Cannot write the working directory, cannot acquire a reservation.
    Fatal,
}

impl Kind {
    /// Whether a message carrying an error of this kind should be requeued.
    ///
    /// Only `Transient` is retryable. Every other kind sets `Retry = false`
    /// per spec §7, including `Fatal` — fatal errors abort the current
    /// message and rely on the bus's own requeue-on-crash behavior rather
    /// than an explicit retry flag.
    pub fn retryable(self) -> bool {
        matches!(self, Kind::Transient)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Transient => "transient",
            Kind::NotFound => "not_found",
            Kind::Validation => "validation",
            Kind::Integrity => "integrity",
            Kind::Configuration => "configuration",
            Kind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A single captured failure, carrying enough context for the
/// `ProcessStatusRecord.note` field (spec §3) to be human-readable.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: Kind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(Kind::Transient, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Kind::Validation, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(Kind::Integrity, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(Kind::Configuration, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Kind::Fatal, message)
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether the pipeline should requeue the message that produced this error.
    pub fn retry(&self) -> bool {
        self.kind.retryable()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_retries() {
        for kind in [
            Kind::Transient,
            Kind::NotFound,
            Kind::Validation,
            Kind::Integrity,
            Kind::Configuration,
            Kind::Fatal,
        ] {
            let e = Error::new(kind, "boom");
            assert_eq!(e.retry(), kind == Kind::Transient, "kind={kind}");
        }
    }

    #[test]
    fn display_includes_kind_and_message() {
        let e = Error::validation("missing title");
        assert_eq!(e.to_string(), "validation: missing title");
    }
}
