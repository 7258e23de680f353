use std::fmt;
use std::io;

/// Machine-readable error codes for scheduler- and operator-friendly output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    StoreUnavailable,
    StaleQueryFailed,
    AggregateQueryFailed,
    ArchiveWriteFailed,
    ArchiveCorrupt,
    ArchiveNameCollision,
    PruneFailed,
    LockContention,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::StoreUnavailable => "E2001",
            Self::StaleQueryFailed => "E2002",
            Self::AggregateQueryFailed => "E2003",
            Self::ArchiveWriteFailed => "E4001",
            Self::ArchiveCorrupt => "E4002",
            Self::ArchiveNameCollision => "E4004",
            Self::PruneFailed => "E4003",
            Self::LockContention => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::StoreUnavailable => "Hot store unavailable",
            Self::StaleQueryFailed => "Stale-record query failed",
            Self::AggregateQueryFailed => "Aggregate window query failed",
            Self::ArchiveWriteFailed => "Archive write failed",
            Self::ArchiveCorrupt => "Existing archive file is corrupt",
            Self::ArchiveNameCollision => "Archive file belongs to another partition",
            Self::PruneFailed => "Hot-store prune failed",
            Self::LockContention => "Lock contention",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in larder.toml and retry."),
            Self::StoreUnavailable => Some("Run `larder init` or check the store path in larder.toml."),
            Self::StaleQueryFailed | Self::AggregateQueryFailed => {
                Some("Check the hot-store schema with `larder init`, then retry.")
            }
            Self::ArchiveWriteFailed => Some("Check disk space and write permissions on the archive directory."),
            Self::ArchiveCorrupt => {
                Some("Move the damaged archive file aside; the partition is retried on the next run.")
            }
            Self::ArchiveNameCollision => Some(
                "Two partitions map to the same file name; rename the location or endpoint upstream.",
            ),
            Self::PruneFailed => {
                Some("Archived records stay in the hot store and are re-archived on the next run.")
            }
            Self::LockContention => Some("Retry after the other `larder` run releases its lock."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while archiving a single partition or provider.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A hot-store query or mutation failed.
    #[error("{code}: {context}: {source:#}")]
    Store {
        code: ErrorCode,
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// The archive document could not be encoded.
    #[error("{}: archive serialization failed: {0}", ErrorCode::ArchiveWriteFailed)]
    Serialize(#[from] serde_json::Error),

    /// Writing or reading the archive file failed.
    #[error("{}: archive write failed: {0}", ErrorCode::ArchiveWriteFailed)]
    Io(#[from] io::Error),

    /// An archive file already on disk could not be decoded.
    #[error("{}: archive {name} is unreadable: {reason}", ErrorCode::ArchiveCorrupt)]
    Corrupt { name: String, reason: String },

    /// The archive file on disk was written for a different partition.
    #[error("{}: archive {name} already holds partition {holds}", ErrorCode::ArchiveNameCollision)]
    NameCollision { name: String, holds: String },
}

impl ArchiveError {
    /// Wrap a store failure with the code of the step that issued it.
    pub fn store(code: ErrorCode, context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Store {
            code,
            context: context.into(),
            source,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store { code, .. } => *code,
            Self::Serialize(_) | Self::Io(_) => ErrorCode::ArchiveWriteFailed,
            Self::Corrupt { .. } => ErrorCode::ArchiveCorrupt,
            Self::NameCollision { .. } => ErrorCode::ArchiveNameCollision,
        }
    }
}
