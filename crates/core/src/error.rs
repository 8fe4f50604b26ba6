//! Error types for presentation media optimization.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while optimizing a presentation archive.
///
/// Every variant is fatal to the run: no output archive is produced.
#[derive(Error, Debug)]
pub enum Error {
    /// The input archive could not be opened or is not a valid ZIP.
    #[error("Archive '{path}' is unreadable: {reason}")]
    ArchiveUnreadable { path: String, reason: String },

    /// A member named by the scan could not be found or read.
    #[error("Member not found in archive: {0}")]
    MemberNotFound(String),

    /// An external image tool failed or produced no output.
    #[error("{tool} failed on '{member}': {reason}")]
    TranscodeToolFailed {
        tool: String,
        member: String,
        reason: String,
    },

    /// Invalid arguments or configuration.
    #[error("Usage error: {0}")]
    UsageError(String),

    /// A scratch directory or file could not be created, written or read.
    #[error("Scratch file error for '{member}': {source}")]
    ScratchIo {
        member: String,
        #[source]
        source: std::io::Error,
    },

    /// A member that must be parsed is not well-formed.
    #[error("Malformed member '{member}': {reason}")]
    MalformedMember { member: String, reason: String },

    /// Two output entries would share the same path.
    #[error("Duplicate member in output archive: {0}")]
    DuplicateMember(String),

    /// The ZIP writer failed.
    #[error("Failed to write archive: {0}")]
    ArchiveWrite(String),

    /// The worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Failed to create or persist the output file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
