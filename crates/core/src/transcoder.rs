//! The capability shared by all image transcoders.

use crate::types::{ArchiveMember, OptimizeMode, TranscodeOutcome};
use crate::Result;

/// Transforms one eligible image member.
///
/// Implementations must be independent per call: no shared mutable state,
/// and any scratch files private to the call.
pub trait ImageTranscoder: Send + Sync {
    /// The mode this transcoder implements.
    fn mode(&self) -> OptimizeMode;

    /// Transcode one member.
    ///
    /// Returns a rejection (`Decision::Keep`) when the result is not worth
    /// keeping; returns an error when the underlying tool fails.
    fn transcode(&self, member: &ArchiveMember) -> Result<TranscodeOutcome>;
}
