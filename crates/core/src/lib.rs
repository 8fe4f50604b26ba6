//! Core domain types, configuration, and reference rewriting
//! for presentation media optimization.

pub mod config;
pub mod error;
pub mod rewrite;
pub mod transcoder;
pub mod types;

pub use config::OptimizerConfig;
pub use error::{Error, Result};
pub use rewrite::ReferenceRewriter;
pub use transcoder::ImageTranscoder;
pub use types::{
    base_filename, with_extension, ArchiveMember, Decision, OptimizeMode, RunReport,
    TranscodeOutcome,
};
