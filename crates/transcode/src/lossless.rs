//! Lossless PNG recompression with optipng.

use crate::scratch::Scratch;
use pptslim_core::{ArchiveMember, ImageTranscoder, OptimizeMode, Result, TranscodeOutcome};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Highest optipng optimization level.
pub const MAX_LEVEL: u8 = 7;

/// Recompresses PNGs in place with optipng, stripping all metadata.
///
/// The result always replaces the original under the same path.
#[derive(Debug, Clone)]
pub struct LosslessRecompress {
    program: PathBuf,
    level: u8,
}

impl LosslessRecompress {
    /// Use `optipng` from `PATH` at the maximal optimization level.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("optipng"),
            level: MAX_LEVEL,
        }
    }

    /// Use a specific optipng executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the optimization level (`-o0` to `-o7`).
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level.min(MAX_LEVEL);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    fn tool_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Default for LosslessRecompress {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTranscoder for LosslessRecompress {
    fn mode(&self) -> OptimizeMode {
        OptimizeMode::Optipng
    }

    fn transcode(&self, member: &ArchiveMember) -> Result<TranscodeOutcome> {
        let tool = self.tool_name();
        let scratch = Scratch::stage(member)?;

        let mut command = Command::new(&self.program);
        command
            .arg(format!("-o{}", self.level))
            .args(["-clobber", "-strip", "all", "-quiet"])
            .arg(scratch.input());
        scratch.run(&mut command, &tool)?;

        let data = scratch.read(scratch.input(), &tool)?;
        log::debug!(
            "{}: {} -> {} bytes",
            member.path,
            member.size(),
            data.len()
        );

        Ok(TranscodeOutcome::accepted(member, member.path.clone(), data))
    }
}
