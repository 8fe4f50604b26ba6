//! PNG to JPEG conversion with ImageMagick.

use crate::scratch::Scratch;
use pptslim_core::{
    with_extension, ArchiveMember, ImageTranscoder, OptimizeMode, Result, TranscodeOutcome,
};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extension given to converted images.
pub const JPEG_EXTENSION: &str = "jpg";

/// Converts PNGs to JPEG, keeping the JPEG only if it is smaller.
///
/// Transparency is flattened onto white before the alpha channel is
/// dropped, so transparent regions do not turn black.
#[derive(Debug, Clone)]
pub struct ConvertToLossyFormat {
    program: PathBuf,
    quality: Option<u8>,
}

impl ConvertToLossyFormat {
    /// Use ImageMagick's `convert` from `PATH` with its default quality.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("convert"),
            quality: None,
        }
    }

    /// Use a specific converter executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the JPEG quality (1-100).
    pub fn with_quality(mut self, quality: Option<u8>) -> Self {
        self.quality = quality.map(|q| q.clamp(1, 100));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    fn tool_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Default for ConvertToLossyFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTranscoder for ConvertToLossyFormat {
    fn mode(&self) -> OptimizeMode {
        OptimizeMode::PngToJpg
    }

    fn transcode(&self, member: &ArchiveMember) -> Result<TranscodeOutcome> {
        let tool = self.tool_name();
        let scratch = Scratch::stage(member)?;
        let output = scratch.sibling(JPEG_EXTENSION);

        let mut command = Command::new(&self.program);
        command
            .arg(scratch.input())
            .args(["-background", "white", "-flatten", "-alpha", "off"]);
        if let Some(quality) = self.quality {
            command.arg("-quality").arg(quality.to_string());
        }
        command.arg(&output);
        scratch.run(&mut command, &tool)?;

        let jpeg = scratch.read(&output, &tool)?;
        let jpeg_size = jpeg.len();
        let outcome =
            TranscodeOutcome::if_smaller(member, with_extension(&member.path, JPEG_EXTENSION), jpeg);

        if outcome.is_accepted() {
            log::debug!(
                "{}: JPEG accepted ({} -> {} bytes)",
                member.path,
                member.size(),
                jpeg_size
            );
        } else {
            log::debug!(
                "{}: JPEG rejected ({} bytes, PNG is {})",
                member.path,
                jpeg_size,
                member.size()
            );
        }

        Ok(outcome)
    }
}
