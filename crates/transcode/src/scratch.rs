//! Scoped scratch files and external tool invocation.

use pptslim_core::{ArchiveMember, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Fallback scratch file name for members without a usable base name.
const FALLBACK_NAME: &str = "image.png";

/// A member's bytes staged in a private temporary directory.
///
/// Dropping it removes the directory and everything the tool wrote there.
pub(crate) struct Scratch {
    dir: TempDir,
    input: PathBuf,
    member: String,
}

impl Scratch {
    /// Write the member into a fresh scratch directory.
    pub(crate) fn stage(member: &ArchiveMember) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pptslim-")
            .tempdir()
            .map_err(|source| Error::ScratchIo {
                member: member.path.clone(),
                source,
            })?;

        let name = match member.base_filename() {
            "" | "." | ".." => FALLBACK_NAME,
            name => name,
        };
        let input = dir.path().join(name);
        fs::write(&input, &member.data).map_err(|source| Error::ScratchIo {
            member: member.path.clone(),
            source,
        })?;

        log::debug!("Staged {} at {}", member.path, input.display());

        Ok(Self {
            dir,
            input,
            member: member.path.clone(),
        })
    }

    /// Path of the staged input file.
    pub(crate) fn input(&self) -> &Path {
        &self.input
    }

    /// A path next to the input with its extension replaced.
    pub(crate) fn sibling(&self, ext: &str) -> PathBuf {
        self.input.with_extension(ext)
    }

    /// The scratch directory itself.
    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Read a file the tool produced.
    ///
    /// A missing file means the tool did not do its job.
    pub(crate) fn read(&self, path: &Path, tool: &str) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(Error::TranscodeToolFailed {
                tool: tool.to_string(),
                member: self.member.clone(),
                reason: format!("no output written to {}", path.display()),
            });
        }
        fs::read(path).map_err(|source| Error::ScratchIo {
            member: self.member.clone(),
            source,
        })
    }

    /// Run a tool to completion, failing on a non-zero exit.
    pub(crate) fn run(&self, command: &mut Command, tool: &str) -> Result<()> {
        log::debug!("Running {:?} in {}", command, self.dir.path().display());

        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::TranscodeToolFailed {
                tool: tool.to_string(),
                member: self.member.clone(),
                reason: format!("could not start: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TranscodeToolFailed {
                tool: tool.to_string(),
                member: self.member.clone(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}
