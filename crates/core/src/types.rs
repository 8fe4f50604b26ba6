//! Domain types for archive members and transcoding results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry read from the input archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path inside the archive, forward-slash separated.
    pub path: String,

    /// Raw (decompressed) bytes.
    pub data: Vec<u8>,
}

impl ArchiveMember {
    /// Create a new member.
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// The final path segment.
    pub fn base_filename(&self) -> &str {
        base_filename(&self.path)
    }

    /// Size of the member's bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// What happens to an original member after transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Write `data` under `path` in place of the original member.
    Replace { path: String, data: Vec<u8> },
    /// Keep the original member verbatim.
    Keep,
}

/// Result of transcoding one eligible member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    /// Path of the member this outcome was produced from.
    pub original_path: String,

    /// Byte size of the original member.
    pub original_size: usize,

    pub decision: Decision,
}

impl TranscodeOutcome {
    /// An outcome that replaces the original with `data` at `new_path`.
    pub fn accepted(
        original: &ArchiveMember,
        new_path: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            original_path: original.path.clone(),
            original_size: original.size(),
            decision: Decision::Replace {
                path: new_path.into(),
                data,
            },
        }
    }

    /// An outcome that keeps the original member unchanged.
    pub fn rejected(original: &ArchiveMember) -> Self {
        Self {
            original_path: original.path.clone(),
            original_size: original.size(),
            decision: Decision::Keep,
        }
    }

    /// Accept `candidate` at `new_path` only if it is strictly smaller than the original.
    pub fn if_smaller(
        original: &ArchiveMember,
        new_path: impl Into<String>,
        candidate: Vec<u8>,
    ) -> Self {
        if candidate.len() < original.size() {
            Self::accepted(original, new_path, candidate)
        } else {
            Self::rejected(original)
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, Decision::Replace { .. })
    }

    /// New path for an accepted outcome.
    pub fn new_path(&self) -> Option<&str> {
        match &self.decision {
            Decision::Replace { path, .. } => Some(path),
            Decision::Keep => None,
        }
    }

    /// New bytes for an accepted outcome.
    pub fn new_data(&self) -> Option<&[u8]> {
        match &self.decision {
            Decision::Replace { data, .. } => Some(data),
            Decision::Keep => None,
        }
    }

    /// Old and new base filename, if this outcome renames the member.
    pub fn renamed_filenames(&self) -> Option<(&str, &str)> {
        let new_path = self.new_path()?;
        let old_name = base_filename(&self.original_path);
        let new_name = base_filename(new_path);
        (old_name != new_name).then_some((old_name, new_name))
    }

    /// Downgrade to a rejection, keeping the original member.
    pub fn reject(&mut self) {
        self.decision = Decision::Keep;
    }
}

/// The optimization applied to eligible images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizeMode {
    /// Lossless PNG recompression; never renames.
    Optipng,
    /// PNG to JPEG conversion, kept only when smaller.
    PngToJpg,
}

impl OptimizeMode {
    /// Whether this mode can rename members and so needs reference rewriting.
    pub fn renames_members(&self) -> bool {
        matches!(self, Self::PngToJpg)
    }
}

impl fmt::Display for OptimizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optipng => f.write_str("optipng"),
            Self::PngToJpg => f.write_str("png-to-jpg"),
        }
    }
}

/// Summary of one optimization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: OptimizeMode,
    pub members: usize,
    pub images_examined: usize,
    pub images_replaced: usize,
    pub images_kept: usize,
    pub references_rewritten: usize,
    pub content_types_updated: bool,
    /// Total size of eligible images before optimization.
    pub image_bytes_before: u64,
    /// Total size of the same images as written to the output.
    pub image_bytes_after: u64,
}

impl RunReport {
    /// Build the image statistics from a set of outcomes.
    pub fn from_outcomes(mode: OptimizeMode, members: usize, outcomes: &[TranscodeOutcome]) -> Self {
        let mut report = Self {
            mode,
            members,
            images_examined: outcomes.len(),
            images_replaced: 0,
            images_kept: 0,
            references_rewritten: 0,
            content_types_updated: false,
            image_bytes_before: 0,
            image_bytes_after: 0,
        };

        for outcome in outcomes {
            report.image_bytes_before += outcome.original_size as u64;
            match outcome.new_data() {
                Some(data) => {
                    report.images_replaced += 1;
                    report.image_bytes_after += data.len() as u64;
                }
                None => {
                    report.images_kept += 1;
                    report.image_bytes_after += outcome.original_size as u64;
                }
            }
        }

        report
    }

    /// Bytes saved on images, zero if the images grew.
    pub fn bytes_saved(&self) -> u64 {
        self.image_bytes_before.saturating_sub(self.image_bytes_after)
    }
}

/// The final path segment of an archive path.
pub fn base_filename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Replace the extension of the final path segment, keeping directory and base name.
///
/// `ext` is given without the leading dot. A base name without an extension
/// (or a dot-file) gets `ext` appended.
pub fn with_extension(path: &str, ext: &str) -> String {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];
    let stem_len = match name.rfind('.') {
        Some(dot) if dot > 0 => dot,
        _ => name.len(),
    };
    format!("{}.{}", &path[..name_start + stem_len], ext)
}
