//! Rewriting of filename references after media renames.
//!
//! Relationship parts refer to media by bare filename (`../media/image1.png`),
//! so a rename is applied as a byte-level substitution of the old base
//! filename with the new one.

use crate::types::{ArchiveMember, TranscodeOutcome};
use regex::bytes::{NoExpand, Regex};

/// A single filename substitution.
#[derive(Debug, Clone)]
struct Rename {
    pattern: Regex,
    replacement: Vec<u8>,
}

/// Applies the renames of a run to reference members.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRewriter {
    renames: Vec<Rename>,
}

impl ReferenceRewriter {
    /// Collect the renames of all accepted outcomes, in order.
    ///
    /// Rejected outcomes and outcomes that keep their filename are skipped.
    pub fn from_outcomes(outcomes: &[TranscodeOutcome]) -> Self {
        let renames = outcomes
            .iter()
            .filter_map(TranscodeOutcome::renamed_filenames)
            .filter_map(|(old, new)| {
                // An escaped literal always compiles.
                let pattern = Regex::new(&regex::escape(old)).ok()?;
                log::debug!("Rename {} -> {}", old, new);
                Some(Rename {
                    pattern,
                    replacement: new.as_bytes().to_vec(),
                })
            })
            .collect();

        Self { renames }
    }

    /// Whether there is nothing to rewrite.
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    /// Number of renames that will be applied.
    pub fn len(&self) -> usize {
        self.renames.len()
    }

    /// Rewrite one reference member.
    ///
    /// Returns the replacement member, or `None` when no substitution changed
    /// its bytes. Later renames operate on the result of earlier ones.
    pub fn rewrite(&self, member: &ArchiveMember) -> Option<ArchiveMember> {
        let mut data = member.data.clone();
        for rename in &self.renames {
            let replaced = rename
                .pattern
                .replace_all(&data, NoExpand(rename.replacement.as_slice()))
                .into_owned();
            data = replaced;
        }

        if data == member.data {
            None
        } else {
            log::debug!("Rewrote references in {}", member.path);
            Some(ArchiveMember::new(member.path.clone(), data))
        }
    }

    /// Rewrite every member, keeping only those that changed.
    pub fn rewrite_all(&self, members: &[ArchiveMember]) -> Vec<ArchiveMember> {
        if self.is_empty() {
            return Vec::new();
        }
        members.iter().filter_map(|m| self.rewrite(m)).collect()
    }
}
