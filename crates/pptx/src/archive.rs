//! Reading members from a presentation archive.

use pptslim_core::{ArchiveMember, Error, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on buffer space reserved from a member's declared size.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// An opened presentation ZIP archive.
pub struct PresentationArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    names: Vec<String>,
    source: String,
}

impl PresentationArchive<BufReader<File>> {
    /// Open an archive file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ArchiveUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::new(BufReader::new(file), &path.display().to_string())
    }
}

impl<R: Read + Seek> PresentationArchive<R> {
    /// Open an archive from a reader. `source` names it in errors.
    pub fn new(reader: R, source: &str) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| Error::ArchiveUnreadable {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

        // ZipArchive::file_names() is unordered; walk the central directory instead.
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index(index)
                .map_err(|e| Error::ArchiveUnreadable {
                    path: source.to_string(),
                    reason: format!("entry {}: {}", index, e),
                })?;
            names.push(file.name().to_string());
        }

        log::debug!("Opened {} with {} members", source, names.len());

        Ok(Self {
            archive,
            names,
            source: source.to_string(),
        })
    }

    /// Member paths in archive order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of the archive used in messages.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn contains(&self, path: &str) -> bool {
        self.names.iter().any(|n| n == path)
    }

    /// Read one member by path.
    pub fn read_member(&mut self, path: &str) -> Result<ArchiveMember> {
        let mut file = self.archive.by_name(path).map_err(|e| match e {
            ZipError::FileNotFound => Error::MemberNotFound(path.to_string()),
            e => Error::ArchiveUnreadable {
                path: self.source.clone(),
                reason: format!("'{}': {}", path, e),
            },
        })?;

        let declared = file.size();
        let data = read_capped(&mut file, declared).map_err(|e| Error::ArchiveUnreadable {
            path: self.source.clone(),
            reason: format!("failed to read '{}': {}", path, e),
        })?;

        Ok(ArchiveMember::new(path, data))
    }

    /// Read every member whose path satisfies `predicate`, in archive order.
    pub fn members_matching<F>(&mut self, predicate: F) -> Result<Vec<ArchiveMember>>
    where
        F: Fn(&str) -> bool,
    {
        let selected: Vec<String> = self
            .names
            .iter()
            .filter(|name| predicate(name.as_str()))
            .cloned()
            .collect();

        selected
            .iter()
            .map(|name| self.read_member(name))
            .collect()
    }

    pub(crate) fn zip_mut(&mut self) -> &mut ZipArchive<R> {
        &mut self.archive
    }
}

/// Read a member to the end without trusting its declared size for allocation.
pub(crate) fn read_capped<T: Read>(mut reader: T, declared: u64) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
    reader.read_to_end(&mut data)?;
    Ok(data)
}
