//! Writing the optimized archive.

use crate::archive::{read_capped, PresentationArchive};
use pptslim_core::{ArchiveMember, Error, Result, TranscodeOutcome};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries at or above this size need ZIP64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Replacement members keyed by the original path they replace.
#[derive(Debug, Default)]
pub struct ReplacementSet {
    by_original: HashMap<String, ArchiveMember>,
}

impl ReplacementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the replacement of an accepted outcome; rejected outcomes are ignored.
    pub fn insert_outcome(&mut self, outcome: &TranscodeOutcome) -> Result<()> {
        if let (Some(path), Some(data)) = (outcome.new_path(), outcome.new_data()) {
            self.insert(&outcome.original_path, ArchiveMember::new(path, data.to_vec()))?;
        }
        Ok(())
    }

    /// Add a member that replaces the original at its own path.
    pub fn insert_member(&mut self, member: ArchiveMember) -> Result<()> {
        let original = member.path.clone();
        self.insert(&original, member)
    }

    fn insert(&mut self, original: &str, replacement: ArchiveMember) -> Result<()> {
        if self.by_original.contains_key(original) {
            return Err(Error::DuplicateMember(original.to_string()));
        }
        self.by_original.insert(original.to_string(), replacement);
        Ok(())
    }

    pub fn get(&self, original: &str) -> Option<&ArchiveMember> {
        self.by_original.get(original)
    }

    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }
}

/// Write every member of `source` to `writer`, substituting replacements.
///
/// Members keep their archive order and count; a replacement is written under
/// its own path in place of the original. Everything is deflated. Returns the
/// writer once the central directory has been written.
pub fn write_archive<R, W>(
    source: &mut PresentationArchive<R>,
    replacements: &ReplacementSet,
    writer: W,
) -> Result<W>
where
    R: Read + Seek,
    W: Write + Seek,
{
    if let Some(missing) = replacements
        .by_original
        .keys()
        .find(|original| !source.contains(original))
    {
        return Err(Error::MemberNotFound(missing.clone()));
    }

    let source_name = source.source().to_string();
    let count = source.len();
    let zip = source.zip_mut();
    let mut out = ZipWriter::new(writer);
    let mut written: HashSet<String> = HashSet::with_capacity(count);
    let mut replaced = 0usize;

    for index in 0..count {
        let mut file = zip.by_index(index).map_err(|e| Error::ArchiveUnreadable {
            path: source_name.clone(),
            reason: format!("entry {}: {}", index, e),
        })?;
        let name = file.name().to_string();

        let mut options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(file.last_modified());
        if let Some(mode) = file.unix_mode() {
            options = options.unix_permissions(mode);
        }

        if file.is_dir() {
            claim(&mut written, &name)?;
            out.add_directory(name.as_str(), options)
                .map_err(|e| Error::ArchiveWrite(e.to_string()))?;
            continue;
        }

        let (path, data) = match replacements.get(&name) {
            Some(replacement) => {
                log::debug!("Writing {} in place of {}", replacement.path, name);
                replaced += 1;
                (replacement.path.clone(), replacement.data.clone())
            }
            None => {
                let declared = file.size();
                let data = read_capped(&mut file, declared).map_err(|e| Error::ArchiveUnreadable {
                    path: source_name.clone(),
                    reason: format!("failed to read '{}': {}", name, e),
                })?;
                (name, data)
            }
        };
        drop(file);

        claim(&mut written, &path)?;
        let options = options.large_file(data.len() as u64 >= ZIP64_THRESHOLD);
        out.start_file(path.as_str(), options)
            .map_err(|e| Error::ArchiveWrite(e.to_string()))?;
        out.write_all(&data)
            .map_err(|e| Error::ArchiveWrite(format!("'{}': {}", path, e)))?;
    }

    let writer = out
        .finish()
        .map_err(|e| Error::ArchiveWrite(e.to_string()))?;

    log::debug!("Wrote {} members ({} replaced)", count, replaced);

    Ok(writer)
}

fn claim(written: &mut HashSet<String>, path: &str) -> Result<()> {
    if !written.insert(path.to_string()) {
        return Err(Error::DuplicateMember(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::ZipArchive;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                let options = FileOptions::default().compression_method(CompressionMethod::Stored);
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn read_all(bytes: Vec<u8>) -> Vec<(String, Vec<u8>, CompressionMethod)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data, file.compression())
            })
            .collect()
    }

    fn source() -> PresentationArchive<Cursor<Vec<u8>>> {
        let bytes = build_zip(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("ppt/media/", b""),
            ("ppt/media/img1.png", b"png png png"),
            ("ppt/slides/_rels/slide1.xml.rels", b"img1.png"),
        ]);
        PresentationArchive::new(Cursor::new(bytes), "test.pptx").unwrap()
    }

    #[test]
    fn test_passthrough_keeps_members_and_deflates() {
        let mut source = source();
        let out = write_archive(&mut source, &ReplacementSet::new(), Cursor::new(Vec::new())).unwrap();
        let members = read_all(out.into_inner());

        let names: Vec<&str> = members.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "ppt/media/",
                "ppt/media/img1.png",
                "ppt/slides/_rels/slide1.xml.rels",
            ]
        );
        assert_eq!(members[2].1, b"png png png");
        assert_eq!(members[2].2, CompressionMethod::Deflated);
    }

    #[test]
    fn test_replacement_written_under_new_path_in_place() {
        let mut source = source();
        let png = ArchiveMember::new("ppt/media/img1.png", b"png png png".to_vec());
        let mut replacements = ReplacementSet::new();
        replacements
            .insert_outcome(&TranscodeOutcome::accepted(&png, "ppt/media/img1.jpg", b"jpg".to_vec()))
            .unwrap();
        replacements
            .insert_member(ArchiveMember::new("ppt/slides/_rels/slide1.xml.rels", b"img1.jpg".to_vec()))
            .unwrap();
        assert_eq!(replacements.len(), 2);

        let out = write_archive(&mut source, &replacements, Cursor::new(Vec::new())).unwrap();
        let members = read_all(out.into_inner());

        assert_eq!(members.len(), 4);
        assert_eq!(members[2].0, "ppt/media/img1.jpg");
        assert_eq!(members[2].1, b"jpg");
        assert_eq!(members[3].0, "ppt/slides/_rels/slide1.xml.rels");
        assert_eq!(members[3].1, b"img1.jpg");
        assert!(!members.iter().any(|(n, _, _)| n == "ppt/media/img1.png"));
    }

    #[test]
    fn test_rejected_outcome_is_not_a_replacement() {
        let png = ArchiveMember::new("ppt/media/img1.png", b"png".to_vec());
        let mut replacements = ReplacementSet::new();
        replacements.insert_outcome(&TranscodeOutcome::rejected(&png)).unwrap();
        assert!(replacements.is_empty());
    }

    #[test]
    fn test_duplicate_replacement_rejected() {
        let mut replacements = ReplacementSet::new();
        let member = ArchiveMember::new("ppt/slides/_rels/slide1.xml.rels", b"x".to_vec());
        replacements.insert_member(member.clone()).unwrap();
        assert!(matches!(
            replacements.insert_member(member),
            Err(Error::DuplicateMember(_))
        ));
    }

    #[test]
    fn test_rename_onto_existing_member_fails() {
        let mut source = source();
        let png = ArchiveMember::new("ppt/media/img1.png", b"png".to_vec());
        let mut replacements = ReplacementSet::new();
        replacements
            .insert_outcome(&TranscodeOutcome::accepted(
                &png,
                "ppt/slides/_rels/slide1.xml.rels",
                b"x".to_vec(),
            ))
            .unwrap();

        let result = write_archive(&mut source, &replacements, Cursor::new(Vec::new()));
        assert!(matches!(result, Err(Error::DuplicateMember(_))));
    }

    #[test]
    fn test_replacement_for_unknown_member_fails() {
        let mut source = source();
        let mut replacements = ReplacementSet::new();
        replacements
            .insert_member(ArchiveMember::new("ppt/slides/_rels/slide9.xml.rels", b"x".to_vec()))
            .unwrap();

        let result = write_archive(&mut source, &replacements, Cursor::new(Vec::new()));
        assert!(matches!(result, Err(Error::MemberNotFound(p)) if p == "ppt/slides/_rels/slide9.xml.rels"));
    }
}
