//! The optimization pipeline.
//!
//! A run moves through `Scanning -> Dispatching -> Collecting -> Rewriting ->
//! Writing -> Done`. Any error ends it in `Failed` before the output archive
//! is finalized.

use crate::archive::PresentationArchive;
use crate::content_types::{self, CONTENT_TYPES_PATH};
use crate::writer::{write_archive, ReplacementSet};
use pptslim_core::{
    base_filename, ArchiveMember, Error, ImageTranscoder, OptimizerConfig, ReferenceRewriter, Result, RunReport,
    TranscodeOutcome,
};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

/// Stage of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scanning,
    Dispatching,
    Collecting,
    Rewriting,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanning => "scanning",
            Self::Dispatching => "dispatching",
            Self::Collecting => "collecting",
            Self::Rewriting => "rewriting",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Replacements produced by the rewriting stage.
#[derive(Debug, Default)]
struct Rewrites {
    references: Vec<ArchiveMember>,
    content_types: Option<ArchiveMember>,
}

/// Runs an image transcoder over a presentation's media.
pub struct PresentationOptimizer {
    transcoder: Box<dyn ImageTranscoder>,
    config: OptimizerConfig,
}

impl PresentationOptimizer {
    /// Create an optimizer for the given transcoder and settings.
    pub fn new(transcoder: Box<dyn ImageTranscoder>, config: OptimizerConfig) -> Self {
        Self { transcoder, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize the archive at `input` into a new archive at `output`.
    ///
    /// The output is assembled in a temporary file next to `output` and only
    /// moved into place once complete; on error nothing is left behind.
    pub fn optimize_file(&self, input: &Path, output: &Path) -> Result<RunReport> {
        self.config.validate()?;
        let mut archive = PresentationArchive::open(input)?;

        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staged = tempfile::Builder::new()
            .prefix(".pptslim-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        let (writer, report) = self.optimize(&mut archive, BufWriter::new(staged.as_file()))?;
        writer
            .into_inner()
            .map_err(|e| Error::IoError(e.into_error()))?;

        staged.persist(output).map_err(|e| Error::IoError(e.error))?;
        log::info!("Wrote {}", output.display());

        Ok(report)
    }

    /// Optimize an opened archive into `writer`.
    pub fn optimize<R, W>(
        &self,
        archive: &mut PresentationArchive<R>,
        writer: W,
    ) -> Result<(W, RunReport)>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let mut stage = Stage::Scanning;
        let result = self.run(archive, writer, &mut stage);
        if let Err(ref e) = result {
            log::warn!("Run over {} failed while {}: {}", archive.source(), stage, e);
            advance(&mut stage, Stage::Failed);
        }
        result
    }

    fn run<R, W>(
        &self,
        archive: &mut PresentationArchive<R>,
        writer: W,
        stage: &mut Stage,
    ) -> Result<(W, RunReport)>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        self.config.validate()?;
        let mode = self.transcoder.mode();
        log::debug!("Optimizing {} ({})", archive.source(), mode);

        advance(stage, Stage::Scanning);
        let config = &self.config;
        let images = archive.members_matching(|path| config.is_eligible_image(path))?;
        log::info!("Found {} eligible images in {}", images.len(), archive.source());

        let mut outcomes = self.dispatch(&images, stage)?;
        resolve_collisions(archive.names(), &mut outcomes);
        resolve_ambiguous_renames(archive.names(), &mut outcomes);

        let rewrites = if mode.renames_members() {
            advance(stage, Stage::Rewriting);
            self.rewrite(archive, &outcomes)?
        } else {
            Rewrites::default()
        };

        advance(stage, Stage::Writing);
        let mut replacements = ReplacementSet::new();
        for outcome in &outcomes {
            replacements.insert_outcome(outcome)?;
        }
        let references_rewritten = rewrites.references.len();
        for member in rewrites.references {
            replacements.insert_member(member)?;
        }
        let content_types_updated = rewrites.content_types.is_some();
        if let Some(member) = rewrites.content_types {
            replacements.insert_member(member)?;
        }
        let writer = write_archive(archive, &replacements, writer)?;

        let mut report = RunReport::from_outcomes(mode, archive.len(), &outcomes);
        report.references_rewritten = references_rewritten;
        report.content_types_updated = content_types_updated;

        advance(stage, Stage::Done);
        log::info!(
            "{} images: {} replaced, {} kept, {} bytes saved",
            report.images_examined,
            report.images_replaced,
            report.images_kept,
            report.bytes_saved()
        );

        Ok((writer, report))
    }

    /// Transcode every image on a bounded worker pool.
    ///
    /// Outcomes come back in the order of `images`. The first failure is
    /// returned once the tasks already running have finished.
    fn dispatch(&self, images: &[ArchiveMember], stage: &mut Stage) -> Result<Vec<TranscodeOutcome>> {
        advance(stage, Stage::Dispatching);
        if images.is_empty() {
            advance(stage, Stage::Collecting);
            return Ok(Vec::new());
        }

        let workers = self.config.workers.min(images.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pptslim-worker-{}", i))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        log::debug!("Dispatching {} images to {} workers", images.len(), workers);

        let transcoder = self.transcoder.as_ref();
        advance(stage, Stage::Collecting);
        pool.install(|| {
            images
                .par_iter()
                .map(|member| transcoder.transcode(member))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Rewrite references to renamed media and register new extensions.
    fn rewrite<R: Read + Seek>(
        &self,
        archive: &mut PresentationArchive<R>,
        outcomes: &[TranscodeOutcome],
    ) -> Result<Rewrites> {
        let rewriter = ReferenceRewriter::from_outcomes(outcomes);
        if rewriter.is_empty() {
            log::debug!("No renamed media, references untouched");
            return Ok(Rewrites::default());
        }

        let config = &self.config;
        let references = archive.members_matching(|path| config.is_reference(path))?;
        let rewritten = rewriter.rewrite_all(&references);
        log::debug!(
            "Rewrote {} of {} reference members",
            rewritten.len(),
            references.len()
        );

        let content_types = if self.config.update_content_types {
            self.register_extensions(archive, outcomes)?
        } else {
            None
        };

        Ok(Rewrites {
            references: rewritten,
            content_types,
        })
    }

    fn register_extensions<R: Read + Seek>(
        &self,
        archive: &mut PresentationArchive<R>,
        outcomes: &[TranscodeOutcome],
    ) -> Result<Option<ArchiveMember>> {
        if !archive.contains(CONTENT_TYPES_PATH) {
            log::warn!(
                "{} has no {}, content types not updated",
                archive.source(),
                CONTENT_TYPES_PATH
            );
            return Ok(None);
        }

        let extensions: BTreeSet<String> = outcomes
            .iter()
            .filter_map(TranscodeOutcome::renamed_filenames)
            .filter_map(|(_, new_name)| new_name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .collect();

        let original = archive.read_member(CONTENT_TYPES_PATH)?;
        let mut current = original.clone();
        for extension in &extensions {
            let Some(content_type) = content_types::content_type_for(extension) else {
                log::warn!("No content type known for .{}", extension);
                continue;
            };
            if let Some(updated) = content_types::ensure_default(&current, extension, content_type)? {
                current = updated;
            }
        }

        Ok((current != original).then_some(current))
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    log::debug!("Stage: {} -> {}", stage, next);
    *stage = next;
}

/// Downgrade renames that would collide with another member.
///
/// Part names are compared case-insensitively. A renamed outcome collides
/// with any original member other than its own, and with the new path of
/// any earlier accepted rename.
fn resolve_collisions(names: &[String], outcomes: &mut [TranscodeOutcome]) {
    let mut taken: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();

    for outcome in outcomes.iter_mut() {
        let Some(new_path) = outcome.new_path() else {
            continue;
        };
        let key = new_path.to_lowercase();
        if key == outcome.original_path.to_lowercase() {
            continue;
        }
        if taken.contains(&key) {
            log::warn!(
                "Keeping {}: {} already exists in the archive",
                outcome.original_path,
                new_path
            );
            outcome.reject();
        } else {
            taken.insert(key);
        }
    }
}

/// Downgrade renames whose old filename would also match a member that stays.
///
/// References are rewritten by filename alone, so renaming `img1.png` must not
/// touch references to a kept `other/img1.png` or `myimg1.png`. Matching is by
/// substring, which is transitive, so comparing against the members kept
/// before this pass is enough.
fn resolve_ambiguous_renames(names: &[String], outcomes: &mut [TranscodeOutcome]) {
    let renamed: HashSet<String> = outcomes
        .iter()
        .filter(|o| o.renamed_filenames().is_some())
        .map(|o| o.original_path.clone())
        .collect();
    let kept: Vec<&String> = names.iter().filter(|n| !renamed.contains(*n)).collect();

    for outcome in outcomes.iter_mut() {
        let Some((old_name, _)) = outcome.renamed_filenames() else {
            continue;
        };
        let Some(clash) = kept.iter().find(|n| base_filename(n).contains(old_name)) else {
            continue;
        };
        log::warn!(
            "Keeping {}: references to it cannot be told apart from {}",
            outcome.original_path,
            clash
        );
        outcome.reject();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pptslim_core::OptimizeMode;
    use std::io::Cursor;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn png(path: &str) -> ArchiveMember {
        ArchiveMember::new(path, vec![0u8; 100])
    }

    #[test]
    fn test_resolve_collisions_with_existing_member() {
        let names = vec![
            "ppt/media/img1.png".to_string(),
            "ppt/media/IMG1.JPG".to_string(),
            "ppt/media/img2.png".to_string(),
        ];
        let mut outcomes = vec![
            TranscodeOutcome::accepted(&png("ppt/media/img1.png"), "ppt/media/img1.jpg", vec![1]),
            TranscodeOutcome::accepted(&png("ppt/media/img2.png"), "ppt/media/img2.jpg", vec![1]),
        ];

        resolve_collisions(&names, &mut outcomes);
        assert!(!outcomes[0].is_accepted());
        assert!(outcomes[1].is_accepted());
    }

    #[test]
    fn test_resolve_collisions_between_outcomes() {
        let names = vec!["ppt/media/a.png".to_string(), "ppt/media/a.PNG".to_string()];
        let mut outcomes = vec![
            TranscodeOutcome::accepted(&png("ppt/media/a.png"), "ppt/media/a.jpg", vec![1]),
            TranscodeOutcome::accepted(&png("ppt/media/a.PNG"), "ppt/media/a.jpg", vec![1]),
        ];

        resolve_collisions(&names, &mut outcomes);
        assert!(outcomes[0].is_accepted());
        assert!(!outcomes[1].is_accepted());
    }

    #[test]
    fn test_in_place_replacement_is_not_a_collision() {
        let names = vec!["ppt/media/a.png".to_string()];
        let mut outcomes = vec![TranscodeOutcome::accepted(
            &png("ppt/media/a.png"),
            "ppt/media/a.png",
            vec![1],
        )];

        resolve_collisions(&names, &mut outcomes);
        assert!(outcomes[0].is_accepted());
    }

    #[test]
    fn test_rename_rejected_when_kept_member_shares_filename() {
        let names = vec![
            "ppt/media/x/img1.png".to_string(),
            "ppt/media/y/img1.png".to_string(),
            "ppt/media/img2.png".to_string(),
        ];
        let mut outcomes = vec![
            TranscodeOutcome::accepted(&png("ppt/media/x/img1.png"), "ppt/media/x/img1.jpg", vec![1]),
            TranscodeOutcome::rejected(&png("ppt/media/y/img1.png")),
            TranscodeOutcome::accepted(&png("ppt/media/img2.png"), "ppt/media/img2.jpg", vec![1]),
        ];

        resolve_ambiguous_renames(&names, &mut outcomes);
        assert!(!outcomes[0].is_accepted());
        assert!(!outcomes[1].is_accepted());
        assert!(outcomes[2].is_accepted());
    }

    #[test]
    fn test_rename_rejected_when_filename_is_suffix_of_kept_member() {
        let names = vec![
            "ppt/media/logo.png".to_string(),
            "ppt/media/mylogo.png".to_string(),
        ];
        let mut outcomes = vec![
            TranscodeOutcome::accepted(&png("ppt/media/logo.png"), "ppt/media/logo.jpg", vec![1]),
            TranscodeOutcome::rejected(&png("ppt/media/mylogo.png")),
        ];

        resolve_ambiguous_renames(&names, &mut outcomes);
        assert!(!outcomes[0].is_accepted());
    }

    #[test]
    fn test_shared_filename_renamed_everywhere_is_kept() {
        let names = vec![
            "ppt/media/x/img1.png".to_string(),
            "ppt/media/y/img1.png".to_string(),
            "ppt/slides/slide1.xml".to_string(),
        ];
        let mut outcomes = vec![
            TranscodeOutcome::accepted(&png("ppt/media/x/img1.png"), "ppt/media/x/img1.jpg", vec![1]),
            TranscodeOutcome::accepted(&png("ppt/media/y/img1.png"), "ppt/media/y/img1.jpg", vec![1]),
        ];

        resolve_ambiguous_renames(&names, &mut outcomes);
        assert!(outcomes.iter().all(TranscodeOutcome::is_accepted));
    }

    struct FailingTranscoder;

    impl ImageTranscoder for FailingTranscoder {
        fn mode(&self) -> OptimizeMode {
            OptimizeMode::PngToJpg
        }

        fn transcode(&self, member: &ArchiveMember) -> Result<TranscodeOutcome> {
            Err(Error::TranscodeToolFailed {
                tool: "convert".to_string(),
                member: member.path.clone(),
                reason: "exit status 1".to_string(),
            })
        }
    }

    #[test]
    fn test_tool_failure_ends_run_while_collecting() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("ppt/media/img1.png", FileOptions::default()).unwrap();
        zip.write_all(&[0u8; 100]).unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let mut archive = PresentationArchive::new(Cursor::new(bytes), "deck.pptx").unwrap();

        let optimizer = PresentationOptimizer::new(
            Box::new(FailingTranscoder),
            OptimizerConfig::default().with_workers(2),
        );
        let mut stage = Stage::Scanning;
        let result = optimizer.run(&mut archive, Cursor::new(Vec::new()), &mut stage);

        assert!(matches!(result, Err(Error::TranscodeToolFailed { .. })));
        assert_eq!(stage, Stage::Collecting);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Rewriting.to_string(), "rewriting");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }
}
