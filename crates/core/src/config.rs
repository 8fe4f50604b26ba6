//! Run configuration and member selection.

use crate::{Error, Result};
use std::num::NonZeroUsize;

/// Directory holding embedded media.
pub const DEFAULT_MEDIA_PREFIX: &str = "ppt/media/";

/// Extension of images eligible for optimization.
pub const DEFAULT_IMAGE_EXTENSION: &str = ".png";

/// Relationship directory of slides.
pub const SLIDE_RELS_PREFIX: &str = "ppt/slides/_rels/";

/// Relationship directories of the other parts that can embed media.
pub const EXTRA_RELS_PREFIXES: &[&str] = &[
    "ppt/slideLayouts/_rels/",
    "ppt/slideMasters/_rels/",
    "ppt/notesSlides/_rels/",
    "ppt/notesMasters/_rels/",
    "ppt/handoutMasters/_rels/",
];

/// Worker count used when the available parallelism cannot be queried.
const FALLBACK_WORKERS: usize = 4;

/// Settings for one optimization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Maximum number of transcodes running at once.
    pub workers: usize,

    /// Path prefix of eligible images (case-insensitive).
    pub media_prefix: String,

    /// Path suffix of eligible images (case-insensitive).
    pub image_extension: String,

    /// Path prefixes of reference members (case-insensitive).
    pub reference_prefixes: Vec<String>,

    /// Register the extension of renamed images in `[Content_Types].xml`.
    pub update_content_types: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(FALLBACK_WORKERS),
            media_prefix: DEFAULT_MEDIA_PREFIX.to_string(),
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            reference_prefixes: vec![SLIDE_RELS_PREFIX.to_string()],
            update_content_types: true,
        }
    }

    /// Set the number of parallel workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Also rewrite relationships of layouts, masters and notes.
    pub fn with_all_relationships(mut self) -> Self {
        for prefix in EXTRA_RELS_PREFIXES {
            if !self.reference_prefixes.iter().any(|p| p == prefix) {
                self.reference_prefixes.push((*prefix).to_string());
            }
        }
        self
    }

    /// Enable or disable `[Content_Types].xml` maintenance.
    pub fn with_content_types(mut self, update: bool) -> Self {
        self.update_content_types = update;
        self
    }

    /// Check the configuration before a run.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::UsageError(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.image_extension.is_empty() {
            return Err(Error::UsageError(
                "image extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `path` names an image eligible for transcoding.
    pub fn is_eligible_image(&self, path: &str) -> bool {
        starts_with_ignore_case(path, &self.media_prefix)
            && ends_with_ignore_case(path, &self.image_extension)
    }

    /// Whether `path` names a member that references media by filename.
    pub fn is_reference(&self, path: &str) -> bool {
        !path.ends_with('/')
            && self
                .reference_prefixes
                .iter()
                .any(|prefix| starts_with_ignore_case(path, prefix))
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.as_bytes()[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OptimizerConfig::default();
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = OptimizerConfig::new().with_workers(0);
        assert!(matches!(config.validate(), Err(Error::UsageError(_))));
    }

    #[test]
    fn test_is_eligible_image() {
        let config = OptimizerConfig::new();
        assert!(config.is_eligible_image("ppt/media/image1.png"));
        assert!(config.is_eligible_image("PPT/Media/IMAGE1.PNG"));
        assert!(!config.is_eligible_image("ppt/media/image1.jpeg"));
        assert!(!config.is_eligible_image("ppt/slides/image1.png"));
        assert!(!config.is_eligible_image("word/media/image1.png"));
        assert!(!config.is_eligible_image("png"));
    }

    #[test]
    fn test_is_reference() {
        let config = OptimizerConfig::new();
        assert!(config.is_reference("ppt/slides/_rels/slide1.xml.rels"));
        assert!(config.is_reference("PPT/SLIDES/_RELS/slide1.xml.rels"));
        assert!(!config.is_reference("ppt/slides/_rels/"));
        assert!(!config.is_reference("ppt/slideLayouts/_rels/slideLayout1.xml.rels"));

        let config = config.with_all_relationships();
        assert!(config.is_reference("ppt/slideLayouts/_rels/slideLayout1.xml.rels"));
        assert!(config.is_reference("ppt/notesSlides/_rels/notesSlide1.xml.rels"));
    }

    #[test]
    fn test_with_all_relationships_is_idempotent() {
        let once = OptimizerConfig::new().with_all_relationships();
        let twice = once.clone().with_all_relationships();
        assert_eq!(once.reference_prefixes, twice.reference_prefixes);
        assert_eq!(once.reference_prefixes.len(), 1 + EXTRA_RELS_PREFIXES.len());
    }
}
