//! PPTX (Office Open XML) archive handling for media optimization.
//!
//! Reads the members of a .pptx ZIP archive, runs an image transcoder over
//! its embedded media, repairs the references to renamed media, and writes a
//! new archive.

pub mod archive;
pub mod content_types;
pub mod optimizer;
pub mod writer;

pub use archive::PresentationArchive;
pub use optimizer::{PresentationOptimizer, Stage};
pub use writer::{write_archive, ReplacementSet};
