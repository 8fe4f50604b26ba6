//! External-tool image transcoders for presentation media optimization.
//!
//! Each transcoder stages the member's bytes in a private scratch directory,
//! runs an external program on it, and reads the result back. The scratch
//! directory is removed when the call returns, on success and failure alike.

pub mod lossless;
pub mod lossy;
mod scratch;

#[cfg(all(test, unix))]
mod testing;

pub use lossless::LosslessRecompress;
pub use lossy::ConvertToLossyFormat;
