/// error.rs — download error taxonomy.
///
/// Every failure inside a resolution chain is normalized into one of these
/// categories before it reaches the bot layer; the bot picks the user-facing
/// wording off the variant.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid {platform} URL format")]
    InvalidUrl { platform: &'static str },

    /// Every strategy in the platform chain was exhausted.
    #[error("{0}")]
    ResolutionFailed(String),

    #[error("file too large (over {limit_mb}MB)")]
    TooLarge { limit_mb: u64 },

    #[error("download timeout exceeded")]
    Timeout,

    /// The chain reported success but the file is missing or empty.
    #[error("download failed: file not created at {0}")]
    MissingFile(PathBuf),
}
