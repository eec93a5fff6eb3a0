//! Error types for sheet2pdf

use std::path::PathBuf;

use thiserror::Error;

use crate::bridge::BridgeError;

/// Result type alias for sheet2pdf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a whole folder from being processed.
///
/// Problems with a single workbook never surface here; they are recorded as
/// a [`FileOutcome`](crate::FileOutcome) and the batch moves on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("folder '{}' does not exist", .0.display())]
    FolderNotFound(PathBuf),

    #[error("failed to read folder '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
