use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the viewer core.
///
/// Only `DirectoryAccess` and `NotFound` are fatal to the command that raised
/// them. `Decode` never leaves the loader: it is folded into the slot state.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("cannot read directory {}: {source}", .path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("cannot change protection of {}: {source}", .path.display())]
    Protection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{} does not seem to be a file or directory", .path.display())]
    NotFound { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ViewerError>;
