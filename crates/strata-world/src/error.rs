//! Errors surfaced by world persistence.

use std::io;
use std::path::PathBuf;

use strata_voxel::RegionError;
use thiserror::Error;

/// Errors that can occur while loading or saving a world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// A region store failed; write failures leave the cached data intact.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// A world directory or metadata file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A metadata file exists but does not parse.
    #[error("malformed {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Background generation workers could not be started.
    #[error("failed to start generation workers: {0}")]
    Workers(#[source] io::Error),
}
