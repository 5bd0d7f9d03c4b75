use std::io;
use std::path::PathBuf;

use qpdata_object_stream::ProtocolError;
use thiserror::Error;

/// A container segment that could not be located. Always soft: it is recorded
/// on [`RawSegments`](crate::RawSegments) and the other segments are still
/// located.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("no version header found")]
    MissingVersionHeader,
    #[error("no JSON metadata block found")]
    MissingJsonBlock,
    #[error("no object stream found")]
    MissingStreamMarker,
    #[error("JSON metadata block at offset {offset} is not valid JSON: {reason}")]
    InvalidJson { offset: usize, reason: String },
}

/// Failure to read one container file.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure to read a project directory as a whole. Per-image problems are
/// recorded on the image entry instead.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
