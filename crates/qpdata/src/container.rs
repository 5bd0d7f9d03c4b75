//! One container file end to end: locate segments, decode the object stream,
//! walk the hierarchy.

use std::fs;
use std::path::Path;

use qpdata_object_stream::{
    CancelToken, DecodeLimits, Diagnostic, ObjectGraph, ObjectStreamDecoder,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ContainerError;
use crate::segments::{RawSegments, SegmentLocator};
use crate::walker::{GraphWalker, WalkOutput};

/// Settings for [`decode_container`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    pub locator: SegmentLocator,
    pub limits: DecodeLimits,
    pub cancel: Option<CancelToken>,
    pub walker: GraphWalker,
}

/// Everything recovered from one container. A stream failure does not hide
/// the segments and metadata found before it.
#[derive(Debug, Default)]
pub struct DecodedContainer {
    pub segments: RawSegments,
    pub metadata: Option<Value>,
    pub graph: Option<ObjectGraph>,
    pub walk: Option<WalkOutput>,
    /// Recoverable problems met while decoding the stream.
    pub diagnostics: Vec<Diagnostic>,
    /// Why no graph was produced.
    pub error: Option<ContainerError>,
}

impl DecodedContainer {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Decodes a container held in memory. Never fails: problems are reported on
/// the returned value.
pub fn decode_container(bytes: &[u8], options: &ContainerOptions) -> DecodedContainer {
    let _span = tracing::debug_span!("decode_container", len = bytes.len()).entered();
    let segments = options.locator.locate(bytes);
    let metadata = segments.metadata();
    let mut out = DecodedContainer {
        metadata,
        ..DecodedContainer::default()
    };

    let graph = segments
        .require_stream()
        .map_err(ContainerError::from)
        .and_then(|stream| {
            let mut decoder = ObjectStreamDecoder::new().with_limits(options.limits);
            if let Some(token) = &options.cancel {
                decoder = decoder.with_cancel_token(token.clone());
            }
            let data = stream.bytes(bytes);
            let graph = if stream.has_preamble {
                decoder.decode(data)
            } else {
                debug!(offset = stream.range.start, "decoding stream without preamble");
                decoder.decode_headless(data)
            };
            graph.map_err(|err| {
                // Offsets in decoder errors are relative to the segment.
                warn!(%err, segment_start = stream.range.start, "object stream decode failed");
                ContainerError::from(err)
            })
        });
    out.segments = segments;

    match graph {
        Ok(graph) => {
            out.diagnostics = graph.diagnostics.clone();
            out.walk = Some(options.walker.walk(&graph));
            out.graph = Some(graph);
        }
        Err(err) => out.error = Some(err),
    }
    out
}

/// Reads and decodes a container file. Only I/O errors are returned as `Err`.
pub fn read_container(
    path: &Path,
    options: &ContainerOptions,
) -> Result<DecodedContainer, ContainerError> {
    let bytes = fs::read(path).map_err(|source| ContainerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_container(&bytes, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;

    #[test]
    fn empty_input_reports_every_segment_missing() {
        let out = decode_container(&[], &ContainerOptions::default());
        assert!(out.graph.is_none());
        assert!(matches!(
            out.error,
            Some(ContainerError::Format(FormatError::MissingStreamMarker))
        ));
        assert_eq!(out.segments.issues.len(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_container(
            Path::new("/nonexistent/data.qpdata"),
            &ContainerOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ContainerError::Io { .. }));
    }
}
