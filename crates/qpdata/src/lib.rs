//! Reader for QuPath `.qpdata` containers.
//!
//! A container is a version header, a JSON metadata block and a serialized
//! object hierarchy, with no framing between them. Reading one is three
//! steps:
//!
//! 1. [`SegmentLocator`] finds the segments by content.
//! 2. [`ObjectStreamDecoder`] turns the object stream into an
//!    [`ObjectGraph`] without instantiating any class.
//! 3. [`GraphWalker`] recognizes hierarchy objects in the graph and reads
//!    them into [`AnnotationRecord`]s and a [`HierarchySummary`].
//!
//! [`decode_container`] runs all three. [`Project`] does it for every image
//! of a project directory, and [`write_report`] exports the result.
//!
//! ```
//! use qpdata::{decode_container, ContainerOptions};
//!
//! let out = decode_container(b"not a container", &ContainerOptions::default());
//! assert!(out.graph.is_none());
//! assert!(out.error.is_some());
//! ```

mod container;
mod error;
mod export;
mod project;
mod record;
mod segments;
mod walker;
mod wkb;

pub use container::{decode_container, read_container, ContainerOptions, DecodedContainer};
pub use error::{ContainerError, FormatError, ProjectError};
pub use export::{
    feature, feature_collection, geometry, write_report, ExportOptions, ExportPaths, EXPORT_FILE,
    GEOJSON_FILE, GEOJSON_UNCLASSIFIED, GRAPH_DIR,
};
pub use project::{
    ImageEntry, ImageReport, ParsedData, Project, ProjectOptions, ProjectReport, DATA_DIR,
    DATA_FILE, LEGEND_FILE, MANIFEST_FILE, SUMMARY_FILE,
};
pub use record::{
    AnnotationRecord, HierarchySummary, ObjectKind, Point, UnknownClassWarning, UNCLASSIFIED,
};
pub use segments::{printable_strings, LocatorConfig, RawSegments, SegmentLocator, StreamSegment};
pub use walker::{GraphWalker, Roi, WalkOutput, WalkerConfig};
pub use wkb::{parse_wkb, WkbError, WkbGeometry, WkbKind};

pub use qpdata_object_stream::{
    graph_to_json, CancelToken, DecodeLimits, Diagnostic, GenericValue, ObjectGraph,
    ObjectStreamDecoder, ProtocolError,
};
