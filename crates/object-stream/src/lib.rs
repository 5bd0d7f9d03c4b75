//! Inspection-only decoder for Java object serialization streams.
//!
//! # Overview
//!
//! - [`ObjectStreamDecoder`] - Turns a stream into an [`ObjectGraph`] of
//!   generic values. Nothing is instantiated; class names are data.
//! - [`ObjectGraph`] - Arena of decoded objects and arrays addressed by
//!   [`NodeId`], plus top-level roots and recoverable [`Diagnostic`]s.
//! - [`DecodeLimits`] / [`CancelToken`] - Bounds for untrusted input.
//! - [`graph_to_json`] - Debug rendering of a graph.
//!
//! Malformed framing is a hard [`ProtocolError`]. Problems confined to one
//! value (a dangling back reference, invalid text) become diagnostics and
//! leave the enclosing object marked `partial`.
//!
//! # Example
//!
//! ```
//! use qpdata_object_stream::{decode_stream, GenericValue};
//!
//! let bytes = [0xac, 0xed, 0x00, 0x05, 0x70];
//! let graph = decode_stream(&bytes).unwrap();
//! assert_eq!(graph.root(), Some(&GenericValue::Null));
//! ```

pub mod constants;
mod decoder;
mod error;
mod graph;
mod handles;
mod json;
mod limits;
mod mutf8;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;

pub use decoder::ObjectStreamDecoder;
pub use error::{Diagnostic, LimitKind, ProtocolError, Severity};
pub use graph::ObjectGraph;
pub use handles::{HandleLookup, HandleTable};
pub use json::{graph_to_json, value_to_json};
pub use limits::{CancelToken, DecodeLimits};
pub use types::{
    simple_name, AnnotationEntry, ArrayVal, ClassDescriptor, ClassFlags, ClassLevel,
    FieldDescriptor, FieldType, GenericValue, Handle, Node, NodeId, ObjectVal, Primitive,
};

/// Decodes a stream (preamble included) with default limits.
pub fn decode_stream(data: &[u8]) -> Result<ObjectGraph, ProtocolError> {
    ObjectStreamDecoder::new().decode(data)
}
