//! Decoder error and diagnostic types.

use std::fmt;

use qpdata_buffers::BufferError;
use thiserror::Error;

use crate::types::Handle;

/// How a failure affects the file being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Decoding continues; the affected value is partial.
    Soft,
    /// Decoding of this file stops.
    Hard,
}

/// Budget counter that tripped a [`ProtocolError::ResourceLimitExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Handles,
    Depth,
    Bytes,
    Steps,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LimitKind::Handles => "handle count",
            LimitKind::Depth => "nesting depth",
            LimitKind::Bytes => "stream size",
            LimitKind::Steps => "dispatch steps",
        };
        f.write_str(s)
    }
}

/// Error type for object stream decoding. Offsets are relative to the start
/// of the stream segment handed to the decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad stream preamble: magic 0x{magic:04x}, version {version}")]
    BadMagic { magic: u16, version: u16 },
    #[error("stream desynchronized at offset {offset}: {reason}")]
    Desync { offset: usize, reason: String },
    #[error("{limit} limit exceeded at offset {offset}")]
    ResourceLimitExceeded { limit: LimitKind, offset: usize },
    #[error("reset at offset {offset} inside an object (depth {depth})")]
    UnexpectedReset { offset: usize, depth: usize },
    #[error("producer aborted the write of an enclosing object at offset {offset}")]
    WriteAborted { offset: usize },
    #[error("unsupported stream construct at offset {offset}: {what}")]
    Unsupported { offset: usize, what: &'static str },
    #[error("decode cancelled at offset {offset}")]
    Cancelled { offset: usize },
    #[error("graph node {node} was never filled in")]
    Unresolved { node: usize },
}

impl ProtocolError {
    pub(crate) fn desync(offset: usize, reason: impl Into<String>) -> Self {
        ProtocolError::Desync {
            offset,
            reason: reason.into(),
        }
    }

    /// Byte offset at which the error was detected, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ProtocolError::BadMagic { .. } => Some(0),
            ProtocolError::Desync { offset, .. }
            | ProtocolError::ResourceLimitExceeded { offset, .. }
            | ProtocolError::UnexpectedReset { offset, .. }
            | ProtocolError::WriteAborted { offset }
            | ProtocolError::Unsupported { offset, .. }
            | ProtocolError::Cancelled { offset } => Some(*offset),
            ProtocolError::Unresolved { .. } => None,
        }
    }

    /// Every `ProtocolError` that escapes the decoder ends that file's decode.
    /// Recoverable problems are reported as [`Diagnostic`]s instead.
    pub fn severity(&self) -> Severity {
        Severity::Hard
    }
}

impl From<BufferError> for ProtocolError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer {
                offset,
                needed,
                available,
            } => ProtocolError::desync(
                offset,
                format!("unexpected end of stream (needed {needed} bytes, {available} left)"),
            ),
        }
    }
}

/// A recoverable decode problem. The value it concerns is kept, possibly
/// partially populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: usize,
    /// Handle of the enclosing object, array, or descriptor, when there is one.
    pub handle: Option<Handle>,
    pub message: String,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        Severity::Soft
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle {
            Some(h) => write!(f, "offset {} (handle 0x{h:x}): {}", self.offset, self.message),
            None => write!(f, "offset {}: {}", self.offset, self.message),
        }
    }
}
