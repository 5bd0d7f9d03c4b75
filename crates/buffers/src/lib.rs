//! Binary buffer utilities for qpdata decoding.
//!
//! # Overview
//!
//! - [`Reader`] - Reads big-endian data from a byte slice with cursor tracking.
//!   Every read is bounds-checked and reports the offset it started at.
//! - [`Writer`] - Writes big-endian data to an auto-growing buffer.
//! - [`print_octets`] - Hex dump helper for diagnostics.
//!
//! # Example
//!
//! ```
//! use qpdata_buffers::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.u8(0x01);
//! writer.u16(0x0203);
//! writer.utf8("hello");
//! let data = writer.flush();
//!
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.u8().unwrap(), 0x01);
//! assert_eq!(reader.u16().unwrap(), 0x0203);
//! assert_eq!(reader.buf(5).unwrap(), b"hello");
//! assert!(reader.u8().is_err());
//! ```

mod print_octets;
mod reader;
mod writer;

pub use print_octets::print_octets;
pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

/// Error type for buffer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Attempted to read past the end of the buffer.
    #[error("end of buffer at offset {offset}: needed {needed} bytes, {available} available")]
    EndOfBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl BufferError {
    /// Byte offset at which the failing read started.
    pub fn offset(&self) -> usize {
        match self {
            BufferError::EndOfBuffer { offset, .. } => *offset,
        }
    }
}
