//! Object serialization stream constants.
//!
//! Tag and flag values are fixed by the wire protocol and must match exactly.

/// Stream preamble magic.
pub const STREAM_MAGIC: u16 = 0xaced;
/// Only protocol version ever emitted by producers.
pub const STREAM_VERSION: u16 = 5;
/// Preamble bytes: magic followed by version.
pub const STREAM_PREAMBLE: [u8; 4] = [0xac, 0xed, 0x00, 0x05];

/// First handle assigned after a stream start or reset.
pub const BASE_WIRE_HANDLE: u32 = 0x7e_0000;

// Type tags
pub const TC_NULL: u8 = 0x70;
pub const TC_REFERENCE: u8 = 0x71;
pub const TC_CLASSDESC: u8 = 0x72;
pub const TC_OBJECT: u8 = 0x73;
pub const TC_STRING: u8 = 0x74;
pub const TC_ARRAY: u8 = 0x75;
pub const TC_CLASS: u8 = 0x76;
pub const TC_BLOCKDATA: u8 = 0x77;
pub const TC_ENDBLOCKDATA: u8 = 0x78;
pub const TC_RESET: u8 = 0x79;
pub const TC_BLOCKDATALONG: u8 = 0x7a;
pub const TC_EXCEPTION: u8 = 0x7b;
pub const TC_LONGSTRING: u8 = 0x7c;
pub const TC_PROXYCLASSDESC: u8 = 0x7d;
pub const TC_ENUM: u8 = 0x7e;

// Class descriptor flags
pub const SC_WRITE_METHOD: u8 = 0x01;
pub const SC_SERIALIZABLE: u8 = 0x02;
pub const SC_EXTERNALIZABLE: u8 = 0x04;
pub const SC_BLOCK_DATA: u8 = 0x08;
pub const SC_ENUM: u8 = 0x10;

// Field type codes
pub const TYPE_BYTE: u8 = b'B';
pub const TYPE_CHAR: u8 = b'C';
pub const TYPE_DOUBLE: u8 = b'D';
pub const TYPE_FLOAT: u8 = b'F';
pub const TYPE_INT: u8 = b'I';
pub const TYPE_LONG: u8 = b'J';
pub const TYPE_SHORT: u8 = b'S';
pub const TYPE_BOOLEAN: u8 = b'Z';
pub const TYPE_OBJECT: u8 = b'L';
pub const TYPE_ARRAY: u8 = b'[';

/// Human-readable tag name for diagnostics.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TC_NULL => "TC_NULL",
        TC_REFERENCE => "TC_REFERENCE",
        TC_CLASSDESC => "TC_CLASSDESC",
        TC_OBJECT => "TC_OBJECT",
        TC_STRING => "TC_STRING",
        TC_ARRAY => "TC_ARRAY",
        TC_CLASS => "TC_CLASS",
        TC_BLOCKDATA => "TC_BLOCKDATA",
        TC_ENDBLOCKDATA => "TC_ENDBLOCKDATA",
        TC_RESET => "TC_RESET",
        TC_BLOCKDATALONG => "TC_BLOCKDATALONG",
        TC_EXCEPTION => "TC_EXCEPTION",
        TC_LONGSTRING => "TC_LONGSTRING",
        TC_PROXYCLASSDESC => "TC_PROXYCLASSDESC",
        TC_ENUM => "TC_ENUM",
        _ => "unknown",
    }
}
