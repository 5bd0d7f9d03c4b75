//! Hand-assembly of object streams for tests.
//!
//! [`StreamBuilder`] writes the wire format directly and numbers handles in
//! the same order the decoder assigns them, so tests can emit back
//! references without decoding first.

use qpdata_buffers::Writer;

use crate::constants::*;
use crate::types::Handle;

/// Field declaration of a [`ClassSpec`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub code: u8,
    pub name: String,
    /// Type signature for object and array fields, e.g. `Ljava/lang/String;`.
    pub type_name: Option<String>,
}

/// How a descriptor position is filled.
#[derive(Debug, Clone)]
pub enum ClassRef {
    New(Box<ClassSpec>),
    /// A dynamic proxy class implementing these interfaces.
    Proxy(Vec<String>),
    Handle(Handle),
    Null,
}

impl From<ClassSpec> for ClassRef {
    fn from(spec: ClassSpec) -> Self {
        ClassRef::New(Box::new(spec))
    }
}

/// A class descriptor to be written.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: String,
    pub suid: i64,
    pub flags: u8,
    pub fields: Vec<FieldSpec>,
    pub super_class: ClassRef,
}

impl ClassSpec {
    /// A plain serializable class with no fields.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            suid: 1,
            flags: SC_SERIALIZABLE,
            fields: Vec::new(),
            super_class: ClassRef::Null,
        }
    }

    /// An array class such as `[D` or `[Ljava.lang.Object;`.
    pub fn array(name: &str) -> Self {
        Self::new(name)
    }

    /// An enum type, with `java.lang.Enum` as its super class.
    pub fn enumeration(name: &str) -> Self {
        let mut base = Self::new("java.lang.Enum");
        base.suid = 0;
        base.flags = SC_SERIALIZABLE | SC_ENUM;
        let mut spec = Self::new(name);
        spec.suid = 0;
        spec.flags = SC_SERIALIZABLE | SC_ENUM;
        spec.super_class = base.into();
        spec
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Marks the class as writing custom data after its fields.
    pub fn write_method(mut self) -> Self {
        self.flags |= SC_WRITE_METHOD;
        self
    }

    pub fn extends(mut self, parent: impl Into<ClassRef>) -> Self {
        self.super_class = parent.into();
        self
    }

    /// Adds a primitive field; `code` is one of `B C D F I J S Z`.
    pub fn field(mut self, code: u8, name: &str) -> Self {
        self.fields.push(FieldSpec {
            code,
            name: name.to_owned(),
            type_name: None,
        });
        self
    }

    /// Adds an object field with a JVM signature like `Ljava/lang/String;`.
    pub fn object_field(mut self, name: &str, signature: &str) -> Self {
        let code = if signature.starts_with('[') {
            TYPE_ARRAY
        } else {
            TYPE_OBJECT
        };
        self.fields.push(FieldSpec {
            code,
            name: name.to_owned(),
            type_name: Some(signature.to_owned()),
        });
        self
    }
}

/// Writes a stream one wire element at a time.
///
/// ```
/// use qpdata_object_stream::testing::{ClassSpec, StreamBuilder};
/// use qpdata_object_stream::ObjectStreamDecoder;
///
/// let mut b = StreamBuilder::new();
/// b.begin_object(ClassSpec::new("demo.Point").field(b'I', "x").field(b'I', "y"));
/// b.int(3).int(4);
/// let graph = ObjectStreamDecoder::new().decode(&b.finish()).unwrap();
/// let point = graph.as_object(graph.root().unwrap()).unwrap();
/// assert_eq!(point.field("y").and_then(|v| v.as_f64()), Some(4.0));
/// ```
#[derive(Debug, Default)]
pub struct StreamBuilder {
    writer: Writer,
    next: u32,
}

impl StreamBuilder {
    /// Starts a stream with the magic/version preamble.
    pub fn new() -> Self {
        let mut b = Self::headless();
        b.writer.buf(&STREAM_PREAMBLE);
        b
    }

    /// Starts a stream without a preamble.
    pub fn headless() -> Self {
        Self::default()
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.writer.flush()
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Handle the decoder will assign next.
    pub fn next_handle(&self) -> Handle {
        BASE_WIRE_HANDLE + self.next
    }

    fn assign(&mut self) -> Handle {
        let h = self.next_handle();
        self.next += 1;
        h
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.writer.buf(bytes);
        self
    }

    pub fn byte(&mut self, v: i8) -> &mut Self {
        self.writer.i8(v);
        self
    }

    pub fn boolean(&mut self, v: bool) -> &mut Self {
        self.writer.u8(v as u8);
        self
    }

    pub fn char(&mut self, v: u16) -> &mut Self {
        self.writer.u16(v);
        self
    }

    pub fn short(&mut self, v: i16) -> &mut Self {
        self.writer.i16(v);
        self
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.writer.i32(v);
        self
    }

    pub fn long(&mut self, v: i64) -> &mut Self {
        self.writer.i64(v);
        self
    }

    pub fn float(&mut self, v: f32) -> &mut Self {
        self.writer.f32(v);
        self
    }

    pub fn double(&mut self, v: f64) -> &mut Self {
        self.writer.f64(v);
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.writer.u8(TC_NULL);
        self
    }

    pub fn reference(&mut self, handle: Handle) -> &mut Self {
        self.writer.u8(TC_REFERENCE);
        self.writer.u32(handle);
        self
    }

    pub fn reset(&mut self) -> &mut Self {
        self.writer.u8(TC_RESET);
        self.next = 0;
        self
    }

    /// Length-prefixed modified UTF-8, as used for names.
    pub fn utf(&mut self, s: &str) -> &mut Self {
        let bytes = encode_mutf8(s);
        self.writer.u16(bytes.len() as u16);
        self.writer.buf(&bytes);
        self
    }

    /// A `TC_STRING` (or `TC_LONGSTRING` past 65535 bytes).
    pub fn string(&mut self, s: &str) -> Handle {
        let bytes = encode_mutf8(s);
        if bytes.len() > u16::MAX as usize {
            self.writer.u8(TC_LONGSTRING);
            self.writer.i64(bytes.len() as i64);
        } else {
            self.writer.u8(TC_STRING);
            self.writer.u16(bytes.len() as u16);
        }
        self.writer.buf(&bytes);
        self.assign()
    }

    pub fn long_string(&mut self, s: &str) -> Handle {
        let bytes = encode_mutf8(s);
        self.writer.u8(TC_LONGSTRING);
        self.writer.i64(bytes.len() as i64);
        self.writer.buf(&bytes);
        self.assign()
    }

    /// A block-data record, short or long form by length.
    pub fn block(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.len() <= u8::MAX as usize {
            self.writer.u8(TC_BLOCKDATA);
            self.writer.u8(bytes.len() as u8);
        } else {
            self.writer.u8(TC_BLOCKDATALONG);
            self.writer.i32(bytes.len() as i32);
        }
        self.writer.buf(bytes);
        self
    }

    pub fn end_block(&mut self) -> &mut Self {
        self.writer.u8(TC_ENDBLOCKDATA);
        self
    }

    /// Writes a descriptor position. Returns the handle of a new descriptor,
    /// or the referenced handle.
    pub fn class_ref(&mut self, class: impl Into<ClassRef>) -> Option<Handle> {
        match class.into() {
            ClassRef::New(spec) => Some(self.class_desc(&spec)),
            ClassRef::Proxy(interfaces) => {
                let names: Vec<&str> = interfaces.iter().map(String::as_str).collect();
                Some(self.proxy_desc(&names))
            }
            ClassRef::Handle(h) => {
                self.reference(h);
                Some(h)
            }
            ClassRef::Null => {
                self.null();
                None
            }
        }
    }

    pub fn class_desc(&mut self, spec: &ClassSpec) -> Handle {
        self.writer.u8(TC_CLASSDESC);
        self.utf(&spec.name);
        self.writer.i64(spec.suid);
        let handle = self.assign();
        self.writer.u8(spec.flags);
        self.writer.u16(spec.fields.len() as u16);
        for field in &spec.fields {
            self.writer.u8(field.code);
            self.utf(&field.name);
            if let Some(type_name) = &field.type_name {
                self.string(type_name);
            }
        }
        self.end_block();
        self.class_ref(spec.super_class.clone());
        handle
    }

    pub fn proxy_desc(&mut self, interfaces: &[&str]) -> Handle {
        self.writer.u8(TC_PROXYCLASSDESC);
        let handle = self.assign();
        self.writer.i32(interfaces.len() as i32);
        for name in interfaces {
            self.utf(name);
        }
        self.end_block();
        self.null();
        handle
    }

    /// Writes `TC_OBJECT` and its descriptor. Field values follow, written
    /// by the caller in declaration order, least-derived class first.
    pub fn begin_object(&mut self, class: impl Into<ClassRef>) -> Handle {
        self.writer.u8(TC_OBJECT);
        self.class_ref(class);
        self.assign()
    }

    /// Writes `TC_ARRAY`, its descriptor and length. Elements follow.
    pub fn begin_array(&mut self, class: impl Into<ClassRef>, len: i32) -> Handle {
        self.writer.u8(TC_ARRAY);
        self.class_ref(class);
        let handle = self.assign();
        self.writer.i32(len);
        handle
    }

    pub fn double_array(&mut self, class: impl Into<ClassRef>, values: &[f64]) -> Handle {
        let h = self.begin_array(class, values.len() as i32);
        for v in values {
            self.double(*v);
        }
        h
    }

    pub fn float_array(&mut self, class: impl Into<ClassRef>, values: &[f32]) -> Handle {
        let h = self.begin_array(class, values.len() as i32);
        for v in values {
            self.float(*v);
        }
        h
    }

    pub fn int_array(&mut self, class: impl Into<ClassRef>, values: &[i32]) -> Handle {
        let h = self.begin_array(class, values.len() as i32);
        for v in values {
            self.int(*v);
        }
        h
    }

    pub fn byte_array(&mut self, class: impl Into<ClassRef>, values: &[u8]) -> Handle {
        let h = self.begin_array(class, values.len() as i32);
        self.writer.buf(values);
        h
    }

    /// Writes `TC_ENUM`. Returns the constant's handle.
    pub fn enum_constant(&mut self, class: impl Into<ClassRef>, constant: &str) -> Handle {
        self.writer.u8(TC_ENUM);
        self.class_ref(class);
        let handle = self.assign();
        self.string(constant);
        handle
    }

    /// Writes `TC_CLASS`. Returns the class object's handle.
    pub fn class_object(&mut self, class: impl Into<ClassRef>) -> Handle {
        self.writer.u8(TC_CLASS);
        self.class_ref(class);
        self.assign()
    }

    /// Writes `TC_EXCEPTION`; the producer's implicit reset follows.
    pub fn begin_exception(&mut self) -> &mut Self {
        self.writer.u8(TC_EXCEPTION);
        self.next = 0;
        self
    }

    /// The implicit reset after the exception object.
    pub fn end_exception(&mut self) -> &mut Self {
        self.next = 0;
        self
    }
}

/// Encodes text the way `DataOutput.writeUTF` does.
pub fn encode_mutf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}
