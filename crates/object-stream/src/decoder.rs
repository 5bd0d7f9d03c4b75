//! Object serialization stream decoder.
//!
//! Materializes field data only: no class is loaded, constructed or called
//! back, so the result is safe to inspect regardless of what produced it.

use std::sync::Arc;

use indexmap::IndexMap;
use qpdata_buffers::{print_octets, Reader};
use tracing::{debug, trace};

use crate::constants::*;
use crate::error::{Diagnostic, ProtocolError};
use crate::graph::ObjectGraph;
use crate::handles::HandleLookup;
use crate::limits::{Budget, CancelToken, DecodeLimits};
use crate::mutf8;
use crate::types::{
    AnnotationEntry, ArrayVal, ClassDescriptor, ClassFlags, ClassLevel, FieldDescriptor,
    FieldType, GenericValue, Handle, Node, NodeId, ObjectVal, Primitive,
};

/// Decodes a serialized object stream into an [`ObjectGraph`].
///
/// ```
/// use qpdata_object_stream::{GenericValue, ObjectStreamDecoder};
///
/// // Preamble, then TC_STRING "hi".
/// let bytes = [0xac, 0xed, 0x00, 0x05, 0x74, 0x00, 0x02, b'h', b'i'];
/// let graph = ObjectStreamDecoder::new().decode(&bytes).unwrap();
/// assert_eq!(graph.root(), Some(&GenericValue::String("hi".into())));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectStreamDecoder {
    limits: DecodeLimits,
    cancel: Option<CancelToken>,
}

impl ObjectStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Decodes a stream that starts with the magic/version preamble.
    pub fn decode(&self, data: &[u8]) -> Result<ObjectGraph, ProtocolError> {
        let _span = tracing::debug_span!("decode_stream", len = data.len()).entered();
        let mut state = DecodeState::new(data, self.limits, self.cancel.clone())?;
        state.read_preamble()?;
        state.read_contents()
    }

    /// Decodes stream contents positioned just after a preamble that is not
    /// part of `data`.
    pub fn decode_headless(&self, data: &[u8]) -> Result<ObjectGraph, ProtocolError> {
        let _span = tracing::debug_span!("decode_stream_headless", len = data.len()).entered();
        let state = DecodeState::new(data, self.limits, self.cancel.clone())?;
        state.read_contents()
    }
}

struct DecodeState<'a> {
    reader: Reader<'a>,
    graph: ObjectGraph,
    budget: Budget,
    /// Handles of the objects, arrays and descriptors being decoded.
    owners: Vec<Handle>,
}

impl<'a> DecodeState<'a> {
    fn new(
        data: &'a [u8],
        limits: DecodeLimits,
        cancel: Option<CancelToken>,
    ) -> Result<Self, ProtocolError> {
        let budget = Budget::new(limits, cancel);
        budget.check_bytes(data.len())?;
        Ok(Self {
            reader: Reader::new(data),
            graph: ObjectGraph::default(),
            budget,
            owners: Vec::new(),
        })
    }

    fn read_preamble(&mut self) -> Result<(), ProtocolError> {
        let magic = self.reader.u16()?;
        if magic != STREAM_MAGIC {
            let version = self.reader.u16().unwrap_or(0);
            return Err(ProtocolError::BadMagic { magic, version });
        }
        let version = self.reader.u16()?;
        if version != STREAM_VERSION {
            return Err(ProtocolError::BadMagic { magic, version });
        }
        Ok(())
    }

    fn read_contents(mut self) -> Result<ObjectGraph, ProtocolError> {
        while !self.reader.is_empty() {
            let offset = self.reader.x;
            match self.reader.peek()? {
                TC_RESET => {
                    self.budget.step(offset)?;
                    self.reader.skip(1)?;
                    self.graph.resets += 1;
                    self.reset_handles(offset);
                }
                TC_BLOCKDATA | TC_BLOCKDATALONG => {
                    self.budget.step(offset)?;
                    let bytes = self.read_block()?;
                    self.graph.roots.push(GenericValue::BlockData(bytes));
                }
                TC_EXCEPTION => {
                    self.budget.step(offset)?;
                    self.reader.skip(1)?;
                    let value = self.read_exception(offset)?;
                    self.graph.roots.push(value);
                }
                _ => {
                    let value = self.read_value()?;
                    self.graph.roots.push(value);
                }
            }
        }
        if self.graph.roots.is_empty() {
            return Err(ProtocolError::desync(
                self.reader.x,
                "stream ended before any content",
            ));
        }
        self.graph.verify()?;
        debug!(
            roots = self.graph.roots.len(),
            nodes = self.graph.len(),
            diagnostics = self.graph.diagnostics.len(),
            resets = self.graph.resets,
            "decoded object stream"
        );
        Ok(self.graph)
    }

    fn reset_handles(&mut self, offset: usize) {
        debug!(offset, dropped = self.graph.handles.len(), "handle table reset");
        self.graph.handles.clear();
    }

    fn diagnose(&mut self, offset: usize, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            offset,
            handle: self.owners.last().copied(),
            message: message.into(),
        };
        debug!(%diagnostic, "recoverable decode problem");
        self.graph.diagnostics.push(diagnostic);
    }

    fn assign(&mut self, value: Option<GenericValue>, offset: usize) -> Result<Handle, ProtocolError> {
        self.budget.assign_handle(offset)?;
        Ok(self.graph.handles.assign(value))
    }

    fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.graph.nodes.len());
        self.graph.nodes.push(Node::Pending);
        id
    }

    fn unexpected(&self, offset: usize, tag: u8, expected: &str) -> ProtocolError {
        let end = (offset + 8).min(self.reader.end);
        let context = print_octets(&self.reader.uint8[offset..end], 8);
        ProtocolError::desync(
            offset,
            format!(
                "{} (0x{tag:02x}) where {expected} was expected [{context}]",
                tag_name(tag)
            ),
        )
    }

    /// General dispatcher for one value.
    fn read_value(&mut self) -> Result<GenericValue, ProtocolError> {
        let offset = self.reader.x;
        self.budget.step(offset)?;
        let tag = self.reader.u8()?;
        match tag {
            TC_NULL => Ok(GenericValue::Null),
            TC_REFERENCE => self.read_reference(offset),
            TC_STRING | TC_LONGSTRING => self.read_string_body(tag, offset).map(GenericValue::String),
            TC_OBJECT => self.read_object(offset),
            TC_ARRAY => self.read_array(offset),
            TC_ENUM => self.read_enum(offset),
            TC_CLASS => {
                let desc = self
                    .read_class_desc()?
                    .ok_or_else(|| ProtocolError::desync(offset, "class object without a descriptor"))?;
                self.assign(Some(GenericValue::Class(desc.clone())), offset)?;
                Ok(GenericValue::Class(desc))
            }
            TC_CLASSDESC | TC_PROXYCLASSDESC => {
                self.read_new_class_desc(tag, offset).map(GenericValue::Class)
            }
            TC_RESET => Err(ProtocolError::UnexpectedReset {
                offset,
                depth: self.budget.depth,
            }),
            TC_EXCEPTION => Err(ProtocolError::WriteAborted { offset }),
            _ => Err(self.unexpected(offset, tag, "a value")),
        }
    }

    fn read_reference(&mut self, offset: usize) -> Result<GenericValue, ProtocolError> {
        let handle = self.reader.u32()?;
        let resolved = match self.graph.handles.get(handle) {
            HandleLookup::Resolved(v) => Ok(v.clone()),
            HandleLookup::Pending => Err(format!(
                "reference to handle 0x{handle:x} whose value is still being decoded"
            )),
            HandleLookup::Unknown => Err(format!("reference to unknown handle 0x{handle:x}")),
        };
        match resolved {
            Ok(v) => Ok(v),
            Err(message) => {
                self.diagnose(offset, message);
                Ok(GenericValue::Null)
            }
        }
    }

    /// Length-prefixed modified UTF-8 used for class and field names.
    fn read_utf(&mut self) -> Result<Arc<str>, ProtocolError> {
        let len = self.reader.u16()? as usize;
        let at = self.reader.x;
        let bytes = self.reader.buf(len)?;
        let (s, malformed) = mutf8::decode(bytes);
        if malformed {
            self.diagnose(at, "invalid modified UTF-8 in name");
        }
        Ok(s.into())
    }

    fn read_string_body(&mut self, tag: u8, offset: usize) -> Result<Arc<str>, ProtocolError> {
        let len = if tag == TC_STRING {
            self.reader.u16()? as usize
        } else {
            let len_at = self.reader.x;
            let len = self.reader.i64()?;
            if len < 0 || len as u64 > self.reader.size() as u64 {
                return Err(ProtocolError::desync(
                    len_at,
                    format!("long string length {len} exceeds the remaining stream"),
                ));
            }
            len as usize
        };
        let at = self.reader.x;
        let bytes = self.reader.buf(len)?;
        let (s, malformed) = mutf8::decode(bytes);
        let s: Arc<str> = s.into();
        let handle = self.assign(Some(GenericValue::String(s.clone())), offset)?;
        if malformed {
            self.diagnose(at, format!("invalid modified UTF-8 in string 0x{handle:x}"));
        }
        Ok(s)
    }

    /// A string in a position that only admits strings (field type names).
    fn read_type_string(&mut self) -> Result<Arc<str>, ProtocolError> {
        let offset = self.reader.x;
        self.budget.step(offset)?;
        let tag = self.reader.u8()?;
        match tag {
            TC_STRING | TC_LONGSTRING => self.read_string_body(tag, offset),
            TC_REFERENCE => {
                let handle = self.reader.u32()?;
                match self.graph.handles.get(handle) {
                    HandleLookup::Resolved(GenericValue::String(s)) => Ok(s.clone()),
                    _ => Err(ProtocolError::desync(
                        offset,
                        format!("handle 0x{handle:x} does not name a string"),
                    )),
                }
            }
            _ => Err(self.unexpected(offset, tag, "a field type name")),
        }
    }

    /// Descriptor position: new descriptor, reference, or null.
    fn read_class_desc(&mut self) -> Result<Option<Arc<ClassDescriptor>>, ProtocolError> {
        let offset = self.reader.x;
        self.budget.step(offset)?;
        let tag = self.reader.u8()?;
        match tag {
            TC_NULL => Ok(None),
            TC_REFERENCE => {
                let handle = self.reader.u32()?;
                match self.graph.handles.get(handle) {
                    HandleLookup::Resolved(GenericValue::Class(desc)) => Ok(Some(desc.clone())),
                    HandleLookup::Resolved(_) => Err(ProtocolError::desync(
                        offset,
                        format!("handle 0x{handle:x} is not a class descriptor"),
                    )),
                    HandleLookup::Pending => Err(ProtocolError::desync(
                        offset,
                        format!("descriptor 0x{handle:x} referenced before it was complete"),
                    )),
                    HandleLookup::Unknown => Err(ProtocolError::desync(
                        offset,
                        format!("reference to unknown descriptor handle 0x{handle:x}"),
                    )),
                }
            }
            TC_CLASSDESC | TC_PROXYCLASSDESC => self.read_new_class_desc(tag, offset).map(Some),
            _ => Err(self.unexpected(offset, tag, "a class descriptor")),
        }
    }

    fn read_new_class_desc(
        &mut self,
        tag: u8,
        offset: usize,
    ) -> Result<Arc<ClassDescriptor>, ProtocolError> {
        self.budget.enter(offset)?;
        let desc = if tag == TC_CLASSDESC {
            self.read_non_proxy_desc(offset)?
        } else {
            self.read_proxy_desc(offset)?
        };
        self.budget.leave();
        Ok(desc)
    }

    fn read_non_proxy_desc(&mut self, offset: usize) -> Result<Arc<ClassDescriptor>, ProtocolError> {
        let name = self.read_utf()?;
        let serial_version_uid = self.reader.i64()?;
        // Assigned before the super chain is read; stays pending until then.
        let handle = self.assign(None, offset)?;
        self.owners.push(handle);

        let flags = ClassFlags(self.reader.u8()?);
        if flags.serializable() && flags.externalizable() {
            self.diagnose(
                offset,
                format!("class {name} is flagged both serializable and externalizable"),
            );
        }
        let count_at = self.reader.x;
        let count = self.reader.i16()?;
        if count < 0 {
            return Err(ProtocolError::desync(
                count_at,
                format!("negative field count {count} for class {name}"),
            ));
        }
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let at = self.reader.x;
            let code = self.reader.u8()?;
            let type_tag = FieldType::from_code(code).ok_or_else(|| {
                ProtocolError::desync(
                    at,
                    format!("invalid field type code 0x{code:02x} in class {name}"),
                )
            })?;
            let field_name = self.read_utf()?;
            let object_type_name = if type_tag.is_primitive() {
                None
            } else {
                Some(self.read_type_string()?)
            };
            fields.push(FieldDescriptor {
                name: field_name,
                type_tag,
                object_type_name,
            });
        }
        let annotations = self.read_annotation_contents()?;
        let super_descriptor = self.read_class_desc()?;
        self.owners.pop();

        let desc = Arc::new(ClassDescriptor {
            name,
            serial_version_uid,
            flags,
            fields,
            annotations,
            super_descriptor,
            proxy_interfaces: Vec::new(),
            handle,
        });
        self.graph
            .handles
            .fill(handle, GenericValue::Class(desc.clone()));
        trace!(
            handle,
            class = %desc.name,
            fields = desc.fields.len(),
            flags = desc.flags.0,
            "class descriptor"
        );
        Ok(desc)
    }

    fn read_proxy_desc(&mut self, offset: usize) -> Result<Arc<ClassDescriptor>, ProtocolError> {
        let handle = self.assign(None, offset)?;
        self.owners.push(handle);
        let count_at = self.reader.x;
        let count = self.reader.i32()?;
        // Every interface name costs at least its two length bytes.
        if count < 0 || count as usize > self.reader.size() / 2 {
            return Err(ProtocolError::desync(
                count_at,
                format!("invalid proxy interface count {count}"),
            ));
        }
        let mut proxy_interfaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            proxy_interfaces.push(self.read_utf()?);
        }
        let annotations = self.read_annotation_contents()?;
        let super_descriptor = self.read_class_desc()?;
        self.owners.pop();

        let names: Vec<&str> = proxy_interfaces.iter().map(|s| s.as_ref()).collect();
        let desc = Arc::new(ClassDescriptor {
            name: format!("$Proxy({})", names.join(", ")).into(),
            serial_version_uid: 0,
            flags: ClassFlags(SC_SERIALIZABLE),
            fields: Vec::new(),
            annotations,
            super_descriptor,
            proxy_interfaces,
            handle,
        });
        self.graph
            .handles
            .fill(handle, GenericValue::Class(desc.clone()));
        Ok(desc)
    }

    /// Custom data up to the end-of-block marker.
    fn read_annotation_contents(&mut self) -> Result<Vec<AnnotationEntry>, ProtocolError> {
        let mut entries = Vec::new();
        loop {
            let offset = self.reader.x;
            match self.reader.peek()? {
                TC_ENDBLOCKDATA => {
                    self.reader.skip(1)?;
                    return Ok(entries);
                }
                TC_BLOCKDATA | TC_BLOCKDATALONG => {
                    self.budget.step(offset)?;
                    entries.push(AnnotationEntry::Block(self.read_block()?));
                }
                _ => entries.push(AnnotationEntry::Value(self.read_value()?)),
            }
        }
    }

    fn read_block(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let offset = self.reader.x;
        let tag = self.reader.u8()?;
        let len = match tag {
            TC_BLOCKDATA => self.reader.u8()? as usize,
            TC_BLOCKDATALONG => {
                let len = self.reader.i32()?;
                if len < 0 {
                    return Err(ProtocolError::desync(
                        offset + 1,
                        format!("negative block data length {len}"),
                    ));
                }
                len as usize
            }
            _ => return Err(self.unexpected(offset, tag, "block data")),
        };
        Ok(self.reader.buf(len)?.to_vec())
    }

    fn read_object(&mut self, offset: usize) -> Result<GenericValue, ProtocolError> {
        let desc = self
            .read_class_desc()?
            .ok_or_else(|| ProtocolError::desync(offset, "object without a class descriptor"))?;
        let id = self.alloc_node();
        // The handle resolves to the arena slot right away, so fields may
        // refer back to this object while it is still being decoded.
        let handle = self.assign(Some(GenericValue::Object(id)), offset)?;

        self.budget.enter(offset)?;
        self.owners.push(handle);
        let first_diagnostic = self.graph.diagnostics.len();
        if desc.flags.is_enum() {
            self.diagnose(offset, format!("enum class {} written as an ordinary object", desc.name));
        }
        let levels = self.read_class_data(&desc)?;
        self.owners.pop();
        self.budget.leave();

        let partial = self.graph.diagnostics[first_diagnostic..]
            .iter()
            .any(|d| d.handle == Some(handle));
        self.graph.nodes[id.0] = Node::Object(ObjectVal {
            levels,
            partial,
            handle,
        });
        Ok(GenericValue::Object(id))
    }

    fn read_class_data(
        &mut self,
        desc: &Arc<ClassDescriptor>,
    ) -> Result<Vec<ClassLevel>, ProtocolError> {
        let chain = ClassDescriptor::chain(desc);
        let mut levels = Vec::with_capacity(chain.len());

        if desc.flags.externalizable() {
            if !desc.flags.block_data() {
                return Err(ProtocolError::Unsupported {
                    offset: self.reader.x,
                    what: "externalizable data written without block-data framing",
                });
            }
            // External data is written once, by the most-derived class.
            let annotations = self.read_annotation_contents()?;
            let last = chain.len() - 1;
            for (i, descriptor) in chain.into_iter().enumerate() {
                levels.push(ClassLevel {
                    descriptor,
                    fields: IndexMap::new(),
                    annotations: if i == last { annotations.clone() } else { Vec::new() },
                });
            }
            return Ok(levels);
        }

        for descriptor in chain {
            let mut fields = IndexMap::with_capacity(descriptor.fields.len());
            let mut annotations = Vec::new();
            if descriptor.flags.serializable() {
                for field in &descriptor.fields {
                    let value = self.read_field_value(field)?;
                    fields.insert(field.name.clone(), value);
                }
                if descriptor.flags.write_method() {
                    annotations = self.read_annotation_contents()?;
                }
            }
            levels.push(ClassLevel {
                descriptor,
                fields,
                annotations,
            });
        }
        Ok(levels)
    }

    fn read_field_value(&mut self, field: &FieldDescriptor) -> Result<GenericValue, ProtocolError> {
        if field.type_tag.is_primitive() {
            return self.read_primitive(field.type_tag).map(GenericValue::Primitive);
        }
        let offset = self.reader.x;
        let value = self.read_value()?;
        if field.type_tag == FieldType::Array
            && !matches!(value, GenericValue::Array(_) | GenericValue::Null)
        {
            self.diagnose(
                offset,
                format!("field {} is declared as an array but holds {}", field.name, describe(&value)),
            );
        }
        Ok(value)
    }

    fn read_primitive(&mut self, kind: FieldType) -> Result<Primitive, ProtocolError> {
        Ok(match kind {
            FieldType::Byte => Primitive::Byte(self.reader.i8()?),
            FieldType::Char => Primitive::Char(self.reader.u16()?),
            FieldType::Double => Primitive::Double(self.reader.f64()?),
            FieldType::Float => Primitive::Float(self.reader.f32()?),
            FieldType::Int => Primitive::Int(self.reader.i32()?),
            FieldType::Long => Primitive::Long(self.reader.i64()?),
            FieldType::Short => Primitive::Short(self.reader.i16()?),
            FieldType::Boolean => Primitive::Boolean(self.reader.u8()? != 0),
            FieldType::Object | FieldType::Array => {
                return Err(ProtocolError::desync(
                    self.reader.x,
                    "reference type read as a primitive",
                ))
            }
        })
    }

    fn read_array(&mut self, offset: usize) -> Result<GenericValue, ProtocolError> {
        let desc = self
            .read_class_desc()?
            .ok_or_else(|| ProtocolError::desync(offset, "array without a class descriptor"))?;
        let (component_type, component_type_name) = desc.array_component().ok_or_else(|| {
            ProtocolError::desync(offset, format!("{} is not an array class", desc.name))
        })?;
        let id = self.alloc_node();
        let handle = self.assign(Some(GenericValue::Array(id)), offset)?;

        let len_at = self.reader.x;
        let len = self.reader.i32()?;
        if len < 0 {
            return Err(ProtocolError::desync(len_at, format!("negative array length {len}")));
        }
        let len = len as usize;
        // Every element costs at least one byte, so this bounds allocation.
        let min_width = component_type.width().unwrap_or(1);
        if len.saturating_mul(min_width) > self.reader.size() {
            return Err(ProtocolError::desync(
                len_at,
                format!(
                    "array of {len} {component_type_name} elements exceeds the remaining {} bytes",
                    self.reader.size()
                ),
            ));
        }

        self.budget.enter(offset)?;
        self.owners.push(handle);
        let mut elements = Vec::with_capacity(len);
        if component_type.is_primitive() {
            for _ in 0..len {
                elements.push(GenericValue::Primitive(self.read_primitive(component_type)?));
            }
        } else {
            for _ in 0..len {
                elements.push(self.read_value()?);
            }
        }
        self.owners.pop();
        self.budget.leave();

        self.graph.nodes[id.0] = Node::Array(ArrayVal {
            descriptor: desc,
            component_type,
            component_type_name,
            elements,
            handle,
        });
        Ok(GenericValue::Array(id))
    }

    fn read_enum(&mut self, offset: usize) -> Result<GenericValue, ProtocolError> {
        let desc = self.read_class_desc()?.ok_or_else(|| {
            ProtocolError::desync(offset, "enum constant without a class descriptor")
        })?;
        let handle = self.assign(None, offset)?;
        let at = self.reader.x;
        let constant = match self.read_value()? {
            GenericValue::String(s) => s,
            other => {
                self.diagnose(
                    at,
                    format!("enum constant name is {} rather than a string", describe(&other)),
                );
                Arc::from("")
            }
        };
        if !desc.flags.is_enum() {
            self.diagnose(offset, format!("class {} is not flagged as an enum", desc.name));
        }
        let value = GenericValue::Enum {
            class_name: enum_class_name(&desc),
            constant,
        };
        self.graph.handles.fill(handle, value.clone());
        Ok(value)
    }

    /// Top-level exception: the producer reset, wrote the throwable, and reset again.
    fn read_exception(&mut self, offset: usize) -> Result<GenericValue, ProtocolError> {
        self.reset_handles(offset);
        let value = self.read_value()?;
        self.reset_handles(self.reader.x);
        match value {
            GenericValue::Object(id) => {
                self.diagnose(offset, "producer wrote an exception in place of an object");
                Ok(GenericValue::Exception(id))
            }
            other => Err(ProtocolError::desync(
                offset,
                format!("exception marker followed by {}", describe(&other)),
            )),
        }
    }
}

/// Enum type for a constant's descriptor; constants with bodies are written
/// with an anonymous subclass descriptor.
fn enum_class_name(desc: &Arc<ClassDescriptor>) -> Arc<str> {
    let mut cur = desc;
    while let Some(parent) = &cur.super_descriptor {
        if parent.name.as_ref() == "java.lang.Enum" {
            break;
        }
        cur = parent;
    }
    cur.name.clone()
}

fn describe(value: &GenericValue) -> &'static str {
    match value {
        GenericValue::Null => "null",
        GenericValue::Primitive(_) => "a primitive",
        GenericValue::String(_) => "a string",
        GenericValue::Array(_) => "an array",
        GenericValue::Object(_) => "an object",
        GenericValue::Enum { .. } => "an enum constant",
        GenericValue::Class(_) => "a class",
        GenericValue::BlockData(_) => "block data",
        GenericValue::Exception(_) => "an exception",
    }
}
