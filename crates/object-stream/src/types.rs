//! Generic graph node types.
//!
//! A decoded stream is an arena of [`Node`]s owned by
//! [`ObjectGraph`](crate::ObjectGraph). Arrays and objects are referred to by
//! [`NodeId`], which is what lets self- and mutually-referential structures
//! exist without shared mutable pointers.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::constants::*;

/// Wire handle assigned by the producer, starting at
/// [`BASE_WIRE_HANDLE`](crate::constants::BASE_WIRE_HANDLE).
pub type Handle = u32;

/// Index of an array or object in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Declared type of a field or array component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            TYPE_BYTE => FieldType::Byte,
            TYPE_CHAR => FieldType::Char,
            TYPE_DOUBLE => FieldType::Double,
            TYPE_FLOAT => FieldType::Float,
            TYPE_INT => FieldType::Int,
            TYPE_LONG => FieldType::Long,
            TYPE_SHORT => FieldType::Short,
            TYPE_BOOLEAN => FieldType::Boolean,
            TYPE_OBJECT => FieldType::Object,
            TYPE_ARRAY => FieldType::Array,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            FieldType::Byte => TYPE_BYTE,
            FieldType::Char => TYPE_CHAR,
            FieldType::Double => TYPE_DOUBLE,
            FieldType::Float => TYPE_FLOAT,
            FieldType::Int => TYPE_INT,
            FieldType::Long => TYPE_LONG,
            FieldType::Short => TYPE_SHORT,
            FieldType::Boolean => TYPE_BOOLEAN,
            FieldType::Object => TYPE_OBJECT,
            FieldType::Array => TYPE_ARRAY,
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(self, FieldType::Object | FieldType::Array)
    }

    /// Encoded width of a primitive value; `None` for references.
    pub fn width(self) -> Option<usize> {
        match self {
            FieldType::Byte | FieldType::Boolean => Some(1),
            FieldType::Char | FieldType::Short => Some(2),
            FieldType::Int | FieldType::Float => Some(4),
            FieldType::Long | FieldType::Double => Some(8),
            FieldType::Object | FieldType::Array => None,
        }
    }

    pub fn java_name(self) -> &'static str {
        match self {
            FieldType::Byte => "byte",
            FieldType::Char => "char",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Short => "short",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// A fixed-width primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Byte(i8),
    /// A UTF-16 code unit.
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
}

impl Primitive {
    pub fn kind(&self) -> FieldType {
        match self {
            Primitive::Byte(_) => FieldType::Byte,
            Primitive::Char(_) => FieldType::Char,
            Primitive::Double(_) => FieldType::Double,
            Primitive::Float(_) => FieldType::Float,
            Primitive::Int(_) => FieldType::Int,
            Primitive::Long(_) => FieldType::Long,
            Primitive::Short(_) => FieldType::Short,
            Primitive::Boolean(_) => FieldType::Boolean,
        }
    }

    /// Numeric value, for the numeric kinds only.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Primitive::Byte(v) => Some(v as f64),
            Primitive::Double(v) => Some(v),
            Primitive::Float(v) => Some(v as f64),
            Primitive::Int(v) => Some(v as f64),
            Primitive::Long(v) => Some(v as f64),
            Primitive::Short(v) => Some(v as f64),
            Primitive::Char(_) | Primitive::Boolean(_) => None,
        }
    }
}

/// Descriptor flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassFlags(pub u8);

impl ClassFlags {
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn write_method(self) -> bool {
        self.contains(SC_WRITE_METHOD)
    }

    pub fn serializable(self) -> bool {
        self.contains(SC_SERIALIZABLE)
    }

    pub fn externalizable(self) -> bool {
        self.contains(SC_EXTERNALIZABLE)
    }

    pub fn block_data(self) -> bool {
        self.contains(SC_BLOCK_DATA)
    }

    pub fn is_enum(self) -> bool {
        self.contains(SC_ENUM)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: Arc<str>,
    pub type_tag: FieldType,
    /// JVM type signature, e.g. `Ljava/lang/String;`. Object and array fields only.
    pub object_type_name: Option<Arc<str>>,
}

/// Shape of a class as written by the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub name: Arc<str>,
    pub serial_version_uid: i64,
    pub flags: ClassFlags,
    pub fields: Vec<FieldDescriptor>,
    /// Contents the producer wrote after the field list.
    pub annotations: Vec<AnnotationEntry>,
    pub super_descriptor: Option<Arc<ClassDescriptor>>,
    /// Interfaces of a dynamic proxy class; empty for ordinary classes.
    pub proxy_interfaces: Vec<Arc<str>>,
    pub handle: Handle,
}

impl ClassDescriptor {
    pub fn is_proxy(&self) -> bool {
        !self.proxy_interfaces.is_empty()
    }

    /// Name after the last package separator, e.g. `PolygonROI$SerializationProxy`.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// Descriptor chain from least-derived to most-derived, ending with `desc`.
    pub fn chain(desc: &Arc<ClassDescriptor>) -> Vec<Arc<ClassDescriptor>> {
        let mut chain = vec![desc.clone()];
        let mut cur = desc.super_descriptor.clone();
        while let Some(d) = cur {
            cur = d.super_descriptor.clone();
            chain.push(d);
        }
        chain.reverse();
        chain
    }

    /// Component type of an array class, e.g. `int` for `[I` and
    /// `java.lang.String` for `[Ljava.lang.String;`.
    pub fn array_component(&self) -> Option<(FieldType, Arc<str>)> {
        let rest = self.name.strip_prefix('[')?;
        let code = *rest.as_bytes().first()?;
        let kind = FieldType::from_code(code)?;
        let name: Arc<str> = match kind {
            FieldType::Object => rest
                .strip_prefix('L')
                .and_then(|s| s.strip_suffix(';'))
                .unwrap_or(rest)
                .into(),
            FieldType::Array => rest.into(),
            _ => kind.java_name().into(),
        };
        Some((kind, name))
    }
}

/// Name after the last `.` of a binary class name.
pub fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// One item of producer-defined custom data, kept in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEntry {
    /// Raw bytes from a block-data record.
    Block(Vec<u8>),
    /// An object written between block-data records.
    Value(GenericValue),
}

/// Field values and custom data written for one level of a class chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLevel {
    pub descriptor: Arc<ClassDescriptor>,
    pub fields: IndexMap<Arc<str>, GenericValue>,
    pub annotations: Vec<AnnotationEntry>,
}

impl ClassLevel {
    /// Concatenated block-data bytes written by custom serialization code.
    pub fn extra_data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.annotations {
            if let AnnotationEntry::Block(bytes) = entry {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// Objects written by custom serialization code, in stream order.
    pub fn extra_values(&self) -> impl Iterator<Item = &GenericValue> {
        self.annotations.iter().filter_map(|entry| match entry {
            AnnotationEntry::Value(v) => Some(v),
            AnnotationEntry::Block(_) => None,
        })
    }
}

/// A decoded object instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVal {
    /// One level per class in the chain, least-derived first.
    pub levels: Vec<ClassLevel>,
    /// Set when at least one field could not be recovered.
    pub partial: bool,
    pub handle: Handle,
}

impl ObjectVal {
    pub fn class_chain(&self) -> impl Iterator<Item = &Arc<ClassDescriptor>> {
        self.levels.iter().map(|l| &l.descriptor)
    }

    /// Most-derived class name.
    pub fn class_name(&self) -> &str {
        self.levels
            .last()
            .map(|l| l.descriptor.name.as_ref())
            .unwrap_or("")
    }

    /// Field lookup, most-derived level first.
    pub fn field(&self, name: &str) -> Option<&GenericValue> {
        self.levels
            .iter()
            .rev()
            .find_map(|l| l.fields.get(name))
    }

    /// All fields across levels, least-derived first.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &GenericValue)> {
        self.levels
            .iter()
            .flat_map(|l| l.fields.iter().map(|(k, v)| (k.as_ref(), v)))
    }

    pub fn extra_values(&self) -> impl Iterator<Item = &GenericValue> {
        self.levels.iter().flat_map(|l| l.extra_values())
    }

    pub fn extra_data(&self) -> Vec<u8> {
        self.levels.iter().flat_map(|l| l.extra_data()).collect()
    }
}

/// A decoded array instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayVal {
    pub descriptor: Arc<ClassDescriptor>,
    pub component_type: FieldType,
    pub component_type_name: Arc<str>,
    pub elements: Vec<GenericValue>,
    pub handle: Handle,
}

/// Arena slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Handle assigned, contents still being decoded.
    Pending,
    Array(ArrayVal),
    Object(ObjectVal),
}

/// A value of the decoded graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    Null,
    Primitive(Primitive),
    String(Arc<str>),
    Array(NodeId),
    Object(NodeId),
    /// Enum constant, with the enum's class name attached.
    Enum {
        class_name: Arc<str>,
        constant: Arc<str>,
    },
    /// A class object or a descriptor written as a value.
    Class(Arc<ClassDescriptor>),
    /// Top-level block data written between objects.
    BlockData(Vec<u8>),
    /// Top-level exception object the producer wrote after aborting.
    Exception(NodeId),
}

impl GenericValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GenericValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GenericValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GenericValue::Primitive(p) => p.as_f64(),
            _ => None,
        }
    }

    /// Arena node this value points at, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            GenericValue::Array(id) | GenericValue::Object(id) | GenericValue::Exception(id) => {
                Some(*id)
            }
            _ => None,
        }
    }
}
