//! JSON rendering of a decoded graph, for debugging and `--dump-graph`.
//!
//! Arena nodes are emitted once, in a flat `nodes` array; values that point
//! at a node render as `{"$ref": <node id>}`, so cycles need no special care.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Number, Value};

use crate::graph::ObjectGraph;
use crate::types::{AnnotationEntry, ClassLevel, GenericValue, Node, Primitive};

pub fn graph_to_json(graph: &ObjectGraph) -> Value {
    let nodes: Vec<Value> = graph.nodes().map(|(_, node)| node_to_json(node)).collect();
    let diagnostics: Vec<Value> = graph
        .diagnostics
        .iter()
        .map(|d| json!({ "offset": d.offset, "handle": d.handle, "message": d.message }))
        .collect();
    json!({
        "roots": graph.roots.iter().map(value_to_json).collect::<Vec<_>>(),
        "nodes": nodes,
        "diagnostics": diagnostics,
        "resets": graph.resets,
    })
}

/// Renders one value without following node references.
pub fn value_to_json(value: &GenericValue) -> Value {
    match value {
        GenericValue::Null => Value::Null,
        GenericValue::Primitive(p) => primitive_to_json(*p),
        GenericValue::String(s) => Value::String(s.to_string()),
        GenericValue::Array(id) | GenericValue::Object(id) => json!({ "$ref": id.0 }),
        GenericValue::Enum {
            class_name,
            constant,
        } => json!({ "$enum": class_name.as_ref(), "constant": constant.as_ref() }),
        GenericValue::Class(desc) => json!({ "$class": desc.name.as_ref() }),
        GenericValue::BlockData(bytes) => json!({ "$block": STANDARD.encode(bytes) }),
        GenericValue::Exception(id) => json!({ "$exception": id.0 }),
    }
}

fn primitive_to_json(p: Primitive) -> Value {
    let float = |v: f64| match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None => Value::String(v.to_string()),
    };
    match p {
        Primitive::Byte(v) => json!(v),
        Primitive::Char(v) => match char::from_u32(v as u32) {
            Some(c) => Value::String(c.to_string()),
            None => json!(v),
        },
        Primitive::Double(v) => float(v),
        Primitive::Float(v) => float(v as f64),
        Primitive::Int(v) => json!(v),
        Primitive::Long(v) => json!(v),
        Primitive::Short(v) => json!(v),
        Primitive::Boolean(v) => Value::Bool(v),
    }
}

fn node_to_json(node: &Node) -> Value {
    match node {
        Node::Pending => Value::Null,
        Node::Array(a) => json!({
            "class": a.descriptor.name.as_ref(),
            "handle": a.handle,
            "componentType": a.component_type_name.as_ref(),
            "elements": a.elements.iter().map(value_to_json).collect::<Vec<_>>(),
        }),
        Node::Object(o) => json!({
            "class": o.class_name(),
            "handle": o.handle,
            "partial": o.partial,
            "levels": o.levels.iter().map(level_to_json).collect::<Vec<_>>(),
        }),
    }
}

fn level_to_json(level: &ClassLevel) -> Value {
    let mut fields = Map::new();
    for (name, value) in &level.fields {
        fields.insert(name.to_string(), value_to_json(value));
    }
    let mut out = Map::new();
    out.insert("class".into(), Value::String(level.descriptor.name.to_string()));
    out.insert("fields".into(), Value::Object(fields));
    if !level.annotations.is_empty() {
        let annotations = level
            .annotations
            .iter()
            .map(|entry| match entry {
                AnnotationEntry::Block(bytes) => json!({ "$block": STANDARD.encode(bytes) }),
                AnnotationEntry::Value(v) => value_to_json(v),
            })
            .collect();
        out.insert("annotations".into(), Value::Array(annotations));
    }
    Value::Object(out)
}
