//! Reading plain values out of generic graph nodes.

use qpdata_object_stream::{ArrayVal, FieldType, GenericValue, ObjectVal};

use super::Extract;
use crate::record::Point;

impl Extract<'_> {
    /// A number: a numeric primitive or a boxed `java.lang` number.
    pub(crate) fn number(&mut self, value: &GenericValue) -> Option<f64> {
        if let Some(n) = value.as_f64() {
            return Some(n);
        }
        let id = value.node_id()?;
        let graph = self.graph;
        let obj = graph.object(id)?;
        if !obj.class_name().starts_with("java.lang.") {
            return None;
        }
        self.touch(id);
        obj.field("value").and_then(GenericValue::as_f64)
    }

    pub(crate) fn number_field(&mut self, obj: &ObjectVal, names: &[&str]) -> Option<f64> {
        let value = names.iter().find_map(|n| field_ci(obj, n))?;
        self.number(value)
    }

    /// An `(x, y)` pair: an object with numeric `x`/`y` fields or a numeric
    /// array of at least two elements.
    pub(crate) fn point(&mut self, value: &GenericValue) -> Option<Point> {
        let graph = self.graph;
        if let Some(obj) = graph.as_object(value) {
            let x = self.number_field(obj, &["x"])?;
            let y = self.number_field(obj, &["y"])?;
            self.touch(value.node_id()?);
            return Some(Point::new(x, y));
        }
        let arr = graph.as_array(value)?;
        if !is_numeric_array(arr) || arr.elements.len() < 2 {
            return None;
        }
        self.touch(value.node_id()?);
        Some(Point::new(arr.elements[0].as_f64()?, arr.elements[1].as_f64()?))
    }

    /// Numbers held by a numeric array, an array of boxed numbers, or a
    /// collection whose elements were written as custom data.
    pub(crate) fn numbers(&mut self, value: &GenericValue) -> Option<Vec<f64>> {
        let id = value.node_id()?;
        let graph = self.graph;
        let items: Vec<&GenericValue> = match (graph.array(id), graph.object(id)) {
            (Some(arr), _) => arr.elements.iter().collect(),
            (None, Some(obj)) => obj.extra_values().collect(),
            (None, None) => return None,
        };
        self.touch(id);
        items.into_iter().map(|v| self.number(v)).collect()
    }

    /// Strings held by a string array or a collection of strings.
    pub(crate) fn strings(&mut self, value: &GenericValue) -> Option<Vec<String>> {
        let id = value.node_id()?;
        let graph = self.graph;
        let items: Vec<&GenericValue> = match (graph.array(id), graph.object(id)) {
            (Some(arr), _) => arr.elements.iter().collect(),
            (None, Some(obj)) => obj.extra_values().collect(),
            (None, None) => return None,
        };
        self.touch(id);
        items
            .into_iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect()
    }
}

/// Case-insensitive field lookup, most-derived level first.
pub(crate) fn field_ci<'a>(obj: &'a ObjectVal, name: &str) -> Option<&'a GenericValue> {
    obj.field(name).or_else(|| {
        obj.levels
            .iter()
            .rev()
            .flat_map(|l| l.fields.iter())
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

pub(crate) fn is_numeric_array(arr: &ArrayVal) -> bool {
    matches!(
        arr.component_type,
        FieldType::Double
            | FieldType::Float
            | FieldType::Int
            | FieldType::Long
            | FieldType::Short
    )
}

pub(crate) fn is_byte_array(arr: &ArrayVal) -> bool {
    arr.component_type == FieldType::Byte
}

/// Raw bytes of a `byte[]`.
pub(crate) fn byte_array_bytes(arr: &ArrayVal) -> Vec<u8> {
    arr.elements
        .iter()
        .filter_map(|v| match v {
            GenericValue::Primitive(qpdata_object_stream::Primitive::Byte(b)) => Some(*b as u8),
            _ => None,
        })
        .collect()
}
