//! Measurement extraction.

use indexmap::IndexMap;
use qpdata_object_stream::{GenericValue, ObjectVal};

use super::values::field_ci;
use super::Extract;

const NAME_FIELDS: [&str; 3] = ["names", "keys", "measurementnames"];
const VALUE_FIELDS: [&str; 2] = ["values", "measurementvalues"];

impl Extract<'_> {
    /// Numeric measurements keyed by name, in source order.
    pub(crate) fn measurements(&mut self, value: &GenericValue) -> IndexMap<String, f64> {
        let mut out = IndexMap::new();
        self.collect_measurements(value, 0, &mut out);
        out
    }

    fn collect_measurements(
        &mut self,
        value: &GenericValue,
        depth: usize,
        out: &mut IndexMap<String, f64>,
    ) {
        if depth > self.config.max_attribute_depth {
            return;
        }
        let graph = self.graph;
        let Some(id) = value.node_id() else { return };
        if let Some(arr) = graph.array(id) {
            self.touch(id);
            for element in &arr.elements {
                self.named_value(element, out);
            }
            return;
        }
        let Some(obj) = graph.object(id) else { return };
        self.touch(id);

        let before = out.len();
        if obj.class_chain().any(|d| d.name.contains("Map")) {
            self.map_entries(obj, out);
        }
        if out.len() == before {
            self.parallel_lists(obj, out);
        }
        if out.len() == before {
            for element in obj.extra_values() {
                self.named_value(element, out);
            }
        }
        if out.len() == before {
            let nested: Vec<&GenericValue> = obj
                .fields()
                .map(|(_, v)| v)
                .filter(|v| v.node_id().is_some())
                .collect();
            for v in nested {
                self.collect_measurements(v, depth + 1, out);
            }
        }
    }

    /// Maps write their entries as alternating key and value objects.
    fn map_entries(&mut self, obj: &ObjectVal, out: &mut IndexMap<String, f64>) {
        let entries: Vec<&GenericValue> = obj.extra_values().collect();
        for pair in entries.chunks_exact(2) {
            let Some(key) = pair[0].as_str() else { continue };
            if let Some(v) = self.number(pair[1]) {
                out.insert(key.to_owned(), v);
            }
        }
    }

    fn parallel_lists(&mut self, obj: &ObjectVal, out: &mut IndexMap<String, f64>) {
        let names = NAME_FIELDS.iter().find_map(|n| field_ci(obj, n));
        let values = VALUE_FIELDS.iter().find_map(|n| field_ci(obj, n));
        let (Some(names), Some(values)) = (names, values) else { return };
        let (Some(names), Some(values)) = (self.strings(names), self.numbers(values)) else {
            return;
        };
        for (name, v) in names.into_iter().zip(values) {
            out.insert(name, v);
        }
    }

    /// An element holding one `name`/`value` pair.
    fn named_value(&mut self, element: &GenericValue, out: &mut IndexMap<String, f64>) {
        let graph = self.graph;
        let Some(obj) = graph.as_object(element) else { return };
        let Some(name) = ["name", "key"]
            .iter()
            .find_map(|n| field_ci(obj, n))
            .and_then(GenericValue::as_str)
        else {
            return;
        };
        if let Some(v) = self.number_field(obj, &["value"]) {
            if let Some(id) = element.node_id() {
                self.touch(id);
            }
            out.insert(name.to_owned(), v);
        }
    }
}
