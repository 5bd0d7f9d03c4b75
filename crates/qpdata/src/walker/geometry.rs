//! ROI point extraction.
//!
//! Shapes show up in many encodings: serialization proxies with parallel
//! `x`/`y` arrays, rectangles and lines as scalar fields, arrays of point
//! objects or pairs, collections written as custom data, and WKB blobs.
//! Every form yields points in source order.

use qpdata_object_stream::{ArrayVal, GenericValue, ObjectVal};
use tracing::debug;

use super::patterns::roi_kind;
use super::values::{byte_array_bytes, field_ci, is_byte_array, is_numeric_array};
use super::Extract;
use crate::record::Point;
use crate::wkb::parse_wkb;

/// Shape recovered from an ROI-like value.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    /// Simple class name of the ROI object; `None` for bare arrays.
    pub kind: Option<String>,
    pub points: Vec<Point>,
}

const PARALLEL: [(&str, &str); 4] = [
    ("x", "y"),
    ("xs", "ys"),
    ("xpoints", "ypoints"),
    ("xcoords", "ycoords"),
];

/// Field-name fragments tried first when looking for nested shape data.
const SHAPE_HINTS: [&str; 7] = ["point", "coord", "vert", "geometry", "polygon", "shape", "wkb"];

impl Extract<'_> {
    pub(crate) fn roi(&mut self, value: &GenericValue) -> Option<Roi> {
        let graph = self.graph;
        if let Some(obj) = graph.as_object(value) {
            let id = value.node_id()?;
            self.touch(id);
            let points = self.object_points(obj, 0).unwrap_or_default();
            return Some(Roi {
                kind: Some(roi_kind(obj.class_name())),
                points,
            });
        }
        let arr = graph.as_array(value)?;
        self.touch(value.node_id()?);
        let points = self.array_points(arr, 0)?;
        Some(Roi { kind: None, points })
    }

    fn value_points(&mut self, value: &GenericValue, depth: usize) -> Option<Vec<Point>> {
        if depth > self.config.max_attribute_depth {
            return None;
        }
        let graph = self.graph;
        let id = value.node_id()?;
        if let Some(arr) = graph.array(id) {
            self.touch(id);
            return self.array_points(arr, depth);
        }
        let obj = graph.object(id)?;
        self.touch(id);
        self.object_points(obj, depth)
    }

    fn object_points(&mut self, obj: &ObjectVal, depth: usize) -> Option<Vec<Point>> {
        // Parallel coordinate arrays.
        for (xs, ys) in PARALLEL {
            let (Some(xv), Some(yv)) = (field_ci(obj, xs), field_ci(obj, ys)) else {
                continue;
            };
            if xv.node_id().is_none() || yv.node_id().is_none() {
                continue;
            }
            if let (Some(x), Some(y)) = (self.numbers(xv), self.numbers(yv)) {
                if !x.is_empty() {
                    return Some(x.into_iter().zip(y).map(|(x, y)| Point::new(x, y)).collect());
                }
            }
        }

        // Scalar shapes: line, rectangle, point.
        let x = self.number_field(obj, &["x", "x1"]);
        let y = self.number_field(obj, &["y", "y1"]);
        if let (Some(x), Some(y)) = (x, y) {
            if let (Some(x2), Some(y2)) = (
                self.number_field(obj, &["x2"]),
                self.number_field(obj, &["y2"]),
            ) {
                return Some(vec![Point::new(x, y), Point::new(x2, y2)]);
            }
            if let (Some(w), Some(h)) = (
                self.number_field(obj, &["w", "width"]),
                self.number_field(obj, &["h", "height"]),
            ) {
                return Some(vec![
                    Point::new(x, y),
                    Point::new(x + w, y),
                    Point::new(x + w, y + h),
                    Point::new(x, y + h),
                ]);
            }
            return Some(vec![Point::new(x, y)]);
        }

        // Nested shape data, likely-looking fields first.
        let mut nested: Vec<(&str, &GenericValue)> = obj
            .fields()
            .filter(|(_, v)| v.node_id().is_some())
            .collect();
        nested.sort_by_key(|(name, _)| {
            let name = name.to_ascii_lowercase();
            !SHAPE_HINTS.iter().any(|h| name.contains(h))
        });
        for (_, value) in nested {
            if let Some(points) = self.value_points(value, depth + 1) {
                if !points.is_empty() {
                    return Some(points);
                }
            }
        }

        // Collections written element by element as custom data.
        let extras: Vec<&GenericValue> = obj.extra_values().collect();
        let points = self.element_points(&extras);
        (!points.is_empty()).then_some(points)
    }

    fn array_points(&mut self, arr: &ArrayVal, depth: usize) -> Option<Vec<Point>> {
        if is_byte_array(arr) {
            return match parse_wkb(&byte_array_bytes(arr)) {
                Ok(geometry) => Some(geometry.outline()),
                Err(err) => {
                    debug!(%err, "byte array is not a WKB geometry");
                    None
                }
            };
        }
        if is_numeric_array(arr) {
            let values: Vec<f64> = arr.elements.iter().filter_map(GenericValue::as_f64).collect();
            if values.len() < 2 || values.len() % 2 != 0 {
                return None;
            }
            return Some(
                values
                    .chunks_exact(2)
                    .map(|pair| Point::new(pair[0], pair[1]))
                    .collect(),
            );
        }
        let elements: Vec<&GenericValue> = arr.elements.iter().collect();
        let points = self.element_points(&elements);
        if !points.is_empty() {
            return Some(points);
        }
        // An array wrapping one nested shape, e.g. polygon rings.
        let first = arr.elements.iter().find(|v| v.node_id().is_some())?;
        self.value_points(first, depth + 1)
    }

    /// Points from a sequence of point-like elements; non-points are skipped.
    fn element_points(&mut self, elements: &[&GenericValue]) -> Vec<Point> {
        elements.iter().filter_map(|v| self.point(v)).collect()
    }
}
