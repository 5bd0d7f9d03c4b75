//! Recovers annotation records from a decoded object graph.
//!
//! The producer's classes are not known ahead of time, so objects are
//! recognized by class-name suffixes and, failing that, by field names.
//! Traversal is an explicit-stack depth-first walk over the graph arena; a
//! node is expanded at most once, so cycles and shared subgraphs terminate.
//!
//! Records come out in discovery order. Hierarchy objects are built first;
//! every object they use as an attribute (ROI, classification, measurement
//! list) is then excluded from being reported on its own.

mod classification;
mod geometry;
mod measurements;
mod patterns;
mod values;

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use qpdata_object_stream::{GenericValue, Node, NodeId, ObjectGraph, ObjectVal};
use tracing::{debug, warn};

use crate::record::{AnnotationRecord, HierarchySummary, UnknownClassWarning};
use patterns::{is_classification_class, is_measurement_class, is_roi_class, Role};

pub use geometry::Roi;

/// Name patterns and budgets used by [`GraphWalker`]. Patterns are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Class simple-name suffixes of hierarchy objects that become records.
    pub record_suffixes: Vec<String>,
    /// Class simple-name suffixes of objects that become records only when
    /// no other record owns them.
    pub standalone_suffixes: Vec<String>,
    /// Class simple names that are traversed but never recorded.
    pub structural_names: Vec<String>,
    /// Field names holding a display name (exact match).
    pub name_fields: Vec<String>,
    /// Field-name fragments marking classification, ROI and measurement
    /// attributes.
    pub attribute_keywords: Vec<String>,
    /// Upper bound on nodes entered per walk.
    pub max_steps: usize,
    /// Upper bound on nesting followed while reading one attribute.
    pub max_attribute_depth: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| (*s).to_owned()).collect();
        Self {
            record_suffixes: owned(&[
                "annotationobject",
                "detectionobject",
                "cellobject",
                "tileobject",
                "tmacoreobject",
            ]),
            standalone_suffixes: owned(&["roi"]),
            structural_names: owned(&[
                "pathobjecthierarchy",
                "pathrootobject",
                "imagedata",
                "tmagrid",
                "defaulttmagrid",
            ]),
            name_fields: owned(&["name", "displayname"]),
            attribute_keywords: owned(&[
                "pathclass",
                "classification",
                "roi",
                "geometry",
                "measurement",
            ]),
            max_steps: 10_000_000,
            max_attribute_depth: 6,
        }
    }
}

/// Everything the walker recovered from one graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkOutput {
    pub records: Vec<AnnotationRecord>,
    pub summary: HierarchySummary,
    /// Classes recorded on field names alone, once each.
    pub warnings: Vec<UnknownClassWarning>,
    /// Set when `max_steps` stopped the walk early.
    pub truncated: bool,
    pub nodes_visited: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GraphWalker {
    config: WalkerConfig,
}

impl GraphWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WalkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Walks every top-level value of the graph.
    pub fn walk(&self, graph: &ObjectGraph) -> WalkOutput {
        self.walk_values(graph, &graph.roots)
    }

    /// Walks the subgraph reachable from `root`.
    pub fn walk_value(&self, graph: &ObjectGraph, root: &GenericValue) -> WalkOutput {
        self.walk_values(graph, std::slice::from_ref(root))
    }

    fn walk_values(&self, graph: &ObjectGraph, roots: &[GenericValue]) -> WalkOutput {
        let _span = tracing::debug_span!("walk_graph", nodes = graph.len()).entered();
        let discovery = self.discover(graph, roots);

        let mut consumed: HashSet<NodeId> = HashSet::new();
        let mut built: Vec<(usize, AnnotationRecord)> = Vec::new();
        let mut warnings: IndexSet<String> = IndexSet::new();

        for pass in [Role::Record, Role::Keyword, Role::Standalone] {
            for (order, &(id, role)) in discovery.candidates.iter().enumerate() {
                if role != pass || (pass != Role::Record && consumed.contains(&id)) {
                    continue;
                }
                let Some(obj) = graph.object(id) else { continue };
                let mut extract = Extract::new(graph, &self.config);
                extract.touched.insert(id);
                let record = match role {
                    Role::Standalone => extract.standalone_record(id, obj),
                    _ => extract.record(obj),
                };
                if role == Role::Keyword {
                    warnings.insert(obj.class_name().to_owned());
                }
                consumed.extend(extract.touched.into_iter().filter(|t| *t != id));
                built.push((order, record));
            }
        }
        built.sort_by_key(|(order, _)| *order);
        let records: Vec<AnnotationRecord> = built.into_iter().map(|(_, r)| r).collect();

        for class_name in &warnings {
            debug!(class = %class_name, "recorded unrecognized class by its field names");
        }
        debug!(
            records = records.len(),
            visited = discovery.visited,
            truncated = discovery.truncated,
            "graph walk finished"
        );
        WalkOutput {
            summary: HierarchySummary::from_records(&records),
            records,
            warnings: warnings
                .into_iter()
                .map(|class_name| UnknownClassWarning { class_name })
                .collect(),
            truncated: discovery.truncated,
            nodes_visited: discovery.visited,
        }
    }

    /// Depth-first discovery of candidate objects, in first-visit order.
    fn discover(&self, graph: &ObjectGraph, roots: &[GenericValue]) -> Discovery {
        enum Frame {
            Enter(NodeId),
            Exit(NodeId),
        }
        #[derive(PartialEq)]
        enum Visit {
            OnPath,
            Done,
        }

        let mut out = Discovery::default();
        let mut state: HashMap<NodeId, Visit> = HashMap::new();
        let mut stack: Vec<Frame> = roots
            .iter()
            .rev()
            .filter_map(GenericValue::node_id)
            .map(Frame::Enter)
            .collect();

        while let Some(frame) = stack.pop() {
            let id = match frame {
                Frame::Exit(id) => {
                    state.insert(id, Visit::Done);
                    continue;
                }
                Frame::Enter(id) => id,
            };
            if state.contains_key(&id) {
                continue;
            }
            if out.visited >= self.config.max_steps {
                warn!(
                    max_steps = self.config.max_steps,
                    "graph walk stopped at its step limit"
                );
                out.truncated = true;
                break;
            }
            out.visited += 1;
            state.insert(id, Visit::OnPath);
            stack.push(Frame::Exit(id));

            let children: Vec<NodeId> = match graph.node(id) {
                Some(Node::Object(obj)) => {
                    let role = self.config.role(obj);
                    if role != Role::Structural {
                        out.candidates.push((id, role));
                    }
                    obj.fields()
                        .map(|(_, v)| v)
                        .chain(obj.extra_values())
                        .filter_map(GenericValue::node_id)
                        .collect()
                }
                Some(Node::Array(arr)) => arr.elements.iter().filter_map(GenericValue::node_id).collect(),
                Some(Node::Pending) | None => Vec::new(),
            };
            stack.extend(
                children
                    .into_iter()
                    .rev()
                    .filter(|c| state.get(c) != Some(&Visit::OnPath))
                    .map(Frame::Enter),
            );
        }
        out
    }
}

#[derive(Debug, Default)]
struct Discovery {
    candidates: Vec<(NodeId, Role)>,
    visited: usize,
    truncated: bool,
}

/// Reads the attributes of one record, remembering every node it looked at.
pub(crate) struct Extract<'g> {
    pub(crate) graph: &'g ObjectGraph,
    pub(crate) config: &'g WalkerConfig,
    pub(crate) touched: HashSet<NodeId>,
}

impl<'g> Extract<'g> {
    fn new(graph: &'g ObjectGraph, config: &'g WalkerConfig) -> Self {
        Self {
            graph,
            config,
            touched: HashSet::new(),
        }
    }

    pub(crate) fn touch(&mut self, id: NodeId) {
        self.touched.insert(id);
    }

    fn record(&mut self, obj: &ObjectVal) -> AnnotationRecord {
        let mut record = AnnotationRecord::new(obj.class_name());
        let mut used: HashSet<NodeId> = HashSet::new();

        for (name, value) in obj.fields() {
            let field = name.to_ascii_lowercase();
            if self.config.is_name_field(&field) {
                if record.display_name.is_none() {
                    record.display_name = value.as_str().map(str::to_owned);
                }
            } else if field.contains("pathclass") || field.contains("classification") {
                if record.classification_path.is_empty() {
                    record.classification_path = self.classification(value);
                    used.extend(value.node_id());
                }
            } else if field.contains("roi") || field.contains("geometry") {
                if record.roi_points.is_empty() {
                    if let Some(roi) = self.roi(value) {
                        record.roi_kind = roi.kind;
                        record.roi_points = roi.points;
                        used.extend(value.node_id());
                    }
                }
            } else if field.contains("measurement") {
                let found = self.measurements(value);
                if !found.is_empty() {
                    used.extend(value.node_id());
                }
                record.measurements.extend(found);
            }
        }

        // Attributes written by custom serialization code carry no field
        // name; recognize them by class.
        let graph = self.graph;
        let fields = obj.fields().map(|(_, v)| (v, false));
        let extras = obj.extra_values().map(|v| (v, true));
        for (value, is_extra) in fields.chain(extras) {
            if value.node_id().is_some_and(|id| used.contains(&id)) {
                continue;
            }
            if let GenericValue::String(s) = value {
                if is_extra && record.display_name.is_none() && !patterns::looks_like_version_tag(s) {
                    record.display_name = Some(s.to_string());
                }
                continue;
            }
            let Some(inner) = graph.as_object(value) else { continue };
            let class_name = inner.class_name();
            if record.classification_path.is_empty() && is_classification_class(class_name) {
                record.classification_path = self.classification(value);
            } else if record.roi_points.is_empty() && is_roi_class(class_name) {
                if let Some(roi) = self.roi(value) {
                    record.roi_kind = roi.kind;
                    record.roi_points = roi.points;
                }
            } else if record.measurements.is_empty() && is_measurement_class(class_name) {
                record.measurements = self.measurements(value);
            }
        }
        record
    }

    /// A bare ROI or measurement list not owned by any record.
    fn standalone_record(&mut self, id: NodeId, obj: &ObjectVal) -> AnnotationRecord {
        let mut record = AnnotationRecord::new(obj.class_name());
        let value = GenericValue::Object(id);
        if is_measurement_class(obj.class_name()) {
            record.measurements = self.measurements(&value);
        } else if let Some(roi) = self.roi(&value) {
            record.roi_kind = roi.kind;
            record.roi_points = roi.points;
        } else {
            record.roi_kind = Some(patterns::roi_kind(obj.class_name()));
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_lowercase() {
        let config = WalkerConfig::default();
        for s in config
            .record_suffixes
            .iter()
            .chain(&config.standalone_suffixes)
            .chain(&config.structural_names)
            .chain(&config.name_fields)
            .chain(&config.attribute_keywords)
        {
            assert_eq!(s, &s.to_ascii_lowercase());
        }
    }

    #[test]
    fn empty_graph_walks_to_nothing() {
        let out = GraphWalker::new().walk(&ObjectGraph::default());
        assert!(out.records.is_empty());
        assert_eq!(out.summary.n_objects, 0);
        assert!(!out.truncated);
    }
}
