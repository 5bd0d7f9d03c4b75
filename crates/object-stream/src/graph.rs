//! The decoded, cycle-aware object graph.

use crate::error::{Diagnostic, ProtocolError};
use crate::handles::{HandleLookup, HandleTable};
use crate::types::{ArrayVal, GenericValue, Handle, Node, NodeId, ObjectVal};

/// Everything decoded from one stream segment.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    /// Top-level contents in stream order.
    pub roots: Vec<GenericValue>,
    pub(crate) nodes: Vec<Node>,
    /// Handle table as it stood at the end of the stream (after the last reset).
    pub handles: HandleTable,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of reset markers honored.
    pub resets: usize,
}

impl ObjectGraph {
    /// First top-level value that is not raw block data.
    pub fn root(&self) -> Option<&GenericValue> {
        self.roots
            .iter()
            .find(|v| !matches!(v, GenericValue::BlockData(_)))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn object(&self, id: NodeId) -> Option<&ObjectVal> {
        match self.nodes.get(id.0) {
            Some(Node::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn array(&self, id: NodeId) -> Option<&ArrayVal> {
        match self.nodes.get(id.0) {
            Some(Node::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Object a value points at, if it is an object (or exception) value.
    pub fn as_object(&self, value: &GenericValue) -> Option<&ObjectVal> {
        match value {
            GenericValue::Object(id) | GenericValue::Exception(id) => self.object(*id),
            _ => None,
        }
    }

    pub fn as_array(&self, value: &GenericValue) -> Option<&ArrayVal> {
        match value {
            GenericValue::Array(id) => self.array(*id),
            _ => None,
        }
    }

    /// Looks a handle up in the final handle table.
    pub fn lookup(&self, handle: Handle) -> Option<&GenericValue> {
        match self.handles.get(handle) {
            HandleLookup::Resolved(v) => Some(v),
            HandleLookup::Pending | HandleLookup::Unknown => None,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks that every node was filled in and every node reference points
    /// inside the arena.
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let in_bounds = |v: &GenericValue| match v.node_id() {
            Some(id) if id.0 >= self.nodes.len() => Err(ProtocolError::Unresolved { node: id.0 }),
            _ => Ok(()),
        };
        for root in &self.roots {
            in_bounds(root)?;
        }
        for (id, node) in self.nodes() {
            match node {
                Node::Pending => return Err(ProtocolError::Unresolved { node: id.0 }),
                Node::Array(a) => a.elements.iter().try_for_each(in_bounds)?,
                Node::Object(o) => {
                    for (_, v) in o.fields() {
                        in_bounds(v)?;
                    }
                    for v in o.extra_values() {
                        in_bounds(v)?;
                    }
                }
            }
        }
        Ok(())
    }
}
