//! Instance data trees.
//!
//! A [`DataTree`] is the XML-like data tree owned by a form instance. Nodes
//! live in an arena ([`slotmap::SlotMap`]) keyed by generational [`NodeId`]s,
//! so parent/child links are plain keys with no ownership cycles, and node
//! handles stay stable while the tree changes shape.
//!
//! Trees distinguish two kinds of mutation, because the consistency pipeline
//! reacts to them differently:
//!
//! - *value-only* mutation ([`DataTree::set_value`],
//!   [`DataTree::set_attribute`]) leaves the tree shape untouched,
//! - *structural* mutation ([`DataTree::append_child`],
//!   [`DataTree::remove`]) changes which nodes exist.
//!
//! A tree can be made read-only ([`DataTree::make_read_only`]), after which
//! both kinds of mutation are rejected. Read-only trees are used for shared,
//! externally-cached instance content; exposing this as a flag rather than a
//! separate type keeps the instance registry uniform.
//!
//! Nodes also carry annotation state maintained by the validation phase:
//! bind-validity and schema-validity markers, clearable per category.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a node within one [`DataTree`].
    ///
    /// `NodeId`s are generational: a key becomes invalid when its node is
    /// removed, and is never confused with a later node reusing the slot.
    pub struct NodeId;
}

/// A process-unique identifier for a [`DataTree`].
///
/// Used to recover the owning instance of a node reference by identity,
/// without holding a pointer to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, for logging and interop.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// A reference to a node in some tree: the currency of node-sets across the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    /// The owning tree.
    pub tree: TreeId,
    /// The node within that tree.
    pub node: NodeId,
}

/// Errors that can occur during tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The node id is invalid or has been removed.
    InvalidNode,
    /// The tree is read-only and cannot be mutated.
    ReadOnly,
    /// The root element cannot be removed.
    RootRemoval,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNode => write!(f, "Invalid or removed node id"),
            Self::ReadOnly => write!(f, "Tree is read-only"),
            Self::RootRemoval => write!(f, "The root element cannot be removed"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Validation annotation state carried by each node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAnnotations {
    /// Set when a validation bind found the node invalid.
    pub bind_invalid: bool,
    /// Set when schema validation found the node invalid.
    pub schema_invalid: bool,
}

/// Internal data stored for each node.
#[derive(Debug, Clone)]
struct NodeData {
    /// Element name (local name without prefix).
    name: String,
    /// Namespace prefix, if any.
    prefix: Option<String>,
    /// Text content. Meaningful for leaf nodes; interleaved text in mixed
    /// content is concatenated here.
    value: String,
    /// Attributes in document order.
    attributes: Vec<(String, String)>,
    /// Parent node (None for the root).
    parent: Option<NodeId>,
    /// Child elements in document order.
    children: Vec<NodeId>,
    /// Validation annotations.
    annotations: NodeAnnotations,
}

impl NodeData {
    fn new(name: String, prefix: Option<String>) -> Self {
        Self {
            name,
            prefix,
            value: String::new(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
            annotations: NodeAnnotations::default(),
        }
    }
}

/// An owned XML-like data tree.
pub struct DataTree {
    id: TreeId,
    nodes: SlotMap<NodeId, NodeData>,
    root: NodeId,
    read_only: bool,
}

impl DataTree {
    /// Create a new tree with a single root element of the given name.
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut nodes = SlotMap::with_key();
        let (prefix, local) = split_qualified(&root_name.into());
        let root = nodes.insert(NodeData::new(local, prefix));
        let id = TreeId::next();
        tracing::trace!(target: "horizon_trellis_core::tree", ?id, "created data tree");
        Self {
            id,
            nodes,
            root,
            read_only: false,
        }
    }

    /// The process-unique id of this tree.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// A [`NodeRef`] for the root element.
    pub fn root_ref(&self) -> NodeRef {
        self.node_ref(self.root)
    }

    /// A [`NodeRef`] for the given node.
    pub fn node_ref(&self, node: NodeId) -> NodeRef {
        NodeRef {
            tree: self.id,
            node,
        }
    }

    /// Whether the node exists in this tree.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no nodes besides the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Whether the tree rejects mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Make the tree read-only. This is one-way.
    pub fn make_read_only(&mut self) {
        self.read_only = true;
    }

    /// Copy this tree into a fresh, mutable tree with a new [`TreeId`].
    ///
    /// Node ids carry over unchanged; only the tree identity differs.
    pub fn duplicate(&self) -> DataTree {
        DataTree {
            id: TreeId::next(),
            nodes: self.nodes.clone(),
            root: self.root,
            read_only: false,
        }
    }

    fn check_mutable(&self) -> Result<(), TreeError> {
        if self.read_only {
            Err(TreeError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn data(&self, node: NodeId) -> Result<&NodeData, TreeError> {
        self.nodes.get(node).ok_or(TreeError::InvalidNode)
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData, TreeError> {
        self.nodes.get_mut(node).ok_or(TreeError::InvalidNode)
    }

    /// Element name (local name) of the node.
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|d| d.name.as_str())
    }

    /// Namespace prefix of the node, if any.
    pub fn namespace_prefix(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).and_then(|d| d.prefix.as_deref())
    }

    /// Text value of the node.
    pub fn value(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|d| d.value.as_str())
    }

    /// Attribute value by name.
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(node).and_then(|d| {
            d.attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        })
    }

    /// All attributes of the node in document order.
    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        self.nodes
            .get(node)
            .map(|d| d.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Parent of the node, `None` for the root.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|d| d.parent)
    }

    /// Child elements of the node in document order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|d| d.children.as_slice())
            .unwrap_or(&[])
    }

    /// First child element with the given name.
    pub fn find_child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|&c| self.name(c) == Some(name))
    }

    /// All child elements with the given name, in document order.
    pub fn children_named(&self, node: NodeId, name: &str) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|&c| self.name(c) == Some(name))
            .collect()
    }

    /// Set the text value of a node. This is a value-only mutation.
    pub fn set_value(&mut self, node: NodeId, value: impl Into<String>) -> Result<(), TreeError> {
        self.check_mutable()?;
        self.data_mut(node)?.value = value.into();
        Ok(())
    }

    /// Set an attribute on a node, replacing any previous value. This is a
    /// value-only mutation.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TreeError> {
        self.check_mutable()?;
        let name = name.into();
        let value = value.into();
        let data = self.data_mut(node)?;
        if let Some(entry) = data.attributes.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            data.attributes.push((name, value));
        }
        Ok(())
    }

    /// Append a new child element to a node and return its id. This is a
    /// structural mutation.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, TreeError> {
        self.check_mutable()?;
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::InvalidNode);
        }
        let (prefix, local) = split_qualified(&name.into());
        let mut data = NodeData::new(local, prefix);
        data.parent = Some(parent);
        let child = self.nodes.insert(data);
        self.nodes[parent].children.push(child);
        Ok(child)
    }

    /// Remove a node and its whole subtree. This is a structural mutation.
    pub fn remove(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.check_mutable()?;
        if node == self.root {
            return Err(TreeError::RootRemoval);
        }
        let parent = self.data(node)?.parent;
        if let Some(parent) = parent {
            if let Some(parent_data) = self.nodes.get_mut(parent) {
                parent_data.children.retain(|&c| c != node);
            }
        }
        for id in self.descendants_or_self(node) {
            self.nodes.remove(id);
        }
        Ok(())
    }

    /// The node and all its descendants, depth-first, parents before
    /// children.
    pub fn descendants_or_self(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.nodes.get(current) {
                result.push(current);
                for &child in data.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        result
    }

    /// Visit the node and all its descendants, depth-first.
    pub fn visit(&self, from: NodeId, mut f: impl FnMut(NodeId)) {
        for node in self.descendants_or_self(from) {
            f(node);
        }
    }

    /// Validation annotations of the node.
    pub fn annotations(&self, node: NodeId) -> NodeAnnotations {
        self.nodes
            .get(node)
            .map(|d| d.annotations)
            .unwrap_or_default()
    }

    /// Whether the node is free of validation markers.
    pub fn is_node_valid(&self, node: NodeId) -> bool {
        let annotations = self.annotations(node);
        !annotations.bind_invalid && !annotations.schema_invalid
    }

    /// Mark the node invalid per a validation bind. Returns `false` when the
    /// node does not exist.
    pub fn mark_bind_invalid(&mut self, node: NodeId) -> bool {
        match self.nodes.get_mut(node) {
            Some(data) => {
                data.annotations.bind_invalid = true;
                true
            }
            None => false,
        }
    }

    /// Mark the node invalid per schema validation. Returns `false` when the
    /// node does not exist.
    pub fn mark_schema_invalid(&mut self, node: NodeId) -> bool {
        match self.nodes.get_mut(node) {
            Some(data) => {
                data.annotations.schema_invalid = true;
                true
            }
            None => false,
        }
    }

    /// Clear the schema-validity markers on every node.
    ///
    /// Run before a schema validation pass so stale state from earlier
    /// passes does not leak into the new result.
    pub fn clear_schema_state(&mut self) {
        for (_, data) in self.nodes.iter_mut() {
            data.annotations.schema_invalid = false;
        }
    }

    /// Clear the bind-validity markers on every node.
    pub fn clear_bind_state(&mut self) {
        for (_, data) in self.nodes.iter_mut() {
            data.annotations.bind_invalid = false;
        }
    }
}

impl fmt::Debug for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTree")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Split a possibly-qualified name `prefix:local` into its parts.
pub(crate) fn split_qualified(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DataTree {
        let mut tree = DataTree::new("order");
        let item = tree.append_child(tree.root(), "item").unwrap();
        tree.set_value(item, "widget").unwrap();
        let qty = tree.append_child(tree.root(), "quantity").unwrap();
        tree.set_value(qty, "2").unwrap();
        tree
    }

    #[test]
    fn test_build_and_read() {
        let tree = sample_tree();
        assert_eq!(tree.name(tree.root()), Some("order"));
        assert_eq!(tree.children(tree.root()).len(), 2);
        let item = tree.find_child(tree.root(), "item").unwrap();
        assert_eq!(tree.value(item), Some("widget"));
        assert_eq!(tree.parent(item), Some(tree.root()));
    }

    #[test]
    fn test_attributes() {
        let mut tree = DataTree::new("root");
        tree.set_attribute(tree.root(), "id", "a").unwrap();
        tree.set_attribute(tree.root(), "id", "b").unwrap();
        assert_eq!(tree.attribute(tree.root(), "id"), Some("b"));
        assert_eq!(tree.attributes(tree.root()).len(), 1);
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample_tree();
        let item = tree.find_child(tree.root(), "item").unwrap();
        let detail = tree.append_child(item, "detail").unwrap();
        tree.remove(item).unwrap();
        assert!(!tree.contains(item));
        assert!(!tree.contains(detail));
        assert_eq!(tree.children(tree.root()).len(), 1);
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = sample_tree();
        assert_eq!(tree.remove(tree.root()), Err(TreeError::RootRemoval));
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut tree = sample_tree();
        tree.make_read_only();
        let item = tree.find_child(tree.root(), "item").unwrap();
        assert_eq!(tree.set_value(item, "x"), Err(TreeError::ReadOnly));
        assert_eq!(
            tree.append_child(tree.root(), "extra").unwrap_err(),
            TreeError::ReadOnly
        );
    }

    #[test]
    fn test_duplicate_gets_fresh_identity() {
        let mut tree = sample_tree();
        tree.make_read_only();
        let copy = tree.duplicate();
        assert_ne!(tree.id(), copy.id());
        assert!(!copy.is_read_only());
        assert_eq!(copy.len(), tree.len());
        // Node ids carry over, so paths stay addressable.
        let item = tree.find_child(tree.root(), "item").unwrap();
        assert_eq!(copy.value(item), Some("widget"));
    }

    #[test]
    fn test_schema_state_clearing() {
        let mut tree = sample_tree();
        let item = tree.find_child(tree.root(), "item").unwrap();
        tree.mark_schema_invalid(item);
        tree.mark_bind_invalid(item);
        assert!(!tree.is_node_valid(item));
        tree.clear_schema_state();
        assert!(tree.annotations(item).bind_invalid);
        assert!(!tree.annotations(item).schema_invalid);
        tree.clear_bind_state();
        assert!(tree.is_node_valid(item));
    }

    #[test]
    fn test_visit_order() {
        let tree = sample_tree();
        let mut names = Vec::new();
        tree.visit(tree.root(), |n| names.push(tree.name(n).unwrap().to_string()));
        assert_eq!(names, vec!["order", "item", "quantity"]);
    }
}
