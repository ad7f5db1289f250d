//! Runtime instances and their persisted projections.
//!
//! An [`Instance`] pairs a declared static id with live data: an owned
//! mutable tree, or a shared read-only tree when the content came from the
//! shared instance cache. The registry stays uniform either way — read-only
//! is a flag on the instance, not a different type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use horizon_trellis_core::{DataTree, NodeRef, TreeId, ident, xml};

/// Cache identity of an externally-loaded instance: the resolved source URL
/// plus the request-relevant parameter fingerprint. Two descriptors are
/// cache-equivalent iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceCaching {
    resolved_url: String,
    parameters: Vec<(String, String)>,
}

impl InstanceCaching {
    /// Create a descriptor. Parameters are sorted so the fingerprint does
    /// not depend on declaration order.
    pub fn new(resolved_url: impl Into<String>, mut parameters: Vec<(String, String)>) -> Self {
        parameters.sort();
        Self {
            resolved_url: resolved_url.into(),
            parameters,
        }
    }

    /// The resolved source URL.
    pub fn resolved_url(&self) -> &str {
        &self.resolved_url
    }

    /// The request-relevant parameter fingerprint.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }
}

/// The data tree behind an instance: exclusively owned, or shared with the
/// cross-session instance cache.
#[derive(Debug)]
enum InstanceDocument {
    Owned(DataTree),
    Shared(Arc<DataTree>),
}

/// A runtime data instance owned by a model.
#[derive(Debug)]
pub struct Instance {
    static_id: String,
    document: InstanceDocument,
    valid: bool,
    read_only: bool,
    schema_validation: bool,
    caching: Option<InstanceCaching>,
}

impl Instance {
    /// Create an instance over an owned tree.
    ///
    /// A read-only instance freezes its tree so later mutation attempts are
    /// rejected at the tree level too.
    pub fn new(
        static_id: impl Into<String>,
        mut tree: DataTree,
        read_only: bool,
        schema_validation: bool,
        caching: Option<InstanceCaching>,
    ) -> Self {
        if read_only {
            tree.make_read_only();
        }
        Self {
            static_id: static_id.into(),
            document: InstanceDocument::Owned(tree),
            valid: true,
            read_only,
            schema_validation,
            caching,
        }
    }

    /// Create an instance over a tree shared with the instance cache.
    /// Shared instances are always read-only.
    pub fn shared(
        static_id: impl Into<String>,
        tree: Arc<DataTree>,
        schema_validation: bool,
        caching: Option<InstanceCaching>,
    ) -> Self {
        Self {
            static_id: static_id.into(),
            document: InstanceDocument::Shared(tree),
            valid: true,
            read_only: true,
            schema_validation,
            caching,
        }
    }

    /// The instance's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The instance's effective id under the given model effective id:
    /// the model's prefix and suffix carried over to the instance's static
    /// id.
    pub fn effective_id(&self, model_effective_id: &str) -> String {
        ident::related_effective_id(model_effective_id, &self.static_id)
    }

    /// The instance's data tree.
    pub fn tree(&self) -> &DataTree {
        match &self.document {
            InstanceDocument::Owned(tree) => tree,
            InstanceDocument::Shared(tree) => tree,
        }
    }

    /// Mutable access to the data tree. `None` for shared trees; owned
    /// read-only trees additionally reject mutation themselves.
    pub(crate) fn tree_mut(&mut self) -> Option<&mut DataTree> {
        match &mut self.document {
            InstanceDocument::Owned(tree) if !self.read_only => Some(tree),
            _ => None,
        }
    }

    /// Identity of the instance's tree.
    pub fn tree_id(&self) -> TreeId {
        self.tree().id()
    }

    /// A reference to the tree's root element.
    pub fn root_ref(&self) -> NodeRef {
        self.tree().root_ref()
    }

    /// Whether the instance rejects mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the instance passed its last validation.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Whether the instance participates in schema validation. Read-only
    /// instances never do.
    pub fn schema_validation(&self) -> bool {
        self.schema_validation && !self.read_only
    }

    /// The cache descriptor, present only when the content came from the
    /// shared instance cache.
    pub fn caching(&self) -> Option<&InstanceCaching> {
        self.caching.as_ref()
    }

    /// Project the instance into its persisted form.
    pub fn to_state(&self, model_effective_id: &str) -> InstanceState {
        InstanceState {
            model_effective_id: model_effective_id.to_string(),
            static_id: self.static_id.clone(),
            document: xml::serialize(self.tree()),
            caching: self.caching.clone(),
            read_only: self.read_only,
            valid: self.valid,
        }
    }
}

/// The persisted projection of an instance, restorable in a later request.
///
/// The surrounding encoding (compression, encryption, framing) is the
/// persistence layer's business; this is only the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    /// Effective id of the owning model.
    pub model_effective_id: String,
    /// The instance's static id.
    pub static_id: String,
    /// Serialized document content.
    pub document: String,
    /// Cache descriptor, when the instance came from the shared cache.
    pub caching: Option<InstanceCaching>,
    /// Whether the instance was read-only.
    pub read_only: bool,
    /// The instance's validity at serialization time.
    pub valid: bool,
}
