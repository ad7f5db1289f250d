//! The per-model instance registry.
//!
//! A model declares an ordered list of instance ids at construction; the
//! registry keeps one slot per declared id, unset until the instance is
//! loaded. Indexing an instance fills (or replaces) the slot matching its
//! static id — first load and instance-replacement actions go through the
//! same door.
//!
//! Invariant: the slot count always equals the declared id count, and a
//! filled slot holds an instance whose static id matches its position.

use std::collections::HashMap;

use horizon_trellis_core::{DataTree, NodeRef, TreeId};

use crate::instance::Instance;

/// Owns the set of data instances belonging to one model.
pub struct InstanceRegistry {
    ids: Vec<String>,
    slots: Vec<Option<Instance>>,
    positions: HashMap<String, usize>,
}

impl InstanceRegistry {
    /// Create a registry with one empty slot per declared id.
    pub fn new(declared_ids: Vec<String>) -> Self {
        let positions = declared_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let slots = declared_ids.iter().map(|_| None).collect();
        Self {
            ids: declared_ids,
            slots,
            positions,
        }
    }

    /// The declared instance ids, in declaration order.
    pub fn declared_ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether the model declares any instances.
    pub fn has_declared(&self) -> bool {
        !self.ids.is_empty()
    }

    /// Number of declared instances.
    pub fn declared_len(&self) -> usize {
        self.ids.len()
    }

    /// Number of loaded instances.
    pub fn loaded_len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Insert an instance at the slot matching its static id, replacing any
    /// previous occupant. Returns the instance back when its id was never
    /// declared.
    pub fn index_instance(&mut self, instance: Instance) -> Result<(), Instance> {
        match self.positions.get(instance.static_id()) {
            Some(&position) => {
                tracing::trace!(
                    target: "horizon_trellis::registry",
                    id = instance.static_id(),
                    position,
                    replaced = self.slots[position].is_some(),
                    "indexing instance"
                );
                self.slots[position] = Some(instance);
                Ok(())
            }
            None => Err(instance),
        }
    }

    /// The instance with the given static id, if loaded.
    pub fn instance(&self, static_id: &str) -> Option<&Instance> {
        let position = *self.positions.get(static_id)?;
        self.slots[position].as_ref()
    }

    /// Mutable access to the instance with the given static id.
    pub fn instance_mut(&mut self, static_id: &str) -> Option<&mut Instance> {
        let position = *self.positions.get(static_id)?;
        self.slots[position].as_mut()
    }

    /// The model's default instance: the first declared one, if loaded.
    pub fn default_instance(&self) -> Option<&Instance> {
        self.slots.first().and_then(|slot| slot.as_ref())
    }

    /// Loaded instances, in declaration order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Loaded instances, mutably, in declaration order.
    pub fn instances_mut(&mut self) -> impl Iterator<Item = &mut Instance> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }

    /// The instance owning the given node, found by tree identity.
    ///
    /// Linear scan: instance counts per model are small.
    pub fn instance_for_node(&self, node: NodeRef) -> Option<&Instance> {
        self.instances().find(|i| i.tree_id() == node.tree)
    }

    /// The tree with the given identity, if any loaded instance owns it.
    pub fn tree(&self, id: TreeId) -> Option<&DataTree> {
        self.instances()
            .find(|i| i.tree_id() == id)
            .map(|i| i.tree())
    }

    /// Mutable access to the tree with the given identity. `None` when no
    /// instance owns it or the instance is read-only.
    pub fn tree_mut(&mut self, id: TreeId) -> Option<&mut DataTree> {
        self.instances_mut()
            .find(|i| i.tree_id() == id)
            .and_then(|i| i.tree_mut())
    }

    /// The text value of a node, resolved through its owning tree.
    pub fn node_value(&self, node: NodeRef) -> Option<&str> {
        self.tree(node.tree)?.value(node.node)
    }
}
