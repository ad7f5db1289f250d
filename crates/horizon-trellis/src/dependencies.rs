//! Dependency tracking hooks.
//!
//! The rendering layer keeps its own bookkeeping of what a mutation
//! invalidated. The engine does not know or care how; it notifies a
//! [`DependencyTracker`] at the relevant points and moves on. Phase
//! completion hooks fire even when the phase skipped its work, so the
//! tracker's own state machine can advance regardless.

use horizon_trellis_core::NodeRef;

/// Hooks notified by the model lifecycle controller.
pub trait DependencyTracker {
    /// The rebuild phase completed (possibly as a no-op) for the model.
    fn rebuild_done(&mut self, model: &str);

    /// The recalculate phase completed (possibly as a no-op) for the model.
    fn recalculate_done(&mut self, model: &str);

    /// The revalidate phase completed (possibly as a no-op) for the model.
    fn revalidate_done(&mut self, model: &str);

    /// A structural mutation happened, optionally scoped to one instance.
    fn mark_structural_change(&mut self, model: &str, instance: Option<&str>);

    /// A single node's value changed.
    fn mark_value_changed(&mut self, model: &str, node: NodeRef);
}

/// A [`DependencyTracker`] that ignores every notification.
#[derive(Debug, Default)]
pub struct NullDependencies;

impl DependencyTracker for NullDependencies {
    fn rebuild_done(&mut self, _model: &str) {}
    fn recalculate_done(&mut self, _model: &str) {}
    fn revalidate_done(&mut self, _model: &str) {}
    fn mark_structural_change(&mut self, _model: &str, _instance: Option<&str>) {}
    fn mark_value_changed(&mut self, _model: &str, _node: NodeRef) {}
}
