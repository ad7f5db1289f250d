//! Binding-context stack contract.
//!
//! Binds, submissions, and event handlers evaluate against hierarchical
//! binding contexts maintained by a [`ContextStack`]. The engine consumes
//! the stack through a narrow contract: reset it to a model (which
//! re-evaluates the model's top-level variables) and read the current
//! context back.
//!
//! [`BasicContextStack`] is the built-in implementation used when no richer
//! stack is injected.

use std::collections::HashMap;

use horizon_trellis_core::NodeRef;

use crate::definition::VariableDefinition;
use crate::evaluator::{EvalContext, ExpressionError, ExpressionEvaluator, Value};
use crate::registry::InstanceRegistry;

/// One level of evaluation context: a node-set, a position within it, and
/// the in-scope variable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingContext {
    /// Context node-set.
    pub nodeset: Vec<NodeRef>,
    /// 1-based position; 0 when the node-set is empty.
    pub position: usize,
    /// In-scope variables.
    pub variables: HashMap<String, Value>,
}

impl BindingContext {
    /// An empty context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context over a single node.
    pub fn single(node: NodeRef) -> Self {
        Self {
            nodeset: vec![node],
            position: 1,
            variables: HashMap::new(),
        }
    }

    /// The context node, when the node-set is non-empty.
    pub fn context_node(&self) -> Option<NodeRef> {
        if self.position >= 1 {
            self.nodeset.get(self.position - 1).copied()
        } else {
            None
        }
    }

    /// An [`EvalContext`] view of this context.
    pub fn eval_context(&self) -> EvalContext<'_> {
        EvalContext {
            nodeset: &self.nodeset,
            position: self.position,
            variables: &self.variables,
        }
    }
}

/// What a [`ContextStack`] needs to know about a model to reset to it.
pub struct ModelContextInfo<'a> {
    /// The model's effective id, for logging and function contexts.
    pub effective_id: &'a str,
    /// Root of the model's default (first) instance, if loaded.
    pub default_root: Option<NodeRef>,
    /// The model's top-level variable declarations, in declaration order.
    pub variables: &'a [VariableDefinition],
}

/// The binding-context stack consumed by the engine.
pub trait ContextStack {
    /// Reset the stack to the given model: the new bottom context binds to
    /// the model's default instance root and carries the model's freshly
    /// evaluated top-level variables.
    ///
    /// Variable evaluation failures are pushed onto `errors` and the
    /// variable takes the empty value; they never abort the reset.
    fn reset_binding_context(
        &mut self,
        info: &ModelContextInfo<'_>,
        instances: &InstanceRegistry,
        evaluator: &dyn ExpressionEvaluator,
        errors: &mut Vec<ExpressionError>,
    ) -> BindingContext;

    /// The context currently on top of the stack.
    fn current_binding_context(&self) -> &BindingContext;
}

/// The built-in context stack: a plain stack of [`BindingContext`] levels
/// with sequential variable evaluation.
pub struct BasicContextStack {
    stack: Vec<BindingContext>,
}

impl BasicContextStack {
    /// Create a stack holding a single empty context.
    pub fn new() -> Self {
        Self {
            stack: vec![BindingContext::empty()],
        }
    }
}

impl Default for BasicContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack for BasicContextStack {
    fn reset_binding_context(
        &mut self,
        info: &ModelContextInfo<'_>,
        instances: &InstanceRegistry,
        evaluator: &dyn ExpressionEvaluator,
        errors: &mut Vec<ExpressionError>,
    ) -> BindingContext {
        let mut context = match info.default_root {
            Some(root) => BindingContext::single(root),
            None => BindingContext::empty(),
        };

        // Variables see those declared before them, in declaration order.
        for variable in info.variables {
            let value = {
                let eval = context.eval_context();
                evaluator.evaluate_string(instances, &eval, variable.expression())
            };
            let value = match value {
                Ok(text) => Value::Text(text),
                Err(error) => {
                    tracing::warn!(
                        target: "horizon_trellis::context",
                        model = info.effective_id,
                        variable = variable.name(),
                        %error,
                        "variable evaluation failed"
                    );
                    errors.push(error);
                    Value::Empty
                }
            };
            context.variables.insert(variable.name().to_string(), value);
        }

        self.stack.clear();
        self.stack.push(context.clone());
        context
    }

    fn current_binding_context(&self) -> &BindingContext {
        self.stack.last().expect("stack holds at least one context")
    }
}
