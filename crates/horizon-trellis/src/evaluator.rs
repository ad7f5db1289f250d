//! Path-expression evaluation contract.
//!
//! The engine does not define a binding-expression language of its own; it
//! consumes an opaque [`ExpressionEvaluator`] service that turns expression
//! text plus an evaluation context into node-sets, strings, or booleans.
//!
//! Failures are always per-evaluation: the engine catches them, reports them
//! through the expression-error event channel, and treats the one evaluation
//! as having produced an empty result. A failing expression never aborts a
//! pipeline phase.

use std::collections::HashMap;

use horizon_trellis_core::NodeRef;

use crate::registry::InstanceRegistry;

/// A value produced by expression evaluation, also used for top-level model
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value.
    Empty,
    /// A string value.
    Text(String),
    /// A boolean value.
    Boolean(bool),
    /// A numeric value.
    Number(f64),
    /// A node-set in document order.
    NodeSet(Vec<NodeRef>),
}

impl Value {
    /// The string value of this value, per the usual conversion rules:
    /// node-sets convert through their first node (the engine does not read
    /// node content here — callers resolve nodes against the registry).
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty | Self::NodeSet(_) => String::new(),
            Self::Text(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
        }
    }

    /// The first node when this value is a non-empty node-set.
    pub fn first_node(&self) -> Option<NodeRef> {
        match self {
            Self::NodeSet(nodes) => nodes.first().copied(),
            _ => None,
        }
    }
}

/// An expression evaluation failure.
///
/// Always non-fatal: the engine reports it and substitutes an empty result
/// for the one evaluation that failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Expression '{expression}' failed: {message}")]
pub struct ExpressionError {
    /// The expression text that failed.
    pub expression: String,
    /// Evaluator message.
    pub message: String,
}

impl ExpressionError {
    /// Create an expression error.
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// The evaluation context handed to the evaluator: a context node-set, a
/// 1-based position within it, and the in-scope variable values.
pub struct EvalContext<'a> {
    /// Context node-set.
    pub nodeset: &'a [NodeRef],
    /// 1-based context position; 0 when the node-set is empty.
    pub position: usize,
    /// In-scope variables.
    pub variables: &'a HashMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    /// The context node, when the node-set is non-empty.
    pub fn context_node(&self) -> Option<NodeRef> {
        if self.position >= 1 {
            self.nodeset.get(self.position - 1).copied()
        } else {
            None
        }
    }
}

/// The opaque path-expression service consumed by bind and value
/// evaluation.
///
/// Implementations read instance content through the registry passed to each
/// call; they never mutate it.
pub trait ExpressionEvaluator {
    /// Evaluate an expression to a node-set in document order.
    fn evaluate_nodeset(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<Vec<NodeRef>, ExpressionError>;

    /// Evaluate an expression to a string.
    fn evaluate_string(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<String, ExpressionError>;

    /// Evaluate an expression to a boolean.
    fn evaluate_boolean(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<bool, ExpressionError>;
}

impl<E: ExpressionEvaluator + ?Sized> ExpressionEvaluator for Box<E> {
    fn evaluate_nodeset(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<Vec<NodeRef>, ExpressionError> {
        (**self).evaluate_nodeset(instances, context, expression)
    }

    fn evaluate_string(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<String, ExpressionError> {
        (**self).evaluate_string(instances, context, expression)
    }

    fn evaluate_boolean(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<bool, ExpressionError> {
        (**self).evaluate_boolean(instances, context, expression)
    }
}
