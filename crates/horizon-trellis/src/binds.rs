//! The runtime bind tree.
//!
//! Binds are declared statically ([`BindDefinition`]); at runtime each
//! declaration is projected onto a node-set against the current instance
//! data. The projection is rebuilt from scratch on every rebuild phase —
//! runtime binds own no data, only references into instance trees.
//!
//! Nested binds multiply under their parent: a child declaration is
//! re-evaluated once per node of the parent's node-set, producing one
//! [`BindIteration`] per parent node. This mirrors how repeated structures
//! multiply controls.
//!
//! Expression failures never abort a pass: the failing evaluation
//! contributes an empty node-set (or no value) and the error is collected
//! for the expression-error event channel.

use std::collections::HashMap;

use horizon_trellis_core::NodeRef;

use crate::context::BindingContext;
use crate::definition::BindDefinition;
use crate::evaluator::{EvalContext, ExpressionError, ExpressionEvaluator, Value};
use crate::registry::InstanceRegistry;

/// The runtime projection of one bind declaration onto a node-set.
pub struct RuntimeBind {
    static_id: String,
    nodeset: Vec<NodeRef>,
    iterations: Vec<BindIteration>,
}

impl RuntimeBind {
    /// The bind's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The nodes this bind resolved to, in document order.
    pub fn nodeset(&self) -> &[NodeRef] {
        &self.nodeset
    }

    /// One iteration per node of the node-set, holding the nested binds
    /// evaluated relative to that node.
    pub fn iterations(&self) -> &[BindIteration] {
        &self.iterations
    }
}

/// The nested binds of one parent node.
pub struct BindIteration {
    binds: Vec<RuntimeBind>,
}

impl BindIteration {
    /// The nested runtime binds of this iteration.
    pub fn binds(&self) -> &[RuntimeBind] {
        &self.binds
    }
}

/// A value computed by a calculation bind, to be written back to its node.
pub(crate) struct CalculatedValue {
    pub node: NodeRef,
    pub value: String,
}

/// The full runtime bind structure of one model.
pub struct BindTree {
    roots: Vec<RuntimeBind>,
}

impl BindTree {
    /// Project the bind declarations onto the current instance data.
    pub(crate) fn rebuild(
        defs: &[BindDefinition],
        registry: &InstanceRegistry,
        evaluator: &dyn ExpressionEvaluator,
        context: &BindingContext,
        errors: &mut Vec<ExpressionError>,
    ) -> Self {
        let roots = build_level(
            defs,
            registry,
            evaluator,
            &context.nodeset,
            context.position,
            &context.variables,
            errors,
        );
        let tree = Self { roots };
        tracing::debug!(
            target: "horizon_trellis::binds",
            binds = tree.size(),
            "bind tree rebuilt"
        );
        tree
    }

    /// Top-level runtime binds, in declaration order.
    pub fn roots(&self) -> &[RuntimeBind] {
        &self.roots
    }

    /// Total number of runtime binds, iterations included.
    pub fn size(&self) -> usize {
        fn count(binds: &[RuntimeBind]) -> usize {
            binds
                .iter()
                .map(|b| 1 + b.iterations.iter().map(|i| count(&i.binds)).sum::<usize>())
                .sum()
        }
        count(&self.roots)
    }

    /// Collect the values produced by calculation binds, in declaration
    /// order (parents before their nested binds). With `apply_defaults`,
    /// initial-value expressions are evaluated before the calculation of
    /// the same bind.
    pub(crate) fn collect_calculates(
        &self,
        defs: &[BindDefinition],
        registry: &InstanceRegistry,
        evaluator: &dyn ExpressionEvaluator,
        variables: &HashMap<String, Value>,
        apply_defaults: bool,
        errors: &mut Vec<ExpressionError>,
    ) -> Vec<CalculatedValue> {
        let mut updates = Vec::new();
        collect_calculates_level(
            &self.roots,
            defs,
            registry,
            evaluator,
            variables,
            apply_defaults,
            &mut updates,
            errors,
        );
        updates
    }

    /// Collect the nodes failing their validation rules (requiredness,
    /// constraint, datatype).
    pub(crate) fn collect_validation_failures(
        &self,
        defs: &[BindDefinition],
        registry: &InstanceRegistry,
        evaluator: &dyn ExpressionEvaluator,
        variables: &HashMap<String, Value>,
        errors: &mut Vec<ExpressionError>,
    ) -> Vec<NodeRef> {
        let mut failures = Vec::new();
        validate_level(
            &self.roots,
            defs,
            registry,
            evaluator,
            variables,
            &mut failures,
            errors,
        );
        failures
    }

    /// Resolve a bind by static id. With a context item, the iteration
    /// whose node-set contains the item is preferred; a bind matching by id
    /// alone is the fallback.
    pub fn resolve_bind(
        &self,
        static_id: &str,
        context_item: Option<NodeRef>,
    ) -> Option<&RuntimeBind> {
        let mut fallback = None;
        find_bind(&self.roots, static_id, context_item, &mut fallback).or(fallback)
    }
}

fn build_level(
    defs: &[BindDefinition],
    registry: &InstanceRegistry,
    evaluator: &dyn ExpressionEvaluator,
    nodeset: &[NodeRef],
    position: usize,
    variables: &HashMap<String, Value>,
    errors: &mut Vec<ExpressionError>,
) -> Vec<RuntimeBind> {
    defs.iter()
        .map(|def| {
            let context = EvalContext {
                nodeset,
                position,
                variables,
            };
            let nodes = match evaluator.evaluate_nodeset(registry, &context, def.nodeset()) {
                Ok(nodes) => nodes,
                Err(error) => {
                    errors.push(error);
                    Vec::new()
                }
            };
            let iterations = (0..nodes.len())
                .map(|index| BindIteration {
                    binds: build_level(
                        def.children(),
                        registry,
                        evaluator,
                        &nodes,
                        index + 1,
                        variables,
                        errors,
                    ),
                })
                .collect();
            RuntimeBind {
                static_id: def.static_id().to_string(),
                nodeset: nodes,
                iterations,
            }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn collect_calculates_level(
    binds: &[RuntimeBind],
    defs: &[BindDefinition],
    registry: &InstanceRegistry,
    evaluator: &dyn ExpressionEvaluator,
    variables: &HashMap<String, Value>,
    apply_defaults: bool,
    updates: &mut Vec<CalculatedValue>,
    errors: &mut Vec<ExpressionError>,
) {
    for (bind, def) in binds.iter().zip(defs) {
        if apply_defaults {
            if let Some(expression) = def.initial_value() {
                evaluate_values(bind, expression, registry, evaluator, variables, updates, errors);
            }
        }
        if let Some(expression) = def.calculate() {
            evaluate_values(bind, expression, registry, evaluator, variables, updates, errors);
        }
        for iteration in &bind.iterations {
            collect_calculates_level(
                &iteration.binds,
                def.children(),
                registry,
                evaluator,
                variables,
                apply_defaults,
                updates,
                errors,
            );
        }
    }
}

fn evaluate_values(
    bind: &RuntimeBind,
    expression: &str,
    registry: &InstanceRegistry,
    evaluator: &dyn ExpressionEvaluator,
    variables: &HashMap<String, Value>,
    updates: &mut Vec<CalculatedValue>,
    errors: &mut Vec<ExpressionError>,
) {
    for (index, node) in bind.nodeset.iter().enumerate() {
        let context = EvalContext {
            nodeset: &bind.nodeset,
            position: index + 1,
            variables,
        };
        match evaluator.evaluate_string(registry, &context, expression) {
            Ok(value) => updates.push(CalculatedValue { node: *node, value }),
            Err(error) => errors.push(error),
        }
    }
}

fn validate_level(
    binds: &[RuntimeBind],
    defs: &[BindDefinition],
    registry: &InstanceRegistry,
    evaluator: &dyn ExpressionEvaluator,
    variables: &HashMap<String, Value>,
    failures: &mut Vec<NodeRef>,
    errors: &mut Vec<ExpressionError>,
) {
    for (bind, def) in binds.iter().zip(defs) {
        for (index, node) in bind.nodeset.iter().enumerate() {
            let context = EvalContext {
                nodeset: &bind.nodeset,
                position: index + 1,
                variables,
            };
            let mut invalid = false;

            if let Some(expression) = def.required() {
                let required = evaluator
                    .evaluate_boolean(registry, &context, expression)
                    .unwrap_or_else(|error| {
                        errors.push(error);
                        false
                    });
                if required {
                    let empty = registry
                        .node_value(*node)
                        .map_or(true, |value| value.is_empty());
                    if empty {
                        invalid = true;
                    }
                }
            }

            if let Some(expression) = def.constraint() {
                // A failing evaluation counts as an unsatisfied constraint.
                let holds = evaluator
                    .evaluate_boolean(registry, &context, expression)
                    .unwrap_or_else(|error| {
                        errors.push(error);
                        false
                    });
                if !holds {
                    invalid = true;
                }
            }

            if let Some(data_type) = def.data_type() {
                let value = registry.node_value(*node).unwrap_or_default();
                if !data_type.is_valid_lexical(value) {
                    invalid = true;
                }
            }

            if invalid {
                failures.push(*node);
            }
        }
        for iteration in &bind.iterations {
            validate_level(
                &iteration.binds,
                def.children(),
                registry,
                evaluator,
                variables,
                failures,
                errors,
            );
        }
    }
}

fn find_bind<'a>(
    binds: &'a [RuntimeBind],
    static_id: &str,
    context_item: Option<NodeRef>,
    fallback: &mut Option<&'a RuntimeBind>,
) -> Option<&'a RuntimeBind> {
    for bind in binds {
        if bind.static_id == static_id {
            match context_item {
                Some(item) if bind.nodeset.contains(&item) => return Some(bind),
                Some(_) => {
                    if fallback.is_none() {
                        *fallback = Some(bind);
                    }
                }
                None => return Some(bind),
            }
        }
        for iteration in &bind.iterations {
            if let Some(found) = find_bind(&iteration.binds, static_id, context_item, fallback) {
                return Some(found);
            }
        }
    }
    None
}
