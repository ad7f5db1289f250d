//! Shared fixtures for the integration tests: a child-axis path evaluator,
//! a counting dependency tracker, an observable refresh target, and an
//! event recorder. The real expression language is an external collaborator;
//! the evaluator here understands just enough to exercise the engine.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use horizon_trellis::{
    DependencyTracker, EvalContext, EventDisposition, ExpressionError, ExpressionEvaluator,
    FormDocument, InstanceRegistry, LifecycleEvent, NodeRef, RefreshTarget,
};

/// Install a test subscriber once so `RUST_LOG=horizon_trellis=trace`
/// surfaces engine logs during test runs.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A minimal path evaluator: `/`-separated child steps from the context
/// node, `..` for the parent, `.` for the context node itself. Strings
/// additionally understand `literal:x` and `$variable`; booleans understand
/// `true`, `false`, and `nonempty:<path>`. The expression `fail` always
/// errors, for exercising the non-fatal error channel.
pub struct PathEvaluator {
    pub nodeset_calls: Arc<AtomicUsize>,
}

impl PathEvaluator {
    pub fn new() -> Self {
        Self {
            nodeset_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.nodeset_calls.clone()
    }

    fn resolve_path(
        registry: &InstanceRegistry,
        context: &EvalContext<'_>,
        path: &str,
    ) -> Vec<NodeRef> {
        let mut current: Vec<NodeRef> = context.context_node().into_iter().collect();
        for step in path.split('/') {
            if step == "." || step.is_empty() {
                continue;
            }
            let mut next = Vec::new();
            for node in &current {
                let Some(tree) = registry.tree(node.tree) else {
                    continue;
                };
                if step == ".." {
                    if let Some(parent) = tree.parent(node.node) {
                        next.push(tree.node_ref(parent));
                    }
                } else {
                    for child in tree.children_named(node.node, step) {
                        next.push(tree.node_ref(child));
                    }
                }
            }
            current = next;
        }
        current
    }
}

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate_nodeset(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<Vec<NodeRef>, ExpressionError> {
        self.nodeset_calls.fetch_add(1, Ordering::SeqCst);
        if expression == "fail" {
            return Err(ExpressionError::new(expression, "forced failure"));
        }
        Ok(Self::resolve_path(instances, context, expression))
    }

    fn evaluate_string(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<String, ExpressionError> {
        if expression == "fail" {
            return Err(ExpressionError::new(expression, "forced failure"));
        }
        if let Some(literal) = expression.strip_prefix("literal:") {
            return Ok(literal.to_string());
        }
        if let Some(name) = expression.strip_prefix('$') {
            return Ok(context
                .variables
                .get(name)
                .map(|v| v.as_text())
                .unwrap_or_default());
        }
        let nodes = Self::resolve_path(instances, context, expression);
        Ok(nodes
            .first()
            .and_then(|n| instances.node_value(*n))
            .unwrap_or_default()
            .to_string())
    }

    fn evaluate_boolean(
        &self,
        instances: &InstanceRegistry,
        context: &EvalContext<'_>,
        expression: &str,
    ) -> Result<bool, ExpressionError> {
        match expression {
            "fail" => Err(ExpressionError::new(expression, "forced failure")),
            "true" | "true()" => Ok(true),
            "false" | "false()" => Ok(false),
            _ => {
                if let Some(path) = expression.strip_prefix("nonempty:") {
                    let nodes = Self::resolve_path(instances, context, path);
                    Ok(nodes
                        .first()
                        .and_then(|n| instances.node_value(*n))
                        .is_some_and(|v| !v.is_empty()))
                } else {
                    Err(ExpressionError::new(expression, "unknown boolean form"))
                }
            }
        }
    }
}

/// Counters for the dependency-tracker hooks.
#[derive(Debug, Default)]
pub struct Counts {
    pub rebuild_done: usize,
    pub recalculate_done: usize,
    pub revalidate_done: usize,
    pub structural_changes: usize,
    pub value_changes: usize,
}

/// A dependency tracker that only counts its notifications.
pub struct CountingTracker {
    pub counts: Rc<RefCell<Counts>>,
}

impl CountingTracker {
    pub fn new() -> (Self, Rc<RefCell<Counts>>) {
        let counts = Rc::new(RefCell::new(Counts::default()));
        (
            Self {
                counts: counts.clone(),
            },
            counts,
        )
    }
}

impl DependencyTracker for CountingTracker {
    fn rebuild_done(&mut self, _model: &str) {
        self.counts.borrow_mut().rebuild_done += 1;
    }

    fn recalculate_done(&mut self, _model: &str) {
        self.counts.borrow_mut().recalculate_done += 1;
    }

    fn revalidate_done(&mut self, _model: &str) {
        self.counts.borrow_mut().revalidate_done += 1;
    }

    fn mark_structural_change(&mut self, _model: &str, _instance: Option<&str>) {
        self.counts.borrow_mut().structural_changes += 1;
    }

    fn mark_value_changed(&mut self, _model: &str, _node: NodeRef) {
        self.counts.borrow_mut().value_changes += 1;
    }
}

/// A refresh target whose synchronization count the test can observe.
pub struct ObservableRefresh {
    state: Rc<RefCell<(bool, usize)>>,
}

impl ObservableRefresh {
    pub fn new() -> (Self, Rc<RefCell<(bool, usize)>>) {
        let state = Rc::new(RefCell::new((false, 0)));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl RefreshTarget for ObservableRefresh {
    fn require_refresh(&mut self) {
        self.state.borrow_mut().0 = true;
    }

    fn refresh_required(&self) -> bool {
        self.state.borrow().0
    }

    fn synchronize_and_refresh(&mut self) {
        let mut state = self.state.borrow_mut();
        state.0 = false;
        state.1 += 1;
    }
}

/// Record every event flowing through the document as `model:event-name`.
pub fn record_events(document: &mut FormDocument) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    document.add_listener(move |model, event: &LifecycleEvent| {
        sink.borrow_mut().push(format!("{model}:{}", event.name()));
        EventDisposition::Continue
    });
    log
}

/// Count occurrences of an event name in a recorded log.
pub fn count_events(log: &Rc<RefCell<Vec<String>>>, suffix: &str) -> usize {
    log.borrow()
        .iter()
        .filter(|entry| entry.ends_with(suffix))
        .count()
}
