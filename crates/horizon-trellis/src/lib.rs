//! A reactive consistency engine for data-bound form processing.
//!
//! A form definition describes data instances (XML-like trees), computation
//! and validation rules ("binds") attached to nodes of those instances, and
//! controls bound to instance nodes through path expressions. As actions
//! mutate the data, this crate keeps three derived properties consistent
//! before the UI re-renders: structural bindings, computed values, and
//! validity — the four-phase **Rebuild → Recalculate → Revalidate →
//! Refresh** pipeline.
//!
//! - **Model Lifecycle**: [`Model`] receives [`LifecycleEvent`]s and runs
//!   the phases in strict order when they are owed
//! - **Deferred Flags**: [`DeferredActionContext`] records which phases a
//!   mutation made owed; phases are idempotent and clear their own flag
//! - **Instance Registry**: [`InstanceRegistry`] owns a model's data
//!   instances, loaded inline, fetched externally, or restored from state
//! - **Bind Tree**: [`BindTree`] projects bind declarations onto node-sets,
//!   rebuilt from scratch on every rebuild
//! - **Shared Cache**: [`SharedInstanceCache`] serves externally-loaded
//!   read-only instances across sessions with single-flight fetches
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_trellis::{
//!     BindDefinition, FormDocument, InstanceDefinition, ModelDefinition,
//! };
//!
//! let definition = Arc::new(
//!     ModelDefinition::new("order-model")
//!         .with_instance(InstanceDefinition::inline(
//!             "order",
//!             "<order><quantity>2</quantity><total/></order>",
//!         ))
//!         .with_bind(BindDefinition::new("total-bind", "total")
//!             .with_calculate("quantity * price")),
//! );
//!
//! let mut document = FormDocument::builder(my_expression_evaluator).build();
//! let model = document.add_model(definition);
//! document.initialize(true)?;
//!
//! // A user action mutates a leaf value…
//! document.set_value(quantity_node, "3")?;
//! // …and the owed phases run before the UI may re-render.
//! document.rebuild_recalculate_revalidate_if_needed(model)?;
//! ```
//!
//! The path-expression language, schema validation internals, and the UI
//! diff protocol are external collaborators, injected through the traits in
//! [`evaluator`], [`validation`], [`load`], [`dependencies`], and
//! [`context`].

pub mod binds;
pub mod cache;
pub mod context;
pub mod definition;
pub mod deferred;
pub mod dependencies;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod instance;
pub mod load;
pub mod model;
pub mod registry;
pub mod validation;

pub use binds::{BindIteration, BindTree, RuntimeBind};
pub use cache::SharedInstanceCache;
pub use context::{BasicContextStack, BindingContext, ContextStack, ModelContextInfo};
pub use definition::{
    ActionDefinition, ActionObserver, BindDefinition, InstanceContent, InstanceDefinition,
    ModelDefinition, SubmissionDefinition, VariableDefinition,
};
pub use deferred::{DeferredActionContext, DeferredRefresh, RefreshTarget};
pub use dependencies::{DependencyTracker, NullDependencies};
pub use document::{
    EventDisposition, EventListeners, FormDocument, FormDocumentBuilder, ModelHandle, ModelHost,
};
pub use error::{Result, TrellisError};
pub use evaluator::{EvalContext, ExpressionError, ExpressionEvaluator, Value};
pub use instance::{Instance, InstanceCaching, InstanceState};
pub use load::{InstanceLoader, LoadError, UnsupportedLoader, UriResolver, resolve_service_url};
pub use model::{Model, ModelAction, ResolvedObject, Submission};
pub use registry::InstanceRegistry;
pub use validation::{DataType, NoSchema, SchemaError, SchemaValidator};

// Re-export the core types users need alongside the engine
pub use horizon_trellis_core::{
    DataTree, LifecycleEvent, MalformedId, NodeId, NodeRef, TreeId, ident, xml,
};

/// Commonly used items, importable in one line.
pub mod prelude {
    pub use crate::{
        BindDefinition, DataTree, EventDisposition, ExpressionEvaluator, FormDocument,
        InstanceDefinition, LifecycleEvent, ModelDefinition, NodeRef, SharedInstanceCache,
        TrellisError, Value,
    };
}
