//! The containing form document.
//!
//! A [`FormDocument`] is the top-level session object: it owns its models by
//! index (models hold no back-pointers), the cross-model refresh target, the
//! registered event listeners, and the collaborator set every phase runs
//! against. One document is driven by one logical request/session at a time;
//! the engine contains no internal parallelism.
//!
//! Events reach models only through [`FormDocument::dispatch`]: listeners
//! run first and may intercept, then the model performs the event's default
//! action. Reset and deferred-phase draining re-enter this same channel, so
//! listeners observe every step.

use std::sync::Arc;

use horizon_trellis_core::{LifecycleEvent, NodeRef};

use crate::cache::SharedInstanceCache;
use crate::context::{BasicContextStack, ContextStack};
use crate::dependencies::{DependencyTracker, NullDependencies};
use crate::deferred::{DeferredRefresh, RefreshTarget};
use crate::error::{Result, TrellisError};
use crate::evaluator::ExpressionEvaluator;
use crate::instance::InstanceState;
use crate::load::{InstanceLoader, UnsupportedLoader, UriResolver};
use crate::model::Model;
use crate::definition::ModelDefinition;
use crate::validation::{NoSchema, SchemaValidator};

/// Index of a model within its document.
pub type ModelHandle = usize;

/// What a listener decided about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Let processing continue; the default action runs.
    Continue,
    /// Swallow the event; the default action is suppressed.
    Intercept,
}

/// The document-level event listeners.
///
/// Listeners observe every event dispatched to any model of the document,
/// including events raised mid-phase (expression errors, validity flips).
/// Returning [`EventDisposition::Intercept`] suppresses the default action —
/// the escape hatch that turns a fatal link exception into a handled one.
#[derive(Default)]
pub struct EventListeners {
    listeners: Vec<Box<dyn FnMut(&str, &LifecycleEvent) -> EventDisposition>>,
}

impl EventListeners {
    /// Register a listener. The first argument is the target model's
    /// effective id.
    pub fn add<F>(&mut self, listener: F)
    where
        F: FnMut(&str, &LifecycleEvent) -> EventDisposition + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Run every listener; any interception wins.
    pub fn notify(&mut self, model: &str, event: &LifecycleEvent) -> EventDisposition {
        let mut disposition = EventDisposition::Continue;
        for listener in &mut self.listeners {
            if listener(model, event) == EventDisposition::Intercept {
                disposition = EventDisposition::Intercept;
            }
        }
        disposition
    }
}

/// The collaborator set a model phase runs against, borrowed from the
/// document for the duration of one dispatch.
pub struct ModelHost<'a> {
    /// The rendering layer's dependency bookkeeping.
    pub dependencies: &'a mut dyn DependencyTracker,
    /// The cross-model refresh capability.
    pub refresh: &'a mut dyn RefreshTarget,
    /// The schema validation service.
    pub schema: &'a mut dyn SchemaValidator,
    /// Fetches external instance content; also the cache's miss-filler.
    pub loader: &'a dyn InstanceLoader,
    /// Optional pluggable resolver for non-cached fetches.
    pub resolver: Option<&'a dyn UriResolver>,
    /// The cross-session shared instance cache.
    pub cache: &'a SharedInstanceCache,
    /// The opaque path-expression service.
    pub evaluator: &'a dyn ExpressionEvaluator,
    /// The binding-context stack.
    pub context_stack: &'a mut dyn ContextStack,
    /// The document-level event listeners.
    pub listeners: &'a mut EventListeners,
}

/// Builder for a [`FormDocument`].
pub struct FormDocumentBuilder {
    dependencies: Box<dyn DependencyTracker>,
    refresh: Box<dyn RefreshTarget>,
    schema: Box<dyn SchemaValidator>,
    loader: Box<dyn InstanceLoader>,
    resolver: Option<Box<dyn UriResolver>>,
    cache: Arc<SharedInstanceCache>,
    evaluator: Box<dyn ExpressionEvaluator>,
    context_stack: Box<dyn ContextStack>,
}

impl FormDocumentBuilder {
    /// Start a builder around the one collaborator without a usable
    /// default: the expression evaluator.
    pub fn new(evaluator: impl ExpressionEvaluator + 'static) -> Self {
        Self {
            dependencies: Box::new(NullDependencies),
            refresh: Box::new(DeferredRefresh::new()),
            schema: Box::new(NoSchema),
            loader: Box::new(UnsupportedLoader),
            resolver: None,
            cache: Arc::new(SharedInstanceCache::new()),
            evaluator: Box::new(evaluator),
            context_stack: Box::new(BasicContextStack::new()),
        }
    }

    /// Use a dependency tracker.
    pub fn with_dependencies(mut self, dependencies: impl DependencyTracker + 'static) -> Self {
        self.dependencies = Box::new(dependencies);
        self
    }

    /// Use a refresh target (the rendering layer).
    pub fn with_refresh_target(mut self, refresh: impl RefreshTarget + 'static) -> Self {
        self.refresh = Box::new(refresh);
        self
    }

    /// Use a schema validator.
    pub fn with_schema_validator(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.schema = Box::new(schema);
        self
    }

    /// Use an instance loader.
    pub fn with_loader(mut self, loader: impl InstanceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Use a pluggable resolver for non-cached fetches.
    pub fn with_resolver(mut self, resolver: impl UriResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Share an instance cache with other documents. Without this, the
    /// document gets a private cache.
    pub fn with_cache(mut self, cache: Arc<SharedInstanceCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a binding-context stack.
    pub fn with_context_stack(mut self, context_stack: impl ContextStack + 'static) -> Self {
        self.context_stack = Box::new(context_stack);
        self
    }

    /// Finish the document.
    pub fn build(self) -> FormDocument {
        FormDocument {
            models: Vec::new(),
            dependencies: self.dependencies,
            refresh: self.refresh,
            schema: self.schema,
            loader: self.loader,
            resolver: self.resolver,
            cache: self.cache,
            evaluator: self.evaluator,
            context_stack: self.context_stack,
            listeners: EventListeners::default(),
        }
    }
}

/// The top-level session object owning models and collaborators.
pub struct FormDocument {
    models: Vec<Model>,
    dependencies: Box<dyn DependencyTracker>,
    refresh: Box<dyn RefreshTarget>,
    schema: Box<dyn SchemaValidator>,
    loader: Box<dyn InstanceLoader>,
    resolver: Option<Box<dyn UriResolver>>,
    cache: Arc<SharedInstanceCache>,
    evaluator: Box<dyn ExpressionEvaluator>,
    context_stack: Box<dyn ContextStack>,
    listeners: EventListeners,
}

impl FormDocument {
    /// Start building a document around an expression evaluator.
    pub fn builder(evaluator: impl ExpressionEvaluator + 'static) -> FormDocumentBuilder {
        FormDocumentBuilder::new(evaluator)
    }

    /// Add a model built from the definition. Its initial effective id is
    /// its prefixed id (a model gains a suffix only inside a repeat).
    pub fn add_model(&mut self, definition: Arc<ModelDefinition>) -> ModelHandle {
        let effective_id = definition.prefixed_id();
        tracing::debug!(
            target: "horizon_trellis::document",
            model = %effective_id,
            "adding model"
        );
        self.models.push(Model::new(definition, effective_id));
        self.models.len() - 1
    }

    /// The model behind a handle.
    pub fn model(&self, handle: ModelHandle) -> Option<&Model> {
        self.models.get(handle)
    }

    /// Mutable access to the model behind a handle.
    pub fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.models.get_mut(handle)
    }

    /// The document's models, in creation order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Register an event listener.
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&str, &LifecycleEvent) -> EventDisposition + 'static,
    {
        self.listeners.add(listener);
    }

    /// The shared instance cache.
    pub fn cache(&self) -> &Arc<SharedInstanceCache> {
        &self.cache
    }

    /// Whether the UI must be refreshed before the next render.
    pub fn refresh_required(&self) -> bool {
        self.refresh.refresh_required()
    }

    fn split(&mut self, handle: ModelHandle) -> Result<(&mut Model, ModelHost<'_>)> {
        let model = self
            .models
            .get_mut(handle)
            .ok_or(TrellisError::UnknownModel { handle })?;
        let host = ModelHost {
            dependencies: self.dependencies.as_mut(),
            refresh: self.refresh.as_mut(),
            schema: self.schema.as_mut(),
            loader: self.loader.as_ref(),
            resolver: self.resolver.as_deref(),
            cache: self.cache.as_ref(),
            evaluator: self.evaluator.as_ref(),
            context_stack: self.context_stack.as_mut(),
            listeners: &mut self.listeners,
        };
        Ok((model, host))
    }

    /// Dispatch a lifecycle event to a model through the public channel.
    pub fn dispatch(&mut self, handle: ModelHandle, event: LifecycleEvent) -> Result<()> {
        let (model, mut host) = self.split(handle)?;
        model.dispatch_event(event, &mut host)
    }

    /// Reject an externally-originated event: the model layer accepts
    /// none.
    pub fn dispatch_external(
        &mut self,
        handle: ModelHandle,
        event: LifecycleEvent,
    ) -> Result<()> {
        let model = self
            .models
            .get(handle)
            .ok_or(TrellisError::UnknownModel { handle })?;
        debug_assert!(!model.allows_external_event(&event));
        Err(TrellisError::ExternalEventRejected {
            name: event.name(),
            model: model.effective_id().to_string(),
        })
    }

    /// Construct every model, then announce construction completion and
    /// readiness to each.
    pub fn initialize(&mut self, run_rrr: bool) -> Result<()> {
        for handle in 0..self.models.len() {
            self.dispatch(handle, LifecycleEvent::ModelConstruct { run_rrr })?;
        }
        for handle in 0..self.models.len() {
            self.dispatch(handle, LifecycleEvent::ModelConstructDone)?;
        }
        for handle in 0..self.models.len() {
            self.dispatch(handle, LifecycleEvent::Ready)?;
        }
        Ok(())
    }

    /// Dispatch the owed phases of a model as public events.
    pub fn rebuild_recalculate_revalidate_if_needed(
        &mut self,
        handle: ModelHandle,
    ) -> Result<()> {
        let (model, mut host) = self.split(handle)?;
        model.rebuild_recalculate_revalidate_if_needed(&mut host)
    }

    /// Set a node's value on behalf of an action. The owning model is found
    /// by tree identity; the change marks its deferred flags.
    pub fn set_value(&mut self, node: NodeRef, value: &str) -> Result<()> {
        let handle = self
            .models
            .iter()
            .position(|m| m.registry().instance_for_node(node).is_some())
            .ok_or(TrellisError::ForeignNode {
                model: String::new(),
            })?;
        let (model, mut host) = self.split(handle)?;
        model.set_node_value(node, value, &mut host)
    }

    /// Record a structural change on a model's data.
    pub fn mark_structural_change(
        &mut self,
        handle: ModelHandle,
        instance: Option<&str>,
    ) -> Result<()> {
        let (model, mut host) = self.split(handle)?;
        model.mark_structural_change(instance, &mut host);
        Ok(())
    }

    /// Restore every model from persisted instance states: instances first,
    /// then the asymmetric restore pipeline (rebuild, computed-expression
    /// binds only, revalidate).
    pub fn restore(&mut self, states: &[InstanceState]) -> Result<()> {
        for handle in 0..self.models.len() {
            let (model, mut host) = self.split(handle)?;
            model.restore_instances(states, &mut host)?;
            model.restore_state(&mut host)?;
        }
        Ok(())
    }

    /// Project every model's loaded instances into persisted states.
    pub fn instance_states(&self) -> Vec<InstanceState> {
        self.models
            .iter()
            .flat_map(|m| m.instance_states())
            .collect()
    }
}
