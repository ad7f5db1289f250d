//! The form model and its lifecycle controller.
//!
//! A [`Model`] is the runtime projection of one [`ModelDefinition`]: it owns
//! the instance registry, the runtime bind tree, the deferred action flags,
//! and the top-level variables, and it drives the consistency pipeline in
//! response to lifecycle events.
//!
//! The pipeline phases (`do_rebuild`, `do_recalculate`, `do_revalidate`)
//! share one shape: early-return when the owed flag is clear, do the work,
//! clear the own flag, and always notify the dependency tracker — even when
//! skipped, so the tracker's own bookkeeping can run. Flags are cleared only
//! by the phase itself; action code executing mid-phase may set them again
//! and the obligation survives for the next drain.
//!
//! Models accept no externally-originated events. Everything arrives through
//! the containing document's dispatch channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use horizon_trellis_core::{LifecycleEvent, NodeRef, ident, xml};

use crate::binds::{BindTree, RuntimeBind};
use crate::context::{BindingContext, ModelContextInfo};
use crate::deferred::DeferredActionContext;
use crate::definition::{
    ActionDefinition, ActionObserver, InstanceContent, InstanceDefinition, ModelDefinition,
    SubmissionDefinition,
};
use crate::document::{EventDisposition, ModelHost};
use crate::error::{Result, TrellisError};
use crate::evaluator::Value;
use crate::instance::{Instance, InstanceCaching, InstanceState};
use crate::load::resolve_service_url;
use crate::registry::InstanceRegistry;

/// A runtime submission. Submission processing itself lives outside the
/// engine; the object exists so submissions take part in resolution.
pub struct Submission {
    static_id: String,
    resource: String,
    method: String,
}

impl Submission {
    fn new(def: &SubmissionDefinition) -> Self {
        Self {
            static_id: def.static_id().to_string(),
            resource: def.resource().to_string(),
            method: def.method().to_string(),
        }
    }

    /// The submission's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The target resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The submission method.
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// A runtime action handler attached to the model or one of its
/// submissions.
pub struct ModelAction {
    static_id: String,
    observer: ActionObserver,
}

impl ModelAction {
    fn new(def: &ActionDefinition) -> Self {
        Self {
            static_id: def.static_id().to_string(),
            observer: def.observer().clone(),
        }
    }

    /// The action's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// What the action observes.
    pub fn observer(&self) -> &ActionObserver {
        &self.observer
    }
}

/// An object found by [`Model::resolve_object_by_id`].
pub enum ResolvedObject<'a> {
    /// The model itself.
    Model,
    /// An instance of the model.
    Instance(&'a Instance),
    /// A submission of the model.
    Submission(&'a Submission),
    /// An action handler of the model.
    Action(&'a ModelAction),
    /// A runtime bind of the model.
    Bind(&'a RuntimeBind),
}

/// One runtime form model.
pub struct Model {
    definition: Arc<ModelDefinition>,
    // Not fixed at construction: a model inside a repeat iteration is
    // re-addressed as iterations move.
    effective_id: String,
    registry: InstanceRegistry,
    submissions: HashMap<String, Submission>,
    actions: HashMap<String, ModelAction>,
    bind_tree: Option<BindTree>,
    deferred: DeferredActionContext,
    top_level_variables: HashMap<String, Value>,
    default_context: BindingContext,
    schema_loaded: bool,
    has_schema: bool,
}

impl Model {
    /// Create a model from its definition, addressed by the given effective
    /// id.
    pub fn new(definition: Arc<ModelDefinition>, effective_id: impl Into<String>) -> Self {
        let declared_ids = definition
            .instances()
            .iter()
            .map(|i| i.static_id().to_string())
            .collect();
        let submissions = definition
            .submissions()
            .iter()
            .map(|s| (s.static_id().to_string(), Submission::new(s)))
            .collect();
        let actions = definition
            .actions()
            .iter()
            .map(|a| (a.static_id().to_string(), ModelAction::new(a)))
            .collect();
        Self {
            definition,
            effective_id: effective_id.into(),
            registry: InstanceRegistry::new(declared_ids),
            submissions,
            actions,
            bind_tree: None,
            deferred: DeferredActionContext::new(),
            top_level_variables: HashMap::new(),
            default_context: BindingContext::empty(),
            schema_loaded: false,
            has_schema: false,
        }
    }

    /// The model's static definition.
    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    /// The model's static id.
    pub fn static_id(&self) -> &str {
        self.definition.static_id()
    }

    /// The model's current effective id.
    pub fn effective_id(&self) -> &str {
        &self.effective_id
    }

    /// Re-address the model, e.g. when its containing repeat iteration
    /// moves.
    pub fn update_effective_id(&mut self, effective_id: impl Into<String>) {
        self.effective_id = effective_id.into();
    }

    /// The instance registry.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// The instance with the given static id, if loaded.
    pub fn instance(&self, static_id: &str) -> Option<&Instance> {
        self.registry.instance(static_id)
    }

    /// The model's default instance: the first declared one, if loaded.
    pub fn default_instance(&self) -> Option<&Instance> {
        self.registry.default_instance()
    }

    /// The runtime bind tree, present after the first rebuild of a model
    /// with binds.
    pub fn binds(&self) -> Option<&BindTree> {
        self.bind_tree.as_ref()
    }

    /// The deferred action flags.
    pub fn deferred(&self) -> &DeferredActionContext {
        &self.deferred
    }

    /// Whether any of the three data phases is owed.
    pub fn needs_rebuild_recalculate_revalidate(&self) -> bool {
        self.deferred.any()
    }

    /// The value of a top-level model variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.top_level_variables.get(name)
    }

    /// The default evaluation context captured by the last variable reset.
    pub fn default_evaluation_context(&self) -> &BindingContext {
        &self.default_context
    }

    /// Whether schemas were loaded for this model.
    pub fn has_schema(&self) -> bool {
        self.has_schema
    }

    /// Models accept no externally-originated events.
    pub fn allows_external_event(&self, _event: &LifecycleEvent) -> bool {
        false
    }

    // --- Event dispatch -------------------------------------------------

    /// Dispatch an event to this model: listeners run first and may
    /// intercept; otherwise the event's default action runs.
    pub fn dispatch_event(
        &mut self,
        event: LifecycleEvent,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        tracing::debug!(
            target: "horizon_trellis::model",
            model = %self.effective_id,
            event = event.name(),
            "dispatching event"
        );
        if host.listeners.notify(&self.effective_id, &event) == EventDisposition::Intercept {
            return Ok(());
        }
        self.perform_default_action(event, host)
    }

    fn perform_default_action(
        &mut self,
        event: LifecycleEvent,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        match event {
            LifecycleEvent::ModelConstruct { run_rrr } => self.do_model_construct(run_rrr, host),
            LifecycleEvent::ModelConstructDone => Ok(()),
            LifecycleEvent::Ready => Ok(()),
            LifecycleEvent::Rebuild => self.do_rebuild(host),
            LifecycleEvent::Recalculate { apply_defaults } => {
                self.do_recalculate(apply_defaults, host)
            }
            LifecycleEvent::Revalidate => self.do_revalidate(host),
            LifecycleEvent::Refresh => self.do_refresh(host),
            LifecycleEvent::Reset => self.do_reset(host),
            LifecycleEvent::LinkException { url, reason } => {
                // Fatal unless a listener intercepted the event.
                Err(TrellisError::link_failure(url.unwrap_or_default(), reason))
            }
            LifecycleEvent::LinkError { url, reason } => {
                tracing::warn!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    url,
                    reason,
                    "link error"
                );
                Ok(())
            }
            LifecycleEvent::ExpressionError { reason } => {
                tracing::warn!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    reason,
                    "expression error"
                );
                Ok(())
            }
            LifecycleEvent::BindingError { location, reason } => {
                tracing::warn!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    location = location.as_deref().unwrap_or(""),
                    reason,
                    "binding error"
                );
                Ok(())
            }
            LifecycleEvent::ActionError { reason } => {
                tracing::warn!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    reason,
                    "action error"
                );
                Ok(())
            }
            LifecycleEvent::InstanceValid { .. } | LifecycleEvent::InstanceInvalid { .. } => {
                Ok(())
            }
        }
    }

    // --- Construction ---------------------------------------------------

    fn do_model_construct(&mut self, run_rrr: bool, host: &mut ModelHost<'_>) -> Result<()> {
        // 1. Schemas. A failure is a non-fatal link error; the model
        //    continues without schema validation.
        self.load_schemas_if_needed(host)?;

        // 2. Instances, in declaration order. A failure on one instance is
        //    a non-fatal link error for that instance; the rest still load.
        let definition = self.definition.clone();
        for def in definition.instances() {
            if self.registry.instance(def.static_id()).is_some() {
                // Already set, e.g. restored from persisted state.
                continue;
            }
            self.load_initial_instance(def, host)?;
        }

        // 3. Everything the model owns is owed.
        self.deferred.mark_structural_change(host.refresh);

        if run_rrr {
            self.do_rebuild(host)?;
            self.do_recalculate(false, host)?;
            self.do_revalidate(host)?;
        }
        Ok(())
    }

    fn load_schemas_if_needed(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        if self.schema_loaded {
            return Ok(());
        }
        self.schema_loaded = true;
        match host.schema.load_schemas(&self.definition) {
            Ok(()) => {
                self.has_schema = host.schema.has_schema();
                Ok(())
            }
            Err(error) => {
                let url = error.url.clone();
                let reason = error.to_string();
                self.dispatch_event(LifecycleEvent::LinkError { url, reason }, host)
            }
        }
    }

    fn load_initial_instance(
        &mut self,
        def: &InstanceDefinition,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        tracing::debug!(
            target: "horizon_trellis::model",
            model = %self.effective_id,
            instance = def.static_id(),
            "loading instance"
        );
        match def.content() {
            InstanceContent::Inline(text) => match xml::parse(text) {
                Ok(tree) => self.index_instance(Instance::new(
                    def.static_id(),
                    tree,
                    def.read_only(),
                    def.schema_validation(),
                    None,
                )),
                Err(error) => self.dispatch_event(
                    LifecycleEvent::LinkError {
                        url: String::new(),
                        reason: format!(
                            "Error extracting or setting inline content for instance '{}': {error}",
                            def.static_id()
                        ),
                    },
                    host,
                ),
            },
            InstanceContent::External { source } => self.load_external_instance(def, source, host),
            InstanceContent::Missing => self.dispatch_event(
                LifecycleEvent::LinkError {
                    url: String::new(),
                    reason: format!(
                        "Required external source or inline content for instance '{}'",
                        def.static_id()
                    ),
                },
                host,
            ),
        }
    }

    fn load_external_instance(
        &mut self,
        def: &InstanceDefinition,
        source: &str,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        let resolved = match resolve_service_url(self.definition.base_url(), source) {
            Ok(url) => url,
            Err(error) => {
                return self.dispatch_event(
                    LifecycleEvent::LinkError {
                        url: source.to_string(),
                        reason: error.to_string(),
                    },
                    host,
                );
            }
        };

        let loaded = if def.cache() {
            // Cache-eligible: identity is the resolved URL plus the
            // request-relevant parameters. The cache serializes the fetch.
            let caching =
                InstanceCaching::new(resolved.as_str(), def.cache_parameters().to_vec());
            host.cache
                .find_content_or_load(&caching, host.loader, false)
                .map(|shared| {
                    if def.read_only() {
                        Instance::shared(
                            def.static_id(),
                            shared,
                            def.schema_validation(),
                            Some(caching),
                        )
                    } else {
                        // A mutable view of cached content gets its own
                        // copy; the cached tree itself stays immutable.
                        Instance::new(
                            def.static_id(),
                            shared.duplicate(),
                            false,
                            def.schema_validation(),
                            Some(caching),
                        )
                    }
                })
        } else {
            let fetched = match host.resolver {
                Some(resolver) => resolver.read(resolved.as_str(), def.read_only()),
                None => host.loader.load(resolved.as_str(), false, def.read_only()),
            };
            fetched.map(|tree| {
                Instance::new(
                    def.static_id(),
                    tree,
                    def.read_only(),
                    def.schema_validation(),
                    None,
                )
            })
        };

        match loaded {
            Ok(instance) => self.index_instance(instance),
            Err(error) => self.dispatch_event(
                LifecycleEvent::LinkError {
                    url: resolved.to_string(),
                    reason: error.to_string(),
                },
                host,
            ),
        }
    }

    /// Insert an instance at its declared slot, replacing any previous
    /// occupant.
    pub fn index_instance(&mut self, instance: Instance) -> Result<()> {
        self.registry.index_instance(instance).map_err(|rejected| {
            TrellisError::unknown_instance(rejected.static_id(), &self.effective_id)
        })
    }

    // --- Variables ------------------------------------------------------

    /// Reset the binding-context stack to this model and re-evaluate its
    /// top-level variables.
    pub fn reset_and_evaluate_variables(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        let definition = self.definition.clone();
        let default_root = self.registry.default_instance().map(|i| i.root_ref());
        let mut errors = Vec::new();

        let context = {
            let info = ModelContextInfo {
                effective_id: &self.effective_id,
                default_root,
                variables: definition.variables(),
            };
            let evaluator = host.evaluator;
            host.context_stack
                .reset_binding_context(&info, &self.registry, evaluator, &mut errors)
        };

        self.top_level_variables = context.variables.clone();
        self.default_context = context;

        for error in errors {
            self.dispatch_event(
                LifecycleEvent::ExpressionError {
                    reason: error.to_string(),
                },
                host,
            )?;
        }
        Ok(())
    }

    fn has_instances_and_binds(&self) -> bool {
        self.registry.has_declared() && self.definition.has_binds()
    }

    // --- The three data phases ------------------------------------------

    /// Rebuild the bind tree against the current instance data, if owed.
    pub fn do_rebuild(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        if self.deferred.rebuild() {
            tracing::debug!(
                target: "horizon_trellis::model",
                model = %self.effective_id,
                "performing rebuild"
            );
            self.reset_and_evaluate_variables(host)?;

            if self.has_instances_and_binds() {
                let definition = self.definition.clone();
                let mut errors = Vec::new();
                let tree = BindTree::rebuild(
                    definition.binds(),
                    &self.registry,
                    host.evaluator,
                    &self.default_context,
                    &mut errors,
                );
                self.bind_tree = Some(tree);
                for error in errors {
                    self.dispatch_event(
                        LifecycleEvent::ExpressionError {
                            reason: error.to_string(),
                        },
                        host,
                    )?;
                }
                // Controls may reference binds, so the UI must re-resolve.
                host.refresh.require_refresh();
            }

            // Directly invoked phases always take immediate effect and
            // clear their own flag.
            self.deferred.clear_rebuild();
        }

        host.dependencies.rebuild_done(&self.effective_id);
        Ok(())
    }

    /// Apply calculation binds, if owed. With `apply_defaults`,
    /// initial-value expressions run too (first construction only).
    pub fn do_recalculate(&mut self, apply_defaults: bool, host: &mut ModelHost<'_>) -> Result<()> {
        if self.deferred.recalculate() {
            tracing::debug!(
                target: "horizon_trellis::model",
                model = %self.effective_id,
                apply_defaults,
                "performing recalculate"
            );
            let has_variables = !self.definition.variables().is_empty();
            if self.has_instances_and_binds() || has_variables {
                self.reset_and_evaluate_variables(host)?;
            }
            if self.has_instances_and_binds() {
                self.apply_calculate_binds(apply_defaults, host)?;
            }
            self.deferred.clear_recalculate();
        }

        host.dependencies.recalculate_done(&self.effective_id);
        Ok(())
    }

    fn apply_calculate_binds(
        &mut self,
        apply_defaults: bool,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        let definition = self.definition.clone();
        let mut errors = Vec::new();
        let updates = match &self.bind_tree {
            Some(tree) => tree.collect_calculates(
                definition.binds(),
                &self.registry,
                host.evaluator,
                &self.top_level_variables,
                apply_defaults,
                &mut errors,
            ),
            None => Vec::new(),
        };

        for update in updates {
            let applied = match self.registry.tree_mut(update.node.tree) {
                Some(tree) => tree.set_value(update.node.node, update.value).is_ok(),
                None => false,
            };
            if applied {
                // A calculation result is a value change, but must not
                // re-request recalculation.
                self.mark_value_change(Some(update.node), true, host);
            } else {
                tracing::warn!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    "calculation target is read-only or gone, skipping"
                );
            }
        }

        for error in errors {
            self.dispatch_event(
                LifecycleEvent::ExpressionError {
                    reason: error.to_string(),
                },
                host,
            )?;
        }
        Ok(())
    }

    /// Re-apply only the computed-expression (calculation) binds.
    ///
    /// Used when restoring persisted state: restored values are already
    /// correct and must not be overwritten by a full recalculation, and
    /// initial values must not be re-applied.
    pub fn apply_computed_expression_binds(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        self.apply_calculate_binds(false, host)
    }

    /// Re-validate instances, if owed, and notify validity flips.
    pub fn do_revalidate(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        let mut invalid: HashSet<String> = HashSet::new();
        let mut ran = false;

        if self.deferred.revalidate() {
            let must_bind_validate = self.definition.has_validation_binds();
            // Validation being idempotent, nothing to do without instances
            // or without any validation rule.
            if self.registry.has_declared() && (must_bind_validate || self.has_schema) {
                tracing::debug!(
                    target: "horizon_trellis::model",
                    model = %self.effective_id,
                    "performing revalidate"
                );

                // Clear schema validation state, scoped to instances that
                // opt into schema validation: clearing is linear in tree
                // size and the others cannot have schema state.
                if self.has_schema {
                    for instance in self.registry.instances_mut() {
                        if instance.schema_validation() {
                            if let Some(tree) = instance.tree_mut() {
                                tree.clear_schema_state();
                            }
                        }
                    }
                }
                if must_bind_validate {
                    for instance in self.registry.instances_mut() {
                        if let Some(tree) = instance.tree_mut() {
                            tree.clear_bind_state();
                        }
                    }
                }

                // Schema validation per instance. Read-only instances are
                // not schema-validated.
                if self.has_schema {
                    for instance in self.registry.instances() {
                        if instance.schema_validation()
                            && !host.schema.validate_instance(instance)
                        {
                            invalid.insert(instance.effective_id(&self.effective_id));
                        }
                    }
                }

                if must_bind_validate {
                    self.apply_validation_binds(&mut invalid, host)?;
                }

                ran = true;
            }

            self.deferred.clear_revalidate();
        }

        host.dependencies.revalidate_done(&self.effective_id);

        if ran {
            // At most one event per instance, and only on a validity flip —
            // re-announcing an unchanged verdict would only churn the UI.
            let model_effective_id = self.effective_id.clone();
            let mut events = Vec::new();
            for instance in self.registry.instances_mut() {
                let effective_id = instance.effective_id(&model_effective_id);
                let currently_valid = !invalid.contains(&effective_id);
                if instance.is_valid() != currently_valid {
                    instance.set_valid(currently_valid);
                    events.push(if currently_valid {
                        LifecycleEvent::InstanceValid {
                            instance: effective_id,
                        }
                    } else {
                        LifecycleEvent::InstanceInvalid {
                            instance: effective_id,
                        }
                    });
                }
            }
            for event in events {
                self.dispatch_event(event, host)?;
            }
        }
        Ok(())
    }

    fn apply_validation_binds(
        &mut self,
        invalid: &mut HashSet<String>,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        let definition = self.definition.clone();
        let mut errors = Vec::new();
        let failures = match &self.bind_tree {
            Some(tree) => tree.collect_validation_failures(
                definition.binds(),
                &self.registry,
                host.evaluator,
                &self.top_level_variables,
                &mut errors,
            ),
            None => Vec::new(),
        };

        for node in failures {
            if let Some(instance) = self.registry.instance_for_node(node) {
                invalid.insert(instance.effective_id(&self.effective_id));
            }
            if let Some(tree) = self.registry.tree_mut(node.tree) {
                tree.mark_bind_invalid(node.node);
            }
        }

        for error in errors {
            self.dispatch_event(
                LifecycleEvent::ExpressionError {
                    reason: error.to_string(),
                },
                host,
            )?;
        }
        Ok(())
    }

    // --- Refresh and reset ----------------------------------------------

    fn do_refresh(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        // Without the refresh requirement there is nothing to synchronize;
        // running the pipeline alone would not update the UI.
        if host.refresh.refresh_required() {
            host.refresh.synchronize_and_refresh();
        }
        Ok(())
    }

    fn do_reset(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        // The four phases go through the public event channel, one event
        // each, so listeners observe every step.
        self.dispatch_event(LifecycleEvent::Rebuild, host)?;
        self.dispatch_event(
            LifecycleEvent::Recalculate {
                apply_defaults: false,
            },
            host,
        )?;
        self.dispatch_event(LifecycleEvent::Revalidate, host)?;
        self.dispatch_event(LifecycleEvent::Refresh, host)
    }

    // --- Mutation entry points ------------------------------------------

    /// Record a value-only mutation: revalidation (and, outside
    /// calculation, recalculation) become owed and the dependency tracker
    /// learns which node changed.
    pub fn mark_value_change(
        &mut self,
        node: Option<NodeRef>,
        is_calculate: bool,
        host: &mut ModelHost<'_>,
    ) {
        self.deferred.mark_value_change(is_calculate, host.refresh);
        if let Some(node) = node {
            host.dependencies.mark_value_changed(&self.effective_id, node);
        }
    }

    /// Record a structural mutation: all three phases become owed.
    pub fn mark_structural_change(&mut self, instance: Option<&str>, host: &mut ModelHost<'_>) {
        self.deferred.mark_structural_change(host.refresh);
        host.dependencies
            .mark_structural_change(&self.effective_id, instance);
    }

    /// Set a node's value on behalf of an action and record the value
    /// change.
    pub fn set_node_value(
        &mut self,
        node: NodeRef,
        value: &str,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        let instance_id = match self.registry.instance_for_node(node) {
            Some(instance) => instance.static_id().to_string(),
            None => {
                return Err(TrellisError::ForeignNode {
                    model: self.effective_id.clone(),
                });
            }
        };
        let Some(tree) = self.registry.tree_mut(node.tree) else {
            return Err(TrellisError::InstanceReadOnly { id: instance_id });
        };
        tree.set_value(node.node, value)?;
        self.mark_value_change(Some(node), false, host);
        Ok(())
    }

    /// Dispatch the owed phases as public events, in rebuild → recalculate
    /// → revalidate order. Flags are left to clear themselves inside the
    /// phases, keeping event order stable even when handlers raise new
    /// obligations mid-drain.
    pub fn rebuild_recalculate_revalidate_if_needed(
        &mut self,
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        if self.deferred.rebuild() {
            self.dispatch_event(LifecycleEvent::Rebuild, host)?;
        }
        if self.deferred.recalculate() {
            self.dispatch_event(
                LifecycleEvent::Recalculate {
                    apply_defaults: false,
                },
                host,
            )?;
        }
        if self.deferred.revalidate() {
            self.dispatch_event(LifecycleEvent::Revalidate, host)?;
        }
        Ok(())
    }

    // --- Persisted state ------------------------------------------------

    /// Restore the model after its object was recreated from persisted
    /// state: re-derive schema state, force rebuild and revalidation, and
    /// re-apply only the computed-expression binds — restored values are
    /// already correct and a full recalculation would overwrite them.
    pub fn restore_state(&mut self, host: &mut ModelHost<'_>) -> Result<()> {
        self.load_schemas_if_needed(host)?;

        self.deferred.request_rebuild();
        self.deferred.request_revalidate();

        self.do_rebuild(host)?;
        if self.definition.has_binds() {
            self.apply_computed_expression_binds(host)?;
        }
        self.do_revalidate(host)
    }

    /// Restore the instances persisted for this model. Declared instances
    /// not present in the states fall back to their inline content (the
    /// unreplaced read-only inline case).
    pub fn restore_instances(
        &mut self,
        states: &[InstanceState],
        host: &mut ModelHost<'_>,
    ) -> Result<()> {
        let definition = self.definition.clone();
        let effective_id = self.effective_id.clone();

        for state in states
            .iter()
            .filter(|s| s.model_effective_id == effective_id)
        {
            tracing::debug!(
                target: "horizon_trellis::model",
                model = %self.effective_id,
                instance = state.static_id,
                "restoring instance from persisted state"
            );
            match self.instance_from_state(state, &definition, host) {
                Ok(instance) => self.index_instance(instance)?,
                Err(reason) => {
                    self.dispatch_event(
                        LifecycleEvent::LinkError {
                            url: String::new(),
                            reason,
                        },
                        host,
                    )?;
                }
            }
        }

        for def in definition.instances() {
            if self.registry.instance(def.static_id()).is_none() {
                if let InstanceContent::Inline(_) = def.content() {
                    self.load_initial_instance(def, host)?;
                }
            }
        }
        Ok(())
    }

    fn instance_from_state(
        &mut self,
        state: &InstanceState,
        definition: &ModelDefinition,
        host: &mut ModelHost<'_>,
    ) -> std::result::Result<Instance, String> {
        let schema_validation = definition
            .instance(&state.static_id)
            .map(|def| def.schema_validation())
            .unwrap_or(true);

        let mut instance = match &state.caching {
            Some(caching) => {
                let shared = host
                    .cache
                    .find_content_or_load(caching, host.loader, false)
                    .map_err(|e| e.to_string())?;
                if state.read_only {
                    Instance::shared(
                        &state.static_id,
                        shared,
                        schema_validation,
                        Some(caching.clone()),
                    )
                } else {
                    Instance::new(
                        &state.static_id,
                        shared.duplicate(),
                        false,
                        schema_validation,
                        Some(caching.clone()),
                    )
                }
            }
            None => {
                let tree = xml::parse(&state.document).map_err(|e| e.to_string())?;
                Instance::new(
                    &state.static_id,
                    tree,
                    state.read_only,
                    schema_validation,
                    None,
                )
            }
        };
        instance.set_valid(state.valid);
        Ok(instance)
    }

    /// Project every loaded instance into its persisted form.
    pub fn instance_states(&self) -> Vec<InstanceState> {
        self.registry
            .instances()
            .map(|i| i.to_state(&self.effective_id))
            .collect()
    }

    // --- Resolution -----------------------------------------------------

    /// Look up a runtime object by effective id. The candidate must live in
    /// this model's scope: its prefix must equal the model's scope prefix
    /// and its suffix must match the model's own.
    pub fn object_by_effective_id(&self, effective_id: &str) -> Result<Option<ResolvedObject<'_>>> {
        if self.definition.scope_prefix() != ident::prefix(effective_id)
            || ident::suffix(&self.effective_id) != ident::suffix(effective_id)
        {
            return Ok(None);
        }
        self.resolve_object_by_id(None, ident::static_id_of(effective_id), None)
    }

    /// Resolve a static id to a runtime object of this model.
    ///
    /// The search order — self, instances, submissions, actions, binds —
    /// carries resolution precedence and must not be reordered. The target
    /// must be a static id; effective or absolute ids are a programming
    /// error and abort loudly.
    pub fn resolve_object_by_id(
        &self,
        _source_effective_id: Option<&str>,
        target_static_id: &str,
        context_item: Option<NodeRef>,
    ) -> Result<Option<ResolvedObject<'_>>> {
        if ident::is_effective_id(target_static_id) || ident::is_absolute_id(target_static_id) {
            return Err(TrellisError::target_not_static(target_static_id));
        }

        if target_static_id == self.definition.static_id() {
            return Ok(Some(ResolvedObject::Model));
        }
        if let Some(instance) = self.registry.instance(target_static_id) {
            return Ok(Some(ResolvedObject::Instance(instance)));
        }
        if let Some(submission) = self.submissions.get(target_static_id) {
            return Ok(Some(ResolvedObject::Submission(submission)));
        }
        if let Some(action) = self.actions.get(target_static_id) {
            return Ok(Some(ResolvedObject::Action(action)));
        }
        if let Some(binds) = &self.bind_tree {
            if let Some(bind) = binds.resolve_bind(target_static_id, context_item) {
                return Ok(Some(ResolvedObject::Bind(bind)));
            }
        }
        Ok(None)
    }
}
