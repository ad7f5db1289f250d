//! Static form-model definitions.
//!
//! A [`ModelDefinition`] is the immutable, shared description of a model:
//! which instances it declares and where their content comes from, its bind
//! tree, submissions, actions, top-level variables, and schema references.
//! One definition serves every runtime [`Model`](crate::Model) projected
//! from it.
//!
//! Parsing form markup into these structures is the job of an upstream
//! layer; here they are built programmatically.

use url::Url;

use crate::validation::DataType;

/// Where an instance's initial content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceContent {
    /// Inline XML text embedded in the form definition.
    Inline(String),
    /// External content fetched from a source URL (possibly relative to the
    /// definition's base URL).
    External {
        /// The source URL.
        source: String,
    },
    /// No source at all. Loading reports a link error for the instance.
    Missing,
}

/// Static description of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDefinition {
    static_id: String,
    content: InstanceContent,
    read_only: bool,
    cache: bool,
    schema_validation: bool,
    cache_parameters: Vec<(String, String)>,
}

impl InstanceDefinition {
    /// An instance with inline XML content.
    pub fn inline(static_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_content(static_id, InstanceContent::Inline(content.into()))
    }

    /// An instance loaded from an external source.
    pub fn external(static_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_content(
            static_id,
            InstanceContent::External {
                source: source.into(),
            },
        )
    }

    /// An instance with no content source.
    pub fn missing(static_id: impl Into<String>) -> Self {
        Self::with_content(static_id, InstanceContent::Missing)
    }

    fn with_content(static_id: impl Into<String>, content: InstanceContent) -> Self {
        Self {
            static_id: static_id.into(),
            content,
            read_only: false,
            cache: false,
            schema_validation: true,
            cache_parameters: Vec::new(),
        }
    }

    /// Mark the instance read-only.
    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Allow the instance to be served from the shared instance cache.
    pub fn with_cache(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Exclude the instance from schema validation.
    pub fn without_schema_validation(mut self) -> Self {
        self.schema_validation = false;
        self
    }

    /// Add a request-relevant parameter to the instance's cache identity.
    pub fn with_cache_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.cache_parameters.push((name.into(), value.into()));
        self
    }

    /// The instance's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The instance's content source.
    pub fn content(&self) -> &InstanceContent {
        &self.content
    }

    /// Whether the instance is read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the instance may be served from the shared cache.
    pub fn cache(&self) -> bool {
        self.cache
    }

    /// Whether the instance participates in schema validation.
    pub fn schema_validation(&self) -> bool {
        self.schema_validation
    }

    /// Request-relevant parameters contributing to the cache identity.
    pub fn cache_parameters(&self) -> &[(String, String)] {
        &self.cache_parameters
    }
}

/// Static description of one bind: a node-set expression plus the rules
/// attached to its nodes. Binds nest; child binds evaluate relative to each
/// node of the parent's node-set.
#[derive(Debug, Clone, PartialEq)]
pub struct BindDefinition {
    static_id: String,
    nodeset: String,
    calculate: Option<String>,
    initial_value: Option<String>,
    required: Option<String>,
    constraint: Option<String>,
    data_type: Option<DataType>,
    children: Vec<BindDefinition>,
}

impl BindDefinition {
    /// A bind over the given node-set expression.
    pub fn new(static_id: impl Into<String>, nodeset: impl Into<String>) -> Self {
        Self {
            static_id: static_id.into(),
            nodeset: nodeset.into(),
            calculate: None,
            initial_value: None,
            required: None,
            constraint: None,
            data_type: None,
            children: Vec::new(),
        }
    }

    /// Set a calculation expression: the node's value is recomputed from it
    /// on every recalculation.
    pub fn with_calculate(mut self, expression: impl Into<String>) -> Self {
        self.calculate = Some(expression.into());
        self
    }

    /// Set an initial-value expression, applied only when defaults are
    /// requested (first construction).
    pub fn with_initial_value(mut self, expression: impl Into<String>) -> Self {
        self.initial_value = Some(expression.into());
        self
    }

    /// Set a requiredness expression.
    pub fn with_required(mut self, expression: impl Into<String>) -> Self {
        self.required = Some(expression.into());
        self
    }

    /// Set a constraint expression that must evaluate to true.
    pub fn with_constraint(mut self, expression: impl Into<String>) -> Self {
        self.constraint = Some(expression.into());
        self
    }

    /// Set the datatype of the bound nodes.
    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Add a nested bind.
    pub fn with_child(mut self, child: BindDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// The bind's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The node-set expression.
    pub fn nodeset(&self) -> &str {
        &self.nodeset
    }

    /// The calculation expression, if any.
    pub fn calculate(&self) -> Option<&str> {
        self.calculate.as_deref()
    }

    /// The initial-value expression, if any.
    pub fn initial_value(&self) -> Option<&str> {
        self.initial_value.as_deref()
    }

    /// The requiredness expression, if any.
    pub fn required(&self) -> Option<&str> {
        self.required.as_deref()
    }

    /// The constraint expression, if any.
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// The datatype, if any.
    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    /// Nested binds.
    pub fn children(&self) -> &[BindDefinition] {
        &self.children
    }

    /// Whether this bind or any nested bind declares a validation rule.
    pub fn has_validation(&self) -> bool {
        self.required.is_some()
            || self.constraint.is_some()
            || self.data_type.is_some()
            || self.children.iter().any(BindDefinition::has_validation)
    }
}

/// Static description of one submission. Submission processing itself lives
/// outside the engine; the definition exists so submissions take part in
/// object resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDefinition {
    static_id: String,
    resource: String,
    method: String,
}

impl SubmissionDefinition {
    /// A submission targeting the given resource.
    pub fn new(static_id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            static_id: static_id.into(),
            resource: resource.into(),
            method: "get".to_string(),
        }
    }

    /// Set the submission method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
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

/// Which object an action handler observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionObserver {
    /// The model itself.
    Model,
    /// A submission of the model, by static id.
    Submission(String),
}

/// Static description of one action handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDefinition {
    static_id: String,
    observer: ActionObserver,
}

impl ActionDefinition {
    /// An action observing the model.
    pub fn new(static_id: impl Into<String>) -> Self {
        Self {
            static_id: static_id.into(),
            observer: ActionObserver::Model,
        }
    }

    /// An action observing one of the model's submissions.
    pub fn observing_submission(
        static_id: impl Into<String>,
        submission: impl Into<String>,
    ) -> Self {
        Self {
            static_id: static_id.into(),
            observer: ActionObserver::Submission(submission.into()),
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

/// Static description of one top-level model variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    name: String,
    expression: String,
}

impl VariableDefinition {
    /// A variable computed from the given expression.
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// The variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variable's expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// The static, immutable description of one form model.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    static_id: String,
    scope_prefix: String,
    base_url: Option<Url>,
    instances: Vec<InstanceDefinition>,
    binds: Vec<BindDefinition>,
    submissions: Vec<SubmissionDefinition>,
    actions: Vec<ActionDefinition>,
    variables: Vec<VariableDefinition>,
    schema_uris: Vec<String>,
}

impl ModelDefinition {
    /// A top-level model definition with the given static id.
    pub fn new(static_id: impl Into<String>) -> Self {
        Self {
            static_id: static_id.into(),
            scope_prefix: String::new(),
            base_url: None,
            instances: Vec::new(),
            binds: Vec::new(),
            submissions: Vec::new(),
            actions: Vec::new(),
            variables: Vec::new(),
            schema_uris: Vec::new(),
        }
    }

    /// Set the component-nesting prefix of the scope the model lives in,
    /// e.g. `"foo$bar$"`. Empty for top-level models.
    pub fn with_scope_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scope_prefix = prefix.into();
        self
    }

    /// Set the base URL external instance sources resolve against.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Declare an instance. Declaration order is significant: the first
    /// instance is the model's default instance.
    pub fn with_instance(mut self, instance: InstanceDefinition) -> Self {
        self.instances.push(instance);
        self
    }

    /// Declare a top-level bind. Declaration order is the calculation
    /// order.
    pub fn with_bind(mut self, bind: BindDefinition) -> Self {
        self.binds.push(bind);
        self
    }

    /// Declare a submission.
    pub fn with_submission(mut self, submission: SubmissionDefinition) -> Self {
        self.submissions.push(submission);
        self
    }

    /// Declare an action handler.
    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    /// Declare a top-level variable. Declaration order is the evaluation
    /// order.
    pub fn with_variable(mut self, variable: VariableDefinition) -> Self {
        self.variables.push(variable);
        self
    }

    /// Declare a schema reference.
    pub fn with_schema_uri(mut self, uri: impl Into<String>) -> Self {
        self.schema_uris.push(uri.into());
        self
    }

    /// The model's static id.
    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    /// The model's prefixed id: scope prefix plus static id.
    pub fn prefixed_id(&self) -> String {
        format!("{}{}", self.scope_prefix, self.static_id)
    }

    /// The component-nesting prefix of the model's scope.
    pub fn scope_prefix(&self) -> &str {
        &self.scope_prefix
    }

    /// The base URL external instance sources resolve against.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Declared instances, in declaration order.
    pub fn instances(&self) -> &[InstanceDefinition] {
        &self.instances
    }

    /// Look up an instance declaration by static id.
    pub fn instance(&self, static_id: &str) -> Option<&InstanceDefinition> {
        self.instances.iter().find(|i| i.static_id == static_id)
    }

    /// Top-level binds, in declaration order.
    pub fn binds(&self) -> &[BindDefinition] {
        &self.binds
    }

    /// Declared submissions.
    pub fn submissions(&self) -> &[SubmissionDefinition] {
        &self.submissions
    }

    /// Declared action handlers.
    pub fn actions(&self) -> &[ActionDefinition] {
        &self.actions
    }

    /// Top-level variables, in declaration order.
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Declared schema references.
    pub fn schema_uris(&self) -> &[String] {
        &self.schema_uris
    }

    /// Whether the model declares any binds.
    pub fn has_binds(&self) -> bool {
        !self.binds.is_empty()
    }

    /// Whether any bind declares a validation rule.
    pub fn has_validation_binds(&self) -> bool {
        self.binds.iter().any(BindDefinition::has_validation)
    }
}
