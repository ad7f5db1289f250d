//! Lifecycle events consumed and emitted by form models.
//!
//! Events are a closed set of tagged variants matched exhaustively by the
//! model's default-action dispatch, so adding a lifecycle event is a
//! compile-time-checked exercise rather than a string comparison.
//!
//! Most variants are *consumed* events delivered by the containing document
//! (construction, the four pipeline phases, reset, and the non-fatal error
//! channels). [`LifecycleEvent::InstanceValid`] and
//! [`LifecycleEvent::InstanceInvalid`] are *derived* notifications emitted
//! by the revalidation phase when an instance's validity flips.

/// Events dispatched to a form model.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Construct the model: load schemas and instances, then mark a
    /// structural change. When `run_rrr` is set, the rebuild, recalculate,
    /// and revalidate phases run synchronously afterwards.
    ModelConstruct {
        /// Whether to run the three data phases immediately.
        run_rrr: bool,
    },

    /// Construction of all models has finished.
    ModelConstructDone,

    /// The containing document has dispatched readiness to all models.
    Ready,

    /// Run the rebuild phase if it is owed.
    Rebuild,

    /// Run the recalculate phase if it is owed.
    Recalculate {
        /// Whether initial-value expressions are applied in addition to
        /// calculations. Used on first construction only.
        apply_defaults: bool,
    },

    /// Run the revalidate phase if it is owed.
    Revalidate,

    /// Ask the containing document to refresh the UI if required.
    Refresh,

    /// Dispatch Rebuild, Recalculate, Revalidate, and Refresh in sequence
    /// through the public event channel.
    Reset,

    /// A resource failed to load. The default action treats this as fatal
    /// unless a listener intercepts the event.
    LinkException {
        /// The resource that failed to load, when known.
        url: Option<String>,
        /// Failure description.
        reason: String,
    },

    /// A resource failed to load; non-fatal, processing continues.
    LinkError {
        /// The resource that failed to load.
        url: String,
        /// Failure description.
        reason: String,
    },

    /// A path expression failed to evaluate; non-fatal, the evaluation
    /// produced an empty result.
    ExpressionError {
        /// Failure description.
        reason: String,
    },

    /// A binding could not be established; non-fatal.
    BindingError {
        /// Location of the offending binding, when known.
        location: Option<String>,
        /// Failure description.
        reason: String,
    },

    /// An action body raised an error; non-fatal at the model boundary.
    ActionError {
        /// Failure description.
        reason: String,
    },

    /// An instance transitioned from invalid to valid.
    InstanceValid {
        /// Effective id of the instance.
        instance: String,
    },

    /// An instance transitioned from valid to invalid.
    InstanceInvalid {
        /// Effective id of the instance.
        instance: String,
    },
}

impl LifecycleEvent {
    /// The stable name of this event, for logging and listener filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModelConstruct { .. } => "model-construct",
            Self::ModelConstructDone => "model-construct-done",
            Self::Ready => "ready",
            Self::Rebuild => "rebuild",
            Self::Recalculate { .. } => "recalculate",
            Self::Revalidate => "revalidate",
            Self::Refresh => "refresh",
            Self::Reset => "reset",
            Self::LinkException { .. } => "link-exception",
            Self::LinkError { .. } => "link-error",
            Self::ExpressionError { .. } => "expression-error",
            Self::BindingError { .. } => "binding-error",
            Self::ActionError { .. } => "action-error",
            Self::InstanceValid { .. } => "instance-valid",
            Self::InstanceInvalid { .. } => "instance-invalid",
        }
    }

    /// Whether this event reports a failure (as opposed to driving the
    /// lifecycle forward).
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::LinkException { .. }
                | Self::LinkError { .. }
                | Self::ExpressionError { .. }
                | Self::BindingError { .. }
                | Self::ActionError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::Rebuild.name(), "rebuild");
        assert_eq!(
            LifecycleEvent::ModelConstruct { run_rrr: true }.name(),
            "model-construct"
        );
        assert_eq!(
            LifecycleEvent::InstanceInvalid {
                instance: "i".into()
            }
            .name(),
            "instance-invalid"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(
            LifecycleEvent::ExpressionError {
                reason: "x".into()
            }
            .is_error()
        );
        assert!(!LifecycleEvent::Refresh.is_error());
    }
}
