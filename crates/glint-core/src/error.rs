use crate::state::LifecycleState;

/// Every failure the runtime can surface.
///
/// Configuration problems (bad bindings, unknown names) are reported when a
/// template is rendered. Hook failures abort the running transaction and are
/// handed back to whoever started the render or flush.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot access the element of `{component}` while it is {state}")]
    IllegalElementAccess {
        component: String,
        state: LifecycleState,
    },

    #[error("nothing handled the action `{action}` (sent from {origin})")]
    UnhandledAction { action: String, origin: String },

    #[error("cannot {operation} on destroyed object {object}")]
    DestroyedObject { object: String, operation: String },

    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    #[error("write to {target} after its owner was torn down")]
    StaleWrite { target: String },

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("`{hook}` of `{component}` failed: {message}")]
    Hook {
        component: String,
        hook: String,
        message: String,
    },
}

impl Error {
    pub fn assertion(msg: impl Into<String>) -> Self {
        Error::Assertion(msg.into())
    }

    pub fn destroyed(object: impl Into<String>, operation: impl Into<String>) -> Self {
        Error::DestroyedObject {
            object: object.into(),
            operation: operation.into(),
        }
    }

    /// Failure raised by user code (hooks, actions, event handlers).
    pub fn hook(
        component: impl Into<String>,
        hook: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Hook {
            component: component.into(),
            hook: hook.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

