//! Error types shared by every layer of the renderer.

/// Errors surfaced by the reactive core, the managers and the renderer.
///
/// Resolution misses are not errors: lookups return `Ok(None)` and the
/// caller renders nothing.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A write was attempted through a reference that only supports reads.
    #[error("cannot update a reference that is not updatable ({0})")]
    NotUpdatable(String),

    /// Invalid API usage detected at runtime.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A manager was handed state or a bucket created by another manager.
    #[error("manager `{manager}` received foreign state (expected {expected})")]
    ManagerMismatch {
        manager: &'static str,
        expected: &'static str,
    },

    /// The owner registers a name that collides with a built-in.
    #[error("you attempted to overwrite the built-in {kind} `{name}` which is not allowed")]
    BuiltinRedefined { kind: &'static str, name: String },

    /// A renderer kept invalidating itself past the configured loop limit.
    #[error("infinite rendering invalidation detected (loop limit {limit})")]
    InfiniteRevalidation { limit: u32 },

    /// An operation was attempted on a destroyed renderer or root.
    #[error("cannot {0} on a destroyed renderer")]
    Destroyed(&'static str),

    /// A user lifecycle hook, helper or action failed.
    #[error("{hook} failed: {message}")]
    Hook { hook: String, message: String },

    /// Environment options could not be parsed.
    #[error("invalid environment options: {0}")]
    Config(#[from] serde_json::Error),
}

impl RenderError {
    /// Convenience constructor for failures raised from user code.
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_limit_message_names_the_failure() {
        let err = RenderError::InfiniteRevalidation { limit: 10 };
        assert!(err.to_string().contains("infinite rendering invalidation detected"));
    }

    #[test]
    fn config_errors_convert_from_serde() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("nope");
        let err: RenderError = parse.unwrap_err().into();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
