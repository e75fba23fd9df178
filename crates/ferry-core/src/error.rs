use thiserror::Error;

#[derive(Debug, Error)]
pub enum FerryError {
    // Graph construction
    #[error("Graph validation failed: {0}")]
    GraphValidation(#[from] GraphValidationError),

    // Executor errors
    #[error("Executor failed: {executor}: {message}")]
    Executor { executor: String, message: String },

    #[error("Executor {executor} expected {expected} but received {found}")]
    MessageType {
        executor: String,
        expected: String,
        found: String,
    },

    #[error("Workflow run cancelled")]
    Cancelled,

    #[error("Internal engine error: {0}")]
    Internal(String),

    // Collaborator errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FerryError {
    /// Shorthand for an executor-level failure.
    pub fn executor(executor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Executor {
            executor: executor.into(),
            message: message.into(),
        }
    }
}

/// A workflow graph that cannot be built. Always names the offending
/// executor or edge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("duplicate executor id '{0}'")]
    DuplicateExecutor(String),

    #[error("edge {from} -> {to} references unregistered executor '{missing}'")]
    UnknownEdgeEndpoint {
        from: String,
        to: String,
        missing: String,
    },

    #[error("output designation references unregistered executor '{0}'")]
    UnknownOutput(String),

    #[error("edge {from} -> {to}: '{from}' produces {produced} but '{to}' accepts {accepted}")]
    TypeMismatch {
        from: String,
        to: String,
        produced: String,
        accepted: String,
    },

    #[error("edge {from} -> {to}: predicate inspects {expected} but '{from}' produces {produced}")]
    PredicateType {
        from: String,
        to: String,
        expected: String,
        produced: String,
    },

    #[error("executor '{executor}' is unreachable from start executor '{start}'")]
    Unreachable { executor: String, start: String },
}

pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_offender() {
        let err = GraphValidationError::TypeMismatch {
            from: "a".into(),
            to: "b".into(),
            produced: "u32".into(),
            accepted: "alloc::string::String".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a -> b"));
        assert!(msg.contains("u32"));
    }

    #[test]
    fn validation_error_converts() {
        let err: FerryError = GraphValidationError::DuplicateExecutor("x".into()).into();
        assert!(matches!(err, FerryError::GraphValidation(_)));
        assert_eq!(
            err.to_string(),
            "Graph validation failed: duplicate executor id 'x'"
        );
    }

    #[test]
    fn executor_shorthand() {
        let err = FerryError::executor("upper", "boom");
        assert_eq!(err.to_string(), "Executor failed: upper: boom");
    }
}
