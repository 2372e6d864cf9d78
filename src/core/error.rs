//! Error taxonomy shared by the completion adapter and the request boundary.

/// Failure of a single completion call. Every stage maps this to its own fallback.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// No completion provider is configured.
    #[error("completion service unavailable")]
    Unavailable,

    /// The call itself failed: transport, HTTP status, rate limiting, timeout.
    #[error("{stage} call failed: {source}")]
    CallFailed {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The service answered but the answer was unusable.
    #[error("{stage} returned malformed output: {reason}")]
    Malformed { stage: &'static str, reason: String },
}

impl CompletionError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CompletionError::Unavailable)
    }
}

/// Rejections at the inbound request boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Story request is required")]
    EmptyRequest,

    #[error("Mode must be \"fast\", \"balanced\", or \"best\" (got \"{0}\")")]
    UnknownMode(String),
}
