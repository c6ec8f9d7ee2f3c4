//! Error taxonomy for the RAG core.

use std::future::Future;

use thiserror::Error;
use tracing::warn;

/// Errors surfaced by chunking, indexing, retrieval, and generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid chunking or retrieval configuration. Raised before any work
    /// is done, so nothing is ever partially applied.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument was rejected (empty query, `k == 0`).
    /// Raised before any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding or completion provider could not be reached or failed.
    #[error("Upstream unavailable ({provider}): {message}")]
    UpstreamUnavailable {
        /// Provider that failed (e.g. `"openai"`).
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The assembled prompt exceeds the provider's limit even with every
    /// context chunk removed.
    #[error("Context too large: prompt needs {prompt_tokens} tokens, limit is {limit}")]
    ContextTooLarge {
        /// Size of the smallest prompt that could be built.
        prompt_tokens: usize,
        /// The configured or provider-reported limit (0 if unknown).
        limit: usize,
    },

    /// The vector index backend failed.
    #[error("Vector index error ({backend}): {message}")]
    Index {
        /// Backend that failed (e.g. `"sqlite"`).
        backend: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Shorthand for an [`RagError::UpstreamUnavailable`].
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::UpstreamUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an [`RagError::Index`].
    pub fn index(backend: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::Index {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error is an upstream failure eligible for one retry.
    pub fn is_upstream(&self) -> bool {
        matches!(self, RagError::UpstreamUnavailable { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Run `op`, and run it once more immediately if it fails with
/// [`RagError::UpstreamUnavailable`]. No backoff, no retained state.
pub async fn retry_once<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if e.is_upstream() => {
            warn!(operation = what, error = %e, "upstream call failed, retrying once");
            op().await
        }
        other => other,
    }
}
