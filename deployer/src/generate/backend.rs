//! Completion backend interface

use async_trait::async_trait;

use crate::errors::GenerationError;
use crate::generate::prompt::Prompt;

/// A single request/response call to an LLM-style completion API.
///
/// Implementations map transport failures and 5xx to `BackendUnavailable`,
/// 4xx to `BackendRejected`, and an unusable response envelope to
/// `ResponseMalformed`. They never retry.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Return the raw text the model produced
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}
