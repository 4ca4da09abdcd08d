//! The provider gateway trait, the only boundary to generation backends.
//!
//! A gateway takes an immutable `GenerationRequest` and returns the backend's
//! raw text, or a `ProviderError` classified into the quota / size /
//! availability taxonomy the orchestrator's fallback chain understands.
//!
//! Implementations: OpenAI-compatible HTTP endpoints, scripted test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ImageBlob, Message};
use crate::mode::{ExpectedShape, Mode};

/// Identifier of an interchangeable generation backend (e.g. "openrouter").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An immutable request handed to a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The effective prompt for this turn.
    pub prompt: String,

    /// Prior turns, already truncated to the provider's budget.
    pub history: Vec<Message>,

    pub mode: Mode,

    pub provider: ProviderId,

    /// Mode-specific instructions prepended by the orchestrator.
    pub system_prompt: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageBlob>,

    /// Target framework for builder output ("html", "react", ...).
    pub framework_hint: String,

    /// Ask the backend for extended reasoning.
    #[serde(default)]
    pub reasoning: bool,

    /// Summary of the existing project, produced by the exploration step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_context: Option<String>,

    /// The prompt asks for an image rather than text or code.
    #[serde(default)]
    pub image_request: bool,

    pub expected_shape: ExpectedShape,
}

impl GenerationRequest {
    /// Same request retargeted at another provider with a different history.
    pub fn retarget(&self, provider: ProviderId, history: Vec<Message>) -> Self {
        Self {
            provider,
            history,
            ..self.clone()
        }
    }
}

/// Raw text returned by a backend, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBackendResult {
    pub text: String,

    /// Which provider actually produced the text.
    pub provider: ProviderId,

    /// Which model answered, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The core gateway trait.
///
/// The orchestrator calls `generate()` without knowing which backend sits
/// behind it. Timeout policy, if any, belongs to the implementation.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// The provider this gateway talks to.
    fn id(&self) -> &ProviderId;

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<RawBackendResult, ProviderError>;

    /// Can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
