//! Error types for the Forgeline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; callers convert into their
//! own errors at the seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Bounded context errors ---

/// Failures reported by a generation backend through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Credits, rate limits, or token allowance exhausted.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The prompt plus context does not fit the backend's window.
    #[error("Prompt too large: {0}")]
    PromptTooLarge(String),

    /// Network or availability failure.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider failed: {0}")]
    Unknown(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Terminal failure kinds carried by `GenerationResult::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    QuotaExceeded,
    PromptTooLarge,
    Unavailable,
    ProviderFailed,
    /// The backend answered with an error payload instead of content.
    BackendError,
    EmptyOutput,
    MalformedOutput,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::PromptTooLarge => "prompt_too_large",
            Self::Unavailable => "unavailable",
            Self::ProviderFailed => "provider_failed",
            Self::BackendError => "backend_error",
            Self::EmptyOutput => "empty_output",
            Self::MalformedOutput => "malformed_output",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the failure came from decoding rather than from the gateway.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendError | Self::EmptyOutput | Self::MalformedOutput
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ProviderError> for FailureKind {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::QuotaExceeded(_) => Self::QuotaExceeded,
            ProviderError::PromptTooLarge(_) => Self::PromptTooLarge,
            ProviderError::Unavailable(_) => Self::Unavailable,
            ProviderError::Unknown(_) | ProviderError::NotConfigured(_) => Self::ProviderFailed,
        }
    }
}

/// Submissions rejected before any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a generation is already in flight")]
    Busy,

    #[error("empty prompt with no attachments or images")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    #[error("cannot set entry to '{0}': no such file in project")]
    EntryNotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}
