//! Persistence and usage collaborator traits.
//!
//! The orchestrator calls these at well-defined points (on submit, on result)
//! but does not define their storage format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::message::{ImageBlob, Message, Role};
use crate::mode::Mode;
use crate::provider::ProviderId;

/// Unique identifier for a persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session and message persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        user_id: &str,
        mode: Mode,
        provider: &ProviderId,
        title: &str,
    ) -> std::result::Result<SessionId, StoreError>;

    async fn save_message(
        &self,
        session: &SessionId,
        role: Role,
        content: &str,
        code: Option<&str>,
        images: &[ImageBlob],
    ) -> std::result::Result<(), StoreError>;

    async fn session_messages(
        &self,
        session: &SessionId,
    ) -> std::result::Result<Vec<Message>, StoreError>;
}

/// Usage accounting and quota checks.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn is_quota_exceeded(&self) -> bool;

    async fn record_usage(
        &self,
        session: &SessionId,
        provider: &ProviderId,
    ) -> std::result::Result<(), StoreError>;
}
