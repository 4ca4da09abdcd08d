//! In-process session store. Useful for the CLI and for tests; nothing is
//! persisted across runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgeline_core::error::StoreError;
use forgeline_core::message::{ImageBlob, Message, Role};
use forgeline_core::mode::Mode;
use forgeline_core::provider::ProviderId;
use forgeline_core::session::{SessionId, SessionStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Metadata and transcript for one session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub mode: Mode,
    pub provider: ProviderId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, session: &SessionId) -> Option<SessionRecord> {
        self.sessions.read().await.get(session).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        user_id: &str,
        mode: Mode,
        provider: &ProviderId,
        title: &str,
    ) -> Result<SessionId, StoreError> {
        let id = SessionId::new();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            mode,
            provider: provider.clone(),
            title: title.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        };
        self.sessions.write().await.insert(id.clone(), record);
        tracing::debug!(session = %id, user_id, %mode, "Session created");
        Ok(id)
    }

    async fn save_message(
        &self,
        session: &SessionId,
        role: Role,
        content: &str,
        code: Option<&str>,
        images: &[ImageBlob],
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session)
            .ok_or_else(|| StoreError::SessionNotFound(session.to_string()))?;

        let id = record.messages.last().map_or(1, |m| m.id + 1);
        let mut message = match role {
            Role::User => Message::user(id, content),
            Role::Assistant => Message::assistant(id, content),
        }
        .with_images(images.to_vec());
        if let Some(code) = code {
            message = message.with_code(code);
        }
        record.messages.push(message);
        Ok(())
    }

    async fn session_messages(&self, session: &SessionId) -> Result<Vec<Message>, StoreError> {
        self.sessions
            .read()
            .await
            .get(session)
            .map(|r| r.messages.clone())
            .ok_or_else(|| StoreError::SessionNotFound(session.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_save_messages() {
        let store = InMemorySessionStore::new();
        let provider = ProviderId::new("openrouter");
        let id = store
            .create_session("local", Mode::Builder, &provider, "landing page")
            .await
            .unwrap();

        store
            .save_message(&id, Role::User, "make a landing page", None, &[])
            .await
            .unwrap();
        store
            .save_message(&id, Role::Assistant, "done", Some("<html></html>"), &[])
            .await
            .unwrap();

        let messages = store.session_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 1);
        assert_eq!(messages[1].id, 2);
        assert_eq!(messages[1].code.as_deref(), Some("<html></html>"));

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.title, "landing page");
        assert_eq!(record.mode, Mode::Builder);
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let store = InMemorySessionStore::new();
        let missing = SessionId::new();
        let err = store
            .save_message(&missing, Role::User, "hi", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
        assert!(store.session_messages(&missing).await.is_err());
    }
}
