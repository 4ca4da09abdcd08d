//! Shared test doubles for engine tests.

use async_trait::async_trait;
use forgeline_core::error::{ProviderError, StoreError};
use forgeline_core::provider::{GenerationRequest, ProviderGateway, ProviderId, RawBackendResult};
use forgeline_core::session::{SessionId, UsageTracker};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A gateway that replays scripted outcomes and records every request.
///
/// Panics if called more times than it has outcomes.
pub struct ScriptedGateway {
    id: ProviderId,
    outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new(id: &str, outcomes: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            id: ProviderId::new(id),
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering (tokio time, so paused clocks auto-advance).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn generate(&self, request: GenerationRequest) -> Result<RawBackendResult, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedGateway {}: no outcome for call #{call}", self.id));
        outcome.map(|text| RawBackendResult {
            text,
            provider: self.id.clone(),
            model: Some("scripted".into()),
        })
    }
}

/// Usage tracker with a fixed quota answer that counts recorded usage.
pub struct FixedUsage {
    exceeded: bool,
    recorded: Mutex<Vec<String>>,
}

impl FixedUsage {
    pub fn new(exceeded: bool) -> Self {
        Self {
            exceeded,
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageTracker for FixedUsage {
    async fn is_quota_exceeded(&self) -> bool {
        self.exceeded
    }

    async fn record_usage(&self, _session: &SessionId, provider: &ProviderId) -> Result<(), StoreError> {
        self.recorded.lock().unwrap().push(provider.to_string());
        Ok(())
    }
}
