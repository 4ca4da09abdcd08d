//! The generation orchestrator.
//!
//! Coordinates one submission at a time: classify, (explore), request through
//! the fallback chain, decode, then update memory, the project and its
//! version history. Every state move is published on the event bus.

pub mod exploration;
pub mod failure;
pub mod state;

pub use exploration::{ExplorationResult, Explorer, deterministic_summary, fallback_summary};
pub use state::{GenerationState, InvalidTransition, Signal, transition};

use chrono::Utc;
use forgeline_config::AppConfig;
use forgeline_core::error::{FailureKind, ProviderError, StoreError, SubmitError};
use forgeline_core::event::{DomainEvent, EventBus};
use forgeline_core::message::{Attachment, ImageBlob, Message, Role};
use forgeline_core::mode::{ExpectedShape, Mode};
use forgeline_core::project::FileType;
use forgeline_core::provider::{GenerationRequest, ProviderId, RawBackendResult};
use forgeline_core::result::GenerationResult;
use forgeline_core::session::{SessionId, SessionStore, UsageTracker};
use forgeline_providers::fallback::{FallbackChain, Strategy};
use forgeline_providers::router::{GatewayRouter, build_chain};
use forgeline_store::files::VirtualFileManager;
use forgeline_store::versions::{InMemoryVersionStore, VersionId, VersionStore};
use futures::future::{AbortHandle, abortable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::context::{CharRatioEstimator, ConversationMemory, TokenBudget, TokenEstimator, truncate};
use crate::decoder::decode;
use crate::intent::{IntentContext, classify_with};
use crate::prompts;
use failure::{build_log_line, failure_message};

/// Where single-file builder output is written.
const SINGLE_FILE_ENTRY: &str = "index.html";

/// Characters of the first prompt used as the session title.
const TITLE_CHARS: usize = 60;

/// One user submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitInput {
    pub text: String,
    /// Skip classification and use this mode.
    pub mode: Option<Mode>,
    /// Primary provider for this submission; defaults to the configured one.
    pub provider: Option<ProviderId>,
    pub attachments: Vec<Attachment>,
    pub images: Vec<ImageBlob>,
}

impl SubmitInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(ProviderId::new(provider));
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageBlob>) -> Self {
        self.images = images;
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty() && self.images.is_empty()
    }
}

/// The outcome of a submission.
#[derive(Debug, Clone)]
pub struct Generation {
    pub mode: Mode,
    pub effective_prompt: String,
    /// Provider that produced the result; differs from the requested one
    /// after a fallback.
    pub provider: Option<ProviderId>,
    /// Escalations taken.
    pub hops: usize,
    pub result: GenerationResult,
    /// Final state: `Success` or `Failed`.
    pub state: GenerationState,
    /// Version saved for a builder result.
    pub version: Option<VersionId>,
    /// Build log lines.
    pub log: Vec<String>,
}

/// State machine plus build log for a single submission.
struct Run<'a> {
    state: GenerationState,
    events: &'a EventBus,
    log: Vec<String>,
}

impl<'a> Run<'a> {
    fn new(events: &'a EventBus) -> Self {
        Self {
            state: GenerationState::Idle,
            events,
            log: Vec::new(),
        }
    }

    fn advance(&mut self, signal: Signal) {
        match transition(&self.state, &signal) {
            Ok(next) => {
                debug!(from = %self.state, to = %next, "Generation state changed");
                self.events.publish(DomainEvent::StateChanged {
                    from: self.state.to_string(),
                    to: next.to_string(),
                    timestamp: Utc::now(),
                });
                self.state = next;
            }
            Err(e) => error!(error = %e, "Rejected generation state transition"),
        }
    }

    fn note(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }
}

enum Outcome {
    Raw { raw: RawBackendResult, hops: usize },
    Failed { error: ProviderError, hops: usize },
    Cancelled,
}

/// Resets the in-flight flag when the submission ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator {
    config: AppConfig,
    router: Arc<GatewayRouter>,
    estimator: Arc<dyn TokenEstimator>,
    memory: Arc<Mutex<ConversationMemory>>,
    files: Arc<Mutex<VirtualFileManager>>,
    versions: Arc<dyn VersionStore>,
    sessions: Option<Arc<dyn SessionStore>>,
    usage: Option<Arc<dyn UsageTracker>>,
    events: Arc<EventBus>,
    session: Mutex<Option<SessionId>>,
    last_mode: Mutex<Option<Mode>>,
    in_flight: AtomicBool,
    abort: std::sync::Mutex<Option<AbortHandle>>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, router: GatewayRouter) -> Self {
        let memory = ConversationMemory::from_config(&config.memory);
        Self {
            config,
            router: Arc::new(router),
            estimator: Arc::new(CharRatioEstimator::default()),
            memory: Arc::new(Mutex::new(memory)),
            files: Arc::new(Mutex::new(VirtualFileManager::new())),
            versions: Arc::new(InMemoryVersionStore::new()),
            sessions: None,
            usage: None,
            events: Arc::new(EventBus::default()),
            session: Mutex::new(None),
            last_mode: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            abort: std::sync::Mutex::new(None),
        }
    }

    pub fn with_version_store(mut self, versions: Arc<dyn VersionStore>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_usage_tracker(mut self, usage: Arc<dyn UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = Arc::new(Mutex::new(memory));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &GatewayRouter {
        &self.router
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn memory(&self) -> Arc<Mutex<ConversationMemory>> {
        Arc::clone(&self.memory)
    }

    pub fn files(&self) -> Arc<Mutex<VirtualFileManager>> {
        Arc::clone(&self.files)
    }

    pub fn versions(&self) -> Arc<dyn VersionStore> {
        Arc::clone(&self.versions)
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.session.lock().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Abort the submission in flight, if any, while it is still exploring
    /// the project or waiting on the gateway.
    ///
    /// Has no effect once the backend has answered: decoding and applying
    /// the result always run to completion.
    pub fn cancel(&self) -> bool {
        let handle = match self.abort.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                info!("Cancelling in-flight generation");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Replace the project with a saved version.
    pub async fn restore_version(&self, id: VersionId) -> Result<bool, StoreError> {
        let Some(version) = self.versions.get(id).await? else {
            return Ok(false);
        };
        let count = version.files.len();
        let mut files = self.files.lock().await;
        files.replace_all(version.files, version.entry_path.as_deref());
        info!(version = id, files = count, "Restored project version");
        self.events.publish(DomainEvent::FilesApplied {
            count,
            entry_path: files.entry().map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    /// Run one submission to a result.
    ///
    /// Rejected without any backend call when the input is empty or another
    /// submission is still in flight. Every other outcome, failures
    /// included, comes back as a `Generation`.
    pub async fn submit(&self, input: SubmitInput) -> Result<Generation, SubmitError> {
        if input.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("Submission rejected: a generation is already in flight");
            return Err(SubmitError::Busy);
        };

        let mut run = Run::new(&self.events);
        run.advance(Signal::Submit);

        let ctx = IntentContext {
            override_mode: input.mode,
            builder_active: *self.last_mode.lock().await == Some(Mode::Builder),
            has_generated_output: !self.files.lock().await.is_empty(),
        };
        let classification = classify_with(&input.text, &ctx);
        let mode = classification.mode;
        info!(%mode, image_request = classification.image_request, "Submission classified");
        run.note(format!("classified as {mode}"));

        if mode == Mode::Canvas
            && classification.effective_prompt.is_empty()
            && input.images.is_empty()
            && input.attachments.is_empty()
        {
            run.advance(Signal::NothingToGenerate);
            return Ok(Generation {
                mode,
                effective_prompt: String::new(),
                provider: None,
                hops: 0,
                result: GenerationResult::CanvasReady,
                state: run.state,
                version: None,
                log: run.log,
            });
        }

        let primary = self.select_primary(&input, &mut run).await;
        let chain = build_chain(&self.config, &primary);
        let framework = self.config.orchestrator.framework.clone();
        let shape = ExpectedShape::for_mode(mode, &framework);

        let turn_text = if classification.effective_prompt.is_empty() {
            prompts::default_prompt(mode, !input.images.is_empty()).to_string()
        } else {
            classification.effective_prompt.clone()
        };
        let history = self.memory.lock().await.snapshot();
        let session = self.persist_user_turn(mode, &primary, &turn_text, &input.images).await;

        // Exploration and the gateway attempts are cancelled as one unit
        let mut hops = 0;
        let (work, handle) = abortable(async {
            let project_context = if mode == Mode::Builder {
                self.explore(&chain, &mut run).await
            } else {
                None
            };
            let base = GenerationRequest {
                prompt: fold_attachments(&turn_text, &input.attachments),
                history: Vec::new(),
                mode,
                provider: primary.clone(),
                system_prompt: prompts::system_prompt(mode, shape, &framework, classification.image_request),
                images: input.images.clone(),
                framework_hint: framework.clone(),
                reasoning: self.config.orchestrator.reasoning,
                project_context,
                image_request: classification.image_request,
                expected_shape: shape,
            };
            self.request(&chain, &base, &history, &mut run, &mut hops).await
        });
        self.set_abort(Some(handle));
        let outcome = work.await.unwrap_or(Outcome::Cancelled);
        self.set_abort(None);

        let (result, provider, hops) = match outcome {
            Outcome::Raw { raw, hops } => {
                run.advance(Signal::Received);
                let decoded = decode(&raw.text, shape);
                run.advance(Signal::Decoded {
                    failure: decoded.failure_kind(),
                });
                (decoded, Some(raw.provider), hops)
            }
            Outcome::Failed { error, hops } => {
                let kind = FailureKind::from(&error);
                run.advance(Signal::Abort(kind));
                (GenerationResult::error(kind, error.to_string()), None, hops)
            }
            Outcome::Cancelled => {
                run.advance(Signal::Abort(FailureKind::Cancelled));
                (
                    GenerationResult::error(FailureKind::Cancelled, "cancelled before the backend answered"),
                    None,
                    hops,
                )
            }
        };

        if let GenerationResult::Error { kind, message } = result {
            let worded = failure_message(mode, kind, &message);
            if mode == Mode::Builder {
                run.note(build_log_line(kind, hops, &message));
            }
            warn!(%mode, %kind, hops, error = %message, "Generation failed");
            self.events.publish(DomainEvent::GenerationFailed {
                mode,
                kind,
                message: message.clone(),
                timestamp: Utc::now(),
            });
            return Ok(Generation {
                mode,
                effective_prompt: classification.effective_prompt,
                provider,
                hops,
                result: GenerationResult::error(kind, worded),
                state: run.state,
                version: None,
                log: run.log,
            });
        }

        self.remember(&turn_text, &input, &result).await;
        let version = if mode == Mode::Builder {
            self.apply(&result, &turn_text, &mut run).await
        } else {
            None
        };
        let provider_id = provider.clone().unwrap_or(primary);
        self.persist_assistant_turn(session.as_ref(), &result, &provider_id).await;
        *self.last_mode.lock().await = Some(mode);

        info!(%mode, provider = %provider_id, hops, "Generation completed");
        self.events.publish(DomainEvent::GenerationCompleted {
            mode,
            provider: provider_id.to_string(),
            escalations: hops,
            timestamp: Utc::now(),
        });

        Ok(Generation {
            mode,
            effective_prompt: classification.effective_prompt,
            provider,
            hops,
            result,
            state: run.state,
            version,
            log: run.log,
        })
    }

    /// The requested provider, or the fallback provider when the usage quota
    /// is exhausted. Gates memory accordingly.
    async fn select_primary(&self, input: &SubmitInput, run: &mut Run<'_>) -> ProviderId {
        let requested = input
            .provider
            .clone()
            .unwrap_or_else(|| ProviderId::new(&self.config.default_provider));
        let exceeded = match &self.usage {
            Some(usage) => usage.is_quota_exceeded().await,
            None => false,
        };

        let mut memory = self.memory.lock().await;
        if !exceeded {
            memory.set_tokens_available(true);
            return requested;
        }

        let fallback = ProviderId::new(&self.config.orchestrator.fallback_provider);
        if memory.set_tokens_available(false) {
            self.events.publish(DomainEvent::MemoryReset {
                reason: "usage quota exhausted".into(),
                timestamp: Utc::now(),
            });
        }
        warn!(requested = %requested, fallback = %fallback, "Usage quota exhausted, starting on fallback provider");
        run.note(format!("quota exhausted: degraded mode on {fallback}"));
        fallback
    }

    async fn explore(&self, chain: &FallbackChain, run: &mut Run<'_>) -> Option<String> {
        let (files, entry) = {
            let vfm = self.files.lock().await;
            if vfm.is_empty() {
                return None;
            }
            (vfm.all_files(), vfm.entry().map(str::to_string))
        };

        run.advance(Signal::Explore);
        run.note(format!("exploring project ({} files)", files.len()));
        let explorer = Explorer {
            router: &self.router,
            chain,
            multi_step: self.config.orchestrator.multi_step,
            timeout: Duration::from_secs(self.config.orchestrator.exploration_timeout_secs),
        };
        let result = explorer.explore(&files, entry.as_deref()).await;
        if result.fell_back {
            run.note("exploration fell back to the file list");
        }
        Some(result.summary)
    }

    /// Drive the fallback chain for the main request, counting escalations
    /// into `hop` as they happen.
    async fn request(
        &self,
        chain: &FallbackChain,
        base: &GenerationRequest,
        history: &[Message],
        run: &mut Run<'_>,
        hop: &mut usize,
    ) -> Outcome {
        let mut previous: Option<ProviderId> = None;

        let attempts = chain.run(|strategy, cause| {
            if let Some(err) = cause {
                *hop += 1;
                let from = previous.as_ref().map(ToString::to_string).unwrap_or_default();
                self.events.publish(DomainEvent::Escalated {
                    from_provider: from.clone(),
                    to_provider: strategy.provider.to_string(),
                    reason: err.to_string(),
                    hop: *hop,
                    timestamp: Utc::now(),
                });
                run.note(format!(
                    "{from} failed ({err}); escalating to {} [{}]",
                    strategy.provider,
                    strategy.kind.as_str()
                ));
            }
            previous = Some(strategy.provider.clone());
            run.advance(Signal::Attempt(strategy.clone()));

            let request = self.request_for(base, history, strategy);
            run.note(format!(
                "requesting {} (budget {}, {} history messages)",
                strategy.provider,
                strategy.total_budget,
                request.history.len()
            ));
            let gateway = self.router.get(&strategy.provider);
            async move {
                match gateway {
                    Some(gateway) => gateway.generate(request).await,
                    None => Err(ProviderError::NotConfigured(format!(
                        "no gateway registered for '{}'",
                        request.provider
                    ))),
                }
            }
        });

        match attempts.await {
            Ok(success) => Outcome::Raw {
                raw: success.value,
                hops: success.hops,
            },
            Err(failure) => Outcome::Failed {
                error: failure.error,
                hops: failure.hops,
            },
        }
    }

    /// The base request with history truncated to `strategy`'s budget.
    fn request_for(
        &self,
        base: &GenerationRequest,
        history: &[Message],
        strategy: &Strategy,
    ) -> GenerationRequest {
        let budget = TokenBudget::new(
            strategy.total_budget,
            strategy.system_reserve,
            self.estimator.estimate(&base.prompt),
        );
        let trimmed = truncate(history, &budget, self.estimator.as_ref());
        debug!(
            provider = %strategy.provider,
            available = budget.available(),
            kept = trimmed.len(),
            of = history.len(),
            "History truncated to budget"
        );
        base.retarget(strategy.provider.clone(), trimmed)
    }

    fn set_abort(&self, handle: Option<AbortHandle>) {
        if let Ok(mut slot) = self.abort.lock() {
            *slot = handle;
        }
    }

    /// Append the user and assistant turns to memory.
    async fn remember(&self, turn_text: &str, input: &SubmitInput, result: &GenerationResult) {
        let mut memory = self.memory.lock().await;
        let user_id = memory.next_id();
        memory.append(
            Message::user(user_id, turn_text)
                .with_attachments(input.attachments.clone())
                .with_images(input.images.clone()),
        );
        let assistant_id = memory.next_id();
        let mut assistant = Message::assistant(assistant_id, result.display_text());
        if let Some(code) = result.code() {
            assistant = assistant.with_code(code);
        }
        memory.append(assistant);
    }

    /// Write a builder result into the project and snapshot it.
    async fn apply(&self, result: &GenerationResult, message: &str, run: &mut Run<'_>) -> Option<VersionId> {
        let (files, entry) = {
            let mut vfm = self.files.lock().await;
            let (count, entry) = match result {
                GenerationResult::SingleFile { content, .. } => {
                    vfm.add_file(SINGLE_FILE_ENTRY, content.clone(), FileType::Page);
                    (1, SINGLE_FILE_ENTRY.to_string())
                }
                GenerationResult::MultiFile { files, entry_path } => {
                    for file in files {
                        vfm.add_file(&file.path, file.content.clone(), file.file_type);
                    }
                    (files.len(), entry_path.clone())
                }
                _ => return None,
            };
            if let Err(e) = vfm.set_entry(&entry) {
                warn!(error = %e, "Generated entry file missing from project");
            }
            run.note(format!("applied {count} file(s), entry {entry}"));
            self.events.publish(DomainEvent::FilesApplied {
                count,
                entry_path: vfm.entry().map(str::to_string),
                timestamp: Utc::now(),
            });
            (vfm.all_files(), vfm.entry().map(str::to_string))
        };

        match self.versions.save_version(&files, entry.as_deref(), message).await {
            Ok(version) => {
                run.note(format!("saved version {}", version.id));
                self.events.publish(DomainEvent::VersionSaved {
                    version_id: version.id,
                    file_count: files.len(),
                    timestamp: Utc::now(),
                });
                Some(version.id)
            }
            Err(e) => {
                self.collaborator_error("save_version", &e);
                None
            }
        }
    }

    async fn persist_user_turn(
        &self,
        mode: Mode,
        provider: &ProviderId,
        text: &str,
        images: &[ImageBlob],
    ) -> Option<SessionId> {
        let store = self.sessions.as_ref()?;
        let session = {
            let mut current = self.session.lock().await;
            match current.as_ref() {
                Some(id) => id.clone(),
                None => {
                    let title: String = text.chars().take(TITLE_CHARS).collect();
                    match store
                        .create_session(&self.config.user_id, mode, provider, &title)
                        .await
                    {
                        Ok(id) => {
                            *current = Some(id.clone());
                            id
                        }
                        Err(e) => {
                            self.collaborator_error("create_session", &e);
                            return None;
                        }
                    }
                }
            }
        };
        if let Err(e) = store.save_message(&session, Role::User, text, None, images).await {
            self.collaborator_error("save_message", &e);
        }
        Some(session)
    }

    async fn persist_assistant_turn(
        &self,
        session: Option<&SessionId>,
        result: &GenerationResult,
        provider: &ProviderId,
    ) {
        let Some(session) = session else {
            return;
        };
        if let Some(store) = &self.sessions {
            let code = result.code();
            if let Err(e) = store
                .save_message(session, Role::Assistant, &result.display_text(), code.as_deref(), &[])
                .await
            {
                self.collaborator_error("save_message", &e);
            }
        }
        if let Some(usage) = &self.usage
            && let Err(e) = usage.record_usage(session, provider).await
        {
            self.collaborator_error("record_usage", &e);
        }
    }

    fn collaborator_error(&self, context: &str, err: &StoreError) {
        warn!(context, error = %err, "Collaborator call failed; continuing");
        self.events.publish(DomainEvent::CollaboratorError {
            context: context.to_string(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// The prompt text with attachments inlined after it.
fn fold_attachments(text: &str, attachments: &[Attachment]) -> String {
    let mut prompt = text.to_string();
    for attachment in attachments {
        prompt.push_str(&format!(
            "\n\n[Attachment: {} ({})]\n{}",
            attachment.name, attachment.kind, attachment.content
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FixedUsage, ScriptedGateway};
    use forgeline_config::ProviderConfig;
    use forgeline_store::sessions::InMemorySessionStore;
    use tokio::sync::broadcast;

    const PAGE: &str = "Here you go:\n```html\n<!DOCTYPE html><html><body><h1>SaaS</h1></body></html>\n```";

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.default_provider = "primary".into();
        config.orchestrator.fallback_provider = "cheap".into();
        config.orchestrator.framework = "html".into();
        config
    }

    fn orchestrator_with(config: AppConfig, gateways: &[&Arc<ScriptedGateway>]) -> Orchestrator {
        let mut router = GatewayRouter::new(&config.default_provider);
        for gateway in gateways {
            router.register(Arc::clone(*gateway) as Arc<dyn forgeline_core::provider::ProviderGateway>);
        }
        Orchestrator::new(config, router)
    }

    fn gateway(id: &str, outcomes: Vec<Result<String, ProviderError>>) -> Arc<ScriptedGateway> {
        Arc::new(ScriptedGateway::new(id, outcomes))
    }

    fn drain(rx: &mut broadcast::Receiver<Arc<DomainEvent>>) -> Vec<Arc<DomainEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn tutor_answer_is_remembered() {
        let primary = gateway("primary", vec![Ok("Recursion is a function calling itself.".into())]);
        let orch = orchestrator_with(config(), &[&primary]);

        let generation = orch.submit(SubmitInput::new("explain how recursion works")).await.unwrap();

        assert_eq!(generation.mode, Mode::Tutor);
        assert_eq!(generation.state, GenerationState::Success);
        assert_eq!(generation.provider, Some(ProviderId::new("primary")));
        assert_eq!(generation.hops, 0);
        assert!(matches!(generation.result, GenerationResult::Text { .. }));

        let memory = orch.memory().lock().await.snapshot();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory[0].role, Role::User);
        assert_eq!(memory[1].content, "Recursion is a function calling itself.");
        assert!(memory[0].id < memory[1].id);
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn quota_on_primary_succeeds_on_fallback() {
        let primary = gateway("primary", vec![Err(ProviderError::QuotaExceeded("credits".into()))]);
        let cheap = gateway("cheap", vec![Ok("Here is the answer.".into())]);
        let orch = orchestrator_with(config(), &[&primary, &cheap]);
        let mut rx = orch.events().subscribe();

        let generation = orch.submit(SubmitInput::new("what is a monad?")).await.unwrap();

        assert!(!generation.result.is_error());
        assert_eq!(generation.provider, Some(ProviderId::new("cheap")));
        assert_ne!(generation.provider, Some(ProviderId::new("primary")));
        assert_eq!(generation.hops, 1);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(cheap.call_count(), 1);

        let escalated = drain(&mut rx)
            .into_iter()
            .any(|e| matches!(e.as_ref(), DomainEvent::Escalated { to_provider, .. } if to_provider == "cheap"));
        assert!(escalated);
    }

    #[tokio::test]
    async fn prompt_too_large_retries_with_less_history() {
        let mut cfg = config();
        cfg.providers.insert(
            "primary".into(),
            ProviderConfig {
                context_budget: 2_000,
                system_reserve: 100,
                ..ProviderConfig::default()
            },
        );
        let primary = gateway(
            "primary",
            vec![
                Err(ProviderError::PromptTooLarge("context length".into())),
                Ok("short answer".into()),
            ],
        );
        let orch = orchestrator_with(cfg, &[&primary]);
        {
            let memory = orch.memory();
            let mut memory = memory.lock().await;
            for _ in 0..10 {
                let id = memory.next_id();
                memory.append(Message::user(id, "x".repeat(400)));
            }
        }

        let generation = orch.submit(SubmitInput::new("and then?")).await.unwrap();

        assert_eq!(generation.provider, Some(ProviderId::new("primary")));
        assert_eq!(generation.hops, 1);
        let requests = primary.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].history.len(), 10);
        assert!(requests[1].history.len() < requests[0].history.len());
        assert!(generation.log.iter().any(|l| l.contains("retry_truncated")));
    }

    #[tokio::test]
    async fn unavailable_fails_without_fallback() {
        let primary = gateway("primary", vec![Err(ProviderError::Unavailable("connection refused".into()))]);
        let cheap = gateway("cheap", vec![]);
        let orch = orchestrator_with(config(), &[&primary, &cheap]);

        let generation = orch.submit(SubmitInput::new("explain closures")).await.unwrap();

        assert_eq!(
            generation.state,
            GenerationState::Failed {
                kind: FailureKind::Unavailable
            }
        );
        assert_eq!(cheap.call_count(), 0);
        match &generation.result {
            GenerationResult::Error { kind, message } => {
                assert_eq!(*kind, FailureKind::Unavailable);
                assert!(message.contains("What you can do:"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(orch.memory().lock().await.is_empty());
    }

    #[tokio::test]
    async fn decode_failure_is_not_retried() {
        let mut cfg = config();
        cfg.orchestrator.framework = "react".into();
        let primary = gateway("primary", vec![Ok("sorry, no JSON today".into())]);
        let orch = orchestrator_with(cfg, &[&primary]);

        let generation = orch
            .submit(SubmitInput::new("make it").with_mode(Mode::Builder))
            .await
            .unwrap();

        assert_eq!(generation.result.failure_kind(), Some(FailureKind::MalformedOutput));
        assert_eq!(primary.call_count(), 1);
        assert!(generation.log.iter().any(|l| l.starts_with("build failed")));
        match &generation.result {
            GenerationResult::Error { message, .. } => {
                assert!(message.starts_with("Generation failed [malformed_output]"))
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(orch.files().lock().await.is_empty());
        assert!(orch.versions().all_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn builder_page_is_applied_and_versioned() {
        let primary = gateway("primary", vec![Ok(PAGE.into())]);
        let orch = orchestrator_with(config(), &[&primary]);

        let generation = orch.submit(SubmitInput::new("buat landing page SaaS modern")).await.unwrap();

        assert_eq!(generation.mode, Mode::Builder);
        assert_eq!(generation.version, Some(1));
        {
            let files = orch.files();
            let files = files.lock().await;
            assert_eq!(files.entry(), Some("index.html"));
            assert!(files.get_file("index.html").unwrap().content.contains("<h1>SaaS</h1>"));
        }
        let versions = orch.versions().all_versions().await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].message, "buat landing page SaaS modern");

        let memory = orch.memory().lock().await.snapshot();
        assert!(memory[1].code.as_deref().unwrap_or_default().contains("<h1>SaaS</h1>"));
        assert_eq!(memory[1].content, "Here you go:");
    }

    #[tokio::test]
    async fn multi_file_project_is_applied_with_entry() {
        let mut cfg = config();
        cfg.orchestrator.framework = "react".into();
        let body = r#"{"files": [
            {"path": "index.html", "content": "<div id=\"root\"></div>", "fileType": "page"},
            {"path": "src/App.jsx", "content": "export default function App() {}", "fileType": "component"}
        ], "entryPath": "src/App.jsx"}"#;
        let primary = gateway("primary", vec![Ok(body.into())]);
        let orch = orchestrator_with(cfg, &[&primary]);

        let generation = orch.submit(SubmitInput::new("build a react todo app")).await.unwrap();

        assert!(matches!(generation.result, GenerationResult::MultiFile { .. }));
        let files = orch.files();
        let files = files.lock().await;
        assert_eq!(files.len(), 2);
        assert_eq!(files.entry(), Some("src/App.jsx"));
    }

    #[tokio::test]
    async fn exceeded_quota_starts_on_fallback_with_memory_gated() {
        let primary = gateway("primary", vec![]);
        let cheap = gateway("cheap", vec![Ok("degraded answer".into())]);
        let usage = Arc::new(FixedUsage::new(true));
        let orch = orchestrator_with(config(), &[&primary, &cheap]).with_usage_tracker(usage.clone());
        {
            let memory = orch.memory();
            let mut memory = memory.lock().await;
            let id = memory.next_id();
            memory.append(Message::user(id, "earlier question"));
        }

        let generation = orch.submit(SubmitInput::new("explain pointers")).await.unwrap();

        assert_eq!(generation.provider, Some(ProviderId::new("cheap")));
        assert_eq!(generation.hops, 0);
        assert_eq!(primary.call_count(), 0);
        assert!(cheap.requests()[0].history.is_empty());
        assert!(orch.memory().lock().await.is_empty());
    }

    #[tokio::test]
    async fn bare_canvas_trigger_makes_no_call() {
        let primary = gateway("primary", vec![]);
        let orch = orchestrator_with(config(), &[&primary]);

        let generation = orch.submit(SubmitInput::new("gambar")).await.unwrap();

        assert_eq!(generation.mode, Mode::Canvas);
        assert_eq!(generation.result, GenerationResult::CanvasReady);
        assert!(generation.effective_prompt.is_empty());
        assert_eq!(primary.call_count(), 0);
        assert_eq!(generation.state, GenerationState::Success);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let primary = gateway("primary", vec![]);
        let orch = orchestrator_with(config(), &[&primary]);

        let err = orch.submit(SubmitInput::new("   ")).await.unwrap_err();
        assert_eq!(err, SubmitError::EmptyInput);
        assert_eq!(primary.call_count(), 0);
    }

    #[tokio::test]
    async fn attachments_alone_are_a_valid_submission() {
        let primary = gateway("primary", vec![Ok("It is a shopping list.".into())]);
        let orch = orchestrator_with(config(), &[&primary]);

        let input = SubmitInput::new("")
            .with_attachments(vec![Attachment::new("document", "list.txt", "eggs, milk")]);
        let generation = orch.submit(input).await.unwrap();

        assert!(!generation.result.is_error());
        let request = primary.requests().remove(0);
        assert!(request.prompt.starts_with("Summarize the attached content."));
        assert!(request.prompt.contains("[Attachment: list.txt (document)]\neggs, milk"));
    }

    #[tokio::test]
    async fn second_submit_is_busy_and_cancel_aborts_the_first() {
        let primary = Arc::new(
            ScriptedGateway::new("primary", vec![Ok("late".into()), Ok("second".into())])
                .with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orchestrator_with(config(), &[&primary]));

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit(SubmitInput::new("explain tcp")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(orch.is_busy());
        let busy = orch.submit(SubmitInput::new("explain udp")).await.unwrap_err();
        assert_eq!(busy, SubmitError::Busy);

        assert!(orch.cancel());
        let generation = first.await.unwrap().unwrap();
        assert_eq!(generation.result.failure_kind(), Some(FailureKind::Cancelled));
        assert!(!orch.is_busy());
        assert!(!orch.cancel());
        assert!(orch.memory().lock().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_during_exploration_stops_before_the_request() {
        let mut cfg = config();
        cfg.orchestrator.multi_step = true;
        let primary = Arc::new(
            ScriptedGateway::new("primary", vec![Ok("A one-page site.".into()), Ok(PAGE.into())])
                .with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orchestrator_with(cfg, &[&primary]));
        {
            let files = orch.files();
            let mut files = files.lock().await;
            files.add_file("index.html", "<html><h1>Acme</h1></html>", FileType::Page);
            files.set_entry("index.html").unwrap();
        }

        let pending = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.submit(SubmitInput::new("add a contact form").with_mode(Mode::Builder))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(orch.cancel());
        let generation = pending.await.unwrap().unwrap();
        assert_eq!(
            generation.state,
            GenerationState::Failed {
                kind: FailureKind::Cancelled
            }
        );
        assert_eq!(primary.call_count(), 1);
        assert_eq!(generation.version, None);
        assert!(orch.versions().all_versions().await.unwrap().is_empty());
        assert!(generation.log.iter().any(|l| l.starts_with("exploring project")));
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn cancel_after_escalation_reports_hops_taken() {
        let primary = gateway("primary", vec![Err(ProviderError::QuotaExceeded("credits".into()))]);
        let cheap = Arc::new(
            ScriptedGateway::new("cheap", vec![Ok("late".into())]).with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orchestrator_with(config(), &[&primary, &cheap]));

        let pending = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit(SubmitInput::new("explain lifetimes")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(orch.cancel());
        let generation = pending.await.unwrap().unwrap();
        assert_eq!(generation.result.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(generation.hops, 1);
        assert_eq!(cheap.call_count(), 1);
    }

    #[tokio::test]
    async fn builder_on_existing_project_gets_exploration_context() {
        let primary = gateway("primary", vec![Ok(PAGE.into())]);
        let orch = orchestrator_with(config(), &[&primary]);
        {
            let files = orch.files();
            let mut files = files.lock().await;
            files.add_file("index.html", "<html><h1>Acme</h1></html>", FileType::Page);
            files.set_entry("index.html").unwrap();
        }

        let generation = orch
            .submit(SubmitInput::new("add a pricing table").with_mode(Mode::Builder))
            .await
            .unwrap();

        assert!(!generation.result.is_error());
        let context = primary.requests()[0].project_context.clone().unwrap();
        assert!(context.contains("index.html"));
        assert!(context.contains("Acme"));
        assert!(generation.log.iter().any(|l| l.starts_with("exploring project")));
    }

    #[tokio::test]
    async fn edit_after_build_stays_in_builder() {
        let primary = gateway("primary", vec![Ok(PAGE.into()), Ok(PAGE.into())]);
        let orch = orchestrator_with(config(), &[&primary]);

        orch.submit(SubmitInput::new("build a landing page")).await.unwrap();
        let edit = orch.submit(SubmitInput::new("change the title to Foo")).await.unwrap();

        assert_eq!(edit.mode, Mode::Builder);
        assert_eq!(edit.version, Some(2));
    }

    #[tokio::test]
    async fn session_and_usage_are_recorded() {
        let primary = gateway("primary", vec![Ok("answer one".into()), Ok("answer two".into())]);
        let sessions = Arc::new(InMemorySessionStore::new());
        let usage = Arc::new(FixedUsage::new(false));
        let orch = orchestrator_with(config(), &[&primary])
            .with_session_store(sessions.clone())
            .with_usage_tracker(usage.clone());

        orch.submit(SubmitInput::new("what is rust?")).await.unwrap();
        orch.submit(SubmitInput::new("and cargo?")).await.unwrap();

        assert_eq!(sessions.count().await, 1);
        let id = orch.session_id().await.unwrap();
        let messages = sessions.session_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "what is rust?");
        assert_eq!(sessions.get(&id).await.unwrap().title, "what is rust?");
        assert_eq!(usage.recorded(), vec!["primary".to_string(), "primary".to_string()]);
    }

    #[tokio::test]
    async fn restore_version_replaces_project() {
        let primary = gateway("primary", vec![Ok(PAGE.into())]);
        let orch = orchestrator_with(config(), &[&primary]);
        orch.submit(SubmitInput::new("build a landing page")).await.unwrap();

        orch.files().lock().await.add_file("extra.css", "body{}", FileType::Style);
        assert!(orch.restore_version(1).await.unwrap());
        assert!(!orch.restore_version(99).await.unwrap());

        let files = orch.files();
        let files = files.lock().await;
        assert!(!files.has_file("extra.css"));
        assert_eq!(files.entry(), Some("index.html"));
    }

    #[tokio::test]
    async fn unknown_provider_fails_as_not_configured() {
        let primary = gateway("primary", vec![]);
        let orch = orchestrator_with(config(), &[&primary]);

        let generation = orch
            .submit(SubmitInput::new("explain traits").with_provider("nowhere"))
            .await
            .unwrap();

        assert_eq!(generation.result.failure_kind(), Some(FailureKind::ProviderFailed));
    }
}
