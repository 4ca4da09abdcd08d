//! OpenAI-compatible gateway implementation.
//!
//! Works with: OpenAI, OpenRouter, Groq, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! HTTP failures are mapped onto the gateway taxonomy so the fallback chain
//! can tell quota exhaustion and oversized prompts apart from outages.

use async_trait::async_trait;
use forgeline_core::error::ProviderError;
use forgeline_core::message::{Message, Role};
use forgeline_core::provider::{GenerationRequest, ProviderGateway, ProviderId, RawBackendResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A gateway to an OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatGateway {
    id: ProviderId,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    /// Create a new OpenAI-compatible gateway.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            id: ProviderId::new(id),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert a generation request to the chat completions message list.
    fn to_api_messages(request: &GenerationRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);

        let mut system = request.system_prompt.clone();
        if let Some(context) = &request.project_context {
            system.push_str("\n\n## Existing project\n");
            system.push_str(context);
        }
        if !system.trim().is_empty() {
            messages.push(ApiMessage {
                role: "system".into(),
                content: ApiContent::Text(system),
            });
        }

        for message in &request.history {
            messages.push(ApiMessage {
                role: message.role.as_str().into(),
                content: ApiContent::Text(history_text(message)),
            });
        }

        let content = if request.images.is_empty() {
            ApiContent::Text(request.prompt.clone())
        } else {
            let mut parts = vec![ApiContentPart::Text {
                text: request.prompt.clone(),
            }];
            parts.extend(request.images.iter().map(|img| ApiContentPart::ImageUrl {
                image_url: ApiImageUrl { url: img.data_url() },
            }));
            ApiContent::Parts(parts)
        };
        messages.push(ApiMessage {
            role: "user".into(),
            content,
        });

        messages
    }
}

/// Flatten a history message with its code and attachments into plain text.
fn history_text(message: &Message) -> String {
    let mut text = message.content.clone();
    for attachment in &message.attachments {
        text.push_str(&format!(
            "\n\n[Attachment: {}]\n{}",
            attachment.name, attachment.content
        ));
    }
    if let Some(code) = &message.code {
        if message.role == Role::Assistant {
            text.push_str("\n\n```\n");
            text.push_str(code);
            text.push_str("\n```");
        }
    }
    text
}

/// Map a non-success HTTP response onto the gateway error taxonomy.
pub fn classify_http_failure(status: u16, body: &str) -> ProviderError {
    let lower = body.to_ascii_lowercase();

    const SIZE_SIGNALS: &[&str] = &[
        "context_length_exceeded",
        "maximum context length",
        "prompt is too long",
        "too many tokens",
        "request too large",
        "reduce the length",
    ];
    const QUOTA_SIGNALS: &[&str] = &[
        "insufficient_quota",
        "quota",
        "credit",
        "rate limit",
        "rate_limit",
        "billing",
    ];

    if status == 413 || SIZE_SIGNALS.iter().any(|s| lower.contains(s)) {
        return ProviderError::PromptTooLarge(format!("HTTP {status}: {body}"));
    }
    if status == 402 || status == 429 || QUOTA_SIGNALS.iter().any(|s| lower.contains(s)) {
        return ProviderError::QuotaExceeded(format!("HTTP {status}: {body}"));
    }
    if status == 408 || (500..600).contains(&status) {
        return ProviderError::Unavailable(format!("HTTP {status}: {body}"));
    }
    if status == 401 || status == 403 {
        return ProviderError::Unknown(format!(
            "HTTP {status}: invalid API key or insufficient permissions"
        ));
    }
    ProviderError::Unknown(format!("HTTP {status}: {body}"))
}

#[async_trait]
impl ProviderGateway for OpenAiCompatGateway {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<RawBackendResult, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request),
            "temperature": self.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if request.reasoning {
            body["reasoning_effort"] = serde_json::json!("high");
        }

        debug!(
            provider = %self.id,
            model = %self.model,
            history = request.history.len(),
            mode = %request.mode,
            "Sending generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.id, status, body = %error_body, "Provider returned error");
            return Err(classify_http_failure(status, &error_body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Unknown("No choices in response".into()))?;

        Ok(RawBackendResult {
            text: choice.message.content.unwrap_or_default(),
            provider: self.id.clone(),
            model: api_response.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
