//! Gateway router: maps provider ids to gateways and builds the escalation
//! chain from configuration.

use crate::fallback::{FallbackChain, Strategy};
use crate::openai_compat::OpenAiCompatGateway;
use forgeline_config::AppConfig;
use forgeline_core::provider::{ProviderGateway, ProviderId};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes generation requests to the gateway registered for a provider id.
pub struct GatewayRouter {
    gateways: HashMap<String, Arc<dyn ProviderGateway>>,
    default_provider: ProviderId,
}

impl GatewayRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            gateways: HashMap::new(),
            default_provider: ProviderId::new(default_provider),
        }
    }

    /// Register a gateway under its own id.
    pub fn register(&mut self, gateway: Arc<dyn ProviderGateway>) {
        self.gateways
            .insert(gateway.id().as_str().to_string(), gateway);
    }

    pub fn default_provider(&self) -> &ProviderId {
        &self.default_provider
    }

    pub fn default_gateway(&self) -> Option<Arc<dyn ProviderGateway>> {
        self.get(&self.default_provider)
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderGateway>> {
        self.gateways.get(id.as_str()).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.gateways.contains_key(id.as_str())
    }

    /// Registered provider ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.gateways.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Build gateways from configuration.
///
/// Every `[providers.*]` entry gets a gateway, and the default and fallback
/// providers are registered even when not configured explicitly.
pub fn build_from_config(config: &AppConfig) -> GatewayRouter {
    let mut router = GatewayRouter::new(&config.default_provider);

    for name in config.providers.keys() {
        router.register(gateway_for(config, name));
    }

    for name in [
        config.default_provider.as_str(),
        config.orchestrator.fallback_provider.as_str(),
    ] {
        if !router.contains(&ProviderId::from(name)) {
            router.register(gateway_for(config, name));
        }
    }

    router
}

fn gateway_for(config: &AppConfig, name: &str) -> Arc<dyn ProviderGateway> {
    let provider_config = config.providers.get(name);

    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();

    let base_url = provider_config
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));

    let model = provider_config
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| default_model_for(config, name));

    Arc::new(
        OpenAiCompatGateway::new(name, base_url, api_key, model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens),
    )
}

/// Build the standard escalation chain starting at `primary`.
///
/// When `primary` is the fallback provider itself the chain has no
/// separate fallback step.
pub fn build_chain(config: &AppConfig, primary: &ProviderId) -> FallbackChain {
    let budget = config.provider_budget(primary.as_str());
    let fallback = ProviderId::new(&config.orchestrator.fallback_provider);
    let fallback_budget = config.provider_budget(fallback.as_str());

    FallbackChain::standard(
        Strategy::primary(primary.clone(), budget.context_budget, budget.system_reserve),
        config.orchestrator.retry_budget_ratio,
        fallback,
        fallback_budget.context_budget,
        fallback_budget.system_reserve,
    )
}

fn default_model_for(config: &AppConfig, provider_name: &str) -> String {
    if provider_name == config.default_provider {
        return config.default_model.clone();
    }
    match provider_name {
        "groq" => "llama-3.3-70b-versatile".into(),
        "openai" => "gpt-4o-mini".into(),
        "deepseek" => "deepseek-chat".into(),
        "ollama" => "llama3.2".into(),
        _ => config.default_model.clone(),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
