use std::sync::Arc;

use crate::config::{require_api_key, VisionConfig};
use crate::errors::ScreenPointResult;
use crate::llm::provider::VisionProvider;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::join_endpoint;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::providers::responses_stream::ResponsesStreamProvider;
use crate::llm::types::ProviderRoute;

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_ANTHROPIC_BASE: &str = "https://api.anthropic.com/v1";

/// Model families served through chat-completions style gateways.
const CHAT_COMPLETIONS_FAMILIES: &[&str] = &[
    "gpt", "gemini", "qwen", "glm", "doubao", "deepseek", "llava", "llama", "mistral", "pixtral", "grok", "kimi",
    "moonshot", "internvl", "ui-tars",
];

fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
        || model.contains("gpt-5")
        || model.contains("codex")
}

fn is_anthropic_model(model: &str) -> bool {
    model.contains("claude")
}

/// Picks the wire format for the configured model.
///
/// Resolution order:
/// 1. explicit `route` in config.toml
/// 2. responses stream for `/responses` endpoints and reasoning models reached
///    through OpenAI-style credentials
/// 3. chat-completions for OpenAI-style credentials or known non-Anthropic families
/// 4. messages
pub fn resolve_route(vision: &VisionConfig) -> ProviderRoute {
    if let Some(explicit) = vision.route.as_deref() {
        match explicit.parse::<ProviderRoute>() {
            Ok(route) => return route,
            Err(e) => tracing::warn!(error = %e, "ignoring configured route"),
        }
    }

    let model = vision.model.to_ascii_lowercase();
    let base_url = vision.base_url.as_deref().unwrap_or_default();

    if base_url.contains("/responses") {
        return ProviderRoute::ResponsesStream;
    }
    if is_reasoning_model(&model) && (vision.openai_style || !is_anthropic_model(&model)) {
        return ProviderRoute::ResponsesStream;
    }
    if vision.openai_style || CHAT_COMPLETIONS_FAMILIES.iter().any(|f| model.contains(f)) {
        return ProviderRoute::ChatCompletions;
    }
    ProviderRoute::Messages
}

/// Builds the single provider this process talks to.
/// Fails with a configuration error when no API key is available.
pub fn build_provider(vision: &VisionConfig) -> ScreenPointResult<Arc<dyn VisionProvider>> {
    let api_key = require_api_key(vision)?;
    let route = resolve_route(vision);
    let model = vision.model.clone();

    let provider: Arc<dyn VisionProvider> = match route {
        ProviderRoute::ChatCompletions => {
            let base = vision.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE);
            Arc::new(OpenAiCompatibleProvider::new(
                "chat_completions".into(),
                join_endpoint(base, "chat/completions"),
                api_key,
                model,
            ))
        }
        ProviderRoute::Messages => {
            let base = vision.base_url.as_deref().unwrap_or(DEFAULT_ANTHROPIC_BASE);
            Arc::new(AnthropicProvider::new(
                "messages".into(),
                join_endpoint(base, "messages"),
                api_key,
                model,
            ))
        }
        ProviderRoute::ResponsesStream => {
            let base = vision.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE);
            Arc::new(ResponsesStreamProvider::new(
                "responses_stream".into(),
                join_endpoint(base, "responses"),
                api_key,
                model,
            ))
        }
    };

    tracing::info!(
        route = ?route,
        provider = provider.name(),
        model = %vision.model,
        "vision provider configured"
    );
    Ok(provider)
}
