use async_trait::async_trait;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::llm::provider::VisionProvider;
use crate::llm::providers::{check_status, http_client, sanitize_for_log, transport};
use crate::llm::types::{ImageSource, MessagesBlock, MessagesBody, MessagesTurn, ProviderRoute, VisionRequest};

const API_VERSION: &str = "2023-06-01";

/// Synchronous messages endpoint; the image travels as base64 with its media type.
pub struct AnthropicProvider {
    id: String,
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            id,
            endpoint,
            api_key,
            model,
            client: http_client(),
        }
    }

    pub fn build_body(&self, request: &VisionRequest) -> MessagesBody {
        MessagesBody {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![MessagesTurn {
                role: "user".into(),
                content: vec![
                    MessagesBlock::Image {
                        source: ImageSource {
                            source_type: "base64".into(),
                            media_type: request.image.media_type.clone(),
                            data: request.image.base64(),
                        },
                    },
                    MessagesBlock::Text { text: request.prompt.clone() },
                ],
            }],
        }
    }
}

#[async_trait]
impl VisionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn route(&self) -> ProviderRoute {
        ProviderRoute::Messages
    }

    async fn complete(&self, request: &VisionRequest) -> ScreenPointResult<String> {
        let body = serde_json::to_value(self.build_body(request))?;
        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            body = %sanitize_for_log(&body),
            "sending messages request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        let json: serde_json::Value = response.json().await.map_err(transport)?;

        let text = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"].as_str() == Some("text"))
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        tracing::info!(
            provider = %self.id,
            content_len = text.len(),
            stop_reason = json["stop_reason"].as_str().unwrap_or(""),
            "messages response received"
        );
        if text.trim().is_empty() {
            return Err(ScreenPointError::EmptyResponse);
        }
        Ok(text)
    }
}
