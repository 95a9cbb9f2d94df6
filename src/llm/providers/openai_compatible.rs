use async_trait::async_trait;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::llm::provider::VisionProvider;
use crate::llm::providers::{check_status, http_client, sanitize_for_log, transport};
use crate::llm::types::{ChatCompletionsBody, ChatMessage, ContentPart, ImageUrl, ProviderRoute, VisionRequest};

/// Synchronous chat-completions endpoint; the image travels as a data URL.
pub struct OpenAiCompatibleProvider {
    id: String,
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            id,
            endpoint,
            api_key,
            model,
            client: http_client(),
        }
    }

    pub fn build_body(&self, request: &VisionRequest) -> ChatCompletionsBody {
        ChatCompletionsBody {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: vec![
                    ContentPart::Text { text: request.prompt.clone() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: request.image.data_url() },
                    },
                ],
            }],
        }
    }
}

#[async_trait]
impl VisionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn route(&self) -> ProviderRoute {
        ProviderRoute::ChatCompletions
    }

    async fn complete(&self, request: &VisionRequest) -> ScreenPointResult<String> {
        let body = serde_json::to_value(self.build_body(request))?;
        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            body = %sanitize_for_log(&body),
            "sending chat-completions request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        let json: serde_json::Value = response.json().await.map_err(transport)?;

        let content = extract_message_text(&json);
        tracing::info!(provider = %self.id, content_len = content.len(), "chat-completions response received");
        if content.trim().is_empty() {
            return Err(ScreenPointError::EmptyResponse);
        }
        Ok(content)
    }
}

/// `choices[0].message.content` as a string, or the text parts of an array.
fn extract_message_text(json: &serde_json::Value) -> String {
    let content = &json["choices"][0]["message"]["content"];
    if let Some(s) = content.as_str() {
        return s.to_string();
    }
    content
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ImagePayload;
    use crate::test_support::{json_response, spawn_stub};

    fn request() -> VisionRequest {
        VisionRequest {
            image: ImagePayload::png(vec![1, 2, 3]),
            prompt: "find the OK button".into(),
            max_tokens: 256,
        }
    }

    #[test]
    fn body_carries_data_url() {
        let provider = OpenAiCompatibleProvider::new("openai".into(), "http://x".into(), "k".into(), "gpt-4o".into());
        let body = serde_json::to_value(provider.build_body(&request())).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(body["messages"][0]["content"][1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn array_content_is_flattened() {
        let json = serde_json::json!({"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]});
        assert_eq!(extract_message_text(&json), "ab");
    }

    #[tokio::test]
    async fn reads_message_content() {
        let stub = spawn_stub(vec![json_response(
            200,
            r#"{"choices":[{"message":{"content":"{\"box_2d\":[1,2,3,4],\"confidence\":77}"}}]}"#,
        )])
        .await;
        let provider = OpenAiCompatibleProvider::new("openai".into(), stub.url.clone(), "k".into(), "gpt-4o".into());
        let text = provider.complete(&request()).await.unwrap();
        assert!(text.contains("\"confidence\":77"));
        assert!(stub.bodies()[0].contains("find the OK button"));
    }

    #[tokio::test]
    async fn bad_request_is_deterministic() {
        let stub = spawn_stub(vec![json_response(400, r#"{"error":{"message":"max_tokens too large"}}"#)]).await;
        let provider = OpenAiCompatibleProvider::new("openai".into(), stub.url.clone(), "k".into(), "gpt-4o".into());
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ScreenPointError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let stub = spawn_stub(vec![json_response(200, r#"{"choices":[{"message":{"content":""}}]}"#)]).await;
        let provider = OpenAiCompatibleProvider::new("openai".into(), stub.url.clone(), "k".into(), "gpt-4o".into());
        assert!(matches!(provider.complete(&request()).await, Err(ScreenPointError::EmptyResponse)));
    }
}
