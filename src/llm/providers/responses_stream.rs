use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::llm::provider::VisionProvider;
use crate::llm::providers::{check_status, http_client, sanitize_for_log, transport};
use crate::llm::sse_parser::{parse_stream_event, SseDecoder};
use crate::llm::stream_assembler::DeltaAssembler;
use crate::llm::types::{ProviderRoute, ResponsesBody, ResponsesInput, ResponsesPart, StreamEvent, VisionRequest};

/// Streaming responses endpoint. Text is rebuilt from interleaved deltas
/// and snapshots; see `DeltaAssembler`.
pub struct ResponsesStreamProvider {
    id: String,
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ResponsesStreamProvider {
    pub fn new(id: String, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            id,
            endpoint,
            api_key,
            model,
            client: http_client(),
        }
    }

    pub fn build_body(&self, request: &VisionRequest) -> ResponsesBody {
        ResponsesBody {
            model: self.model.clone(),
            stream: true,
            max_output_tokens: request.max_tokens,
            input: vec![ResponsesInput {
                role: "user".into(),
                content: vec![
                    ResponsesPart::InputText { text: request.prompt.clone() },
                    ResponsesPart::InputImage { image_url: request.image.data_url() },
                ],
            }],
        }
    }
}

#[async_trait]
impl VisionProvider for ResponsesStreamProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn route(&self) -> ProviderRoute {
        ProviderRoute::ResponsesStream
    }

    async fn complete(&self, request: &VisionRequest) -> ScreenPointResult<String> {
        let body = serde_json::to_value(self.build_body(request))?;
        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            body = %sanitize_for_log(&body),
            "opening responses stream"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let mut decoder = SseDecoder::new();
        let mut assembler = DeltaAssembler::new();
        let mut stream = response.bytes_stream();
        let mut events_seen = 0usize;
        let mut done = false;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            for sse in decoder.push(&chunk) {
                events_seen += 1;
                if apply(&mut assembler, &sse)? {
                    done = true;
                    break 'outer;
                }
            }
        }
        if !done {
            if let Some(sse) = decoder.finish() {
                events_seen += 1;
                done = apply(&mut assembler, &sse)?;
            }
        }

        let text = assembler.finish();
        if !done {
            tracing::warn!(
                provider = %self.id,
                events = events_seen,
                partial_len = text.as_ref().map_or(0, |t| t.len()),
                "responses stream ended before completion"
            );
            return Err(ScreenPointError::Transport("stream ended before completion".into()));
        }
        tracing::info!(
            provider = %self.id,
            events = events_seen,
            completed = done,
            content_len = text.as_ref().map_or(0, |t| t.len()),
            "responses stream finished"
        );
        text.ok_or(ScreenPointError::EmptyResponse)
    }
}

/// Feeds one SSE block into the assembler. Returns true on a terminal event.
fn apply(assembler: &mut DeltaAssembler, sse: &crate::llm::types::SseEvent) -> ScreenPointResult<bool> {
    for event in parse_stream_event(sse)? {
        match event {
            StreamEvent::Delta { channel, text } => assembler.push_delta(&channel, &text),
            StreamEvent::Snapshot { channel, text } => assembler.push_snapshot(&channel, &text),
            StreamEvent::Done => return Ok(true),
            StreamEvent::Failed(reason) => {
                tracing::warn!(%reason, "responses stream reported failure");
                return Err(ScreenPointError::Transport(format!("stream failed: {reason}")));
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ImagePayload;
    use crate::test_support::{json_response, spawn_stub, sse_response};

    fn request() -> VisionRequest {
        VisionRequest {
            image: ImagePayload::png(vec![9; 8]),
            prompt: "Locate: Chrome".into(),
            max_tokens: 300,
        }
    }

    fn provider(url: &str) -> ResponsesStreamProvider {
        ResponsesStreamProvider::new("responses".into(), url.to_string(), "k".into(), "gpt-5".into())
    }

    fn delta(item: &str, text: &str) -> String {
        let data = serde_json::json!({
            "type": "response.output_text.delta",
            "item_id": item,
            "output_index": 0,
            "content_index": 0,
            "delta": text,
        });
        format!("event: response.output_text.delta\ndata: {data}\n\n")
    }

    fn completed() -> String {
        format!("data: {}\n\n", serde_json::json!({"type": "response.completed", "response": {"output": []}}))
    }

    #[test]
    fn body_requests_a_stream() {
        let body = serde_json::to_value(provider("http://x").build_body(&request())).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_output_tokens"], 300);
        assert_eq!(body["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(body["input"][0]["content"][1]["type"], "input_image");
    }

    #[tokio::test]
    async fn assembles_deltas_until_completed() {
        let events = format!(
            "{}{}{}{}",
            delta("msg_1", "{\"box_2d\":"),
            delta("msg_1", "[10,20,30,40],"),
            delta("msg_1", "\"confidence\":88}"),
            completed(),
        );
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        let text = provider(&stub.url).complete(&request()).await.unwrap();
        assert_eq!(text, "{\"box_2d\":[10,20,30,40],\"confidence\":88}");
    }

    #[tokio::test]
    async fn cumulative_resends_do_not_duplicate() {
        let events = format!(
            "{}{}{}{}",
            delta("a", "ABC"),
            delta("a", "ABCDEF"),
            delta("a", "ABCDEFGH"),
            completed()
        );
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        assert_eq!(provider(&stub.url).complete(&request()).await.unwrap(), "ABCDEFGH");
    }

    #[tokio::test]
    async fn truncated_stream_is_a_transient_error() {
        let events = format!("{}{}", delta("a", "{\"box_2d\": [10, 20,"), delta("a", " 30"));
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        let err = provider(&stub.url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ScreenPointError::Transport(ref m) if m.contains("before completion")));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn done_marker_completes_the_stream() {
        let events = format!("{}data: [DONE]\n\n", delta("a", "{\"confidence\": 70}"));
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        assert_eq!(provider(&stub.url).complete(&request()).await.unwrap(), "{\"confidence\": 70}");
    }

    #[tokio::test]
    async fn interleaved_duplicate_channels_collapse() {
        let events = format!(
            "{}{}{}{}{}",
            delta("a", "Hello "),
            delta("b", "Hello "),
            delta("a", "world"),
            delta("b", "world"),
            completed(),
        );
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        assert_eq!(provider(&stub.url).complete(&request()).await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn failed_event_is_an_error() {
        let events = format!(
            "{}data: {}\n\n",
            delta("a", "partial"),
            serde_json::json!({"type": "response.failed", "response": {"error": {"message": "overloaded"}}}),
        );
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        let err = provider(&stub.url).complete(&request()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn stream_without_text_is_empty() {
        let events = format!("data: {}\n\n", serde_json::json!({"type": "response.completed", "response": {}}));
        let stub = spawn_stub(vec![sse_response(&events)]).await;
        assert!(matches!(
            provider(&stub.url).complete(&request()).await,
            Err(ScreenPointError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn throttling_surfaces_as_status() {
        let stub = spawn_stub(vec![json_response(429, "{}")]).await;
        let err = provider(&stub.url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ScreenPointError::ProviderStatus { status: 429, .. }));
    }
}
