use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::llm::types::{SseEvent, StreamEvent};

/// Incremental Server-Sent-Events decoder.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.handle_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.handle_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Interprets one SSE block from a responses stream (or a chat-completions
/// style chunk, which some gateways emit on the same endpoint).
pub fn parse_stream_event(sse: &SseEvent) -> ScreenPointResult<Vec<StreamEvent>> {
    let data = sse.data.trim();
    if data == "[DONE]" {
        return Ok(vec![StreamEvent::Done]);
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ScreenPointError::SseParsing(e.to_string()))?;
    let kind = json["type"]
        .as_str()
        .or(sse.event.as_deref())
        .unwrap_or_default();

    let events = match kind {
        "response.output_text.delta" => json["delta"]
            .as_str()
            .filter(|d| !d.is_empty())
            .map(|d| StreamEvent::Delta { channel: channel_key(&json), text: d.to_string() })
            .into_iter()
            .collect(),
        "response.output_text.done" => json["text"]
            .as_str()
            .map(|t| StreamEvent::Snapshot { channel: channel_key(&json), text: t.to_string() })
            .into_iter()
            .collect(),
        "response.content_part.done" => {
            let part = &json["part"];
            match (part["type"].as_str(), part["text"].as_str()) {
                (Some("output_text"), Some(t)) => vec![StreamEvent::Snapshot {
                    channel: channel_key(&json),
                    text: t.to_string(),
                }],
                _ => Vec::new(),
            }
        }
        "response.completed" => {
            let mut out = completed_snapshots(&json["response"]);
            out.push(StreamEvent::Done);
            out
        }
        "response.incomplete" => {
            tracing::warn!("responses stream reported incomplete output");
            vec![StreamEvent::Done]
        }
        "response.failed" | "error" => vec![StreamEvent::Failed(error_message(&json))],
        _ => chat_chunk(&json),
    };
    Ok(events)
}

/// Disambiguates interleaved deltas: one channel per item/output/content part.
fn channel_key(json: &serde_json::Value) -> String {
    format!(
        "{}:{}:{}",
        json["item_id"].as_str().unwrap_or_default(),
        json["output_index"].as_u64().unwrap_or(0),
        json["content_index"].as_u64().unwrap_or(0),
    )
}

fn completed_snapshots(response: &serde_json::Value) -> Vec<StreamEvent> {
    let Some(output) = response["output"].as_array() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (output_index, item) in output.iter().enumerate() {
        if item["type"].as_str() != Some("message") {
            continue;
        }
        let item_id = item["id"].as_str().unwrap_or_default();
        let Some(parts) = item["content"].as_array() else {
            continue;
        };
        for (content_index, part) in parts.iter().enumerate() {
            if part["type"].as_str() != Some("output_text") {
                continue;
            }
            if let Some(text) = part["text"].as_str() {
                out.push(StreamEvent::Snapshot {
                    channel: format!("{item_id}:{output_index}:{content_index}"),
                    text: text.to_string(),
                });
            }
        }
    }
    out
}

fn chat_chunk(json: &serde_json::Value) -> Vec<StreamEvent> {
    let Some(choices) = json["choices"].as_array() else {
        return Vec::new();
    };
    choices
        .iter()
        .filter_map(|choice| {
            let content = choice["delta"]["content"].as_str().filter(|c| !c.is_empty())?;
            Some(StreamEvent::Delta {
                channel: format!("choice:{}", choice["index"].as_u64().unwrap_or(0)),
                text: content.to_string(),
            })
        })
        .collect()
}

fn error_message(json: &serde_json::Value) -> String {
    [
        &json["error"]["message"],
        &json["response"]["error"]["message"],
        &json["message"],
    ]
    .iter()
    .find_map(|v| v.as_str())
    .unwrap_or("stream reported failure")
    .to_string()
}
