use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Image handed to a vision model.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    /// e.g. "image/png"
    pub media_type: String,
}

impl ImagePayload {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: "image/png".to_string(),
        }
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64())
    }
}

/// Provider-agnostic single-turn vision request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image: ImagePayload,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Wire format used to reach the configured model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRoute {
    /// Synchronous chat-completions JSON, image as a data URL.
    ChatCompletions,
    /// Synchronous messages JSON, image as base64 with a media type.
    Messages,
    /// Server-Sent-Events responses stream.
    ResponsesStream,
}

impl std::str::FromStr for ProviderRoute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "chat_completions" | "openai" | "chat" => Ok(Self::ChatCompletions),
            "messages" | "anthropic" => Ok(Self::Messages),
            "responses_stream" | "responses" | "stream" => Ok(Self::ResponsesStream),
            other => Err(format!("unknown provider route '{other}'")),
        }
    }
}

// ── Chat completions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionsBody {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

// ── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MessagesBody {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<MessagesTurn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesTurn {
    pub role: String,
    pub content: Vec<MessagesBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagesBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

// ── Responses stream ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesBody {
    pub model: String,
    pub stream: bool,
    pub max_output_tokens: u32,
    pub input: Vec<ResponsesInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesInput {
    pub role: String,
    pub content: Vec<ResponsesPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesPart {
    InputText { text: String },
    InputImage { image_url: String },
}

/// One decoded `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Meaningful content of a stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental (or possibly cumulative) text for one channel.
    Delta { channel: String, text: String },
    /// Authoritative full text for one channel.
    Snapshot { channel: String, text: String },
    Done,
    Failed(String),
}
