use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenPointError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-level failure (connection reset, truncated body, ...). Retried.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Vision provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    /// The request itself is malformed; retrying cannot help.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Vision provider exhausted after {attempts} attempts: {source}")]
    ProviderExhausted {
        attempts: u32,
        #[source]
        source: Box<ScreenPointError>,
    },

    #[error("Vision provider returned no usable text")]
    EmptyResponse,

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Annotation error: {0}")]
    Annotation(String),

    #[error("Input injection error: {0}")]
    Injection(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Platform query error: {0}")]
    Platform(String),

    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ScreenPointError {
    /// Whether a vision request that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::EmptyResponse | Self::SseParsing(_) => true,
            Self::Timeout { .. } => true,
            Self::ProviderStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            _ => false,
        }
    }
}

impl serde::Serialize for ScreenPointError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ScreenPointResult<T> = Result<T, ScreenPointError>;
