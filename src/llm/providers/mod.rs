pub mod anthropic;
pub mod openai_compatible;
pub mod responses_stream;

use std::time::Duration;

use crate::errors::{ScreenPointError, ScreenPointResult};

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `base` may already be a full endpoint; otherwise `/v1/<path>` is appended.
pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(path) {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/{path}")
    } else {
        format!("{base}/v1/{path}")
    }
}

/// Maps a non-success status onto the error taxonomy.
///
/// Auth failures are configuration errors, malformed-request statuses are
/// deterministic, everything else is left to `is_transient` (5xx, 408, 429).
pub(crate) async fn check_status(response: reqwest::Response) -> ScreenPointResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let code = status.as_u16();
    Err(match code {
        401 | 403 => ScreenPointError::Config(format!("vision provider rejected credentials ({status}): {body}")),
        400 | 404 | 405 | 413 | 415 | 422 => ScreenPointError::InvalidRequest(format!("{status}: {body}")),
        _ => ScreenPointError::ProviderStatus { status: code, body },
    })
}

/// Replaces long strings (base64 images) so request bodies can be logged.
pub(crate) fn sanitize_for_log(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.len() > 256 => {
            serde_json::Value::String(format!("<omitted {} bytes>", s.len()))
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sanitize_for_log).collect()),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), sanitize_for_log(v))).collect(),
        ),
        other => other.clone(),
    }
}

/// Converts a reqwest failure into a transport error the retry loop understands.
pub(crate) fn transport(e: reqwest::Error) -> ScreenPointError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        ScreenPointError::Transport(e.to_string())
    } else {
        ScreenPointError::Http(e)
    }
}
