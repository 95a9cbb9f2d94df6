// Extraction and validation of the model's `{"box_2d": [...], "confidence": n}` answer.
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::perception::types::{BoundingBox, VisionAnswer};

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("Invalid fence regex"))
}

/// First balanced `{...}` in `text`, ignoring braces inside JSON strings.
pub fn extract_braced_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds the answer object: direct brace matching first, then a fenced code block.
pub fn extract_answer_json(text: &str) -> ScreenPointResult<serde_json::Value> {
    if let Some(candidate) = extract_braced_json(text) {
        match serde_json::from_str::<serde_json::Value>(candidate) {
            Ok(v) if v.get("box_2d").is_some() => return Ok(v),
            Ok(_) => tracing::debug!("first JSON object has no box_2d; trying fenced block"),
            Err(e) => tracing::debug!(error = %e, "brace-matched text is not JSON; trying fenced block"),
        }
    }
    let fenced = fenced_block_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ScreenPointError::Parse(format!("no JSON object in model response: {}", preview(text))))?;
    serde_json::from_str(fenced.as_str())
        .map_err(|e| ScreenPointError::Parse(format!("fenced block is not valid JSON: {e}")))
}

/// Parses and validates a model response.
///
/// `box_2d` must be an array of exactly four numbers; values are clamped to
/// 0–1000 and swapped when min/max come back reversed. A missing
/// `confidence` counts as 0.
pub fn parse_vision_answer(text: &str) -> ScreenPointResult<VisionAnswer> {
    let json = extract_answer_json(text)?;

    let raw = json["box_2d"]
        .as_array()
        .ok_or_else(|| ScreenPointError::Parse("box_2d is not an array".into()))?;
    if raw.len() != 4 {
        return Err(ScreenPointError::Parse(format!("box_2d has {} values, expected 4", raw.len())));
    }
    let mut values = [0f64; 4];
    for (slot, v) in values.iter_mut().zip(raw) {
        let n = v
            .as_f64()
            .ok_or_else(|| ScreenPointError::Parse(format!("box_2d value {v} is not a number")))?;
        if !n.is_finite() {
            return Err(ScreenPointError::Parse("box_2d value is not finite".into()));
        }
        *slot = n.clamp(0.0, 1000.0);
    }
    let [y1, x1, y2, x2] = values;
    let bbox = BoundingBox {
        ymin: y1.min(y2),
        xmin: x1.min(x2),
        ymax: y1.max(y2),
        xmax: x1.max(x2),
    };

    let confidence = match &json["confidence"] {
        serde_json::Value::Null => {
            tracing::warn!("model answer has no confidence; treating as 0");
            0
        }
        v => v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
            .ok_or_else(|| ScreenPointError::Parse(format!("confidence {v} is not a number")))?
            .clamp(0.0, 100.0)
            .round() as u8,
    };

    Ok(VisionAnswer { bbox, confidence })
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(120).collect();
    if p.len() < text.len() {
        p.push('…');
    }
    p
}
