// Rebuilds final text from a responses stream.
//
// Providers interleave several delta channels and are inconsistent about
// what a "delta" is: some send true increments, others resend the
// cumulative text so far. A channel is treated as incremental until it
// sends a cumulative snapshot; only then are resent tails and overlaps
// trimmed. Duplicate channels collapse to the longest one, and doubled CJK
// echoes are undone.
use std::collections::HashMap;

/// Shorter overlaps are treated as coincidence, not as a resend.
const MIN_OVERLAP_CHARS: usize = 4;

/// Text of one channel and whether it has shown cumulative behaviour.
#[derive(Debug, Default, Clone)]
pub struct ChannelText {
    pub text: String,
    cumulative: bool,
}

impl ChannelText {
    pub fn is_cumulative(&self) -> bool {
        self.cumulative
    }
}

#[derive(Debug, Default)]
pub struct DeltaAssembler {
    order: Vec<String>,
    channels: HashMap<String, ChannelText>,
}

impl DeltaAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, channel: &str, delta: &str) {
        merge_delta(self.channel_mut(channel), delta);
    }

    /// A snapshot is the provider's final word on a channel.
    pub fn push_snapshot(&mut self, channel: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let current = self.channel_mut(channel);
        if current.text != text {
            tracing::trace!(
                channel,
                streamed = current.text.len(),
                snapshot = text.len(),
                "snapshot replaces streamed text"
            );
            current.text = text.to_string();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(|c| c.text.trim().is_empty())
    }

    /// Final text, or `None` when nothing usable arrived.
    pub fn finish(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .order
            .iter()
            .filter_map(|k| self.channels.get(k))
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            return None;
        }
        if texts.len() > 1 {
            tracing::debug!(channels = texts.len(), "collapsing stream channels");
        }
        let joined = collapse_channels(&texts).join("\n");
        Some(collapse_doubled_cjk(&joined))
    }

    fn channel_mut(&mut self, channel: &str) -> &mut ChannelText {
        if !self.channels.contains_key(channel) {
            self.order.push(channel.to_string());
        }
        self.channels.entry(channel.to_string()).or_default()
    }
}

/// Merges one delta into a channel.
///
/// A delta that extends the whole channel text is a cumulative snapshot and
/// switches the channel to cumulative mode. In that mode a delta the text
/// already ends with is a resend, and a delta starting with the current tail
/// only contributes its new part. Incremental channels always append.
pub fn merge_delta(channel: &mut ChannelText, delta: &str) {
    if delta.is_empty() {
        return;
    }
    let existing = &mut channel.text;
    if existing.is_empty() {
        existing.push_str(delta);
        return;
    }
    if delta.len() > existing.len() && delta.starts_with(existing.as_str()) {
        if !channel.cumulative {
            tracing::trace!(held = existing.len(), delta = delta.len(), "channel switched to cumulative mode");
        }
        channel.cumulative = true;
        *existing = delta.to_string();
        return;
    }
    if !channel.cumulative {
        existing.push_str(delta);
        return;
    }
    if existing.ends_with(delta) {
        return;
    }
    let overlap = longest_overlap(existing, delta);
    existing.push_str(&delta[overlap..]);
}

/// Byte length of the longest proper prefix of `delta` that `existing` ends
/// with, or 0 when that prefix is shorter than [`MIN_OVERLAP_CHARS`].
fn longest_overlap(existing: &str, delta: &str) -> usize {
    delta
        .char_indices()
        .map(|(i, _)| i)
        .skip(MIN_OVERLAP_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|&end| existing.ends_with(&delta[..end]))
        .unwrap_or(0)
}

/// Keeps the longest of any channels that contain one another; distinct
/// channels survive in their original order.
fn collapse_channels<'a>(texts: &[&'a str]) -> Vec<&'a str> {
    let mut by_len: Vec<(usize, &str)> = texts.iter().copied().enumerate().collect();
    by_len.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

    let mut kept: Vec<(usize, &str)> = Vec::new();
    for (pos, text) in by_len {
        if kept.iter().any(|(_, k)| k.contains(text)) {
            continue;
        }
        kept.push((pos, text));
    }
    kept.sort_by_key(|(pos, _)| *pos);
    kept.into_iter().map(|(_, t)| t).collect()
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}')
}

/// Undoes the "点点击击" echo some streams produce: a run of at least four
/// CJK characters in which every character appears exactly twice in a row
/// is halved. Natural reduplication ("谢谢") is too short to match.
pub fn collapse_doubled_cjk(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if !is_cjk(chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && is_cjk(chars[i]) {
            i += 1;
        }
        let run = &chars[start..i];
        let doubled = run.len() >= 4 && run.len() % 2 == 0 && run.chunks(2).all(|p| p[0] == p[1]);
        if doubled {
            out.extend(run.iter().step_by(2));
        } else {
            out.extend(run.iter());
        }
    }
    out
}
