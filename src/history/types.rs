use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::display::types::{LocalPoint, NormalizedPoint};

/// One remembered click location for the active application.
///
/// `x`/`y` are re-derived from `normalized` whenever the ledger is loaded,
/// so they always match the current topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickHistoryEntry {
    /// Per-app counter value; never reused.
    pub index: u64,
    pub display_index: usize,
    pub x: i32,
    pub y: i32,
    /// Merge identity together with `display_index`.
    pub normalized: NormalizedPoint,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    /// Clicks at this location.
    pub count: u32,
    /// Clicks confirmed effective by an external verifier.
    pub success_count: u32,
}

impl ClickHistoryEntry {
    pub fn local(&self) -> LocalPoint {
        LocalPoint::new(self.x, self.y)
    }

    /// Ranking score for the annotation overlay.
    pub fn score(&self) -> u64 {
        self.success_count as u64 * 2 + self.count as u64
    }
}

/// On-disk form of [`ClickHistoryEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredClickHistoryEntry {
    pub index: u64,
    pub display_index: usize,
    #[serde(rename = "x_normalized")]
    pub x_normalized: u32,
    #[serde(rename = "y_normalized")]
    pub y_normalized: u32,
    /// Display size at save time. Diagnostic only; loads use the live topology.
    pub display_width: u32,
    pub display_height: u32,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub count: u32,
    #[serde(default)]
    pub success_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppClickHistory {
    pub app_name: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub clicks: Vec<StoredClickHistoryEntry>,
    /// Next index to hand out.
    #[serde(default)]
    pub counter: u64,
}

/// A history point chosen for the screenshot overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationCandidate {
    /// 0 is always the most recent click.
    pub rank: usize,
    pub entry: ClickHistoryEntry,
}
