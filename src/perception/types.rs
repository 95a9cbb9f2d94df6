use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::display::types::{GlobalPoint, LocalPoint};

/// Sub-rectangle of a display in display-relative logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Screenshot of one display (or a region of it) at device-pixel resolution.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// PNG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub display_index: usize,
    pub region: Option<CaptureRegion>,
    pub captured_at: Instant,
}

/// One history point drawn onto the screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Image pixel coordinates.
    pub x: i32,
    pub y: i32,
    /// Rank, shown as the marker number.
    pub label: String,
    /// Normalized coordinates, e.g. "512,300".
    pub norm_label: String,
}

/// `[ymin, xmin, ymax, xmax]`, each 0–1000 relative to the image the model saw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }
}

/// Validated model answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionAnswer {
    pub bbox: BoundingBox,
    /// 0–100.
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateRequest {
    /// Natural-language description of the element, e.g. "the blue Send button".
    pub description: String,
    pub display_index: usize,
    #[serde(default)]
    pub region: Option<CaptureRegion>,
}

impl LocateRequest {
    pub fn new(description: impl Into<String>, display_index: usize) -> Self {
        Self {
            description: description.into(),
            display_index,
            region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub local: LocalPoint,
    pub global: GlobalPoint,
    pub display_index: usize,
    pub confidence: u8,
    /// Name of the locator that produced it.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocateOutcome {
    Located(Location),
    /// The model answered but below the threshold; a negative result, not an error.
    LowConfidence { confidence: u8, threshold: u8 },
    /// This locator has nothing to say about the request.
    NotFound,
}

impl LocateOutcome {
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Located(l) => Some(l),
            _ => None,
        }
    }
}

/// Steps of a single vision locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateState {
    Idle,
    Capturing,
    Annotating,
    Requesting,
    Parsing,
    Converting,
    Decided,
}

/// An item in the macOS Dock or Windows taskbar, in global logical pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockItem {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DockItem {
    pub fn center(&self) -> GlobalPoint {
        GlobalPoint::new(self.x + self.width as i32 / 2, self.y + self.height as i32 / 2)
    }
}
