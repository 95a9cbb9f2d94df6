use serde::{Deserialize, Serialize};

/// Frame in which a platform source reports display origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginFrame {
    /// Y grows upward from the bottom-left corner of the main display (AppKit).
    BottomLeft,
    /// Y grows downward from the top-left corner of the main display.
    TopLeft,
}

/// Per-display geometry as reported by a platform source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDisplay {
    pub name: String,
    pub is_main: bool,
    pub width: u32,
    pub height: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub scale_factor: f64,
    pub frame: OriginFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub index: usize,
    pub name: String,
    pub is_main: bool,
    pub width: u32,
    pub height: u32,
    /// Canonical top-left, main-display-relative origin.
    pub origin_x: i32,
    pub origin_y: i32,
    /// Device pixels per logical pixel, always >= 1.
    pub scale_factor: f64,
}

impl Display {
    pub fn contains_global(&self, p: GlobalPoint) -> bool {
        p.x >= self.origin_x
            && p.y >= self.origin_y
            && (p.x as i64) < self.origin_x as i64 + self.width as i64
            && (p.y as i64) < self.origin_y as i64 + self.height as i64
    }

    /// Squared distance from a global point to the nearest edge of this display.
    pub(crate) fn distance_sq(&self, p: GlobalPoint) -> i64 {
        let right = self.origin_x as i64 + self.width as i64 - 1;
        let bottom = self.origin_y as i64 + self.height as i64 - 1;
        let dx = (p.x as i64).clamp(self.origin_x as i64, right.max(self.origin_x as i64)) - p.x as i64;
        let dy = (p.y as i64).clamp(self.origin_y as i64, bottom.max(self.origin_y as i64)) - p.y as i64;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub displays: Vec<Display>,
    pub total_width: u32,
    /// Tallest single display, not the sum of heights.
    pub total_height: u32,
    pub main_display_index: usize,
}

impl Topology {
    /// Looks a display up by index, falling back to display 0.
    pub fn display(&self, index: usize) -> &Display {
        match self.displays.get(index) {
            Some(d) => d,
            None => {
                tracing::warn!(requested = index, "no display at index; using display 0");
                &self.displays[0]
            }
        }
    }

    pub fn has_display(&self, index: usize) -> bool {
        index < self.displays.len()
    }

    pub fn main(&self) -> &Display {
        &self.displays[self.main_display_index]
    }
}

/// 0–1000 per axis, relative to one display. The durable representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: u32,
    pub y: u32,
}

/// Display-relative logical pixels, as consumed by automation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: i32,
    pub y: i32,
}

/// Logical pixels in the canonical multi-display frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPoint {
    pub x: i32,
    pub y: i32,
}

/// Platform-native coordinates, handed only to the input injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePoint {
    pub x: i32,
    pub y: i32,
}

impl LocalPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl GlobalPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    Absolute,
    Normalized,
    Auto,
}

impl std::str::FromStr for CoordinateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "absolute" => Ok(Self::Absolute),
            "normalized" => Ok(Self::Normalized),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown coordinate mode '{other}'")),
        }
    }
}

/// How native coordinates are laid out on the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeSpace {
    /// Logical points, Y up from the bottom of the main display (Quartz).
    BottomLeftLogical,
    /// Device pixels, Y down from the top-left of the main display.
    TopLeftPhysical,
}

impl NativeSpace {
    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "windows") {
            Self::TopLeftPhysical
        } else {
            Self::BottomLeftLogical
        }
    }
}
