// Platform-specific raw display geometry.
//
// Each source answers with `RawDisplay` records in its native frame; the
// normalizer in `topology.rs` is the only place frames are reconciled.
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DisplayConfig;
use crate::display::types::{OriginFrame, RawDisplay};
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::process::{run_cmd, run_jxa};

#[async_trait]
pub trait TopologySource: Send + Sync {
    fn name(&self) -> &str;

    async fn query(&self) -> ScreenPointResult<Vec<RawDisplay>>;
}

/// Picks the primary and fallback sources for the running OS.
/// A configured display list replaces the platform query entirely.
pub fn platform_sources(config: &DisplayConfig) -> Vec<Box<dyn TopologySource>> {
    if !config.displays.is_empty() {
        let raw = config.displays.iter().map(|d| d.to_raw()).collect();
        return vec![Box::new(StaticTopologySource::new(raw))];
    }

    let mut sources: Vec<Box<dyn TopologySource>> = Vec::new();
    if cfg!(target_os = "macos") {
        sources.push(Box::new(MacScreenSource));
        sources.push(Box::new(SystemProfilerSource));
    } else if cfg!(target_os = "windows") {
        sources.push(Box::new(WindowsScreenSource));
    }
    sources
}

// ── Static ──────────────────────────────────────────────────────────────────

pub struct StaticTopologySource {
    displays: Vec<RawDisplay>,
}

impl StaticTopologySource {
    pub fn new(displays: Vec<RawDisplay>) -> Self {
        Self { displays }
    }
}

#[async_trait]
impl TopologySource for StaticTopologySource {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self) -> ScreenPointResult<Vec<RawDisplay>> {
        Ok(self.displays.clone())
    }
}

// ── macOS: NSScreen ─────────────────────────────────────────────────────────

const NSSCREEN_SCRIPT: &str = r#"
ObjC.import('AppKit');
const screens = $.NSScreen.screens;
const out = [];
for (let i = 0; i < screens.count; i++) {
  const s = screens.objectAtIndex(i);
  const f = s.frame;
  out.push({
    name: ObjC.unwrap(s.localizedName),
    x: f.origin.x, y: f.origin.y,
    width: f.size.width, height: f.size.height,
    scale: s.backingScaleFactor,
    main: i === 0
  });
}
JSON.stringify(out);
"#;

#[derive(Debug, Deserialize)]
struct NsScreenFrame {
    #[serde(default)]
    name: Option<String>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default = "one")]
    scale: f64,
    #[serde(default)]
    main: bool,
}

fn one() -> f64 {
    1.0
}

/// NSScreen frames: bottom-left origin, Y up, screens[0] carries the menu bar.
pub struct MacScreenSource;

#[async_trait]
impl TopologySource for MacScreenSource {
    fn name(&self) -> &str {
        "nsscreen"
    }

    async fn query(&self) -> ScreenPointResult<Vec<RawDisplay>> {
        let out = run_jxa(NSSCREEN_SCRIPT).await?;
        parse_nsscreen_json(&out)
    }
}

pub fn parse_nsscreen_json(json: &str) -> ScreenPointResult<Vec<RawDisplay>> {
    let frames: Vec<NsScreenFrame> = serde_json::from_str(json)?;
    Ok(frames
        .into_iter()
        .enumerate()
        .map(|(i, f)| RawDisplay {
            name: f.name.unwrap_or_else(|| format!("Display {}", i + 1)),
            is_main: f.main,
            width: f.width.round().max(0.0) as u32,
            height: f.height.round().max(0.0) as u32,
            origin_x: f.x.round() as i32,
            origin_y: f.y.round() as i32,
            scale_factor: f.scale,
            frame: OriginFrame::BottomLeft,
        })
        .collect())
}

// ── macOS: system_profiler (coarse) ─────────────────────────────────────────

/// Resolution-only enumeration. Origins are unknown, so displays are laid
/// out left to right starting with the main one.
pub struct SystemProfilerSource;

#[async_trait]
impl TopologySource for SystemProfilerSource {
    fn name(&self) -> &str {
        "system_profiler"
    }

    async fn query(&self) -> ScreenPointResult<Vec<RawDisplay>> {
        let out = run_cmd("system_profiler", &["SPDisplaysDataType", "-json"]).await?;
        parse_system_profiler_json(&out)
    }
}

pub fn parse_system_profiler_json(json: &str) -> ScreenPointResult<Vec<RawDisplay>> {
    let root: serde_json::Value = serde_json::from_str(json)?;
    let gpus = root["SPDisplaysDataType"]
        .as_array()
        .ok_or_else(|| ScreenPointError::Platform("SPDisplaysDataType missing".into()))?;

    let mut found: Vec<(String, bool, (u32, u32), Option<(u32, u32)>)> = Vec::new();
    for gpu in gpus {
        let Some(ndrvs) = gpu["spdisplays_ndrvs"].as_array() else {
            continue;
        };
        for d in ndrvs {
            let Some(logical) = d["_spdisplays_resolution"].as_str().and_then(parse_resolution) else {
                continue;
            };
            let pixels = d["_spdisplays_pixels"].as_str().and_then(parse_resolution);
            let name = d["_name"].as_str().unwrap_or("Display").to_string();
            let is_main = d["spdisplays_main"].as_str() == Some("spdisplays_yes");
            found.push((name, is_main, logical, pixels));
        }
    }

    // Main first so the left-to-right layout starts at the origin.
    found.sort_by_key(|(_, is_main, _, _)| !*is_main);

    let mut next_x = 0i32;
    Ok(found
        .into_iter()
        .map(|(name, is_main, (w, h), pixels)| {
            let scale = pixels
                .map(|(pw, _)| pw as f64 / w.max(1) as f64)
                .unwrap_or(1.0);
            let raw = RawDisplay {
                name,
                is_main,
                width: w,
                height: h,
                origin_x: next_x,
                origin_y: 0,
                scale_factor: scale,
                frame: OriginFrame::TopLeft,
            };
            next_x += w as i32;
            raw
        })
        .collect())
}

/// Parses "1512 x 982 @ 120.00Hz" or "3024 x 1964" into (w, h).
fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split_whitespace();
    let w = parts.next()?.parse().ok()?;
    if parts.next()? != "x" {
        return None;
    }
    let h = parts.next()?.parse().ok()?;
    Some((w, h))
}

// ── Windows: System.Windows.Forms.Screen ────────────────────────────────────

/// Makes the PowerShell process per-monitor DPI aware so screen bounds and
/// capture coordinates are device pixels, and exposes `GetDpiForMonitor`.
pub(crate) const WINDOWS_DPI_PREAMBLE: &str = r#"
Add-Type @'
using System;
using System.Runtime.InteropServices;
public static class ScreenPointDpi {
    [StructLayout(LayoutKind.Sequential)] public struct POINT { public int X; public int Y; }
    [DllImport("user32.dll")] public static extern bool SetProcessDpiAwarenessContext(IntPtr value);
    [DllImport("user32.dll")] public static extern IntPtr MonitorFromPoint(POINT pt, uint flags);
    [DllImport("shcore.dll")] public static extern int GetDpiForMonitor(IntPtr monitor, int kind, out uint dpiX, out uint dpiY);
}
'@
[void][ScreenPointDpi]::SetProcessDpiAwarenessContext([IntPtr](-4))
"#;

const ALL_SCREENS_SCRIPT: &str = r#"
Add-Type -AssemblyName System.Windows.Forms
[System.Windows.Forms.Screen]::AllScreens | ForEach-Object {
    $pt = New-Object ScreenPointDpi+POINT
    $pt.X = $_.Bounds.X + 1; $pt.Y = $_.Bounds.Y + 1
    $dpiX = [uint32]0; $dpiY = [uint32]0
    $hr = [ScreenPointDpi]::GetDpiForMonitor([ScreenPointDpi]::MonitorFromPoint($pt, 2), 0, [ref]$dpiX, [ref]$dpiY)
    [pscustomobject]@{
        name = $_.DeviceName; primary = $_.Primary
        x = $_.Bounds.X; y = $_.Bounds.Y; width = $_.Bounds.Width; height = $_.Bounds.Height
        dpi = $(if ($hr -eq 0) { $dpiX } else { $null })
    }
} | ConvertTo-Json -Compress
"#;

/// Windows' logical pixel density.
const BASE_DPI: f64 = 96.0;

#[derive(Debug, Deserialize)]
struct FormsScreen {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    primary: bool,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    /// Effective monitor DPI; absent when the query failed.
    #[serde(default)]
    dpi: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<FormsScreen>),
    One(FormsScreen),
}

/// Screen bounds are top-left, primary-relative device pixels; each screen is
/// divided by its own DPI scale to get logical points.
pub struct WindowsScreenSource;

#[async_trait]
impl TopologySource for WindowsScreenSource {
    fn name(&self) -> &str {
        "forms_screen"
    }

    async fn query(&self) -> ScreenPointResult<Vec<RawDisplay>> {
        let script = format!("{WINDOWS_DPI_PREAMBLE}{ALL_SCREENS_SCRIPT}");
        let out = run_cmd("powershell", &["-NoProfile", "-NonInteractive", "-Command", &script]).await?;
        parse_forms_screen_json(&out)
    }
}

pub fn parse_forms_screen_json(json: &str) -> ScreenPointResult<Vec<RawDisplay>> {
    // ConvertTo-Json emits a bare object when there is a single screen.
    let screens = match serde_json::from_str::<OneOrMany>(json)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(s) => vec![s],
    };
    Ok(screens
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let scale = match s.dpi {
                Some(dpi) if dpi > 0 => (dpi as f64 / BASE_DPI).max(1.0),
                _ => {
                    tracing::warn!(screen = i, "no monitor DPI reported; assuming 100% scaling");
                    1.0
                }
            };
            let logical = |v: f64| (v / scale).round();
            RawDisplay {
                name: s
                    .name
                    .map(|n| n.trim_start_matches(r"\\.\").to_string())
                    .unwrap_or_else(|| format!("Display {}", i + 1)),
                is_main: s.primary,
                width: logical(s.width as f64) as u32,
                height: logical(s.height as f64) as u32,
                origin_x: logical(s.x as f64) as i32,
                origin_y: logical(s.y as f64) as i32,
                scale_factor: scale,
                frame: OriginFrame::TopLeft,
            }
        })
        .collect())
}
