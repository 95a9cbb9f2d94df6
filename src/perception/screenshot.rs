// Screen capture through the platform's own tools, plus a short-lived reuse cache.
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::display::sources::WINDOWS_DPI_PREAMBLE;
use crate::display::types::Display;
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{CaptureRegion, CapturedImage};
use crate::process::run_cmd;

/// Captures with `screencapture` (macOS) or GDI via PowerShell (Windows).
///
/// Rectangles are passed in global logical points on macOS and in device
/// pixels on Windows; both produce images at device resolution.
#[derive(Debug, Default)]
pub struct PlatformCapture;

fn temp_png_path() -> PathBuf {
    std::env::temp_dir().join(format!("screenpoint-{}.png", uuid::Uuid::new_v4()))
}

/// Logical rectangle of `region` (or the whole display) in the global frame.
fn global_rect(display: &Display, region: Option<CaptureRegion>) -> (i32, i32, u32, u32) {
    match region {
        Some(r) => (display.origin_x + r.x, display.origin_y + r.y, r.width, r.height),
        None => (display.origin_x, display.origin_y, display.width, display.height),
    }
}

const WINDOWS_CAPTURE_SCRIPT: &str = r#"
Add-Type -AssemblyName System.Drawing
$bmp = New-Object System.Drawing.Bitmap {w}, {h}
$g = [System.Drawing.Graphics]::FromImage($bmp)
$g.CopyFromScreen({x}, {y}, 0, 0, $bmp.Size)
$bmp.Save('{path}', [System.Drawing.Imaging.ImageFormat]::Png)
$g.Dispose(); $bmp.Dispose()
"#;

#[async_trait]
impl ScreenCapture for PlatformCapture {
    async fn capture(&self, display: &Display, region: Option<CaptureRegion>) -> ScreenPointResult<CapturedImage> {
        let (x, y, w, h) = global_rect(display, region);
        if w == 0 || h == 0 {
            return Err(ScreenPointError::Capture("empty capture rectangle".into()));
        }
        let path = temp_png_path();
        let path_str = path.to_string_lossy().to_string();

        if cfg!(target_os = "macos") {
            let rect = format!("{x},{y},{w},{h}");
            run_cmd("screencapture", &["-x", "-t", "png", "-R", &rect, &path_str]).await?;
        } else if cfg!(target_os = "windows") {
            let s = display.scale_factor;
            let script = format!("{WINDOWS_DPI_PREAMBLE}{WINDOWS_CAPTURE_SCRIPT}")
                .replace("{x}", &((x as f64 * s).round() as i64).to_string())
                .replace("{y}", &((y as f64 * s).round() as i64).to_string())
                .replace("{w}", &((w as f64 * s).round() as u64).to_string())
                .replace("{h}", &((h as f64 * s).round() as u64).to_string())
                .replace("{path}", &path_str);
            run_cmd("powershell", &["-NoProfile", "-NonInteractive", "-Command", &script]).await?;
        } else {
            return Err(ScreenPointError::Capture("no screen capture backend for this platform".into()));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ScreenPointError::Capture(format!("read {}: {e}", path.display())))?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(error = %e, path = %path.display(), "temp capture not removed");
        }

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| ScreenPointError::Capture(format!("decode capture: {e}")))?;
        let display_index = display.index;
        tracing::debug!(
            display = display_index,
            width = decoded.width(),
            height = decoded.height(),
            bytes = bytes.len(),
            "screen captured"
        );
        Ok(CapturedImage {
            bytes,
            width: decoded.width(),
            height: decoded.height(),
            display_index,
            region,
            captured_at: Instant::now(),
        })
    }
}

/// Reuses the last capture for the same display and region for a short window.
///
/// Every `invalidate` bumps a generation counter; a capture that started
/// before the bump is returned to its caller but never cached or reused.
pub struct CachedCapture {
    inner: Arc<dyn ScreenCapture>,
    reuse_for: Duration,
    generation: AtomicU64,
    last: Mutex<Option<(u64, CapturedImage)>>,
}

impl CachedCapture {
    pub fn new(inner: Arc<dyn ScreenCapture>, reuse_for: Duration) -> Self {
        Self {
            inner,
            reuse_for,
            generation: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ScreenCapture for CachedCapture {
    async fn capture(&self, display: &Display, region: Option<CaptureRegion>) -> ScreenPointResult<CapturedImage> {
        let display_index = display.index;
        let generation = self.generation.load(Ordering::SeqCst);
        {
            let last = self.last.lock().await;
            if let Some((cached_gen, cached)) = last.as_ref() {
                let fresh = cached.captured_at.elapsed() < self.reuse_for;
                if *cached_gen == generation
                    && fresh
                    && cached.display_index == display_index
                    && cached.region == region
                {
                    tracing::debug!(
                        display = display_index,
                        age_ms = cached.captured_at.elapsed().as_millis() as u64,
                        "reusing recent capture"
                    );
                    return Ok(cached.clone());
                }
            }
        }

        let image = self.inner.capture(display, region).await?;

        let mut last = self.last.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *last = Some((generation, image.clone()));
        } else {
            tracing::debug!(display = display_index, "cache invalidated during capture; result not kept");
        }
        Ok(image)
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
