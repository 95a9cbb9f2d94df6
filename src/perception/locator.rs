// Vision-model element locator.
//
// One locate runs Idle → Capturing → Annotating → Requesting → Parsing →
// Converting → Decided. Transport retries happen inside the provider
// client; a malformed answer fails this locate without another request.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LocatorConfig, VisionConfig};
use crate::display::types::{Display, LocalPoint};
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::history::types::AnnotationCandidate;
use crate::llm::client::VisionProviderClient;
use crate::llm::types::ImagePayload;
use crate::perception::prompt::build_locate_prompt;
use crate::perception::response::parse_vision_answer;
use crate::perception::traits::{Annotator, LocateContext, Locator, ScreenCapture};
use crate::perception::types::{
    BoundingBox, CaptureRegion, CapturedImage, LocateOutcome, LocateRequest, LocateState, Location, Marker,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorSettings {
    pub confidence_threshold: u8,
    pub max_markers: usize,
    pub min_marker_separation_px: f64,
    pub capture_timeout: Duration,
    pub max_tokens: u32,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self::from_config(&LocatorConfig::default(), &VisionConfig::default())
    }
}

impl LocatorSettings {
    pub fn from_config(locator: &LocatorConfig, vision: &VisionConfig) -> Self {
        Self {
            confidence_threshold: locator.confidence_threshold.min(100),
            max_markers: locator.max_markers,
            min_marker_separation_px: locator.min_marker_separation_px,
            capture_timeout: Duration::from_secs(locator.capture_timeout_secs.max(1)),
            max_tokens: vision.max_tokens,
        }
    }
}

pub struct VisionLocator {
    capture: Arc<dyn ScreenCapture>,
    annotator: Arc<dyn Annotator>,
    client: VisionProviderClient,
    settings: LocatorSettings,
}

impl VisionLocator {
    pub fn new(
        capture: Arc<dyn ScreenCapture>,
        annotator: Arc<dyn Annotator>,
        client: VisionProviderClient,
        settings: LocatorSettings,
    ) -> Self {
        Self {
            capture,
            annotator,
            client,
            settings,
        }
    }

    pub fn settings(&self) -> &LocatorSettings {
        &self.settings
    }

    async fn capture_with_timeout(
        &self,
        display: &Display,
        region: Option<CaptureRegion>,
        ctx: &LocateContext<'_>,
    ) -> ScreenPointResult<CapturedImage> {
        let timeout = self.settings.capture_timeout;
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ScreenPointError::Cancelled),
            res = tokio::time::timeout(timeout, self.capture.capture(display, region)) => match res {
                Ok(image) => image,
                Err(_) => Err(ScreenPointError::Timeout {
                    operation: "screen capture",
                    millis: timeout.as_millis() as u64,
                }),
            },
        }
    }

    /// Overlays history markers. No history (or a failed overlay) leaves the
    /// image untouched and yields no markers.
    fn annotate(
        &self,
        image: &CapturedImage,
        display: &Display,
        candidates: &[AnnotationCandidate],
    ) -> (Vec<u8>, Vec<Marker>) {
        let markers = markers_for(candidates, image, display);
        if markers.is_empty() {
            return (image.bytes.clone(), markers);
        }
        match self.annotator.annotate(&image.bytes, &markers) {
            Ok(bytes) => (bytes, markers),
            Err(e) => {
                tracing::warn!(error = %e, "history overlay failed; sending plain screenshot");
                (image.bytes.clone(), Vec::new())
            }
        }
    }
}

fn transition(state: &mut LocateState, next: LocateState) {
    tracing::debug!(from = ?*state, to = ?next, "locate state");
    *state = next;
}

/// History points in image pixel coordinates; points outside a captured
/// region are left out.
pub fn markers_for(candidates: &[AnnotationCandidate], image: &CapturedImage, display: &Display) -> Vec<Marker> {
    let (ox, oy) = image.region.map_or((0, 0), |r| (r.x, r.y));
    candidates
        .iter()
        .filter_map(|c| {
            let x = ((c.entry.x - ox) as f64 * display.scale_factor).round() as i32;
            let y = ((c.entry.y - oy) as f64 * display.scale_factor).round() as i32;
            if x < 0 || y < 0 || x >= image.width as i32 || y >= image.height as i32 {
                return None;
            }
            Some(Marker {
                x,
                y,
                label: c.rank.to_string(),
                norm_label: format!("{},{}", c.entry.normalized.x, c.entry.normalized.y),
            })
        })
        .collect()
}

/// Normalized box → image pixels → centre → logical pixels (÷ scale factor),
/// offset by the captured region and clamped to the display.
pub fn box_to_local(bbox: &BoundingBox, image: &CapturedImage, display: &Display) -> LocalPoint {
    let (cxn, cyn) = bbox.center();
    let px = cxn / 1000.0 * image.width as f64;
    let py = cyn / 1000.0 * image.height as f64;
    let scale = if display.scale_factor > 0.0 { display.scale_factor } else { 1.0 };
    let (ox, oy) = image.region.map_or((0, 0), |r| (r.x, r.y));
    let x = (px / scale).round() as i32 + ox;
    let y = (py / scale).round() as i32 + oy;
    let max_x = display.width.saturating_sub(1) as i32;
    let max_y = display.height.saturating_sub(1) as i32;
    LocalPoint::new(x.clamp(0, max_x), y.clamp(0, max_y))
}

#[async_trait]
impl Locator for VisionLocator {
    fn name(&self) -> &str {
        "vision"
    }

    fn handles(&self, _request: &LocateRequest) -> bool {
        true
    }

    async fn locate(&self, request: &LocateRequest, ctx: &LocateContext<'_>) -> ScreenPointResult<LocateOutcome> {
        let mut state = LocateState::Idle;
        let display = ctx.transformer.display(request.display_index).clone();
        let display_index = display.index;
        tracing::info!(description = %request.description, display = display_index, "vision locate started");

        transition(&mut state, LocateState::Capturing);
        let image = self.capture_with_timeout(&display, request.region, ctx).await?;

        transition(&mut state, LocateState::Annotating);
        let candidates = ctx.history.select_annotation_set(
            display.index,
            self.settings.max_markers,
            self.settings.min_marker_separation_px,
            ctx.transformer,
        );
        let (annotated, markers) = self.annotate(&image, &display, &candidates);
        tracing::debug!(markers = markers.len(), "annotation done");

        transition(&mut state, LocateState::Requesting);
        let prompt = build_locate_prompt(&request.description, &markers);
        let text = self
            .client
            .complete(ImagePayload::png(annotated), &prompt, self.settings.max_tokens, ctx.cancel)
            .await?;

        transition(&mut state, LocateState::Parsing);
        let answer = parse_vision_answer(&text).map_err(|e| {
            tracing::warn!(error = %e, response_len = text.len(), "unusable vision answer");
            e
        })?;

        transition(&mut state, LocateState::Converting);
        let local = box_to_local(&answer.bbox, &image, &display);
        let global = ctx.transformer.to_global(local, display.index);

        transition(&mut state, LocateState::Decided);
        if answer.confidence < self.settings.confidence_threshold {
            tracing::info!(
                confidence = answer.confidence,
                threshold = self.settings.confidence_threshold,
                "vision locate below confidence threshold"
            );
            return Ok(LocateOutcome::LowConfidence {
                confidence: answer.confidence,
                threshold: self.settings.confidence_threshold,
            });
        }
        tracing::info!(
            x = local.x,
            y = local.y,
            display = display_index,
            confidence = answer.confidence,
            "element located"
        );
        Ok(LocateOutcome::Located(Location {
            local,
            global,
            display_index: display.index,
            confidence: answer.confidence,
            source: self.name().to_string(),
        }))
    }
}
