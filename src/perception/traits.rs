use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::display::transform::CoordinateTransformer;
use crate::display::types::Display;
use crate::errors::ScreenPointResult;
use crate::history::store::ClickHistoryStore;
use crate::perception::types::{CaptureRegion, CapturedImage, DockItem, LocateOutcome, LocateRequest, Marker};

/// Produces device-pixel screenshots of a display or a region of it.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self, display: &Display, region: Option<CaptureRegion>) -> ScreenPointResult<CapturedImage>;

    /// Drops any reusable capture. Called after the screen is known to change.
    fn invalidate(&self) {}
}

/// Draws history markers onto a screenshot and returns the new image bytes.
pub trait Annotator: Send + Sync {
    fn annotate(&self, image: &[u8], markers: &[Marker]) -> ScreenPointResult<Vec<u8>>;
}

/// Everything a locator may read while answering one request.
pub struct LocateContext<'a> {
    pub transformer: &'a CoordinateTransformer,
    pub history: &'a ClickHistoryStore,
    pub cancel: &'a CancellationToken,
}

/// One strategy for turning a description into a screen location.
///
/// `handles` is a cheap capability check; a locator that returns
/// `LocateOutcome::NotFound` lets the next one in the chain try.
#[async_trait]
pub trait Locator: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, request: &LocateRequest) -> bool;

    async fn locate(&self, request: &LocateRequest, ctx: &LocateContext<'_>) -> ScreenPointResult<LocateOutcome>;
}

#[async_trait]
pub trait DockItemsSource: Send + Sync {
    async fn items(&self) -> ScreenPointResult<Vec<DockItem>>;
}
