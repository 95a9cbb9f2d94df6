// The explicit automation context: one topology cache, one active app's
// click history, a locator chain and an input injector.
//
// Methods take `&mut self`; callers serialize app switches and clicks.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::display::sources::platform_sources;
use crate::display::topology::DisplayTopology;
use crate::display::transform::CoordinateTransformer;
use crate::display::types::{CoordinateMode, LocalPoint, NativeSpace};
use crate::errors::ScreenPointResult;
use crate::executor::input::{ClickKind, InjectionTarget, InputInjector};
use crate::history::ledger::JsonFileLedger;
use crate::history::store::ClickHistoryStore;
use crate::history::types::{AnnotationCandidate, ClickHistoryEntry};
use crate::llm::client::VisionProviderClient;
use crate::perception::annotator::MarkerOverlay;
use crate::perception::chain::LocatorChain;
use crate::perception::dock::{platform_dock_source, DockLocator};
use crate::perception::locator::{LocatorSettings, VisionLocator};
use crate::perception::screenshot::{CachedCapture, PlatformCapture};
use crate::perception::traits::{LocateContext, Locator, ScreenCapture};
use crate::perception::types::{LocateOutcome, LocateRequest, Location};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickReport {
    pub target: InjectionTarget,
    pub entry: ClickHistoryEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElementClick {
    Clicked { location: Location, report: ClickReport },
    LowConfidence { confidence: u8, threshold: u8 },
    NotFound,
}

pub struct AutomationSession {
    topology: Arc<DisplayTopology>,
    history: ClickHistoryStore,
    locators: LocatorChain,
    capture: Arc<dyn ScreenCapture>,
    injector: Arc<dyn InputInjector>,
    native_space: NativeSpace,
    settings: LocatorSettings,
}

impl AutomationSession {
    pub fn new(
        topology: Arc<DisplayTopology>,
        history: ClickHistoryStore,
        locators: LocatorChain,
        capture: Arc<dyn ScreenCapture>,
        injector: Arc<dyn InputInjector>,
        settings: LocatorSettings,
    ) -> Self {
        Self {
            topology,
            history,
            locators,
            capture,
            injector,
            native_space: NativeSpace::for_current_platform(),
            settings,
        }
    }

    /// Wires the platform collaborators from config. Fails when no vision
    /// API key is configured.
    pub fn from_config(config: &AppConfig, injector: Arc<dyn InputInjector>) -> ScreenPointResult<Self> {
        let topology = Arc::new(DisplayTopology::new(
            platform_sources(&config.display),
            Duration::from_millis(config.display.cache_ttl_ms),
        ));
        let ledger = Arc::new(JsonFileLedger::new(
            config.history.resolved_data_dir(),
            config.history.io_timeout(),
        ));
        let capture: Arc<dyn ScreenCapture> = Arc::new(CachedCapture::new(
            Arc::new(PlatformCapture),
            Duration::from_millis(config.locator.screenshot_reuse_ms),
        ));
        let settings = LocatorSettings::from_config(&config.locator, &config.vision);
        let client = VisionProviderClient::from_config(&config.vision)?;

        let mut locators: Vec<Arc<dyn Locator>> = Vec::new();
        if config.locator.dock_shortcut {
            if let Some(source) = platform_dock_source() {
                locators.push(Arc::new(DockLocator::new(source)));
            }
        }
        locators.push(Arc::new(VisionLocator::new(
            capture.clone(),
            Arc::new(MarkerOverlay::new()),
            client,
            settings,
        )));
        let chain = LocatorChain::new(locators);
        tracing::info!(locators = ?chain.names(), injector = injector.name(), "automation session ready");

        Ok(Self::new(topology, ClickHistoryStore::new(ledger), chain, capture, injector, settings))
    }

    pub fn with_native_space(mut self, space: NativeSpace) -> Self {
        self.native_space = space;
        self
    }

    pub async fn transformer(&self) -> CoordinateTransformer {
        CoordinateTransformer::new(self.topology.get().await)
    }

    pub fn history(&self) -> &ClickHistoryStore {
        &self.history
    }

    pub fn active_app(&self) -> Option<&str> {
        self.history.active_app()
    }

    /// Switches the click-history context, loading the app's ledger.
    pub async fn set_active_app(&mut self, app_name: &str) -> ScreenPointResult<()> {
        if self.history.active_app() == Some(app_name) {
            return Ok(());
        }
        let transformer = self.transformer().await;
        self.history.load(app_name, &transformer).await?;
        tracing::info!(app = %app_name, entries = self.history.entries().len(), "active app switched");
        Ok(())
    }

    /// Resolves caller coordinates, injects the click and records it.
    pub async fn click(
        &mut self,
        x: f64,
        y: f64,
        display_index: usize,
        mode: CoordinateMode,
        kind: ClickKind,
    ) -> ScreenPointResult<ClickReport> {
        let transformer = self.transformer().await;
        let display_index = transformer.display(display_index).index;
        let local = transformer.resolve_click_coordinates(x, y, display_index, mode);
        self.inject_and_record(local, display_index, kind, &transformer).await
    }

    /// Locates an element and clicks it. Only a `Located` outcome clicks;
    /// low confidence and not-found leave the screen and history untouched.
    pub async fn click_element(
        &mut self,
        request: &LocateRequest,
        kind: ClickKind,
        cancel: &CancellationToken,
    ) -> ScreenPointResult<ElementClick> {
        let transformer = self.transformer().await;
        let outcome = {
            let ctx = LocateContext {
                transformer: &transformer,
                history: &self.history,
                cancel,
            };
            self.locators.locate(request, &ctx).await?
        };

        match outcome {
            LocateOutcome::Located(location) => {
                let report = self
                    .inject_and_record(location.local, location.display_index, kind, &transformer)
                    .await?;
                Ok(ElementClick::Clicked { location, report })
            }
            LocateOutcome::LowConfidence { confidence, threshold } => {
                tracing::info!(description = %request.description, confidence, threshold, "not clicking: low confidence");
                Ok(ElementClick::LowConfidence { confidence, threshold })
            }
            LocateOutcome::NotFound => {
                tracing::info!(description = %request.description, "not clicking: element not found");
                Ok(ElementClick::NotFound)
            }
        }
    }

    /// Feeds an external verifier's verdict on the last click into the history.
    pub async fn verify_last_click(&mut self, successful: bool) -> ScreenPointResult<Option<ClickHistoryEntry>> {
        let transformer = self.transformer().await;
        self.history.record_outcome(successful, &transformer).await
    }

    pub async fn clear_history(&mut self, app_name: &str) -> ScreenPointResult<()> {
        self.history.clear(app_name).await
    }

    /// History points that would be overlaid on the next screenshot of `display_index`.
    pub async fn annotation_set(&self, display_index: usize) -> Vec<AnnotationCandidate> {
        let transformer = self.transformer().await;
        self.history.select_annotation_set(
            display_index,
            self.settings.max_markers,
            self.settings.min_marker_separation_px,
            &transformer,
        )
    }

    async fn inject_and_record(
        &mut self,
        local: LocalPoint,
        display_index: usize,
        kind: ClickKind,
        transformer: &CoordinateTransformer,
    ) -> ScreenPointResult<ClickReport> {
        let global = transformer.to_global(local, display_index);
        let native = transformer.to_native(global, self.native_space);
        let target = InjectionTarget {
            display_index,
            local,
            global,
            native,
        };
        self.injector.click(target, kind).await?;
        self.capture.invalidate();

        let entry = self
            .history
            .record_click(local, display_index, kind.operation(), transformer)
            .await?;
        Ok(ClickReport { target, entry })
    }
}
