// Dock/taskbar shortcut: resolves "X in the dock" by matching accessibility
// item names against an alias table, without a vision request.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::perception::traits::{DockItemsSource, LocateContext, Locator};
use crate::perception::types::{DockItem, LocateOutcome, LocateRequest, Location};
use crate::process::run_jxa;

const REGION_WORDS: &[&str] = &["dock", "taskbar", "task bar"];

/// Words stripped from a description before matching.
const FILLER_WORDS: &[&str] = &[
    "in", "on", "the", "from", "at", "icon", "app", "application", "button", "click", "open", "launch", "dock",
    "taskbar", "task", "bar",
];

/// Common spoken names → names the dock actually shows.
const ALIASES: &[(&str, &str)] = &[
    ("chrome", "google chrome"),
    ("vscode", "visual studio code"),
    ("vs code", "visual studio code"),
    ("code", "visual studio code"),
    ("settings", "system settings"),
    ("system preferences", "system settings"),
    ("preferences", "system settings"),
    ("outlook", "microsoft outlook"),
    ("word", "microsoft word"),
    ("excel", "microsoft excel"),
    ("powerpoint", "microsoft powerpoint"),
    ("teams", "microsoft teams"),
    ("edge", "microsoft edge"),
    ("wechat", "微信"),
    ("weixin", "微信"),
    ("app store", "app store"),
    ("iterm", "iterm2"),
    ("bin", "trash"),
    ("recycle bin", "trash"),
];

fn normalize_name(s: &str) -> String {
    s.trim().to_lowercase().replace(['.', '-', '_'], " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The app the description refers to, with filler words removed.
pub fn extract_target(description: &str) -> String {
    normalize_name(description)
        .split(' ')
        .filter(|w| !FILLER_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn alias_for(target: &str) -> Option<&'static str> {
    ALIASES.iter().find(|(alias, _)| *alias == target).map(|(_, name)| *name)
}

/// Best matching item: exact name, then alias, then substring (3+ chars).
pub fn match_dock_item<'a>(items: &'a [DockItem], description: &str) -> Option<&'a DockItem> {
    let target = extract_target(description);
    if target.is_empty() {
        return None;
    }
    let named = |wanted: &str| items.iter().find(|i| normalize_name(&i.name) == wanted);

    if let Some(item) = named(&target) {
        return Some(item);
    }
    if let Some(item) = alias_for(&target).and_then(named) {
        return Some(item);
    }
    if target.chars().count() >= 3 {
        return items.iter().find(|i| normalize_name(&i.name).contains(&target));
    }
    None
}

pub struct DockLocator {
    source: Arc<dyn DockItemsSource>,
}

impl DockLocator {
    pub fn new(source: Arc<dyn DockItemsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Locator for DockLocator {
    fn name(&self) -> &str {
        "dock"
    }

    fn handles(&self, request: &LocateRequest) -> bool {
        let d = request.description.to_lowercase();
        REGION_WORDS.iter().any(|w| d.contains(w))
    }

    async fn locate(&self, request: &LocateRequest, ctx: &LocateContext<'_>) -> ScreenPointResult<LocateOutcome> {
        let items = self.source.items().await?;
        let Some(item) = match_dock_item(&items, &request.description) else {
            tracing::debug!(
                description = %request.description,
                items = items.len(),
                "no dock item matched; deferring"
            );
            return Ok(LocateOutcome::NotFound);
        };

        let global = item.center();
        let (display_index, local) = ctx.transformer.to_local(global);
        tracing::info!(item = %item.name, x = local.x, y = local.y, display = display_index, "dock item matched");
        Ok(LocateOutcome::Located(Location {
            local,
            global,
            display_index,
            confidence: 100,
            source: self.name().to_string(),
        }))
    }
}

/// Dock items through System Events (macOS). Positions are global logical points.
#[derive(Debug, Default)]
pub struct MacDockSource;

const DOCK_ITEMS_SCRIPT: &str = r#"
const se = Application('System Events');
const items = se.processes.byName('Dock').lists[0].uiElements();
JSON.stringify(items.map(i => {
  const p = i.position(), s = i.size();
  return { name: i.name(), x: p[0], y: p[1], width: s[0], height: s[1] };
}));
"#;

#[derive(Deserialize)]
struct RawDockItem {
    name: Option<String>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

pub fn parse_dock_items_json(json: &str) -> ScreenPointResult<Vec<DockItem>> {
    let raw: Vec<RawDockItem> =
        serde_json::from_str(json).map_err(|e| ScreenPointError::Platform(format!("dock items: {e}")))?;
    Ok(raw
        .into_iter()
        .filter_map(|r| {
            let name = r.name.filter(|n| !n.trim().is_empty())?;
            Some(DockItem {
                name,
                x: r.x.round() as i32,
                y: r.y.round() as i32,
                width: r.width.max(0.0).round() as u32,
                height: r.height.max(0.0).round() as u32,
            })
        })
        .collect())
}

#[async_trait]
impl DockItemsSource for MacDockSource {
    async fn items(&self) -> ScreenPointResult<Vec<DockItem>> {
        let out = run_jxa(DOCK_ITEMS_SCRIPT).await?;
        parse_dock_items_json(&out)
    }
}

/// The dock source for the running OS, if it has one.
pub fn platform_dock_source() -> Option<Arc<dyn DockItemsSource>> {
    if cfg!(target_os = "macos") {
        Some(Arc::new(MacDockSource))
    } else {
        None
    }
}
