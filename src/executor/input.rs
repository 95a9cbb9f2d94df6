// Input-injection boundary. Real backends live outside this crate; the
// dry-run injector only logs and records what it was asked to do.
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::display::types::{GlobalPoint, LocalPoint, NativePoint};
use crate::errors::{ScreenPointError, ScreenPointResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    Left,
    Double,
    Right,
}

impl ClickKind {
    /// Operation name stored in the click history.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Left => "click",
            Self::Double => "double_click",
            Self::Right => "right_click",
        }
    }
}

impl std::str::FromStr for ClickKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "click" | "left" | "left_click" => Ok(Self::Left),
            "double" | "double_click" => Ok(Self::Double),
            "right" | "right_click" => Ok(Self::Right),
            other => Err(format!("unknown click kind '{other}'")),
        }
    }
}

/// Every representation of the point being clicked; backends pick the one they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionTarget {
    pub display_index: usize,
    pub local: LocalPoint,
    pub global: GlobalPoint,
    pub native: NativePoint,
}

#[async_trait]
pub trait InputInjector: Send + Sync {
    fn name(&self) -> &str;

    async fn click(&self, target: InjectionTarget, kind: ClickKind) -> ScreenPointResult<()>;

    async fn scroll(&self, target: InjectionTarget, dx: i32, dy: i32) -> ScreenPointResult<()> {
        let _ = (target, dx, dy);
        Err(ScreenPointError::Injection(format!("{} does not support scroll", self.name())))
    }

    async fn drag(&self, from: InjectionTarget, to: InjectionTarget) -> ScreenPointResult<()> {
        let _ = (from, to);
        Err(ScreenPointError::Injection(format!("{} does not support drag", self.name())))
    }

    async fn type_text(&self, text: &str) -> ScreenPointResult<()> {
        let _ = text;
        Err(ScreenPointError::Injection(format!("{} does not support typing", self.name())))
    }
}

/// Non-click actions seen by the dry-run injector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunAction {
    Scroll { target: InjectionTarget, dx: i32, dy: i32 },
    Drag { from: InjectionTarget, to: InjectionTarget },
    Type(String),
}

#[derive(Debug, Default)]
pub struct DryRunInjector {
    clicks: Mutex<Vec<(InjectionTarget, ClickKind)>>,
    actions: Mutex<Vec<DryRunAction>>,
}

impl DryRunInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self) -> Vec<(InjectionTarget, ClickKind)> {
        self.clicks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<DryRunAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn push_action(&self, action: DryRunAction) -> ScreenPointResult<()> {
        tracing::info!(?action, "dry-run action");
        self.actions
            .lock()
            .map_err(|_| ScreenPointError::Injection("dry-run log poisoned".into()))?
            .push(action);
        Ok(())
    }
}

#[async_trait]
impl InputInjector for DryRunInjector {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn click(&self, target: InjectionTarget, kind: ClickKind) -> ScreenPointResult<()> {
        tracing::info!(
            display = target.display_index,
            local_x = target.local.x,
            local_y = target.local.y,
            native_x = target.native.x,
            native_y = target.native.y,
            kind = kind.operation(),
            "dry-run click"
        );
        self.clicks
            .lock()
            .map_err(|_| ScreenPointError::Injection("dry-run log poisoned".into()))?
            .push((target, kind));
        Ok(())
    }

    async fn scroll(&self, target: InjectionTarget, dx: i32, dy: i32) -> ScreenPointResult<()> {
        self.push_action(DryRunAction::Scroll { target, dx, dy })
    }

    async fn drag(&self, from: InjectionTarget, to: InjectionTarget) -> ScreenPointResult<()> {
        self.push_action(DryRunAction::Drag { from, to })
    }

    async fn type_text(&self, text: &str) -> ScreenPointResult<()> {
        self.push_action(DryRunAction::Type(text.to_string()))
    }
}
