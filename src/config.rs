use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::display::types::{OriginFrame, RawDisplay};
use crate::errors::{ScreenPointError, ScreenPointResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Model name sent to the API.
    #[serde(default = "default_model")]
    pub model: String,
    /// Full endpoint URL. When absent the route's public default is used.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Optional API key stored in config.toml (env vars take precedence).
    #[serde(default)]
    pub api_key: Option<String>,
    /// "chat_completions", "messages" or "responses_stream". Inferred when absent.
    #[serde(default)]
    pub route: Option<String>,
    /// Set from OPENAI_API_KEY / OPENAI_BASE_URL; steers route inference.
    #[serde(skip)]
    pub openai_style: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key: None,
            route: None,
            openai_style: false,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Results below this confidence (0-100) are reported as low confidence.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
    #[serde(default = "default_max_markers")]
    pub max_markers: usize,
    /// Minimum distance in device pixels between two history markers.
    #[serde(default = "default_min_marker_separation")]
    pub min_marker_separation_px: f64,
    /// How long a capture may be reused for the same display/region.
    #[serde(default = "default_screenshot_reuse_ms")]
    pub screenshot_reuse_ms: u64,
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
    /// Try the dock/taskbar alias matcher before the vision model.
    #[serde(default = "default_true")]
    pub dock_shortcut: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_markers: default_max_markers(),
            min_marker_separation_px: default_min_marker_separation(),
            screenshot_reuse_ms: default_screenshot_reuse_ms(),
            capture_timeout_secs: default_capture_timeout_secs(),
            dock_shortcut: true,
        }
    }
}

fn default_confidence_threshold() -> u8 {
    50
}

fn default_max_markers() -> usize {
    8
}

fn default_min_marker_separation() -> f64 {
    40.0
}

fn default_screenshot_reuse_ms() -> u64 {
    1500
}

fn default_capture_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Root directory for per-app ledgers. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

fn default_io_timeout_secs() -> u64 {
    5
}

impl HistoryConfig {
    /// `<data_local_dir>/screenpoint/click_history`, falling back to the cwd.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("screenpoint").join("click_history"))
            .unwrap_or_else(|| PathBuf::from(".").join("click_history"))
    }

    pub fn io_timeout(&self) -> std::time::Duration {
        // Zero would make every read fail; treat it as unset.
        let secs = if self.io_timeout_secs == 0 { default_io_timeout_secs() } else { self.io_timeout_secs };
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Fixed display layout; replaces the platform query when non-empty.
    #[serde(default)]
    pub displays: Vec<StaticDisplayEntry>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            displays: Vec::new(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDisplayEntry {
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub origin_x: i32,
    #[serde(default)]
    pub origin_y: i32,
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl StaticDisplayEntry {
    /// Configured origins are already in the canonical top-left frame.
    pub fn to_raw(&self) -> RawDisplay {
        RawDisplay {
            name: self.name.clone(),
            is_main: self.is_main,
            width: self.width,
            height: self.height,
            origin_x: self.origin_x,
            origin_y: self.origin_y,
            scale_factor: self.scale_factor,
            frame: OriginFrame::TopLeft,
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Loads `config.toml` (or defaults when none exists) and applies env overrides.
pub fn load_config() -> ScreenPointResult<AppConfig> {
    let mut config = match resolve_config_path() {
        Some(path) => {
            let config = load_config_from(&path)?;
            tracing::info!(path = %path.display(), model = %config.vision.model, "config loaded");
            config
        }
        None => {
            tracing::info!("no config.toml found; using defaults");
            AppConfig::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn load_config_from(path: &std::path::Path) -> ScreenPointResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

pub fn save_config(config: &AppConfig, path: &std::path::Path) -> ScreenPointResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

/// Environment wins over the file for every variable; `SCREENPOINT_API_KEY`
/// wins over the provider-specific keys. `lookup` is injectable for tests.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let vision = &mut config.vision;

    if let Some(model) = non_empty("SCREENPOINT_MODEL") {
        vision.model = model;
    }

    if let Some(key) = non_empty("OPENAI_API_KEY") {
        vision.openai_style = true;
        vision.api_key = Some(key);
    }
    if let Some(url) = non_empty("OPENAI_BASE_URL") {
        vision.openai_style = true;
        vision.base_url = Some(url);
    }
    if !vision.openai_style {
        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            vision.api_key = Some(key);
        }
        if let Some(url) = non_empty("ANTHROPIC_BASE_URL") {
            vision.base_url = Some(url);
        }
    }
    if let Some(key) = non_empty("SCREENPOINT_API_KEY") {
        vision.api_key = Some(key);
    }

    if let Some(dir) = non_empty("SCREENPOINT_DATA_DIR") {
        config.history.data_dir = Some(PathBuf::from(dir));
    }
}

/// Fails fast when no API key is available; never retried.
pub fn require_api_key(vision: &VisionConfig) -> ScreenPointResult<String> {
    vision
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ScreenPointError::Config(
                "no vision API key: set SCREENPOINT_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY".into(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.vision.timeout_secs, 45);
        assert_eq!(config.vision.max_attempts, 3);
        assert_eq!(config.vision.backoff_base_ms, 1000);
        assert_eq!(config.locator.confidence_threshold, 50);
        assert_eq!(config.display.cache_ttl_ms, 5000);
    }

    #[test]
    fn loads_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[vision]
model = "gpt-4o"
max_tokens = 512

[[display.displays]]
name = "Built-in"
is_main = true
width = 1512
height = 982
scale_factor = 2.0
"#,
        )
        .unwrap();
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.vision.model, "gpt-4o");
        assert_eq!(config.vision.max_tokens, 512);
        assert_eq!(config.vision.timeout_secs, 45);
        assert_eq!(config.display.displays.len(), 1);
        assert_eq!(config.display.displays[0].scale_factor, 2.0);
    }

    #[test]
    fn openai_env_marks_openai_style() {
        let vars = env(&[("OPENAI_API_KEY", "sk-1"), ("ANTHROPIC_API_KEY", "ak-1")]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).cloned());
        assert!(config.vision.openai_style);
        assert_eq!(config.vision.api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn anthropic_env_used_when_no_openai() {
        let vars = env(&[("ANTHROPIC_API_KEY", "ak-1"), ("SCREENPOINT_DATA_DIR", "/tmp/sp")]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).cloned());
        assert!(!config.vision.openai_style);
        assert_eq!(config.vision.api_key.as_deref(), Some("ak-1"));
        assert_eq!(config.history.data_dir, Some(PathBuf::from("/tmp/sp")));
    }

    #[test]
    fn env_keys_override_file_values_for_both_providers() {
        let file_values = || {
            let mut config = AppConfig::default();
            config.vision.api_key = Some("file-key".into());
            config.vision.base_url = Some("https://file.example/v1".into());
            config
        };

        let mut openai = file_values();
        let vars = env(&[("OPENAI_API_KEY", "sk-env"), ("OPENAI_BASE_URL", "https://gw.example/v1")]);
        apply_env_overrides(&mut openai, |k| vars.get(k).cloned());
        assert_eq!(openai.vision.api_key.as_deref(), Some("sk-env"));
        assert_eq!(openai.vision.base_url.as_deref(), Some("https://gw.example/v1"));

        let mut anthropic = file_values();
        let vars = env(&[("ANTHROPIC_API_KEY", "ak-env"), ("ANTHROPIC_BASE_URL", "https://proxy.example")]);
        apply_env_overrides(&mut anthropic, |k| vars.get(k).cloned());
        assert_eq!(anthropic.vision.api_key.as_deref(), Some("ak-env"));
        assert_eq!(anthropic.vision.base_url.as_deref(), Some("https://proxy.example"));

        let mut untouched = file_values();
        apply_env_overrides(&mut untouched, |_| None);
        assert_eq!(untouched.vision.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = require_api_key(&VisionConfig::default()).unwrap_err();
        assert!(matches!(err, ScreenPointError::Config(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.locator.max_markers = 3;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap().locator.max_markers, 3);
    }
}
