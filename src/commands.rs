use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::AppConfig;
use crate::display::sources::platform_sources;
use crate::display::topology::DisplayTopology;
use crate::display::transform::CoordinateTransformer;
use crate::display::types::{CoordinateMode, NativeSpace};
use crate::errors::ScreenPointResult;
use crate::history::ledger::JsonFileLedger;
use crate::history::store::ClickHistoryStore;

pub const USAGE: &str = "usage: screenpoint <command>

commands:
  displays                          print the normalized display topology
  resolve <x> <y> [display] [mode]  resolve a click point (mode: absolute|normalized|auto)
  history <app>                     print the click history of an app
  clear <app>                       delete the click history of an app
  version                           print the version";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Displays,
    Resolve {
        x: f64,
        y: f64,
        display_index: usize,
        mode: CoordinateMode,
    },
    History { app: String },
    Clear { app: String },
    Version,
}

/// Parses CLI arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    let arg = |i: usize, what: &str| args.get(i).ok_or_else(|| format!("missing {what}"));
    let number = |i: usize, what: &str| -> Result<f64, String> {
        arg(i, what)?.parse::<f64>().map_err(|e| format!("invalid {what}: {e}"))
    };

    match args.first().map(String::as_str) {
        Some("displays") => Ok(Command::Displays),
        Some("resolve") => {
            let x = number(1, "x")?;
            let y = number(2, "y")?;
            let display_index = match args.get(3) {
                Some(d) => d.parse().map_err(|e| format!("invalid display index: {e}"))?,
                None => 0,
            };
            let mode = match args.get(4) {
                Some(m) => m.parse()?,
                None => CoordinateMode::Auto,
            };
            Ok(Command::Resolve { x, y, display_index, mode })
        }
        Some("history") => Ok(Command::History { app: arg(1, "app name")?.clone() }),
        Some("clear") => Ok(Command::Clear { app: arg(1, "app name")?.clone() }),
        Some("version") | Some("--version") | Some("-V") => Ok(Command::Version),
        Some(other) => Err(format!("unknown command '{other}'")),
        None => Err("no command given".into()),
    }
}

fn topology(config: &AppConfig) -> DisplayTopology {
    DisplayTopology::new(
        platform_sources(&config.display),
        Duration::from_millis(config.display.cache_ttl_ms),
    )
}

fn history_store(config: &AppConfig) -> ClickHistoryStore {
    ClickHistoryStore::new(Arc::new(JsonFileLedger::new(
        config.history.resolved_data_dir(),
        config.history.io_timeout(),
    )))
}

/// Runs one command and returns its JSON result.
pub async fn run(command: Command, config: &AppConfig) -> ScreenPointResult<serde_json::Value> {
    tracing::debug!(?command, "running command");
    match command {
        Command::Displays => {
            let topology = topology(config).get().await;
            Ok(serde_json::to_value(topology.as_ref())?)
        }
        Command::Resolve { x, y, display_index, mode } => {
            let transformer = CoordinateTransformer::new(topology(config).get().await);
            let display_index = transformer.display(display_index).index;
            let local = transformer.resolve_click_coordinates(x, y, display_index, mode);
            let global = transformer.to_global(local, display_index);
            let native = transformer.to_native(global, NativeSpace::for_current_platform());
            let normalized = transformer.local_to_normalized(local, display_index);
            Ok(json!({
                "displayIndex": display_index,
                "local": local,
                "global": global,
                "native": native,
                "normalized": normalized,
            }))
        }
        Command::History { app } => {
            let transformer = CoordinateTransformer::new(topology(config).get().await);
            let mut store = history_store(config);
            store.load(&app, &transformer).await?;
            Ok(json!({
                "appName": app,
                "clicks": store.entries(),
            }))
        }
        Command::Clear { app } => {
            history_store(config).clear(&app).await?;
            Ok(json!({ "appName": app, "cleared": true }))
        }
        Command::Version => Ok(json!({ "version": env!("CARGO_PKG_VERSION") })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticDisplayEntry;
    use crate::display::types::LocalPoint;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.history.data_dir = Some(dir.to_path_buf());
        config.display.displays = vec![StaticDisplayEntry {
            name: "Main".into(),
            is_main: true,
            width: 1000,
            height: 500,
            origin_x: 0,
            origin_y: 0,
            scale_factor: 1.0,
        }];
        config
    }

    #[test]
    fn parses_resolve_with_defaults() {
        assert_eq!(
            parse_args(&args("resolve 10 20")).unwrap(),
            Command::Resolve { x: 10.0, y: 20.0, display_index: 0, mode: CoordinateMode::Auto }
        );
        assert_eq!(
            parse_args(&args("resolve 500 500 1 normalized")).unwrap(),
            Command::Resolve { x: 500.0, y: 500.0, display_index: 1, mode: CoordinateMode::Normalized }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args("resolve ten 20")).is_err());
        assert!(parse_args(&args("resolve 1 2 0 sideways")).is_err());
        assert!(parse_args(&args("history")).is_err());
        assert!(parse_args(&args("dance")).is_err());
        assert!(parse_args(&[]).is_err());
    }

    #[tokio::test]
    async fn resolve_uses_configured_displays() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let out = run(parse_args(&args("resolve 500 500 0 normalized")).unwrap(), &cfg).await.unwrap();
        assert_eq!(out["local"]["x"], 500);
        assert_eq!(out["local"]["y"], 250);
        assert_eq!(out["normalized"]["x"], 500);
    }

    #[tokio::test]
    async fn history_then_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let transformer = CoordinateTransformer::new(topology(&cfg).get().await);
        let mut store = history_store(&cfg);
        store.load("Slack", &transformer).await.unwrap();
        store.record_click(LocalPoint::new(10, 10), 0, "click", &transformer).await.unwrap();

        let out = run(Command::History { app: "Slack".into() }, &cfg).await.unwrap();
        assert_eq!(out["clicks"].as_array().unwrap().len(), 1);

        run(Command::Clear { app: "Slack".into() }, &cfg).await.unwrap();
        let out = run(Command::History { app: "Slack".into() }, &cfg).await.unwrap();
        assert!(out["clicks"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn displays_lists_topology() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(Command::Displays, &config(dir.path())).await.unwrap();
        assert_eq!(out["totalWidth"], 1000);
        assert_eq!(out["displays"][0]["isMain"], true);
    }
}
