pub mod commands;
pub mod config;
pub mod display;
pub mod errors;
pub mod executor;
pub mod history;
pub mod llm;
pub mod perception;
pub mod process;
pub mod session;

#[cfg(test)]
mod test_support;

pub use errors::{ScreenPointError, ScreenPointResult};
pub use session::AutomationSession;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
