use std::time::Duration;

use crate::errors::{ScreenPointError, ScreenPointResult};

/// Timeout for helper processes (osascript, powershell, system_profiler).
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Run a command with a timeout, returning trimmed stdout on success.
pub async fn run_cmd(program: &str, args: &[&str]) -> ScreenPointResult<String> {
    let result = tokio::time::timeout(
        CMD_TIMEOUT,
        tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ScreenPointError::Platform(
                    format!("{program} failed: {stderr}").trim().to_string(),
                ))
            }
        }
        Ok(Err(e)) => Err(ScreenPointError::Platform(format!("failed to execute {program}: {e}"))),
        Err(_) => Err(ScreenPointError::Timeout {
            operation: "helper process",
            millis: CMD_TIMEOUT.as_millis() as u64,
        }),
    }
}

/// Runs a JavaScript-for-Automation snippet through `osascript`.
pub async fn run_jxa(script: &str) -> ScreenPointResult<String> {
    run_cmd("osascript", &["-l", "JavaScript", "-e", script]).await
}
