// SPDX-License-Identifier: MIT

//! Subprocess execution with a hard timeout, used for pool scale-check
//! commands and startup hint commands, so a runaway process cannot pin the
//! controller.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for a pool's scale-check command.
pub const SCALE_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a session's pre-start / session-setup commands.
pub const STARTUP_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for an image pre-check.
pub const IMAGE_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `cmd` and kill it if it outlives `timeout`. Tokio's `Child` kills the
/// underlying process on drop, so a timed-out command is not left behind.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}

/// Outcome of a pool scale-check command. A three-way exit-code contract:
/// 0 yields a count, 2 means "not needed right now" and is not a failure,
/// anything else is a genuine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCheckOutcome {
    /// Exit code 0: stdout's first line is the desired instance count.
    Desired(u32),
    /// Exit code 2: the pool reports it doesn't need scaling right now.
    /// Treated the same as falling back to the pool's configured minimum,
    /// and is not a failure.
    NotNeeded,
}

#[derive(Debug, thiserror::Error)]
pub enum ScaleCheckError {
    #[error("scale-check command failed: {0}")]
    Exec(String),
    #[error("scale-check exited with status {0}")]
    UnexpectedExitCode(i32),
    #[error("scale-check stdout was not a valid count: {0:?}")]
    UnparseableCount(String),
}

/// Run a pool's scale-check command and interpret its exit code and stdout.
pub async fn run_scale_check(
    mut cmd: Command,
    timeout: Duration,
) -> Result<ScaleCheckOutcome, ScaleCheckError> {
    cmd.kill_on_drop(true);
    let output = run_with_timeout(cmd, timeout, "scale-check")
        .await
        .map_err(ScaleCheckError::Exec)?;

    match output.status.code() {
        Some(0) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let first_line = stdout.lines().next().unwrap_or("").trim();
            first_line
                .parse::<u32>()
                .map(ScaleCheckOutcome::Desired)
                .map_err(|_| ScaleCheckError::UnparseableCount(first_line.to_string()))
        }
        Some(2) => Ok(ScaleCheckOutcome::NotNeeded),
        Some(code) => Err(ScaleCheckError::UnexpectedExitCode(code)),
        None => Err(ScaleCheckError::Exec(
            "scale-check terminated by signal".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_zero_with_count_is_desired() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 3");
        let outcome = run_scale_check(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, ScaleCheckOutcome::Desired(3));
    }

    #[tokio::test]
    async fn exit_two_is_not_needed() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 2");
        let outcome = run_scale_check(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, ScaleCheckOutcome::NotNeeded);
    }

    #[tokio::test]
    async fn other_exit_code_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 1");
        let err = run_scale_check(cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ScaleCheckError::UnexpectedExitCode(1)));
    }

    #[tokio::test]
    async fn non_numeric_stdout_on_success_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo not-a-number");
        let err = run_scale_check(cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ScaleCheckError::UnparseableCount(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let err = run_with_timeout(cmd, Duration::from_millis(50), "slow")
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }
}
