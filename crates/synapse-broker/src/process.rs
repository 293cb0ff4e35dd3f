//! Child-process spawn/capture/timeout (spec §4.B steps 6-8), grounded on
//! the `tokio::process::Command` spawn/capture/timeout shape in the
//! teacher's code evaluator, generalized to the SIGTERM-then-SIGKILL
//! cancellation contract spec §5 requires.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::BrokerError;

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_success: bool,
    pub exit_code: Option<i32>,
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

/// Spawn `command argv`, write `stdin_text` then close stdin, and capture
/// stdout/stderr. On `timeout` expiry sends SIGTERM, waits `kill_grace`,
/// then SIGKILLs via `Child::start_kill` (spec §4.B step 7, §5
/// "Cancellation").
pub async fn spawn_and_capture(
    command: &str,
    argv: &[String],
    stdin_text: &str,
    timeout: Duration,
    kill_grace: Duration,
) -> Result<ProcessOutcome, BrokerError> {
    let mut child = Command::new(command)
        .args(argv)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BrokerError::Spawn(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(stdin_text.as_bytes())
            .await
            .map_err(|e| BrokerError::Spawn(e.to_string()))?;
        drop(stdin);
    }

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| BrokerError::Spawn(e.to_string()))?;
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            Ok(ProcessOutcome {
                stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
                stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
                exit_success: status.success(),
                exit_code: status.code(),
            })
        }
        _ = tokio::time::sleep(timeout) => {
            if let Some(pid) = child.id() {
                send_sigterm(pid);
            }
            if tokio::time::timeout(kill_grace, child.wait()).await.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(BrokerError::ProcessTimeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_successful_exit() {
        let outcome = spawn_and_capture(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            "",
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert!(outcome.exit_success);
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn s6_timeout_kills_long_running_child() {
        let start = std::time::Instant::now();
        let result = spawn_and_capture(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            "",
            Duration::from_millis(200),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(BrokerError::ProcessTimeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn captures_stderr_and_nonzero_exit() {
        let outcome = spawn_and_capture(
            "sh",
            &["-c".to_string(), "echo oops 1>&2; exit 1".to_string()],
            "",
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert!(!outcome.exit_success);
        assert_eq!(outcome.stderr.trim(), "oops");
    }
}
