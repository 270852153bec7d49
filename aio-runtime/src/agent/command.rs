//! Deadline-guarded subprocess execution.

use aio_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Output {
    pub status_ok: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args..` under `timeout`. A timeout produces
/// `DeadlineExceeded` carrying whatever partial output was captured.
///
/// Output is read off the child's pipes concurrently with the wait,
/// rather than via `wait_with_output`'s all-in-one future, so a
/// timeout can still report what the process had written so far —
/// `wait_with_output` discards its buffers when its future is dropped.
pub async fn run(program: &str, args: &[&str], timeout: Duration) -> Result<Output> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| Error::internal(format!("spawn {program}: {e}")))?;

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");
    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));

    let stdout_task = tokio::spawn({
        let buf = Arc::clone(&stdout_buf);
        async move {
            let mut out = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut out).await;
            *buf.lock().await = out;
        }
    });
    let stderr_task = tokio::spawn({
        let buf = Arc::clone(&stderr_buf);
        async move {
            let mut out = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut out).await;
            *buf.lock().await = out;
        }
    });

    let awaited = tokio::time::timeout(timeout, child.wait()).await;
    match awaited {
        Ok(Ok(status)) => {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            Ok(Output {
                status_ok: status.success(),
                stdout: String::from_utf8_lossy(&stdout_buf.lock().await).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf.lock().await).into_owned(),
            })
        }
        Ok(Err(e)) => Err(Error::internal(format!("{program}: {e}"))),
        Err(_) => {
            let _ = child.kill().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let stdout = String::from_utf8_lossy(&stdout_buf.lock().await).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_buf.lock().await).into_owned();
            Err(Error::deadline_exceeded(format!(
                "{program} exceeded {timeout:?}; stdout={stdout:?} stderr={stderr:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = run("echo", &["hello"], Duration::from_secs(5)).await.unwrap();
        assert!(out.status_ok);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn times_out_long_running_commands() {
        let err = run("sleep", &["5"], Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn timeout_error_carries_partial_output() {
        let err = run("sh", &["-c", "echo partial-output; sleep 5"], Duration::from_millis(200))
            .await
            .unwrap_err();
        let Error::DeadlineExceeded(msg) = err else {
            panic!("expected DeadlineExceeded, got {err:?}");
        };
        assert!(msg.contains("partial-output"), "message did not carry captured stdout: {msg}");
    }
}
