use std::future::Future;
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;

use crate::error::{Result, ScanError};

static RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

/// Shared runtime driving every external process; the library API stays synchronous.
pub fn runtime() -> Result<&'static Runtime> {
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("smartscan-process")
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| ScanError::Recognition(format!("cannot start process runtime: {e}")))
}

/// Await `fut`, failing with [`ScanError::Timeout`] once `limit` has passed.
pub async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(ScanError::Timeout(limit))),
        None => fut.await,
    }
}

/// Run `command` to completion, feeding `stdin` and capturing stdout/stderr.
///
/// With a `timeout`, a child still running at the deadline is killed and the
/// call fails with [`ScanError::Timeout`].
pub fn run_command(command: Command, stdin: Option<&[u8]>, timeout: Option<Duration>) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut command = tokio::process::Command::from(command);
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    runtime()?.block_on(async {
        let mut child = command
            .spawn()
            .map_err(|e| ScanError::Recognition(format!("failed to invoke {program}: {e}")))?;

        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                // A child that exits without reading its input is not an error here;
                // its exit status tells the story.
                let _ = pipe.write_all(input).await;
            }
        };
        let run = async {
            let (_, output) = tokio::join!(feed, child.wait_with_output());
            output.map_err(|e| ScanError::Recognition(format!("failed waiting for {program}: {e}")))
        };

        // Dropping the unfinished future drops the child, which kills it.
        bounded(timeout, run).await
    })
}

/// Fail with the child's stderr when it exited unsuccessfully.
pub fn check_status(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ScanError::Recognition(format!(
        "{program} failed ({}): {}",
        output.status,
        stderr.trim()
    )))
}
