//! Spawns a child process and streams its stdout/stderr back as opaque
//! byte chunks, the way the original `TicketScopeProcess` forwarded
//! `outReceived`/`errReceived` straight into `task_log`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use mcloud_shared::{McloudError, McloudResult};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::guard::ChildGuard;

const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A chunk of raw stdout or stderr bytes. No line buffering is
    /// assumed; a chunk may be a partial line, several lines, or an
    /// 8-byte stream-framing header (see [`crate::is_stream_header_frame`]).
    Output(Vec<u8>),
    /// The process exited. `code` is `-1` if it was killed by a signal.
    Exited { code: i32 },
}

pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `argv[0]` with the remaining elements as arguments, stream
    /// its combined stdout/stderr through the returned channel, and
    /// resolve with the exit code once the process ends. Cancelling
    /// `cancel` kills the process (and its process group on Unix).
    pub async fn run(
        argv: Vec<String>,
        cwd: Option<PathBuf>,
        env: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> McloudResult<mpsc::Receiver<ProcessEvent>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| McloudError::ValueError("empty argv".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(?argv, cwd = ?cwd, "spawning process");
        let mut child = cmd
            .spawn()
            .map_err(|e| McloudError::Internal(format!("failed to spawn {program}: {e}")))?;

        let pid = child.id().unwrap_or(0);
        let guard = Arc::new(ChildGuard::new(pid));

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let _guard = guard;
            let mut stdout_buf = [0u8; CHUNK_SIZE];
            let mut stderr_buf = [0u8; CHUNK_SIZE];
            let mut stdout_open = stdout.is_some();
            let mut stderr_open = stderr.is_some();

            loop {
                if !stdout_open && !stderr_open {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        _guard.kill();
                        break;
                    }
                    n = read_or_pending(&mut stdout, stdout_open, &mut stdout_buf) => {
                        match n {
                            Some(Ok(0)) | None => stdout_open = false,
                            Some(Ok(n)) => {
                                if tx.send(ProcessEvent::Output(stdout_buf[..n].to_vec())).await.is_err() {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "stdout read error");
                                stdout_open = false;
                            }
                        }
                    }
                    n = read_or_pending(&mut stderr, stderr_open, &mut stderr_buf) => {
                        match n {
                            Some(Ok(0)) | None => stderr_open = false,
                            Some(Ok(n)) => {
                                if tx.send(ProcessEvent::Output(stderr_buf[..n].to_vec())).await.is_err() {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "stderr read error");
                                stderr_open = false;
                            }
                        }
                    }
                }
            }

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait for child");
                    -1
                }
            };
            if code != 0 {
                let _ = tx
                    .send(ProcessEvent::Output(format!("processEnded, status {code}\n").into_bytes()))
                    .await;
            }
            let _ = tx.send(ProcessEvent::Exited { code }).await;
        });

        Ok(rx)
    }
}

/// Reads one chunk from `stream` if it's still open, otherwise never
/// resolves — lets the surrounding `select!` treat a closed half as
/// simply absent from the race instead of a busy loop.
async fn read_or_pending<R>(stream: &mut Option<R>, open: bool, buf: &mut [u8]) -> Option<std::io::Result<usize>>
where
    R: AsyncReadExt + Unpin,
{
    if !open {
        std::future::pending::<()>().await;
        unreachable!()
    }
    match stream {
        Some(s) => Some(s.read(buf).await),
        None => {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let result = ProcessRunner::run(vec![], None, vec![], CancellationToken::new()).await;
        assert!(matches!(result, Err(McloudError::ValueError(_))));
    }

    #[tokio::test]
    async fn runs_true_and_reports_zero_exit() {
        let mut rx = ProcessRunner::run(vec!["true".into()], None, vec![], CancellationToken::new())
            .await
            .unwrap();
        let mut saw_exit_zero = false;
        while let Some(event) = rx.recv().await {
            if let ProcessEvent::Exited { code } = event {
                saw_exit_zero = code == 0;
            }
        }
        assert!(saw_exit_zero);
    }

    #[tokio::test]
    async fn streams_stdout_from_echo() {
        let mut rx = ProcessRunner::run(
            vec!["echo".into(), "hello".into()],
            None,
            vec![],
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let mut collected = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ProcessEvent::Output(chunk) = event {
                collected.extend(chunk);
            }
        }
        assert_eq!(String::from_utf8(collected).unwrap(), "hello\n");
    }
}
