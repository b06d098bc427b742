//! Runs a one-off child process to completion, forwarding its combined
//! output as ticket progress exactly like `TicketScopeProcess` did for
//! `backup`/`machine`: every output chunk is logged, and the caller only
//! learns the final exit code.

use std::path::PathBuf;

use mcloud_process::{ProcessEvent, ProcessRunner};
use mcloud_registry::TaskContext;
use mcloud_shared::McloudResult;
use tokio_util::sync::CancellationToken;

pub async fn run_process_to_completion(
    ctx: &TaskContext,
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
) -> McloudResult<i32> {
    let mut rx = ProcessRunner::run(argv, cwd, env, CancellationToken::new()).await?;
    let mut exit_code = 0;
    while let Some(event) = rx.recv().await {
        match event {
            ProcessEvent::Output(chunk) => ctx.log(String::from_utf8_lossy(&chunk).into_owned()),
            ProcessEvent::Exited { code } => exit_code = code,
        }
    }
    Ok(exit_code)
}
