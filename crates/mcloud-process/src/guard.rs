//! Kills a spawned process (and, on Unix, its whole process group) when
//! dropped, so a cancelled or panicking task never leaves an orphan
//! `docker`/`rsync`/`btrfs` child running.

use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct ChildGuard {
    pid: u32,
    killed: AtomicBool,
}

impl ChildGuard {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid,
            killed: AtomicBool::new(false),
        }
    }

    #[cfg(unix)]
    pub(crate) fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }

        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(self.pid as i32);
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            tracing::debug!(pid = self.pid, error = %e, "SIGTERM to process group failed");
            return;
        }

        let pid = self.pid;
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(2));
            let pgid = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                tracing::debug!(pid, error = %e, "SIGKILL to process group failed");
            }
        });
    }

    #[cfg(not(unix))]
    pub(crate) fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!(pid = self.pid, "process group cleanup not supported on this platform");
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
