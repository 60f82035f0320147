//! Subprocess spawn and termination helpers shared by both extractor modes.

use std::io;
use std::time::Duration;

use tokio::process::{Child, Command};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppresses the console window Windows would otherwise pop up for a
/// piped child process. No-op on other platforms.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for Command {
    #[cfg(windows)]
    fn no_window(&mut self) -> &mut Self {
        use std::os::windows::process::CommandExt;
        self.creation_flags(CREATE_NO_WINDOW);
        self
    }

    #[cfg(not(windows))]
    fn no_window(&mut self) -> &mut Self {
        self
    }
}

/// Sends a graceful termination signal and escalates to an unconditional
/// kill if the child is still alive after `grace`. Safe to call on a child
/// that has already exited.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is a live child pid owned by `child`; SIGTERM is a
        // best-effort request, its failure (e.g. already-reaped) is ignored.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => Ok(()),
        Err(_) => {
            child.start_kill()?;
            child.wait().await?;
            Ok(())
        }
    }
}

/// Classifies a [`std::io::Error`] from `Command::spawn` as "executable not found".
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}
