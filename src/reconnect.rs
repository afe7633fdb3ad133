//! Recovery from a device that disappears in the middle of an I/O call.
//!
//! After any failed block write or read the caller parks here until the
//! working directory can be entered again, then repeats the same operation on
//! the same block. There is no retry limit: the operator is expected to
//! reinsert the media.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::log::RunLog;

/// Pause between attempts while the device is absent.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

pub trait Reconnect: Send + Sync {
    /// One attempt to make `dir` the active working directory again.
    fn reenter(&self, dir: &Path) -> io::Result<()>;

    /// Leave the working directory so it can be removed.
    fn release(&self, _parent: &Path) -> io::Result<()> {
        Ok(())
    }

    fn backoff(&self) -> Duration {
        RECONNECT_BACKOFF
    }
}

/// Reconnect by changing the process working directory, stepping out to a
/// stable root first when the current directory is the stale target.
#[derive(Debug, Clone)]
pub struct CwdReconnect {
    stable_root: PathBuf,
    backoff: Duration,
}

impl CwdReconnect {
    pub fn new(backoff: Duration) -> Self {
        Self {
            stable_root: stable_root(),
            backoff,
        }
    }
}

impl Default for CwdReconnect {
    fn default() -> Self {
        Self::new(RECONNECT_BACKOFF)
    }
}

fn stable_root() -> PathBuf {
    cfg_if::cfg_if! {
        if #[cfg(windows)] {
            PathBuf::from("C:\\")
        } else {
            PathBuf::from("/")
        }
    }
}

impl Reconnect for CwdReconnect {
    fn reenter(&self, dir: &Path) -> io::Result<()> {
        match env::current_dir() {
            // An unreadable cwd is a handle into a vanished mount as well.
            Ok(cwd) if cwd != dir => {}
            _ => {
                let _ = env::set_current_dir(&self.stable_root);
            }
        }
        env::set_current_dir(dir)
    }

    fn release(&self, parent: &Path) -> io::Result<()> {
        env::set_current_dir(parent)
    }

    fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Block until `dir` is reachable again. Returns the number of failed
/// attempts; zero means the failure was transient.
pub fn wait_for_device(reconnect: &dyn Reconnect, dir: &Path, log: &RunLog) -> u32 {
    let mut failed = 0;
    while let Err(e) = reconnect.reenter(dir) {
        failed += 1;
        log.error(
            "Connect Error",
            &dir.display().to_string(),
            &format!("device unreachable ({}), waiting for reconnect", e),
        );
        thread::sleep(reconnect.backoff());
    }
    if failed > 0 {
        log.simple(format!(
            "Device reachable again after {} attempt(s): {}",
            failed + 1,
            dir.display()
        ));
    }
    failed
}
