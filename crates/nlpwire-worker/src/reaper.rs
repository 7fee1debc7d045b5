//! Process-wide registry of live workers, for abnormal exits.
//!
//! Normal teardown goes through `Drop`. When the host process is interrupted
//! instead (Ctrl-C in the CLI), [`reap_all`] kills every registered worker and
//! removes the paths its transport created.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

struct Entry {
    pid: u32,
    paths: Vec<PathBuf>,
}

static REGISTRY: Mutex<BTreeMap<u64, Entry>> = Mutex::new(BTreeMap::new());
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, BTreeMap<u64, Entry>> {
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`register`]; pass it back to [`unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Record a live worker and the filesystem paths it depends on.
pub fn register(pid: u32, paths: Vec<PathBuf>) -> Ticket {
    let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
    registry().insert(ticket, Entry { pid, paths });
    Ticket(ticket)
}

/// Forget a worker that has been torn down normally.
pub fn unregister(ticket: Ticket) {
    registry().remove(&ticket.0);
}

/// Number of workers currently registered.
pub fn live_workers() -> usize {
    registry().len()
}

/// Kill every registered worker and remove its paths. Returns how many
/// workers were reaped.
pub fn reap_all() -> usize {
    let entries = std::mem::take(&mut *registry());
    let count = entries.len();
    entries.into_values().for_each(reap_entry);
    if count > 0 {
        info!(count, "reaped workers");
    }
    count
}

fn reap_entry(entry: Entry) {
    kill_pid(entry.pid);
    for path in entry.paths {
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(?path, error = %err, "failed to remove worker path"),
        }
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "failed to kill worker");
    } else {
        info!(pid, "killed worker");
    }
}

#[cfg(not(unix))]
fn kill_pid(pid: u32) {
    warn!(pid, "cannot signal workers on this platform");
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Command;

    use super::*;

    #[test]
    fn reap_kills_registered_workers_and_removes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pipe");
        let scratch = dir.path().join("scratch");
        std::fs::write(&file, b"").unwrap();
        std::fs::create_dir(&scratch).unwrap();

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let ticket = register(child.id(), vec![file.clone(), scratch.clone()]);
        assert!(live_workers() >= 1);

        // Other tests in this process register workers too; reap only ours.
        let entry = registry().remove(&ticket.0).unwrap();
        reap_entry(entry);

        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!file.exists());
        assert!(!scratch.exists());
    }

    #[test]
    fn unregistered_workers_are_left_alone() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let ticket = register(child.id(), Vec::new());
        unregister(ticket);
        assert!(child.try_wait().unwrap().is_none());
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
