use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::WorkerStream;

/// A named FIFO the worker writes response frames into.
///
/// The FIFO node is created by us and removed on [`Fifo::remove`] or drop,
/// but only if the path still refers to the node we created.
#[derive(Debug)]
pub struct Fifo {
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl Fifo {
    /// Default permission mode for created FIFO nodes.
    pub const DEFAULT_MODE: u32 = 0o600;

    /// Build a path unique to this process and moment:
    /// `<prefix>_pid=<pid>_time=<nanos>_<seq>`.
    pub fn unique_path(prefix: impl AsRef<Path>) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut name = prefix.as_ref().as_os_str().to_os_string();
        name.push(format!("_pid={}_time={}_{}", std::process::id(), nanos, seq));
        PathBuf::from(name)
    }

    /// Create a FIFO node at `path`.
    ///
    /// A stale FIFO left at the same path is replaced. Any other kind of file
    /// is refused.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_fifo() {
                debug!(?path, "removing stale fifo");
                std::fs::remove_file(&path).map_err(|e| TransportError::Fifo {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::PathInUse(path));
            }
        }

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            TransportError::Fifo {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            }
        })?;

        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), Self::DEFAULT_MODE as libc::mode_t) };
        if rc != 0 {
            return Err(TransportError::Fifo {
                path,
                source: std::io::Error::last_os_error(),
            });
        }

        let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Fifo {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "created response fifo");

        Ok(Self {
            path,
            created_inode: Some((metadata.dev(), metadata.ino())),
        })
    }

    /// Open the FIFO for reading without blocking.
    ///
    /// The node is opened read-write so the reader never observes EOF while
    /// the worker has not yet opened (or has re-opened) its end; reads with no
    /// data pending fail with `WouldBlock`.
    pub fn open_reader(&self) -> Result<WorkerStream> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| TransportError::Fifo {
                path: self.path.clone(),
                source: e,
            })?;
        debug!(path = ?self.path, "opened response fifo");
        Ok(WorkerStream::from_fifo(file))
    }

    /// The FIFO's filesystem path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the FIFO node. Safe to call more than once.
    pub fn remove(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode.take() else {
            return;
        };
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata)
                if metadata.file_type().is_fifo()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino =>
            {
                debug!(path = ?self.path, "removing response fifo");
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => debug!(path = ?self.path, "fifo path identity changed; skipping cleanup"),
            Err(_) => {}
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        self.remove();
    }
}
