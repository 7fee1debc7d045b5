//! Sentinel-file response channel.
//!
//! The worker writes the whole response into a designated file and appends a
//! single NUL byte once it is done. The reader polls until the file's last
//! byte is NUL, takes everything before it, and deletes the file.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

/// Terminator marking a completed response file.
pub const SENTINEL: u8 = 0;

/// Wait for a sentinel-terminated response in `path`.
///
/// Polls at the configured interval, checking `alive` and `deadline` on every
/// round. The file is removed once its content has been taken.
pub fn read_sentinel(
    path: &Path,
    config: &FrameConfig,
    deadline: Option<Instant>,
    alive: &mut dyn FnMut() -> bool,
) -> Result<Bytes> {
    let started = Instant::now();
    loop {
        if let Some(data) = take_if_complete(path, config.max_payload_size)? {
            debug!(?path, len = data.len(), "sentinel response complete");
            return Ok(data);
        }

        if !alive() {
            return Err(FrameError::PeerExited);
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(FrameError::TimedOut(started.elapsed()));
            }
        }

        std::thread::sleep(config.poll_interval);
    }
}

/// Write `payload` followed by the sentinel byte. This is the worker's side.
pub fn write_sentinel(path: &Path, payload: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(payload)?;
    file.write_all(&[SENTINEL])?;
    file.flush()?;
    Ok(())
}

fn take_if_complete(path: &Path, max_payload: usize) -> Result<Option<Bytes>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(FrameError::Io(err)),
    };

    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }
    if len - 1 > max_payload as u64 {
        return Err(FrameError::PayloadTooLarge {
            size: len - 1,
            max: max_payload,
        });
    }

    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    if file.read(&mut last)? == 0 || last[0] != SENTINEL {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(0))?;
    let mut data = Vec::with_capacity(len as usize);
    file.read_to_end(&mut data)?;
    if data.last() == Some(&SENTINEL) {
        data.pop();
    }
    drop(file);

    if let Err(err) = std::fs::remove_file(path) {
        debug!(?path, error = %err, "failed to remove sentinel file");
    }
    Ok(Some(Bytes::from(data)))
}
