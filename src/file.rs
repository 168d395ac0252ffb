//! On-disk file state and the interrupt-resilient I/O primitives the
//! flusher and fsync path build on.
//!
//! The two-file handover is modeled as an explicit state machine
//! (`Rotation`) rather than a sentinel `-1` file descriptor, and the
//! `dw_end` sentinel lives on the flush queue as an `Option<usize>` (see
//! [`crate::fqueue::FlushQueue`]).
//!
//! A naive `curr <- next` handover would leak the pre-rotation file
//! descriptor before the cleanup window that still needs it, so this module
//! carries the pre-rotation file slot forward explicitly as
//! `Rotation::Cleanup { old }`. The cleanup branch in [`crate::flusher`]
//! then always has the right fd to write to, regardless of what `curr` has
//! moved on to. See `DESIGN.md` for the full writeup.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// One open (or not-yet-opened) log file slot.
///
/// `id` is a per-slot identity, assigned when the slot is opened, that
/// survives the slot moving between `curr`/`next`/`old`/`pending_close` as
/// rotation progresses. [`crate::log::CommandLog::file_sync`] uses it to
/// tell, after re-acquiring the lock post-`fsync()`, whether the slot it
/// was syncing is still the one installed under that name or has since been
/// retired by a rotation that ran while the lock was released.
#[derive(Debug, Default)]
pub(crate) struct FileSlot {
    pub file: Option<File>,
    pub fsync_ongoing: bool,
    pub size: u64,
    pub id: u64,
    /// `size` as of the last successful `fsync` this slot was part of;
    /// used by [`crate::log::CommandLog::file_sync`] to report how many
    /// bytes a sync call actually made durable.
    pub last_synced_size: u64,
}

impl FileSlot {
    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// Rotation phase of the log file pair.
#[derive(Debug, Default)]
pub(crate) enum Rotation {
    /// No rotation in progress.
    #[default]
    Single,
    /// `file_prepare` has opened a second file; every new write must also
    /// go to `next` when the caller marks it `dual_write`.
    Dual { next: FileSlot },
    /// `complete_dual_write(true)` has handed writers off to the new file
    /// (now `curr`); `old` is the pre-rotation file, which the flusher's
    /// cleanup branch must still drain queued dual-write bytes into.
    Cleanup { old: FileSlot },
}

/// Holds the current (and, mid-rotation, next/old) log file(s). Mutated
/// exclusively under the subsystem's `flush_lock`.
///
/// `pending_close` holds a file slot that has been logically retired
/// (rotation's cleanup window drained, or an aborted rotation's `next`
/// discarded) but whose `fsync_ongoing` flag was still set at the moment of
/// retirement -- closing it immediately would race a concurrent, lock-free
/// `fsync()` call in [`crate::log::CommandLog::file_sync`]. It is closed
/// once that fsync completes and observes the slot is no longer installed.
#[derive(Debug, Default)]
pub(crate) struct LogFiles {
    pub curr: FileSlot,
    pub rotation: Rotation,
    pub pending_close: Option<FileSlot>,
    next_id: u64,
}

impl LogFiles {
    /// Opens `path` read-write, creating it if missing, and installs it as
    /// `curr` (first time) or `next` (starting a rotation).
    ///
    /// Returns whether this installed `next` (i.e. started a `Dual`
    /// rotation).
    pub(crate) fn prepare(&mut self, path: &Path, mode: u32) -> io::Result<bool> {
        let file = open_log_file(path, mode)?;
        let size = file.metadata()?.len();
        self.next_id += 1;
        let slot = FileSlot {
            file: Some(file),
            fsync_ongoing: false,
            size,
            id: self.next_id,
            last_synced_size: 0,
        };

        if self.curr.is_open() {
            self.rotation = Rotation::Dual { next: slot };
            Ok(true)
        } else {
            self.curr = slot;
            Ok(false)
        }
    }

    /// Returns the file size visible to callers: `curr`'s size, unless a
    /// cleanup window is active, in which case `curr` is mid-handover and
    /// this reports `0`.
    pub(crate) fn visible_size(&self) -> u64 {
        match &self.rotation {
            Rotation::Cleanup { .. } => 0,
            _ => self.curr.size,
        }
    }

    /// Retires `slot`: closes it immediately if no fsync is in flight on
    /// it, otherwise parks it in `pending_close` for `file_sync` to close
    /// once that fsync completes.
    pub(crate) fn retire(&mut self, slot: FileSlot) {
        if slot.fsync_ongoing {
            self.pending_close = Some(slot);
        } else if let Some(file) = slot.file {
            close_log_file(file);
        }
    }

    /// If a cleanup rotation's pre-rotation tail has fully drained (`fbgn`
    /// has caught up to `dw_end`), retires the pre-rotation file and
    /// returns to `Single`. Called by the flusher once it observes that
    /// boundary.
    pub(crate) fn finish_cleanup(&mut self) {
        if matches!(self.rotation, Rotation::Cleanup { .. }) {
            if let Rotation::Cleanup { old } = std::mem::replace(&mut self.rotation, Rotation::Single) {
                self.retire(old);
            }
        }
    }
}

/// Opens a log file with restartable-write-friendly flags: create if
/// missing, read/write, at the configured mode.
pub(crate) fn open_log_file(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path)
}

/// Writes all of `buf` to `file`, retrying on `Interrupted` and treating a
/// zero-length write or any other error as fatal: a short or failed write
/// to an open log file is unrecoverable.
pub(crate) fn write_all_restartable(file: &mut File, mut buf: &[u8]) {
    while !buf.is_empty() {
        match file.write(buf) {
            Ok(0) => crate::error::fatal(
                "log file write",
                "write() returned 0 with bytes remaining",
            ),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => crate::error::fatal("log file write", e),
        }
    }
}

/// `fsync`s `file`, retrying on `Interrupted`. Any other failure is fatal.
pub(crate) fn fsync_restartable(file: &File) {
    loop {
        match file.sync_all() {
            Ok(()) => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => crate::error::fatal("log file fsync", e),
        }
    }
}

/// Closes `file`. A close failure on a live fd is fatal; Rust's `File`
/// does not expose a fallible close (the OS
/// close happens in `Drop`, which discards any error), so this documents
/// the limitation rather than pretending to detect it.
pub(crate) fn close_log_file(file: File) {
    drop(file);
}

/// Seeks `file` backward by `by` bytes relative to its current position.
/// Used by recovery to rewind over a torn record's header.
pub(crate) fn seek_back(file: &mut File, by: u64) -> io::Result<u64> {
    file.seek(SeekFrom::Current(-(by as i64)))
}

/// Reads exactly `buf.len()` bytes, returning `Ok(n)` with `n < buf.len()`
/// on a short read at end-of-file rather than erroring, so recovery can
/// distinguish "ran out of file" from a genuine I/O error.
pub(crate) fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn prepare_first_file_installs_curr() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let mut files = LogFiles::default();

        let started_rotation = files.prepare(&path, 0o640).unwrap();
        assert!(!started_rotation);
        assert!(files.curr.is_open());
        assert!(matches!(files.rotation, Rotation::Single));
    }

    #[test]
    fn prepare_second_file_starts_dual_rotation() {
        let dir = tempdir().unwrap();
        let mut files = LogFiles::default();
        files.prepare(&dir.path().join("log"), 0o640).unwrap();

        let started_rotation = files.prepare(&dir.path().join("log.new"), 0o640).unwrap();
        assert!(started_rotation);
        assert!(matches!(files.rotation, Rotation::Dual { .. }));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let mut file = open_log_file(&path, 0o640).unwrap();
        write_all_restartable(&mut file, b"hello world");

        let mut reopened = open_log_file(&path, 0o640).unwrap();
        let mut buf = [0u8; 11];
        let n = read_up_to(&mut reopened, &mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn short_read_returns_fewer_bytes_than_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let mut file = open_log_file(&path, 0o640).unwrap();
        write_all_restartable(&mut file, b"abc");

        let mut reopened = open_log_file(&path, 0o640).unwrap();
        let mut buf = [0u8; 16];
        let n = read_up_to(&mut reopened, &mut buf).unwrap();
        assert_eq!(n, 3);
    }
}
