//! [`CommandLog`]: the top-level type tying the ring buffer, flush-request
//! queue, on-disk files, and background flusher together.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CommandLogConfig;
use crate::error::Result;
use crate::file::{close_log_file, fsync_restartable, LogFiles, Rotation};
use crate::flusher::Flusher;
use crate::lsn::LogSn;
use crate::record::{Codec, Record};
use crate::writer::WriteState;

/// Durable, append-only command log buffer.
///
/// Stages records in an in-memory ring ahead of a background flusher and
/// fsync path, and supports a checkpoint-driven two-file rotation for
/// handing writers off to a new log file without blocking them on the old
/// one's final drain. See the crate documentation for the full protocol.
///
/// Constructed with [`CommandLog::init`]; torn down with
/// [`CommandLog::shutdown`] (also called from `Drop`, so an explicit call
/// is optional but lets a caller observe the final flush/fsync
/// synchronously).
pub struct CommandLog<R: Record> {
    pub(crate) write: Mutex<WriteState>,
    pub(crate) files: Mutex<LogFiles>,
    pub(crate) flush_lsn: Mutex<LogSn>,
    pub(crate) fsync_lsn: Mutex<LogSn>,
    pub(crate) flusher: Flusher,
    pub(crate) config: CommandLogConfig,
    pub(crate) codec: Arc<dyn Codec<R>>,
    pub(crate) stats: LogStatsInner,
    shut_down: AtomicBool,
}

impl<R: Record> CommandLog<R> {
    /// Opens `path` as the initial log file and starts the background
    /// flusher thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CommandLogError::InvalidPath`] or
    /// [`crate::error::CommandLogError::Io`] if `path` cannot be opened.
    pub fn init(config: CommandLogConfig, path: &Path, codec: Arc<dyn Codec<R>>) -> Result<Arc<Self>> {
        config.validate_path(path)?;

        let mut files = LogFiles::default();
        files.prepare(path, config.file_mode)?;

        let write = WriteState::new(
            config.buffer_size,
            config.flush_queue_len(),
            config.flush_auto_size,
        );

        let log = Arc::new(Self {
            write: Mutex::new(write),
            files: Mutex::new(files),
            flush_lsn: Mutex::new(LogSn::INITIAL),
            fsync_lsn: Mutex::new(LogSn::INITIAL),
            flusher: Flusher::default(),
            config,
            codec,
            stats: LogStatsInner::default(),
            shut_down: AtomicBool::new(false),
        });

        log.flush_thread_start();
        tracing::debug!(path = %path.display(), "command log initialized");
        Ok(log)
    }

    /// Stops the flusher, drains and fsyncs everything still buffered, and
    /// marks this instance shut down. Idempotent -- a second call, or the
    /// one `Drop` makes, is a no-op.
    ///
    /// `file_sync` is called after every drain round, not just once at the
    /// end: the round that fully drains a rotation's cleanup window
    /// retires the pre-rotation file on the *next* round
    /// (`LogFiles::finish_cleanup`), so a sync interleaved between rounds
    /// is what gives that file's final bytes a chance to become durable
    /// before it is closed.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.flush_thread_stop();
        loop {
            let flushed = {
                let mut files = self.files.lock();
                self.flush_once(&mut files, true)
            };
            self.file_sync();
            if flushed == 0 {
                break;
            }
        }
        tracing::debug!("command log shut down");
    }

    /// The most recently advanced flush cursor.
    #[must_use]
    pub fn get_flush_lsn(&self) -> LogSn {
        *self.flush_lsn.lock()
    }

    /// The most recently advanced fsync cursor.
    #[must_use]
    pub fn get_fsync_lsn(&self) -> LogSn {
        *self.fsync_lsn.lock()
    }

    /// Size of the visible log file, or `0` while a rotation's cleanup
    /// window is draining.
    #[must_use]
    pub fn file_getsize(&self) -> u64 {
        self.files.lock().visible_size()
    }

    /// A snapshot of this instance's activity counters.
    #[must_use]
    pub fn stats(&self) -> LogStats {
        self.stats.snapshot()
    }

    /// Blocks until the flush cursor has advanced strictly past `target`,
    /// or until a flush makes no further progress.
    ///
    /// The boundary is strict (`>`, not `>=`) because a `Waiter`'s LSN is
    /// stamped at the point a record is queued, which can land exactly on
    /// a flush-request slot boundary; a caller waiting on its own record's
    /// LSN needs the flush that closes that slot to have actually run, not
    /// merely to find the cursor already equal to it.
    pub fn buffer_flush(&self, target: LogSn) {
        while self.get_flush_lsn() <= target {
            let mut files = self.files.lock();
            if self.flush_once(&mut files, true) == 0 {
                break;
            }
        }
    }

    /// Fsyncs the live log file(s) and advances the fsync cursor to the
    /// flush cursor observed at the start of the call.
    ///
    /// Any thread may call this to force an on-demand fsync outside of a
    /// full [`Self::shutdown`].
    ///
    /// Clones the file handle(s) before releasing the files lock, so the
    /// (potentially slow) `fsync` syscall itself runs without holding it --
    /// the flusher and writers can make progress concurrently. Each file
    /// slot's `id` is used to detect, after re-acquiring the lock, whether
    /// a rotation retired the slot out from under the in-flight sync; see
    /// the doc comment on [`crate::file::FileSlot`].
    ///
    /// During a rotation's cleanup window, `curr` already points at the
    /// new file, but bytes are still being drained into the pre-rotation
    /// file (`Rotation::Cleanup { old }`); `old` is fsynced alongside
    /// `curr` so those bytes become durable too, and so `old` ends up with
    /// `fsync_ongoing` cleared (or correctly deferred via `pending_close`)
    /// by the time the flusher retires it in `LogFiles::finish_cleanup`.
    pub fn file_sync(&self) {
        struct Target {
            id: u64,
            file: std::fs::File,
            size: u64,
        }

        let now_flush_lsn = *self.flush_lsn.lock();
        let mut targets = Vec::new();

        {
            let mut files = self.files.lock();
            if let Some(file) = &files.curr.file {
                if let Ok(clone) = file.try_clone() {
                    files.curr.fsync_ongoing = true;
                    targets.push(Target {
                        id: files.curr.id,
                        file: clone,
                        size: files.curr.size,
                    });
                }
            }
            match &mut files.rotation {
                Rotation::Dual { next } => {
                    if let Some(file) = &next.file {
                        if let Ok(clone) = file.try_clone() {
                            next.fsync_ongoing = true;
                            targets.push(Target {
                                id: next.id,
                                file: clone,
                                size: next.size,
                            });
                        }
                    }
                }
                Rotation::Cleanup { old } => {
                    if let Some(file) = &old.file {
                        if let Ok(clone) = file.try_clone() {
                            old.fsync_ongoing = true;
                            targets.push(Target {
                                id: old.id,
                                file: clone,
                                size: old.size,
                            });
                        }
                    }
                }
                Rotation::Single => {}
            }
        }

        for target in &targets {
            fsync_restartable(&target.file);
        }

        *self.fsync_lsn.lock() = now_flush_lsn;

        let mut files = self.files.lock();
        for target in &targets {
            if files.curr.id == target.id {
                files.curr.fsync_ongoing = false;
                self.stats.record_synced(target.size.saturating_sub(files.curr.last_synced_size));
                files.curr.last_synced_size = target.size;
                continue;
            }
            if let Rotation::Dual { next } = &mut files.rotation {
                if next.id == target.id {
                    next.fsync_ongoing = false;
                    self.stats.record_synced(target.size.saturating_sub(next.last_synced_size));
                    next.last_synced_size = target.size;
                    continue;
                }
            }
            if let Rotation::Cleanup { old } = &mut files.rotation {
                if old.id == target.id {
                    old.fsync_ongoing = false;
                    self.stats.record_synced(target.size.saturating_sub(old.last_synced_size));
                    old.last_synced_size = target.size;
                    continue;
                }
            }
            match files.pending_close.take() {
                Some(pending) if pending.id == target.id => {
                    self.stats
                        .record_synced(target.size.saturating_sub(pending.last_synced_size));
                    if let Some(file) = pending.file {
                        close_log_file(file);
                    }
                }
                Some(pending) => files.pending_close = Some(pending),
                None => {}
            }
        }

        tracing::trace!(%now_flush_lsn, "fsynced log file(s)");
    }
}

impl<R: Record> Drop for CommandLog<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Point-in-time activity counters for a [`CommandLog`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStats {
    /// Total bytes handed to `record_write` across this instance's
    /// lifetime.
    pub bytes_written: u64,
    /// Total bytes the flusher has written to disk.
    pub bytes_flushed: u64,
    /// Total bytes confirmed durable by a completed `file_sync`.
    pub bytes_synced: u64,
    /// Total records handed to `record_write`.
    pub records_written: u64,
    /// Total flush-request slots the flusher has written to disk.
    pub flush_count: u64,
    /// Total rotations completed via `complete_dual_write(true)`.
    pub rotation_count: u64,
    /// Total times `record_write` had to force a synchronous flush because
    /// the ring had no room for its record.
    pub backpressure_stalls: u64,
}

#[derive(Default)]
pub(crate) struct LogStatsInner {
    bytes_written: AtomicU64,
    bytes_flushed: AtomicU64,
    bytes_synced: AtomicU64,
    records_written: AtomicU64,
    flush_count: AtomicU64,
    rotation_count: AtomicU64,
    backpressure_stalls: AtomicU64,
}

impl LogStatsInner {
    pub(crate) fn record_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self, bytes: u64) {
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_synced(&self, bytes: u64) {
        if bytes > 0 {
            self.bytes_synced.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rotation(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backpressure_stall(&self) {
        self.backpressure_stalls.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LogStats {
        LogStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            bytes_synced: self.bytes_synced.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            rotation_count: self.rotation_count.load(Ordering::Relaxed),
            backpressure_stalls: self.backpressure_stalls.load(Ordering::Relaxed),
        }
    }
}
