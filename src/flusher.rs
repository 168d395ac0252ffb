//! The background flusher thread and the core `flush_once` step it repeats.
//!
//! `flush_once` is also called synchronously from the write path
//! ([`crate::writer`]) when a reservation fails and a non-exhaustive flush
//! is needed to make room: the write path forces progress rather than
//! blocking on the background thread's own pace.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::file::{write_all_restartable, LogFiles, Rotation};
use crate::log::CommandLog;
use crate::record::Record;

const FLUSHER_IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unstarted,
    Started,
    Stopped,
}

struct FlusherInner {
    phase: Phase,
    reqstop: bool,
    handle: Option<JoinHandle<()>>,
}

/// Owns the flusher thread's lifecycle state. The actual flush logic lives
/// on [`CommandLog`] itself (`flush_once`), since it needs the rest of the
/// subsystem's locks; this type just coordinates start/stop/wake.
pub(crate) struct Flusher {
    inner: Mutex<FlusherInner>,
    cond: Condvar,
}

impl Default for Flusher {
    fn default() -> Self {
        Self {
            inner: Mutex::new(FlusherInner {
                phase: Phase::Unstarted,
                reqstop: false,
                handle: None,
            }),
            cond: Condvar::new(),
        }
    }
}

impl Flusher {
    /// Wakes the flusher if it's sleeping. Cheap enough to call
    /// unconditionally after every write rather than tracking precisely
    /// whether a request "became" non-empty.
    pub(crate) fn notify(&self) {
        let _guard = self.inner.lock();
        self.cond.notify_one();
    }
}

impl<R: Record> CommandLog<R> {
    /// Starts the background flusher thread. Idempotent: calling this on an
    /// already-started instance is a no-op.
    pub(crate) fn flush_thread_start(self: &Arc<Self>) {
        let mut inner = self.flusher.inner.lock();
        if inner.phase == Phase::Started {
            return;
        }
        inner.reqstop = false;
        inner.phase = Phase::Started;
        let log = Arc::clone(self);
        inner.handle = Some(thread::spawn(move || log.flusher_loop()));
        tracing::debug!("flusher thread started");
    }

    /// Signals the flusher to stop and blocks until it has. Idempotent.
    pub(crate) fn flush_thread_stop(&self) {
        {
            let mut inner = self.flusher.inner.lock();
            if inner.phase != Phase::Started {
                return;
            }
            inner.reqstop = true;
        }
        self.flusher.cond.notify_one();

        let handle = self.flusher.inner.lock().handle.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("flusher thread panicked during shutdown");
            }
        }
        tracing::debug!("flusher thread stopped");
    }

    fn flusher_loop(&self) {
        loop {
            if self.flusher.inner.lock().reqstop {
                break;
            }

            let flushed = {
                let mut files = self.files.lock();
                self.flush_once(&mut files, false)
            };

            if flushed == 0 {
                let mut inner = self.flusher.inner.lock();
                if inner.reqstop {
                    break;
                }
                self.flusher.cond.wait_for(&mut inner, FLUSHER_IDLE_SLEEP);
            }
        }
        self.flusher.inner.lock().phase = Phase::Stopped;
    }

    /// Flushes at most one flush-request slot's worth of bytes out of the
    /// ring and onto disk.
    ///
    /// With `flush_all` false (the background thread's steady state), a
    /// still-open tail slot is left alone so more bytes can accumulate in
    /// it before it's written. With `flush_all` true (used during shutdown
    /// and recovery-adjacent draining), an open tail slot is force-closed
    /// so its bytes are flushed too.
    ///
    /// Returns the number of bytes written to disk, or `0` if there was
    /// nothing to do.
    pub(crate) fn flush_once(&self, files: &mut LogFiles, flush_all: bool) -> usize {
        let mut next_fhlsn_flag = false;
        let mut cleanup_process = false;
        let selected: Option<usize>;
        let mut payload = Vec::new();
        let dual_write;
        let payload_len;

        {
            let mut ws = self.write.lock();

            if let Some(dw_end) = ws.fqueue.dw_end() {
                if ws.fqueue.fbgn() == dw_end {
                    ws.fqueue.clear_dual_write_end();
                    next_fhlsn_flag = true;
                } else {
                    cleanup_process = true;
                }
            }

            selected = if ws.fqueue.has_pending_before_fend() {
                Some(ws.fqueue.fbgn())
            } else if flush_all && ws.fqueue.slot(ws.fqueue.fend()).nflush > 0 {
                ws.fqueue.close_tail_if_nonempty();
                Some(ws.fqueue.fbgn())
            } else {
                None
            };

            if selected.is_some() {
                ws.buffer.reclaim_if_drained();
            }

            if let Some(idx) = selected {
                let slot = ws.fqueue.slot(idx);
                let head = ws.buffer.head();
                payload.extend_from_slice(ws.buffer.read_at(head..head + slot.nflush as usize));
                dual_write = slot.dual_write;
                payload_len = slot.nflush as usize;
            } else {
                dual_write = false;
                payload_len = 0;
            }
        }

        if next_fhlsn_flag {
            self.flush_lsn.lock().roll_to_next_file();
            files.finish_cleanup();
        }

        if selected.is_none() {
            return 0;
        }

        if cleanup_process {
            if dual_write {
                if let Rotation::Cleanup { old } = &mut files.rotation {
                    match old.file.as_mut() {
                        Some(file) => {
                            write_all_restartable(file, &payload);
                            old.size += payload_len as u64;
                        }
                        None => crate::error::fatal("cleanup flush", "pre-rotation file not open"),
                    }
                }
            }
            // A non-dual-write slot caught in the cleanup window targeted
            // only the pre-rotation file's predecessor semantics and has no
            // surviving destination once rotation has moved on; it is
            // dropped here, matching the documented (if surprising)
            // behavior this module's cleanup routing inherited.
        } else {
            match files.curr.file.as_mut() {
                Some(file) => {
                    write_all_restartable(file, &payload);
                    files.curr.size += payload_len as u64;
                }
                None => crate::error::fatal("flush", "current file not open"),
            }

            if dual_write {
                if let Rotation::Dual { next } = &mut files.rotation {
                    match next.file.as_mut() {
                        Some(file) => {
                            write_all_restartable(file, &payload);
                            next.size += payload_len as u64;
                        }
                        None => crate::error::fatal("dual-write flush", "next file not open"),
                    }
                }
            }
        }

        self.flush_lsn.lock().advance(payload_len as u64);

        {
            let mut ws = self.write.lock();
            ws.fqueue.consume_fbgn();
            ws.buffer.advance_head(payload_len);
        }

        self.stats.record_flushed(payload_len as u64);
        tracing::trace!(payload_len, cleanup_process, dual_write, "flushed one slot");
        payload_len
    }
}
