//! The write path: reserving ring buffer space for a record, handing it to
//! the codec, and queuing the bytes for the flusher.
//!
//! Everything here runs under the subsystem's write lock. Whenever this
//! path needs to force a flush to make room it must drop the write lock
//! first and take the flush lock, never the reverse.

use crate::buffer::LogBuffer;
use crate::error::{CommandLogError, Result};
use crate::fqueue::FlushQueue;
use crate::lsn::LogSn;
use crate::log::CommandLog;
use crate::record::{Codec, Record, Waiter};

/// Everything guarded by the write lock: the byte ring, the
/// parallel flush-request queue, and the next LSN to assign.
pub(crate) struct WriteState {
    pub buffer: LogBuffer,
    pub fqueue: FlushQueue,
    pub write_lsn: LogSn,
}

impl WriteState {
    pub(crate) fn new(buffer_size: usize, flush_queue_len: usize, flush_auto_size: u32) -> Self {
        Self {
            buffer: LogBuffer::new(buffer_size),
            fqueue: FlushQueue::new(flush_queue_len, flush_auto_size),
            write_lsn: LogSn::INITIAL,
        }
    }
}

impl<R: Record> CommandLog<R> {
    /// Appends `record` to the log.
    ///
    /// If `waiter` is present, it is stamped with the LSN assigned to this
    /// record before the record's bytes are copied into the ring -- so a
    /// caller that then calls [`Self::buffer_flush`] with that LSN is
    /// guaranteed the bytes it cares about have been queued.
    ///
    /// `dual_write` marks the record as one the caller needs to survive a
    /// rotation in progress. Sampling it correctly (typically by reading
    /// the rotation state under the same lock the caller uses to decide)
    /// is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`CommandLogError::RecordTooLarge`] if the record's encoded
    /// size exceeds either the ring buffer's capacity or the configured
    /// maximum. Once a record's bytes have begun landing in the ring, any
    /// further failure (a codec error) is unrecoverable and aborts the
    /// process: no partial record may be left once the tail has moved.
    pub fn record_write(
        &self,
        record: &R,
        waiter: Option<&dyn Waiter>,
        dual_write: bool,
    ) -> Result<()> {
        let header_len = self.codec.header_len();
        let total_len = header_len + record.body_len() as usize;

        if total_len >= self.config.buffer_size {
            return Err(CommandLogError::RecordTooLarge {
                total_len,
                limit: self.config.buffer_size,
            });
        }
        if total_len > self.config.max_record_size {
            return Err(CommandLogError::RecordTooLarge {
                total_len,
                limit: self.config.max_record_size,
            });
        }

        loop {
            let mut ws = self.write.lock();

            if let Some(waiter) = waiter {
                waiter.stamp_lsn(ws.write_lsn);
            }

            let WriteState {
                buffer, fqueue, ..
            } = &mut *ws;
            let reserved = buffer.try_reserve(total_len, || {
                fqueue.close_tail_if_nonempty();
            });

            let Some(range) = reserved else {
                drop(ws);
                self.stats.record_backpressure_stall();
                self.force_flush();
                continue;
            };

            let lsn = ws.write_lsn;
            {
                let slice = ws.buffer.write_at(range);
                if let Err(message) = self.codec.serialize(record, slice) {
                    // The tail has already moved: a half-written record
                    // cannot be left behind.
                    crate::error::fatal("record serialize", message);
                }
            }

            ws.write_lsn.advance(total_len as u64);
            ws.fqueue.append(total_len as u32, dual_write);
            drop(ws);

            tracing::trace!(%lsn, total_len, dual_write, "record queued for flush");
            self.stats.record_written(total_len as u64);
            self.flusher.notify();
            return Ok(());
        }
    }

    /// Forces a non-exhaustive flush to reclaim ring space, per the write
    /// path's contiguity-retry policy. Always acquires the flush lock
    /// after releasing the write lock, matching the subsystem-wide lock
    /// ordering.
    pub(crate) fn force_flush(&self) {
        let mut files = self.files.lock();
        self.flush_once(&mut files, false);
    }
}
