//! Traits the command-log buffer delegates to external collaborators.
//!
//! The record codec itself -- how a command is laid out on the wire and how
//! it is replayed during recovery -- is out of scope for this crate.
//! Callers inject an implementation of [`Codec`].

use crate::lsn::LogSn;

/// Minimum possible on-disk record size (8-byte header + 8-byte body),
/// used to size the flush-request queue relative to the ring buffer.
pub const RECORD_MIN_SIZE: usize = 16;

/// Default ring buffer capacity (100 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 100 * 1024 * 1024;

/// Maximum number of bytes a single flush-request slot may cover.
/// Chosen to fit in a `u16` with headroom.
pub const FLUSH_AUTO_SIZE: u32 = 32 * 1024;

/// Maximum length of a log file path, enforced by `file_prepare`.
pub const MAX_FILEPATH_LENGTH: usize = 255;

/// A command record to be appended to the log.
///
/// The subsystem only needs to know how many body bytes a record will
/// occupy; everything else (layout, checksum, redo semantics) belongs to
/// the [`Codec`].
pub trait Record {
    /// Length of the record's body, in bytes, not counting the header.
    fn body_len(&self) -> u32;
}

/// Outcome of decoding one on-disk record header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInfo {
    /// Length of the body that follows this header, in bytes.
    pub body_len: u32,
}

/// Injected capability that knows how to lay a [`Record`] out on disk and
/// how to replay one during recovery.
///
/// Implementations are shared across the writer and the recovery path, so
/// they must be `Send + Sync`.
pub trait Codec<R: Record>: Send + Sync {
    /// Fixed size, in bytes, of a record header.
    fn header_len(&self) -> usize;

    /// Decodes the `body_len` field out of a header-sized byte slice.
    ///
    /// `header` is guaranteed to be exactly `header_len()` bytes.
    fn decode_header(&self, header: &[u8]) -> HeaderInfo;

    /// Serializes `record`'s header and body into `out`, which is
    /// guaranteed to be exactly `header_len() + record.body_len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error message on any encoding failure (e.g. the record
    /// hook itself failing); this crate has no concept of encoding errors
    /// beyond what the codec reports.
    fn serialize(&self, record: &R, out: &mut [u8]) -> Result<(), String>;

    /// Replays one on-disk record against engine state during recovery.
    ///
    /// `header` and `body` are the raw bytes as read from the log file.
    ///
    /// # Errors
    ///
    /// Returning `Err` signals `OUT_OF_MEMORY` per the spec's recovery
    /// error taxonomy: recovery treats this as fatal and aborts with an
    /// error rather than continuing.
    fn redo(&self, header: &[u8], body: &[u8]) -> Result<(), String>;
}

/// Opaque caller-supplied handle that is stamped with the LSN assigned to a
/// record, before that record is appended to the ring.
///
/// Foreground threads that need to know the LSN of their own write (e.g. to
/// later call [`crate::log::CommandLog::buffer_flush`]) pass a `Waiter` in;
/// callers uninterested in the assigned LSN pass `None`.
pub trait Waiter: Send + Sync {
    /// Called under the write lock, before the record's bytes are copied
    /// into the ring, with the LSN the record was assigned.
    fn stamp_lsn(&self, lsn: LogSn);
}
