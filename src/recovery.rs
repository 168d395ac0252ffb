//! Startup recovery: replaying a log file's `(header, body)` records
//! against the caller's state via [`crate::record::Codec::redo`].
//!
//! A torn trailing record -- the usual result of a crash mid-write -- is
//! not an error: recovery rewinds the file to the end of the last complete
//! record and reports how far it got. Bytes beyond that point are orphaned
//! on disk but harmless: the next write to this file starts exactly at the
//! rewound position and overwrites them.

use std::path::Path;

use crate::error::{CommandLogError, Result};
use crate::file::{open_log_file, read_up_to, seek_back};
use crate::log::CommandLog;
use crate::record::Record;

/// Result of replaying a log file at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The file ended exactly on a record boundary.
    Clean {
        /// Number of records successfully replayed.
        records_replayed: usize,
    },
    /// The file's final record was torn (a short header or short body);
    /// the file has been rewound to just past the last complete record so
    /// the next write starts there.
    Truncated {
        /// Number of records successfully replayed before the torn tail.
        records_replayed: usize,
        /// Size, in bytes, of the torn tail that was rewound past.
        trailing_bytes: u64,
    },
}

impl RecoveryOutcome {
    /// Number of records successfully replayed, regardless of outcome.
    #[must_use]
    pub fn records_replayed(&self) -> usize {
        match self {
            Self::Clean { records_replayed } | Self::Truncated { records_replayed, .. } => {
                *records_replayed
            }
        }
    }
}

impl<R: Record> CommandLog<R> {
    /// Replays every complete record in `path` against the codec's `redo`
    /// hook, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CommandLogError::RecoveryCorrupt`] if a header declares a
    /// body length exceeding the configured maximum record size -- the log
    /// itself is suspect, not merely torn. Returns
    /// [`CommandLogError::OutOfMemory`] if the codec's `redo` hook fails;
    /// this is a distinct failure mode from a corrupt header, since a
    /// `redo` failure can happen against an otherwise well-formed record.
    /// Returns [`CommandLogError::Io`] on any other I/O failure.
    pub fn file_apply(&self, path: &Path) -> Result<RecoveryOutcome> {
        let mut file = open_log_file(path, self.config.file_mode)?;
        let header_len = self.codec.header_len();
        let mut header_buf = vec![0u8; header_len];
        let mut records_replayed = 0usize;

        loop {
            let hn = read_up_to(&mut file, &mut header_buf)?;
            if hn == 0 {
                tracing::debug!(records_replayed, "recovery reached clean end of file");
                return Ok(RecoveryOutcome::Clean { records_replayed });
            }
            if hn < header_len {
                seek_back(&mut file, hn as u64)?;
                tracing::warn!(records_replayed, torn_bytes = hn, "recovery found a torn header");
                return Ok(RecoveryOutcome::Truncated {
                    records_replayed,
                    trailing_bytes: hn as u64,
                });
            }

            let info = self.codec.decode_header(&header_buf);
            if info.body_len as usize > self.config.max_record_size {
                return Err(CommandLogError::RecoveryCorrupt {
                    reason: format!(
                        "body length {} exceeds configured maximum {}",
                        info.body_len, self.config.max_record_size
                    ),
                });
            }

            let mut body_buf = vec![0u8; info.body_len as usize];
            let bn = read_up_to(&mut file, &mut body_buf)?;
            if bn < body_buf.len() {
                seek_back(&mut file, (header_len + bn) as u64)?;
                let torn = header_len as u64 + bn as u64;
                tracing::warn!(records_replayed, torn_bytes = torn, "recovery found a torn body");
                return Ok(RecoveryOutcome::Truncated {
                    records_replayed,
                    trailing_bytes: torn,
                });
            }

            self.codec.redo(&header_buf, &body_buf).map_err(|message| {
                tracing::error!(records_replayed, %message, "redo failed during recovery");
                CommandLogError::OutOfMemory {
                    what: "redo of a record during recovery",
                }
            })?;

            records_replayed += 1;
        }
    }
}
