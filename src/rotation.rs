//! Public rotation entry points: opening a new log file to start a
//! checkpoint-driven handover, and completing or aborting it.
//!
//! [`CommandLog::complete_dual_write`] takes the flush lock for the whole
//! operation (it mutates [`crate::file::LogFiles`]) and nests the write
//! lock inside it for the flush-queue and write-LSN touches, never the
//! reverse.

use std::path::Path;

use crate::error::{CommandLogError, Result};
use crate::file::Rotation;
use crate::log::CommandLog;
use crate::record::Record;

impl<R: Record> CommandLog<R> {
    /// Opens `path` as the next log file, starting a rotation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CommandLogError::InvalidPath`] if `path`
    /// exceeds the configured maximum length, or
    /// [`crate::error::CommandLogError::Io`] if the file cannot be opened.
    pub fn file_prepare(&self, path: &Path) -> Result<()> {
        self.config.validate_path(path)?;
        let mut files = self.files.lock();
        files.prepare(path, self.config.file_mode)?;
        tracing::debug!(path = %path.display(), "log file prepared");
        Ok(())
    }

    /// Completes, or aborts, a rotation started by [`Self::file_prepare`].
    ///
    /// On success, the queued tail slot is closed, the still-queued
    /// pre-rotation bytes are marked as the cleanup window, the write LSN
    /// rolls to the next file, and the pre-rotation file is carried
    /// forward (rather than dropped) so the flusher's cleanup branch can
    /// still drain dual-written bytes into it -- see the module doc on
    /// [`crate::file`] for why this deviates from a naive `curr <- next`
    /// handover.
    ///
    /// On abort, queued `dual_write` flags are cleared so the flusher
    /// falls back to single-file routing, and the `next` file is retired.
    ///
    /// # Errors
    ///
    /// Returns [`CommandLogError::InvalidState`] if no rotation is in
    /// progress.
    pub fn complete_dual_write(&self, success: bool) -> Result<()> {
        let mut files = self.files.lock();
        let mut ws = self.write.lock();

        let rotation = std::mem::take(&mut files.rotation);
        let next = match rotation {
            Rotation::Dual { next } => next,
            other => {
                files.rotation = other;
                return Err(CommandLogError::InvalidState {
                    reason: "complete_dual_write called with no rotation in progress".to_string(),
                });
            }
        };

        if success {
            ws.fqueue.close_tail_if_nonempty();
            ws.fqueue.mark_dual_write_end();
            ws.write_lsn.roll_to_next_file();

            let old = std::mem::replace(&mut files.curr, next);
            files.rotation = Rotation::Cleanup { old };
            self.stats.record_rotation();
            tracing::debug!("rotation completed; pre-rotation file entering cleanup");
        } else {
            ws.fqueue.clear_all_dual_write_flags();
            files.retire(next);
            tracing::warn!("rotation aborted");
        }

        Ok(())
    }
}
