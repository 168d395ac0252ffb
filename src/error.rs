//! Centralized error handling: one `thiserror` enum covering every
//! recoverable failure mode, plus a crate-wide `Result` alias.
//!
//! One category is treated as *unrecoverable* -- `fsync` failure, a short
//! or failed `write` to an already-open log file, or a `close` failure on a
//! live fd -- and is deliberately not a variant here. Those are logged and
//! then the process aborts via [`fatal`], because the log's correctness
//! contract can't be locally repaired once a write is torn.

use std::fmt;

use thiserror::Error;

/// Convenience alias for results using [`CommandLogError`].
pub type Result<T> = std::result::Result<T, CommandLogError>;

/// Recoverable errors produced by the command-log buffer subsystem.
#[derive(Error, Debug)]
pub enum CommandLogError {
    /// An I/O error occurred that the caller can reasonably react to (e.g.
    /// opening a log file during `file_prepare`).
    #[error("log I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Allocation of the ring buffer or flush-request queue failed at init,
    /// or the codec's `redo` hook ran out of memory while replaying a
    /// record during recovery. Distinct from [`Self::RecoveryCorrupt`]:
    /// this covers a resource failure against an otherwise well-formed
    /// record, not a malformed one.
    #[error("out of memory: {what}")]
    OutOfMemory {
        /// What ran out of memory, e.g. `"ring buffer"` or `"redo of a
        /// record during recovery"`.
        what: &'static str,
    },

    /// A record's total encoded length (header + body) does not fit the
    /// configured buffer or record-size limit.
    #[error("record of {total_len} bytes exceeds the {limit}-byte limit")]
    RecordTooLarge {
        /// The record's total encoded length.
        total_len: usize,
        /// The limit it was checked against.
        limit: usize,
    },

    /// The injected [`crate::record::Codec`] failed to serialize or redo a
    /// record.
    #[error("codec error: {message}")]
    Codec {
        /// Human-readable description from the codec.
        message: String,
    },

    /// A log file path exceeded `MAX_FILEPATH_LENGTH`.
    #[error("log file path exceeds the {limit}-byte limit: {path}")]
    InvalidPath {
        /// The offending path, rendered lossily.
        path: String,
        /// The configured limit.
        limit: usize,
    },

    /// Recovery encountered a record whose body length exceeds the
    /// configured maximum record size. Unlike a torn tail, this is not
    /// recoverable by truncation: the log itself is suspect.
    #[error("recovery aborted: {reason}")]
    RecoveryCorrupt {
        /// Why recovery gave up.
        reason: String,
    },

    /// The operation is not valid given the subsystem's current lifecycle
    /// or rotation state (e.g. calling `complete_dual_write` with no
    /// rotation in progress).
    #[error("operation invalid in current state: {reason}")]
    InvalidState {
        /// Description of the mismatched state.
        reason: String,
    },
}

/// Logs `context`/`err` at error level and then aborts the process.
///
/// This is the landing spot for the spec's `FATAL` error category: `fsync`
/// failure, a short or failed `write` to an open log file, or a `close`
/// failure on a live fd. Crash-and-restart is the safe path, so this never
/// returns.
#[cold]
pub fn fatal(context: &str, err: impl fmt::Display) -> ! {
    tracing::error!(context, %err, "fatal I/O error in command log; aborting process");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = CommandLogError::RecordTooLarge {
            total_len: 1024,
            limit: 512,
        };
        assert!(err.to_string().contains("1024"));
        assert!(err.to_string().contains("512"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: CommandLogError = io_err.into();
        assert!(matches!(err, CommandLogError::Io { .. }));
    }
}
