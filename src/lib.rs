//! Command-log buffer subsystem for a persistent in-memory cache server.
//!
//! This crate is the durable, append-only write-ahead-log staging area that
//! sits between foreground worker threads and disk. Callers serialize
//! command records through an injected [`Codec`], which this crate batches
//! into a large in-memory ring ([`buffer::LogBuffer`]), groups into bounded
//! flush units ([`fqueue::FlushQueue`]), and hands to a dedicated flusher
//! thread that owns the on-disk file(s).
//!
//! The entry point is [`CommandLog`]. Construct one with
//! [`CommandLog::init`], point it at a file with
//! [`CommandLog::file_prepare`], and start writing records with
//! [`CommandLog::record_write`].
//!
//! Out of scope: the record codec itself, the checkpoint subsystem that
//! decides when to rotate, and the engine that redoes records during
//! recovery. Those are supplied by the caller through the [`Codec`] and
//! [`Record`] traits.

pub mod buffer;
pub mod config;
pub mod error;
pub mod file;
pub mod flusher;
pub mod fqueue;
pub mod log;
pub mod lsn;
pub mod record;
pub mod recovery;
pub mod rotation;
pub mod writer;

pub use config::CommandLogConfig;
pub use error::{fatal, CommandLogError, Result};
pub use log::{CommandLog, LogStats};
pub use lsn::LogSn;
pub use record::{Codec, Record, Waiter};
pub use recovery::RecoveryOutcome;
