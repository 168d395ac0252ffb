//! Configuration for the command-log buffer: a `serde`-friendly struct
//! with sane defaults, a builder for programmatic construction in tests,
//! and a `from_file` loader built on the `config` crate for on-disk TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CommandLogError, Result};
use crate::record::{DEFAULT_BUFFER_SIZE, FLUSH_AUTO_SIZE, MAX_FILEPATH_LENGTH, RECORD_MIN_SIZE};

/// Tunable constants for a [`crate::log::CommandLog`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLogConfig {
    /// Capacity of the in-memory ring buffer, in bytes.
    pub buffer_size: usize,

    /// Maximum number of bytes grouped into a single flush-request slot.
    pub flush_auto_size: u32,

    /// Used to size the flush-request queue: `flush_queue_len = buffer_size
    /// / record_min_size`.
    pub record_min_size: usize,

    /// Maximum length, in bytes, of a log file path passed to
    /// `file_prepare`.
    pub max_filepath_length: usize,

    /// Maximum total encoded record size (header + body) this instance
    /// will accept. Not given a literal value in the spec beyond "bounded";
    /// chosen here as a generous default a caller can override.
    pub max_record_size: usize,

    /// Unix file mode used when creating log files.
    pub file_mode: u32,
}

impl Default for CommandLogConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_auto_size: FLUSH_AUTO_SIZE,
            record_min_size: RECORD_MIN_SIZE,
            max_filepath_length: MAX_FILEPATH_LENGTH,
            max_record_size: 16 * 1024 * 1024,
            file_mode: 0o640,
        }
    }
}

impl CommandLogConfig {
    /// Starts a [`CommandLogConfigBuilder`] seeded with defaults.
    #[must_use]
    pub fn builder() -> CommandLogConfigBuilder {
        CommandLogConfigBuilder {
            config: Self::default(),
        }
    }

    /// Number of slots in the flush-request queue for this configuration.
    #[must_use]
    pub fn flush_queue_len(&self) -> usize {
        (self.buffer_size / self.record_min_size).max(1)
    }

    /// Loads configuration from a TOML file, layering it over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CommandLogError::Io`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| {
                CommandLogError::Io {
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
                }
            })?;

        settings.try_deserialize().map_err(|e| CommandLogError::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        })
    }

    pub(crate) fn validate_path(&self, path: &Path) -> Result<()> {
        let len = path.as_os_str().len();
        if len > self.max_filepath_length {
            return Err(CommandLogError::InvalidPath {
                path: path.display().to_string(),
                limit: self.max_filepath_length,
            });
        }
        Ok(())
    }
}

/// Builder for [`CommandLogConfig`].
pub struct CommandLogConfigBuilder {
    config: CommandLogConfig,
}

impl CommandLogConfigBuilder {
    /// Sets the ring buffer capacity.
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Sets the maximum bytes per flush-request slot.
    #[must_use]
    pub fn flush_auto_size(mut self, bytes: u32) -> Self {
        self.config.flush_auto_size = bytes;
        self
    }

    /// Sets the minimum record size used to size the flush-request queue.
    #[must_use]
    pub fn record_min_size(mut self, bytes: usize) -> Self {
        self.config.record_min_size = bytes;
        self
    }

    /// Sets the maximum accepted total record size.
    #[must_use]
    pub fn max_record_size(mut self, bytes: usize) -> Self {
        self.config.max_record_size = bytes;
        self
    }

    /// Finishes building.
    #[must_use]
    pub fn build(self) -> CommandLogConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CommandLogConfig::default();
        assert_eq!(cfg.buffer_size, 100 * 1024 * 1024);
        assert_eq!(cfg.flush_auto_size, 32 * 1024);
        assert_eq!(cfg.record_min_size, 16);
        assert_eq!(cfg.max_filepath_length, 255);
        assert_eq!(cfg.file_mode, 0o640);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = CommandLogConfig::builder().buffer_size(1024 * 1024).build();
        assert_eq!(cfg.buffer_size, 1024 * 1024);
        assert_eq!(cfg.flush_auto_size, 32 * 1024);
    }

    #[test]
    fn flush_queue_len_divides_buffer_by_record_min_size() {
        let cfg = CommandLogConfig::builder()
            .buffer_size(1024 * 1024)
            .record_min_size(16)
            .build();
        assert_eq!(cfg.flush_queue_len(), 65536);
    }

    #[test]
    fn rejects_overlong_paths() {
        let cfg = CommandLogConfig::default();
        let long = "a".repeat(300);
        let err = cfg.validate_path(Path::new(&long)).unwrap_err();
        assert!(matches!(err, CommandLogError::InvalidPath { .. }));
    }
}
