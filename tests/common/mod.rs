//! Shared fixtures for the integration test suite: a minimal fixed-layout
//! `Record`/`Codec` pair and a `Waiter` that captures the LSN it was
//! stamped with.

use std::sync::Mutex;

use cachelog::record::HeaderInfo;
use cachelog::{Codec, LogSn, Record, Waiter};

/// Header: 4-byte little-endian body length, 4 bytes reserved.
pub const HEADER_LEN: usize = 8;

pub struct FixedRecord {
    pub body: Vec<u8>,
}

impl Record for FixedRecord {
    fn body_len(&self) -> u32 {
        self.body.len() as u32
    }
}

pub struct FixedCodec;

impl Codec<FixedRecord> for FixedCodec {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn decode_header(&self, header: &[u8]) -> HeaderInfo {
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[0..4]);
        HeaderInfo {
            body_len: u32::from_le_bytes(len),
        }
    }

    fn serialize(&self, record: &FixedRecord, out: &mut [u8]) -> Result<(), String> {
        out[0..4].copy_from_slice(&(record.body.len() as u32).to_le_bytes());
        out[4..8].copy_from_slice(&0u32.to_le_bytes());
        out[HEADER_LEN..].copy_from_slice(&record.body);
        Ok(())
    }

    fn redo(&self, _header: &[u8], _body: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingWaiter {
    lsn: Mutex<Option<LogSn>>,
}

impl CountingWaiter {
    pub fn lsn(&self) -> Option<LogSn> {
        *self.lsn.lock().expect("lock poisoned")
    }
}

impl Waiter for CountingWaiter {
    fn stamp_lsn(&self, lsn: LogSn) {
        *self.lsn.lock().expect("lock poisoned") = Some(lsn);
    }
}

/// Appends one on-disk record in [`FixedCodec`]'s layout, for tests that
/// craft log file bytes directly rather than going through `record_write`.
pub fn append_raw_record(bytes: &mut Vec<u8>, body: &[u8]) {
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(body);
}
