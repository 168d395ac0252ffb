//! S5: recovery replays complete records and stops cleanly at a torn tail.

mod common;

use std::sync::Arc;

use cachelog::{CommandLog, CommandLogConfig, CommandLogError, RecoveryOutcome};
use tempfile::tempdir;

use common::{append_raw_record, FixedCodec};

#[test]
fn recovery_stops_at_a_torn_trailing_record_and_rewinds_past_it() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");

    let mut bytes = Vec::new();
    for i in 0..3u8 {
        append_raw_record(&mut bytes, &[i; 16]);
    }
    // A header claiming a 16-byte body, but only 5 bytes actually follow --
    // the signature of a crash mid-write.
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&[0xaa; 5]);
    std::fs::write(&path, &bytes).expect("write fixture");

    let log = CommandLog::init(CommandLogConfig::default(), &path, Arc::new(FixedCodec))
        .expect("init");

    let outcome = log.file_apply(&path).expect("recovery");
    match outcome {
        RecoveryOutcome::Truncated {
            records_replayed,
            trailing_bytes,
        } => {
            assert_eq!(records_replayed, 3);
            assert_eq!(trailing_bytes, 8 + 5);
        }
        RecoveryOutcome::Clean { .. } => panic!("expected a truncated outcome"),
    }

    log.shutdown();
}

#[test]
fn recovery_is_clean_when_the_file_ends_on_a_record_boundary() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");

    let mut bytes = Vec::new();
    for i in 0..5u8 {
        append_raw_record(&mut bytes, &[i; 8]);
    }
    std::fs::write(&path, &bytes).expect("write fixture");

    let log = CommandLog::init(CommandLogConfig::default(), &path, Arc::new(FixedCodec))
        .expect("init");

    let outcome = log.file_apply(&path).expect("recovery");
    assert_eq!(outcome, RecoveryOutcome::Clean { records_replayed: 5 });

    log.shutdown();
}

#[test]
fn recovery_rejects_a_header_claiming_an_oversized_body() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&path, &bytes).expect("write fixture");

    let config = CommandLogConfig::builder().max_record_size(1024).build();
    let log = CommandLog::init(config, &path, Arc::new(FixedCodec)).expect("init");

    let err = log.file_apply(&path).unwrap_err();
    assert!(matches!(err, CommandLogError::RecoveryCorrupt { .. }));

    log.shutdown();
}
