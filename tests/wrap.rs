//! S2: the ring buffer wraps repeatedly under sustained writes with a
//! small capacity, and every record still reaches disk intact.

mod common;

use std::sync::Arc;

use cachelog::{CommandLog, CommandLogConfig, RecoveryOutcome};
use tempfile::tempdir;

use common::{FixedCodec, FixedRecord};

#[test]
fn ring_wraps_under_sustained_writes_and_every_record_survives() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");
    let config = CommandLogConfig::builder()
        .buffer_size(4096)
        .record_min_size(16)
        .flush_auto_size(512)
        .build();
    let log = CommandLog::init(config, &path, Arc::new(FixedCodec)).expect("init");

    const COUNT: u32 = 500;
    for i in 0..COUNT {
        let record = FixedRecord {
            body: i.to_le_bytes().to_vec(),
        };
        log.record_write(&record, None, false).expect("write");
    }

    log.shutdown();

    let outcome = log.file_apply(&path).expect("recovery");
    assert_eq!(outcome.records_replayed(), COUNT as usize);
    assert!(matches!(outcome, RecoveryOutcome::Clean { .. }));
}
