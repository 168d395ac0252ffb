//! S1: a straightforward sequence of writes reaches disk, in order, once
//! flushed and fsynced.

mod common;

use std::sync::Arc;

use cachelog::{CommandLog, CommandLogConfig, Waiter};
use tempfile::tempdir;

use common::{CountingWaiter, FixedCodec, FixedRecord};

#[test]
fn writes_flush_and_fsync_advance_the_lsn_cursors_in_order() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");
    let config = CommandLogConfig::builder()
        .buffer_size(1024 * 1024)
        .record_min_size(16)
        .build();
    let log = CommandLog::init(config, &path, Arc::new(FixedCodec)).expect("init");

    assert_eq!(log.get_flush_lsn(), log.get_fsync_lsn());

    let waiter = CountingWaiter::default();
    for i in 0..100u8 {
        let record = FixedRecord { body: vec![i; 32] };
        let is_last = i == 99;
        let waiter_arg: Option<&dyn Waiter> = if is_last { Some(&waiter) } else { None };
        log.record_write(&record, waiter_arg, false).expect("write");
    }

    let target = waiter.lsn().expect("waiter was stamped");
    log.buffer_flush(target);
    assert!(log.get_flush_lsn() >= target);
    // fsync lags flush until explicitly driven.
    assert!(log.get_fsync_lsn() <= log.get_flush_lsn());

    log.shutdown();
    assert!(log.get_fsync_lsn() >= target);

    let on_disk = std::fs::metadata(&path).expect("metadata").len();
    assert_eq!(on_disk, 100 * (8 + 32));
}

#[test]
fn shutdown_is_idempotent() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cmdlog");
    let log = CommandLog::init(CommandLogConfig::default(), &path, Arc::new(FixedCodec))
        .expect("init");

    log.record_write(&FixedRecord { body: vec![1, 2, 3] }, None, false)
        .expect("write");

    log.shutdown();
    log.shutdown(); // must not panic or double-close anything
}
