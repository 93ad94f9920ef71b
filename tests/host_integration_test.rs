//! End-to-end seed scenarios against a real `SqlEngineHost`, using the
//! reference engine in `tests/support` in place of the out-of-scope
//! SQL parser/planner/VM.

mod support;

use std::sync::Arc;
use std::time::Duration;

use driftdb::block::{BlockStore, MemoryBlockBackend};
use driftdb::common::clock::{Clock, Deadline, ManualClock};
use driftdb::host::{CipherHookFactory, NullCipherFactory, OpenConfig, SqlEngineFactory, SqlEngineHost, Value};

use support::SeedEngineFactory;

fn test_host(clock: ManualClock) -> SqlEngineHost {
    let block_store = Arc::new(BlockStore::new(Box::new(MemoryBlockBackend::new()), Arc::new(clock.clone())));
    let engine_factory: Arc<dyn SqlEngineFactory> = Arc::new(SeedEngineFactory);
    let cipher_factory: Arc<dyn CipherHookFactory> = Arc::new(NullCipherFactory);
    SqlEngineHost::new(block_store, engine_factory, cipher_factory, Arc::new(clock))
}

fn forever(clock: &dyn Clock) -> Deadline {
    Deadline::after(clock, Duration::from_secs(60))
}

#[test]
fn scenario_1_create_insert_query() {
    let clock = ManualClock::new();
    let host = test_host(clock.clone());
    let deadline = forever(&clock);

    let handle = host.open(OpenConfig::new("t1.db")).unwrap();
    host.execute(handle, "CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT)", deadline)
        .unwrap();

    let r1 = host.execute(handle, "INSERT INTO items VALUES (1, 'a')", deadline).unwrap();
    assert_eq!(r1.rows_affected, 1);
    let r2 = host.execute(handle, "INSERT INTO items VALUES (2, 'b')", deadline).unwrap();
    assert_eq!(r2.rows_affected, 1);

    let select = host.execute(handle, "SELECT name FROM items ORDER BY id", deadline).unwrap();
    assert_eq!(select.columns, vec!["name".to_string()]);
    assert_eq!(select.rows, vec![vec![Value::Text("a".to_string())], vec![Value::Text("b".to_string())]]);
    assert_eq!(select.rows_affected, 0);
}

#[test]
fn scenario_2_transaction_rollback() {
    let clock = ManualClock::new();
    let host = test_host(clock.clone());
    let deadline = forever(&clock);

    let handle = host.open(OpenConfig::new("t1.db")).unwrap();
    host.execute(handle, "CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT)", deadline).unwrap();
    host.execute(handle, "INSERT INTO items VALUES (1, 'a')", deadline).unwrap();
    host.execute(handle, "INSERT INTO items VALUES (2, 'b')", deadline).unwrap();

    let epoch_before = host.change_epoch(handle).unwrap();

    host.begin(handle, driftdb::txn::Mode::Deferred, deadline).unwrap();
    host.execute(handle, "INSERT INTO items VALUES (3, 'c')", deadline).unwrap();
    host.rollback(handle).unwrap();

    let count = host.execute(handle, "SELECT count(*) FROM items", deadline).unwrap();
    assert_eq!(count.rows, vec![vec![Value::Integer(2)]]);

    let epoch_after = host.change_epoch(handle).unwrap();
    assert_eq!(epoch_before, epoch_after);
}

#[test]
fn scenario_3_export_import_round_trip() {
    let clock = ManualClock::new();
    let host = test_host(clock.clone());
    let deadline = forever(&clock);

    let handle = host.open(OpenConfig::new("t1.db")).unwrap();
    host.execute(handle, "CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT)", deadline).unwrap();
    host.execute(handle, "INSERT INTO items VALUES (1, 'a')", deadline).unwrap();
    host.execute(handle, "INSERT INTO items VALUES (2, 'b')", deadline).unwrap();

    let exported = host.export_to_bytes(handle).unwrap();
    assert_eq!(&exported[0..16], b"SQLite format 3\0");

    let handle2 = host.open(OpenConfig::new("t2.db")).unwrap();
    host.import_from_bytes(handle2, &exported, deadline).unwrap();

    let select = host.execute(handle2, "SELECT name FROM items ORDER BY id", deadline).unwrap();
    assert_eq!(select.rows, vec![vec![Value::Text("a".to_string())], vec![Value::Text("b".to_string())]]);
}
