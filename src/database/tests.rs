use super::*;
use crate::error::DbError;
use crate::record::{DataType, Record, Value};
use tempfile::TempDir;

fn small_config() -> DbConfig {
    DbConfig {
        page_size: 256,
        pool_pages: 8,
        lock_timeout_min_ms: 200,
        lock_timeout_max_ms: 400,
    }
}

fn setup_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), small_config()).unwrap();
    (temp_dir, db)
}

fn people() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", DataType::Int, true),
        ColumnDef::new("name", DataType::Char(12), false),
    ]
}

fn person(id: i32, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::String(name.to_string())]
}

fn scan_all(db: &Database, table: TableId) -> Vec<Record> {
    let txn = db.begin();
    let records = txn
        .scan(table)
        .unwrap()
        .collect::<DbResult<Vec<_>>>()
        .unwrap();
    txn.commit().unwrap();
    records
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = DbConfig {
        page_size: 0,
        ..small_config()
    };
    assert!(matches!(
        Database::open(temp_dir.path(), config),
        Err(DbError::InvalidConfig(_))
    ));
}

#[test]
fn test_transaction_ids_are_unique() {
    let (_temp, db) = setup_test_db();
    let a = db.begin();
    let b = db.begin();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_insert_commit_scan() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();

    let txn = db.begin();
    let rid = txn.insert(table, person(1, "ada")).unwrap();
    txn.insert(table, person(2, "grace")).unwrap();
    txn.commit().unwrap();

    let rows = scan_all(&db, table);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values(), &person(1, "ada")[..]);
    assert_eq!(rows[0].record_id(), Some(rid));
}

#[test]
fn test_abort_discards_inserts() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();

    let txn = db.begin();
    txn.insert(table, person(1, "ada")).unwrap();
    txn.abort().unwrap();

    assert!(scan_all(&db, table).is_empty());
    assert!(db.buffer_pool().dirty_pages().is_empty());
}

#[test]
fn test_dropped_transaction_aborts() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();

    let tid = {
        let txn = db.begin();
        txn.insert(table, person(1, "ada")).unwrap();
        txn.id()
    };

    assert!(db.buffer_pool().lock_manager().locked_pages(tid).is_empty());
    assert!(scan_all(&db, table).is_empty());
}

#[test]
fn test_delete_through_scan() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();
    db.run(1, |txn| {
        for i in 0..5 {
            txn.insert(table, person(i, "x"))?;
        }
        Ok(())
    })
    .unwrap();

    let txn = db.begin();
    let mut victims: Vec<Record> = txn
        .scan(table)
        .unwrap()
        .map(|r| r.unwrap())
        .filter(|r| matches!(r.get(0), Some(Value::Int(i)) if i % 2 == 0))
        .collect();
    for record in &mut victims {
        txn.delete(record).unwrap();
        assert_eq!(record.record_id(), None);
    }
    txn.commit().unwrap();

    let left: Vec<Value> = scan_all(&db, table)
        .iter()
        .map(|r| r.get(0).cloned().unwrap())
        .collect();
    assert_eq!(left, vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn test_scan_rewind_and_multiple_pages() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();
    // 17-byte tuples in 256-byte pages: 14 per page
    db.run(1, |txn| {
        for i in 0..40 {
            txn.insert(table, person(i, "row"))?;
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(db.catalog().store(table).unwrap().page_count().unwrap(), 3);

    let txn = db.begin();
    let mut scan = txn.scan(table).unwrap();
    let first: Vec<Record> = scan.by_ref().take(20).map(|r| r.unwrap()).collect();
    assert_eq!(first.len(), 20);

    scan.rewind();
    let all: Vec<Record> = scan.map(|r| r.unwrap()).collect();
    assert_eq!(all.len(), 40);
    assert_eq!(all[..20], first[..]);
    txn.commit().unwrap();
}

#[test]
fn test_run_gives_up_on_structural_errors() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("people", people()).unwrap();

    let mut calls = 0;
    let result = db.run(5, |txn| {
        calls += 1;
        txn.insert(table, vec![Value::Null, Value::Null])
    });
    assert!(matches!(result, Err(DbError::Record(_))));
    assert_eq!(calls, 1);
}

#[test]
fn test_close_and_reopen_keeps_committed_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), small_config()).unwrap();
        let table = db.create_table("people", people()).unwrap();
        db.run(1, |txn| txn.insert(table, person(7, "kept"))).unwrap();

        let txn = db.begin();
        txn.insert(table, person(8, "lost")).unwrap();
        txn.abort().unwrap();
        db.close().unwrap();
    }

    let db = Database::open(temp_dir.path(), small_config()).unwrap();
    let table = db.table_id("people").unwrap();
    let rows = scan_all(&db, table);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values(), &person(7, "kept")[..]);
}

#[test]
fn test_reopen_with_different_page_size_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), small_config()).unwrap();
        let table = db.create_table("people", people()).unwrap();
        db.run(1, |txn| {
            for i in 0..3 {
                txn.insert(table, person(i, "p"))?;
            }
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    let smaller = DbConfig {
        page_size: 128,
        ..small_config()
    };
    assert!(matches!(
        Database::open(temp_dir.path(), smaller),
        Err(DbError::InvalidConfig(_))
    ));

    let db = Database::open(temp_dir.path(), small_config()).unwrap();
    let table = db.table_id("people").unwrap();
    assert_eq!(scan_all(&db, table).len(), 3);
}
