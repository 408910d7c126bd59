#![allow(missing_docs)]
mod common;

use byteorder::{ByteOrder, LittleEndian};
use common::open_env;
use lmdb_bridge::*;
use tempfile::tempdir;

#[test]
fn test_open() {
    let dir = tempdir().unwrap();

    // opening non-existent env with read-only should fail
    assert!(
        Environment::builder()
            .set_flags(EnvironmentFlags::READ_ONLY)
            .open(dir.path())
            .is_err()
    );

    // opening non-existent env should succeed
    Environment::builder().open(dir.path()).unwrap();

    // opening env with read-only should succeed
    Environment::builder().set_flags(EnvironmentFlags::READ_ONLY).open(dir.path()).unwrap();
}

#[test]
fn test_open_creates_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("env");

    let env = Environment::builder().open(&path).unwrap();
    assert!(path.join("data.mdb").exists());
    assert!(path.join("lock.mdb").exists());
    assert_eq!(env.path(), path.as_path());
}

#[test]
fn test_open_no_sub_dir() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sub").join("env.mdb");

    let env = Environment::builder().set_flags(EnvironmentFlags::NO_SUB_DIR).open(&path).unwrap();
    assert!(path.is_file());
    assert!(dir.path().join("sub").join("env.mdb-lock").exists());
    assert!(env.flags().unwrap().contains(EnvironmentFlags::NO_SUB_DIR));
}

#[cfg(unix)]
#[test]
fn test_open_with_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let env = Environment::builder().set_mode(0o600).open(dir.path()).unwrap();
    let mode = std::fs::metadata(dir.path().join("data.mdb")).unwrap().permissions().mode();
    assert_eq!(mode & 0o077, 0);
    assert_eq!(env.fatal_error(), None);
}

#[test]
fn test_no_tls_is_always_set() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    assert!(env.flags().unwrap().contains(EnvironmentFlags::NO_TLS));
}

#[test]
fn test_lifecycle_errors() {
    let dir = tempdir().unwrap();
    let env = Environment::new(dir.path()).unwrap();

    assert_eq!(env.begin_ro_txn().unwrap_err(), LmdbError::EnvironmentNotOpen);
    assert!(!env.is_open());

    env.open(EnvironmentFlags::empty(), DEFAULT_MODE).unwrap();
    assert!(env.is_open());
    assert_eq!(
        env.open(EnvironmentFlags::empty(), DEFAULT_MODE),
        Err(LmdbError::EnvironmentAlreadyOpen)
    );

    env.close();
    assert!(env.is_closed());
    assert_eq!(env.begin_rw_txn().unwrap_err(), LmdbError::EnvironmentClosed);
    assert_eq!(env.set_map_size(1 << 20), Err(LmdbError::EnvironmentClosed));
    assert_eq!(env.stat().unwrap_err(), LmdbError::EnvironmentClosed);

    // a second close is a no-op
    env.close();
}

#[test]
fn test_failed_open_can_be_retried() {
    let dir = tempdir().unwrap();
    let env = Environment::new(dir.path()).unwrap();
    env.set_max_dbs(4).unwrap();

    // no data file yet, so a read-only open fails
    assert!(env.open(EnvironmentFlags::READ_ONLY, DEFAULT_MODE).is_err());
    assert!(!env.is_open());

    env.open(EnvironmentFlags::empty(), DEFAULT_MODE).unwrap();
    let txn = env.begin_rw_txn().unwrap();
    // max_dbs survived the failed attempt
    txn.create_db(Some("named"), DatabaseFlags::empty()).unwrap();
    txn.commit().unwrap();
}

#[test]
fn test_begin_txn() {
    let dir = tempdir().unwrap();

    {
        // writable environment
        let env = Environment::builder().open(dir.path()).unwrap();

        env.begin_rw_txn().unwrap();
        env.begin_ro_txn().unwrap();
    }

    {
        // read-only environment
        let env =
            Environment::builder().set_flags(EnvironmentFlags::READ_ONLY).open(dir.path()).unwrap();

        env.begin_rw_txn().unwrap_err();
        env.begin_ro_txn().unwrap();
    }
}

#[test]
fn test_begin_transaction_with_parent() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    let other_dir = tempdir().unwrap();
    let other = Environment::builder().open(other_dir.path()).unwrap();

    let parent = env.begin_rw_txn().unwrap();
    let child = env.begin_transaction(Some(&parent), TransactionFlags::empty()).unwrap();
    assert_eq!(child.parent_id(), Some(parent.id()));

    assert_eq!(
        other.begin_transaction(Some(&parent), TransactionFlags::empty()).unwrap_err(),
        LmdbError::EnvironmentMismatch
    );
    child.abort();
}

#[test]
fn test_open_db() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), 1);

    let txn = env.begin_ro_txn().unwrap();
    txn.open_db(None).unwrap();
    assert_eq!(txn.open_db(Some("testdb")).unwrap_err(), LmdbError::NotFound);
}

#[test]
fn test_create_db() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), 11);

    let txn = env.begin_rw_txn().unwrap();
    txn.open_db(Some("testdb")).unwrap_err();
    txn.create_db(Some("testdb"), DatabaseFlags::empty()).unwrap();
    txn.open_db(Some("testdb")).unwrap();
}

#[test]
fn test_too_many_dbs() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), 1);

    let txn = env.begin_rw_txn().unwrap();
    txn.create_db(Some("one"), DatabaseFlags::empty()).unwrap();
    assert_eq!(txn.create_db(Some("two"), DatabaseFlags::empty()).unwrap_err(), LmdbError::DbsFull);
}

#[test]
fn test_sync() {
    let dir = tempdir().unwrap();
    {
        let env = Environment::builder().open(dir.path()).unwrap();
        env.sync(true).unwrap();
    }
    {
        let env =
            Environment::builder().set_flags(EnvironmentFlags::READ_ONLY).open(dir.path()).unwrap();
        env.sync(true).unwrap_err();
    }
}

#[test]
fn test_stat() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    // Stats should be empty initially.
    let stat = env.stat().unwrap();
    assert_eq!(stat.depth, 0);
    assert_eq!(stat.branch_pages, 0);
    assert_eq!(stat.leaf_pages, 0);
    assert_eq!(stat.overflow_pages, 0);
    assert_eq!(stat.entries, 0);

    // Write a few small values.
    for i in 0..64 {
        let mut value = [0u8; 8];
        LittleEndian::write_u64(&mut value, i);
        let tx = env.begin_rw_txn().expect("begin_rw_txn");
        let db = tx.open_db(None).unwrap();
        tx.put(db, value, value, WriteFlags::default()).expect("tx.put");
        tx.commit().expect("tx.commit");
    }

    // Stats should now reflect inserted values.
    let stat = env.stat().unwrap();
    assert_eq!(stat.depth, 1);
    assert_eq!(stat.branch_pages, 0);
    assert_eq!(stat.leaf_pages, 1);
    assert_eq!(stat.overflow_pages, 0);
    assert_eq!(stat.entries, 64);
}

#[test]
fn test_info() {
    let map_size = 1024 * 1024;
    let dir = tempdir().unwrap();
    let env = Environment::builder()
        .set_map_size(map_size)
        .set_max_readers(16)
        .open(dir.path())
        .unwrap();

    let info = env.info().unwrap();
    assert_eq!(info.map_size, map_size);
    assert_eq!(info.max_readers, 16);
    assert_eq!(info.num_readers, 0);
    assert!(!env.is_read_only());

    env.close();
    let env = Environment::builder()
        .set_map_size(map_size)
        .set_flags(EnvironmentFlags::READ_ONLY)
        .open(dir.path())
        .unwrap();
    assert!(env.is_read_only());
}

#[test]
fn test_max_key_size_and_version() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    assert_eq!(env.max_key_size().unwrap(), 511);

    let version = version();
    assert_eq!(version.major, 0);
    assert!(version.text.starts_with("LMDB"));
}

#[test]
fn test_reader_check() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    assert_eq!(env.reader_check().unwrap(), 0);
}

#[test]
fn test_copy_to() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), 2);
    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(Some("copied"), DatabaseFlags::empty()).unwrap();
    txn.put(db, b"key", b"value", WriteFlags::empty()).unwrap();
    txn.commit().unwrap();

    for compact in [false, true] {
        let target = tempdir().unwrap();
        let path = target.path().join("copy");
        env.copy_to(&path, compact).unwrap();

        let copy = open_env(&path, 2);
        let txn = copy.begin_ro_txn().unwrap();
        let db = txn.open_db(Some("copied")).unwrap();
        assert_eq!(txn.get_owned(db, b"key").unwrap().as_deref(), Some(&b"value"[..]));
    }
}

#[test]
fn test_close_aborts_descendants() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let root = env.begin_rw_txn().unwrap();
    let db = root.open_db(None).unwrap();
    root.put(db, b"a", b"1", WriteFlags::empty()).unwrap();
    let child = root.begin_nested_txn().unwrap();
    let grandchild = child.begin_nested_txn().unwrap();
    let mut cursor = grandchild.cursor(db).unwrap();
    assert!(cursor.first().unwrap().is_some());

    let reader_env = env.clone();
    let reader = reader_env.begin_ro_txn().unwrap();

    env.close();

    for txn in [&root, &child, &grandchild, &reader] {
        assert_eq!(txn.state(), TransactionState::Aborted);
    }
    assert_eq!(
        cursor.first().unwrap_err(),
        LmdbError::TxnNotActive(TransactionState::Aborted)
    );
    assert_eq!(
        root.put(db, b"b", b"2", WriteFlags::empty()),
        Err(LmdbError::TxnNotActive(TransactionState::Aborted))
    );
    drop(cursor);
}

#[test]
fn test_dropping_env_keeps_live_transactions_usable() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    let txn = env.begin_rw_txn().unwrap();
    drop(env);

    let db = txn.open_db(None).unwrap();
    txn.put(db, b"k", b"v", WriteFlags::empty()).unwrap();
    txn.commit().unwrap();
}
