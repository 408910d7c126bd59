#![allow(missing_docs)]
mod common;

use common::{kv, pair, val};
use lmdb_bridge::*;
use tempfile::tempdir;

#[test]
fn test_get() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.open_db(None).unwrap();

    assert_eq!(kv(txn.cursor(db).unwrap().first()), None);

    txn.put(db, b"key1", b"val1", WriteFlags::empty()).unwrap();
    txn.put(db, b"key2", b"val2", WriteFlags::empty()).unwrap();
    txn.put(db, b"key3", b"val3", WriteFlags::empty()).unwrap();

    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(kv(cursor.first()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.get_current()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.next()), pair(b"key2", b"val2"));
    assert_eq!(kv(cursor.prev()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.last()), pair(b"key3", b"val3"));
    assert_eq!(val(cursor.set(b"key1")), Some(b"val1".to_vec()));
    assert_eq!(kv(cursor.set_key(b"key3")), pair(b"key3", b"val3"));
    assert_eq!(kv(cursor.set_range(b"key2\0")), pair(b"key3", b"val3"));
    assert_eq!(kv(cursor.set_range(b"key4")), None);
    assert_eq!(val(cursor.set(b"missing")), None);
}

#[test]
fn test_get_dup() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT).unwrap();
    txn.put(db, b"key1", b"val1", WriteFlags::empty()).unwrap();
    txn.put(db, b"key1", b"val2", WriteFlags::empty()).unwrap();
    txn.put(db, b"key1", b"val3", WriteFlags::empty()).unwrap();
    txn.put(db, b"key2", b"val1", WriteFlags::empty()).unwrap();
    txn.put(db, b"key2", b"val2", WriteFlags::empty()).unwrap();
    txn.put(db, b"key2", b"val3", WriteFlags::empty()).unwrap();

    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(kv(cursor.first()), pair(b"key1", b"val1"));
    assert_eq!(val(cursor.first_dup()), Some(b"val1".to_vec()));
    assert_eq!(kv(cursor.get_current()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.next_nodup()), pair(b"key2", b"val1"));
    assert_eq!(kv(cursor.next()), pair(b"key2", b"val2"));
    assert_eq!(kv(cursor.prev()), pair(b"key2", b"val1"));
    assert_eq!(kv(cursor.next_dup()), pair(b"key2", b"val2"));
    assert_eq!(kv(cursor.next_dup()), pair(b"key2", b"val3"));
    assert_eq!(kv(cursor.next_dup()), None);
    assert_eq!(kv(cursor.prev_dup()), pair(b"key2", b"val2"));
    assert_eq!(val(cursor.last_dup()), Some(b"val3".to_vec()));
    assert_eq!(kv(cursor.prev_nodup()), pair(b"key1", b"val3"));
    assert_eq!(kv(cursor.next_dup()), None);
    assert_eq!(val(cursor.set(b"key1")), Some(b"val1".to_vec()));
    assert_eq!(cursor.count().unwrap(), 3);
    assert_eq!(val(cursor.set(b"key2")), Some(b"val1".to_vec()));
    assert_eq!(kv(cursor.set_range(b"key1\0")), pair(b"key2", b"val1"));
    assert_eq!(val(cursor.get_both(b"key1", b"val3")), Some(b"val3".to_vec()));
    assert_eq!(val(cursor.get_both_range(b"key1", b"val4")), None);
    assert_eq!(val(cursor.get_both_range(b"key2", b"val")), Some(b"val1".to_vec()));

    assert_eq!(kv(cursor.last()), pair(b"key2", b"val3"));
    cursor.del(false).unwrap();
    assert_eq!(kv(cursor.last()), pair(b"key2", b"val2"));
    cursor.del(false).unwrap();
    assert_eq!(kv(cursor.last()), pair(b"key2", b"val1"));
    cursor.del(false).unwrap();
    assert_eq!(kv(cursor.last()), pair(b"key1", b"val3"));
}

#[test]
fn test_del_all_duplicates() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT).unwrap();
    for v in [b"a", b"b", b"c"] {
        txn.put(db, b"key1", v, WriteFlags::empty()).unwrap();
    }
    txn.put(db, b"key2", b"a", WriteFlags::empty()).unwrap();

    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(val(cursor.set(b"key1")), Some(b"a".to_vec()));
    cursor.del(true).unwrap();
    assert!(!cursor.is_positioned());
    assert_eq!(cursor.del(false), Err(LmdbError::CursorNotPositioned));
    assert_eq!(kv(cursor.first()), pair(b"key2", b"a"));
    drop(cursor);
    assert_eq!(txn.entries(db).unwrap(), 1);
}

#[test]
fn test_put_no_dup_data() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT).unwrap();
    let mut cursor = txn.cursor(db).unwrap();
    cursor.put(b"key", b"val", WriteFlags::NO_DUP_DATA).unwrap();
    assert_eq!(cursor.put(b"key", b"val", WriteFlags::NO_DUP_DATA), Err(LmdbError::KeyExist));
    cursor.put(b"key", b"val2", WriteFlags::NO_DUP_DATA).unwrap();
    assert_eq!(val(cursor.set(b"key")), Some(b"val".to_vec()));
    assert_eq!(cursor.count().unwrap(), 2);
}

#[test]
fn test_cursor_put_then_traverse() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    {
        let mut cursor = txn.cursor(db).unwrap();
        for i in 1..=5 {
            let (key, value) = (format!("key{i}"), format!("val{i}"));
            cursor.put(key.as_bytes(), value.as_bytes(), WriteFlags::empty()).unwrap();
        }
    }
    txn.commit().unwrap();

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(kv(cursor.first()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.last()), pair(b"key5", b"val5"));

    let keys = cursor.iter_start().map(|item| item.unwrap().0).collect::<Vec<_>>();
    let expected = (1..=5).map(|i| format!("key{i}").into_bytes()).collect::<Vec<_>>();
    assert_eq!(keys, expected);
}

#[test]
fn test_empty_database() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let mut cursor = txn.cursor(db).unwrap();

    assert_eq!(cursor.get_current().unwrap_err(), LmdbError::CursorNotPositioned);
    assert_eq!(kv(cursor.next()), None);
    assert_eq!(kv(cursor.first()), None);
    assert_eq!(kv(cursor.last()), None);
    assert_eq!(cursor.iter().count(), 0);
    assert_eq!(cursor.iter_from(b"a").unwrap().count(), 0);
}

#[test]
fn test_iter() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"key1".to_vec(), b"val1".to_vec()),
        (b"key2".to_vec(), b"val2".to_vec()),
        (b"key3".to_vec(), b"val3".to_vec()),
        (b"key5".to_vec(), b"val5".to_vec()),
    ];

    {
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        for (key, data) in &items {
            txn.put(db, key, data, WriteFlags::empty()).unwrap();
        }
        assert!(!txn.contains_key(db, b"key4").unwrap());
        txn.commit().unwrap();
    }

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let mut cursor = txn.cursor(db).unwrap();

    // Because Result implements FromIterator, we can collect the iterator
    // of items of type Result<_, E> into a Result<Vec<_, E>> by specifying
    // the collection type via the turbofish syntax.
    assert_eq!(items, cursor.iter().collect::<LmdbResult<Vec<_>>>().unwrap());

    // Alternately, we can optionally specify the collection type via the
    // type annotation of the binding.
    let retr: LmdbResult<Vec<_>> = cursor.iter_start().collect();
    assert_eq!(items, retr.unwrap());

    assert_eq!(val(cursor.set(b"key2")), Some(b"val2".to_vec()));
    assert_eq!(
        items.clone().into_iter().skip(2).collect::<Vec<_>>(),
        cursor.iter().collect::<LmdbResult<Vec<_>>>().unwrap()
    );

    assert_eq!(items, cursor.iter_start().collect::<LmdbResult<Vec<_>>>().unwrap());

    assert_eq!(
        items.clone().into_iter().skip(1).collect::<Vec<_>>(),
        cursor.iter_from(b"key2").unwrap().collect::<LmdbResult<Vec<_>>>().unwrap()
    );

    assert_eq!(
        items.clone().into_iter().skip(3).collect::<Vec<_>>(),
        cursor.iter_from(b"key4").unwrap().collect::<LmdbResult<Vec<_>>>().unwrap()
    );

    assert_eq!(
        Vec::<(Vec<u8>, Vec<u8>)>::new(),
        cursor.iter_from(b"key6").unwrap().collect::<LmdbResult<Vec<_>>>().unwrap()
    );
}

#[test]
fn test_iter_dup() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT).unwrap();
    let items: Vec<(Vec<u8>, Vec<u8>)> = ["a", "b", "c"]
        .into_iter()
        .flat_map(|k| ["1", "2", "3"].into_iter().map(move |v| (k, v)))
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    for (key, data) in &items {
        txn.put(db, key, data, WriteFlags::empty()).unwrap();
    }
    txn.commit().unwrap();

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let mut cursor = txn.cursor(db).unwrap();

    assert_eq!(items, cursor.iter_start().collect::<LmdbResult<Vec<_>>>().unwrap());

    assert_eq!(
        items.iter().filter(|(k, _)| k == b"b").cloned().collect::<Vec<_>>(),
        cursor.iter_dup_of(b"b").unwrap().collect::<LmdbResult<Vec<_>>>().unwrap()
    );
    assert_eq!(0, cursor.iter_dup_of(b"z").unwrap().count());

    // the stored flags come back when opening without any
    assert!(cursor.db_flags().contains(DatabaseFlags::DUP_SORT));
}

#[test]
fn test_dup_ops_require_dup_sort() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    txn.put(db, b"key", b"val", WriteFlags::empty()).unwrap();

    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(cursor.get_both(b"key", b"val").unwrap_err(), LmdbError::RequiresDupSort);
    assert_eq!(cursor.next_dup().unwrap_err(), LmdbError::RequiresDupSort);
    assert_eq!(cursor.iter_dup_of(b"key").unwrap_err(), LmdbError::RequiresDupSort);
    assert_eq!(cursor.get_multiple::<u32>().unwrap_err(), LmdbError::RequiresDupFixed);
}

#[test]
fn test_put_get_multiple() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT | DatabaseFlags::DUP_FIXED).unwrap();
    let mut cursor = txn.cursor(db).unwrap();

    let values: Vec<u32> = (1..=5).collect();
    assert_eq!(cursor.put_multiple(b"key", &values, WriteFlags::empty()).unwrap(), 5);
    assert_eq!(cursor.put_multiple::<u32>(b"key", &[], WriteFlags::empty()).unwrap(), 0);
    assert_eq!(cursor.put_multiple(b"single", &[9u32], WriteFlags::empty()).unwrap(), 1);

    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(cursor.get_multiple::<u32>().unwrap_err(), LmdbError::CursorNotPositioned);

    assert_eq!(val(cursor.set(b"key")), Some(1u32.to_ne_bytes().to_vec()));
    assert_eq!(cursor.count().unwrap(), 5);
    assert_eq!(cursor.get_multiple::<u32>().unwrap(), Some(values.clone()));
    assert_eq!(cursor.next_multiple::<u32>().unwrap(), None);

    // a lone value is not stored as a duplicate page
    assert_eq!(val(cursor.set(b"single")), Some(9u32.to_ne_bytes().to_vec()));
    assert_eq!(cursor.get_multiple::<u32>().unwrap(), Some(vec![9]));

    // the wrong element width is rejected
    cursor.set(b"key").unwrap();
    assert_eq!(
        cursor.get_multiple::<u64>().unwrap_err(),
        LmdbError::ElementSizeMismatch { len: 20, width: 8 }
    );
}

#[test]
fn test_put_multiple_spans_pages() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn
        .create_db(
            None,
            DatabaseFlags::DUP_SORT | DatabaseFlags::DUP_FIXED | DatabaseFlags::INTEGER_DUP,
        )
        .unwrap();
    let values: Vec<u64> = (0..2000u64).map(|i| i * 7).collect();
    {
        let mut cursor = txn.cursor(db).unwrap();
        assert_eq!(cursor.put_multiple(b"key", &values, WriteFlags::empty()).unwrap(), 2000);
    }
    txn.commit().unwrap();

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();

    // positioned first, then page by page
    let mut cursor = txn.cursor(db).unwrap();
    cursor.set(b"key").unwrap();
    let mut read = cursor.get_multiple::<u64>().unwrap().unwrap();
    assert!(read.len() < values.len());
    while let Some(page) = cursor.next_multiple::<u64>().unwrap() {
        read.extend(page);
    }
    assert_eq!(read, values);

    // a fresh cursor starts at the first key
    let mut cursor = txn.cursor(db).unwrap();
    let mut read = Vec::new();
    while let Some(page) = cursor.next_multiple::<u64>().unwrap() {
        read.extend(page);
    }
    assert_eq!(read, values);
}

#[test]
fn test_put_multiple_slices() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let db = txn.create_db(None, DatabaseFlags::DUP_SORT | DatabaseFlags::DUP_FIXED).unwrap();
    let mut cursor = txn.cursor(db).unwrap();

    assert_eq!(
        cursor.put_multiple_slices(b"key", &[&b"abcd"[..], &b"abc"[..]], WriteFlags::empty()),
        Err(LmdbError::ElementSizeMismatch { len: 3, width: 4 })
    );
    assert_eq!(cursor.put_multiple_slices(b"key", &[], WriteFlags::empty()), Ok(0));
    assert_eq!(
        cursor.put_multiple_slices(
            b"key",
            &[&b"dddd"[..], &b"bbbb"[..], &b"cccc"[..]],
            WriteFlags::empty()
        ),
        Ok(3)
    );

    cursor.set(b"key").unwrap();
    assert_eq!(
        cursor.get_multiple::<[u8; 4]>().unwrap(),
        Some(vec![*b"bbbb", *b"cccc", *b"dddd"])
    );
}

#[test]
fn test_cursor_on_read_only_txn_rejects_writes() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let mut cursor = txn.cursor(db).unwrap();
    assert_eq!(cursor.put(b"k", b"v", WriteFlags::empty()), Err(LmdbError::ReadWriteRequired));
    assert_eq!(cursor.del(false), Err(LmdbError::ReadWriteRequired));
}

#[test]
fn test_cursor_closed_by_ancestor_end() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();

    let root = env.begin_rw_txn().unwrap();
    let db = root.open_db(None).unwrap();
    root.put(db, b"k", b"v", WriteFlags::empty()).unwrap();
    let child = root.begin_nested_txn().unwrap();
    let mut cursor = child.cursor(db).unwrap();
    assert_eq!(kv(cursor.first()), pair(b"k", b"v"));
    let view = cursor.get_current().unwrap().unwrap().1;

    root.abort();
    assert_eq!(cursor.first().unwrap_err(), LmdbError::TxnNotActive(TransactionState::Aborted));
    assert!(!cursor.is_positioned());
    assert_eq!(view.to_vec(), Err(LmdbError::StaleView));
}

#[test]
fn test_cursor_survives_reset_and_renew() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    {
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        txn.put(db, b"key2", b"val2", WriteFlags::empty()).unwrap();
        txn.commit().unwrap();
    }

    let reader = env.begin_ro_txn().unwrap();
    let db = reader.open_db(None).unwrap();
    let mut cursor = reader.cursor(db).unwrap();
    assert_eq!(kv(cursor.first()), pair(b"key2", b"val2"));

    reader.reset().unwrap();
    assert_eq!(cursor.first().unwrap_err(), LmdbError::TxnNotActive(TransactionState::Reset));

    {
        let txn = env.begin_rw_txn().unwrap();
        txn.put(db, b"key1", b"val1", WriteFlags::empty()).unwrap();
        txn.commit().unwrap();
    }

    reader.renew().unwrap();
    // the cursor rebinds to the new snapshot, unpositioned
    assert_eq!(cursor.get_current().unwrap_err(), LmdbError::CursorNotPositioned);
    assert_eq!(kv(cursor.first()), pair(b"key1", b"val1"));
    assert_eq!(kv(cursor.next()), pair(b"key2", b"val2"));
}

#[test]
fn test_cursor_renew_to_other_transaction() {
    let dir = tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    {
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        txn.put(db, b"key1", b"val1", WriteFlags::empty()).unwrap();
        txn.commit().unwrap();
    }

    let first = env.begin_ro_txn().unwrap();
    let db = first.open_db(None).unwrap();
    let mut cursor = first.cursor(db).unwrap();
    assert_eq!(kv(cursor.last()), pair(b"key1", b"val1"));

    {
        let txn = env.begin_rw_txn().unwrap();
        txn.put(db, b"key2", b"val2", WriteFlags::empty()).unwrap();
        txn.commit().unwrap();
    }

    let second = env.begin_ro_txn().unwrap();
    let mut cursor = cursor.renew(&second).unwrap();
    assert_eq!(cursor.txn().id(), second.id());
    assert!(!cursor.is_positioned());
    assert_eq!(kv(cursor.last()), pair(b"key2", b"val2"));

    // the old transaction is unaffected
    assert_eq!(first.entries(db).unwrap(), 1);

    let writer = env.begin_rw_txn().unwrap();
    let rw_cursor = writer.cursor(db).unwrap();
    assert_eq!(rw_cursor.renew(&second).unwrap_err(), LmdbError::ReadOnlyRequired);
    let cursor = cursor.renew(&first).unwrap();
    assert_eq!(cursor.db(), db);
}
