//! Shared helpers for integration tests.
#![allow(dead_code)]

use lmdb_bridge::{Environment, KvView, LmdbResult, ValueView};
use std::path::Path;

/// Opens an environment with room for `max_dbs` named databases.
pub fn open_env(path: &Path, max_dbs: u32) -> Environment {
    Environment::builder().set_max_dbs(max_dbs).open(path).unwrap()
}

/// Copies a navigation result out of the map.
pub fn kv(item: LmdbResult<Option<KvView<'_>>>) -> Option<(Vec<u8>, Vec<u8>)> {
    item.unwrap().map(|(k, v)| (k.to_vec().unwrap(), v.to_vec().unwrap()))
}

/// Copies a value result out of the map.
pub fn val(item: LmdbResult<Option<ValueView<'_>>>) -> Option<Vec<u8>> {
    item.unwrap().map(|v| v.to_vec().unwrap())
}

/// An owned key/value pair, for comparisons.
pub fn pair(k: &[u8], v: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    Some((k.to_vec(), v.to_vec()))
}
