// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ordered KV store adapter: scoped reader/writer transactions over
//! an embedded, ordered, byte-keyed map, plus a process-wide registry that
//! serializes writer transactions per store.
//!
//! Backed by `sled`. Each logical store (branch, ref, hash,
//! label, stage-ref, stage-hash, and one per unpacked commit) is its own
//! `sled::Db` rooted at a stable path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;

use crate::error::Result;

struct WriterSlot {
    locked: Mutex<bool>,
    cv: Condvar,
}

impl WriterSlot {
    fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.cv.wait(locked).unwrap();
        }
        *locked = true;
    }

    fn release(&self) {
        let mut locked = self.locked.lock().unwrap();
        *locked = false;
        self.cv.notify_one();
    }
}

/// Process-wide registry that avoids overlapping writer transactions on the
/// same logical store within this process.
#[derive(Clone)]
pub struct TransactionRegistry {
    slots: Arc<Mutex<HashMap<String, Arc<WriterSlot>>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn slot_for(&self, store: &str) -> Arc<WriterSlot> {
        let mut slots = self.slots.lock().unwrap();
        slots
            .entry(store.to_string())
            .or_insert_with(|| Arc::new(WriterSlot::new()))
            .clone()
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A single logical ordered KV store. Each store is its own `sled::Db`
/// rooted at a stable path rather than a tree shared within one `Db`, so the on-disk layout
/// keeps the stable per-store file names existing repos rely on.
#[derive(Clone)]
pub struct KvStore {
    name: String,
    tree: sled::Db,
    registry: TransactionRegistry,
}

impl KvStore {
    /// Opens (creating if absent) the store rooted at `path`.
    pub fn open(path: &Path, registry: TransactionRegistry, name: &str) -> Result<Self> {
        let tree = sled::Config::default()
            .path(path)
            .flush_every_ms(Some(50))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self {
            name: name.to_string(),
            tree,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Multiple concurrent readers are allowed; each sees a consistent
    /// snapshot of the tree as of the call.
    pub fn begin_reader(&self) -> ReadTxn<'_> {
        ReadTxn { tree: &self.tree }
    }

    /// Blocks until no other writer transaction is open on this store, then
    /// returns a scoped writer transaction.
    pub fn begin_writer(&self) -> WriteTxn<'_> {
        let slot = self.registry.slot_for(&self.name);
        slot.acquire();
        WriteTxn {
            tree: &self.tree,
            batch: sled::Batch::default(),
            pending: HashMap::new(),
            slot,
            committed: false,
        }
    }
}

/// A read-only scoped transaction.
pub struct ReadTxn<'a> {
    tree: &'a sled::Db,
}

impl ReadTxn<'_> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    /// Ascending-order iterator over all keys starting with `prefix`.
    pub fn range(&self, prefix: &[u8]) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.tree
            .scan_prefix(prefix)
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }

    /// All (key, value) pairs in the store, in ascending key order.
    pub fn all(&self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.tree
            .iter()
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl KvStore {
    /// Removes every record from the store.
    pub fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}

/// A writer transaction. Writes are buffered and applied atomically to the
/// underlying tree on [`WriteTxn::commit`]; dropping without committing
/// discards all buffered writes (commit-or-abort on every exit path,
/// including early returns via `?`).
pub struct WriteTxn<'a> {
    tree: &'a sled::Db,
    batch: sled::Batch,
    pending: HashMap<Vec<u8>, Option<Vec<u8>>>,
    slot: Arc<WriterSlot>,
    committed: bool,
}

impl WriteTxn<'_> {
    /// Reads through pending writes in this transaction first, falling back
    /// to the committed state of the tree (read-your-own-writes).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch.insert(key, value);
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.batch.remove(key);
        self.pending.insert(key.to_vec(), None);
    }

    pub fn range(&self, prefix: &[u8]) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.tree
            .scan_prefix(prefix)
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }

    /// Atomically applies every buffered write to the underlying tree.
    pub fn commit(mut self) -> Result<()> {
        self.tree.apply_batch(std::mem::take(&mut self.batch))?;
        self.tree.flush()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_store(name: &str) -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(&dir.path().join(name), TransactionRegistry::new(), name).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read() {
        let (_dir, store) = open_test_store("branch");
        let mut txn = store.begin_writer();
        txn.put(b"branch:master", b"deadbeef");
        txn.commit().unwrap();

        let reader = store.begin_reader();
        assert_eq!(reader.get(b"branch:master").unwrap(), Some(b"deadbeef".to_vec()));
    }

    #[test]
    fn abort_on_drop_without_commit() {
        let (_dir, store) = open_test_store("branch");
        {
            let mut txn = store.begin_writer();
            txn.put(b"branch:master", b"deadbeef");
            // dropped without commit
        }
        let reader = store.begin_reader();
        assert_eq!(reader.get(b"branch:master").unwrap(), None);
    }

    #[test]
    fn range_scan_ascending() {
        let (_dir, store) = open_test_store("stage_ref");
        let mut txn = store.begin_writer();
        txn.put(b"a:ds1:s1", b"d1");
        txn.put(b"a:ds1:s0", b"d0");
        txn.put(b"s:ds1", b"schema");
        txn.commit().unwrap();

        let reader = store.begin_reader();
        let keys: Vec<_> = reader
            .range(b"a:ds1:")
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a:ds1:s0".to_vec(), b"a:ds1:s1".to_vec()]);
    }

    #[test]
    fn writer_serializes_within_process() {
        let (_dir, store) = open_test_store("branch");
        let txn1 = store.begin_writer();
        // A second writer attempted here would block; verify by releasing
        // the first before acquiring the second on the same thread.
        drop(txn1);
        let txn2 = store.begin_writer();
        drop(txn2);
    }
}
