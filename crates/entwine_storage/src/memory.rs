//! In-memory backend for testing and ephemeral storage.

use crate::error::StorageResult;
use crate::kv::{Bucket, KvEngine, KvRead, KvWrite};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;
type Tables = BTreeMap<String, Table>;

/// A non-persistent engine backed by ordered maps.
///
/// Transactions clone the current state, which keeps snapshot isolation and
/// rollback trivial at the cost of copying; this backend exists for tests.
/// Writers are serialized through a blocking gate, mirroring the contract of
/// the persistent engine.
#[derive(Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    writer_busy: Mutex<bool>,
    writer_released: Condvar,
}

impl Shared {
    fn acquire_writer(&self) {
        let mut busy = self.writer_busy.lock();
        while *busy {
            self.writer_released.wait(&mut busy);
        }
        *busy = true;
    }

    fn release_writer(&self) {
        let mut busy = self.writer_busy.lock();
        *busy = false;
        self.writer_released.notify_one();
    }
}

impl MemoryEngine {
    /// Creates an empty in-memory engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemoryEngine {
    fn begin_read(&self) -> StorageResult<Box<dyn KvRead>> {
        let tables = self.shared.tables.read().clone();
        Ok(Box::new(MemoryRead { tables }))
    }

    fn begin_write(&self) -> StorageResult<Box<dyn KvWrite>> {
        self.shared.acquire_writer();
        let tables = self.shared.tables.read().clone();
        Ok(Box::new(MemoryWrite {
            shared: Arc::clone(&self.shared),
            tables,
        }))
    }
}

fn probe_tables(
    tables: &Tables,
    table: &str,
    lo: Bound<Vec<u8>>,
    hi: Bound<Vec<u8>>,
    backward: bool,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let table = tables.get(table)?;
    let mut range = table.range((lo, hi));
    let entry = if backward { range.next_back() } else { range.next() };
    entry.map(|(k, v)| (k.clone(), v.clone()))
}

struct MemoryRead {
    tables: Tables,
}

impl KvRead for MemoryRead {
    fn get(&self, bucket: &Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .get(bucket.table())
            .and_then(|table| table.get(&bucket.key(key)))
            .cloned())
    }

    fn probe(
        &self,
        table: &str,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        backward: bool,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(probe_tables(&self.tables, table, lo, hi, backward))
    }
}

struct MemoryWrite {
    shared: Arc<Shared>,
    tables: Tables,
}

impl KvRead for MemoryWrite {
    fn get(&self, bucket: &Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .get(bucket.table())
            .and_then(|table| table.get(&bucket.key(key)))
            .cloned())
    }

    fn probe(
        &self,
        table: &str,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        backward: bool,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(probe_tables(&self.tables, table, lo, hi, backward))
    }
}

impl KvWrite for MemoryWrite {
    fn put(&mut self, bucket: &Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tables
            .entry(bucket.table().to_string())
            .or_default()
            .insert(bucket.key(key), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket: &Bucket, key: &[u8]) -> StorageResult<()> {
        if let Some(table) = self.tables.get_mut(bucket.table()) {
            table.remove(&bucket.key(key));
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let tables = std::mem::take(&mut self.tables);
        *self.shared.tables.write() = tables;
        Ok(())
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}

impl Drop for MemoryWrite {
    fn drop(&mut self) {
        self.shared.release_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Seek;

    fn write(engine: &MemoryEngine, bucket: &Bucket, pairs: &[(&[u8], &[u8])]) {
        let mut txn = engine.begin_write().unwrap();
        for (key, value) in pairs {
            txn.put(bucket, key, value).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn put_get_roundtrip() {
        let engine = MemoryEngine::new();
        let bucket = Bucket::root("entries");
        write(&engine, &bucket, &[(b"00000000", b"payload")]);

        let read = engine.begin_read().unwrap();
        assert_eq!(
            read.get(&bucket, b"00000000").unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(read.get(&bucket, b"00000001").unwrap(), None);
    }

    #[test]
    fn rollback_on_drop() {
        let engine = MemoryEngine::new();
        let bucket = Bucket::root("entries");

        {
            let mut txn = engine.begin_write().unwrap();
            txn.put(&bucket, b"00000000", b"payload").unwrap();
            // dropped without commit
        }

        let read = engine.begin_read().unwrap();
        assert_eq!(read.get(&bucket, b"00000000").unwrap(), None);
    }

    #[test]
    fn snapshot_isolation() {
        let engine = MemoryEngine::new();
        let bucket = Bucket::root("entries");
        write(&engine, &bucket, &[(b"00000000", b"old")]);

        let read = engine.begin_read().unwrap();
        write(&engine, &bucket, &[(b"00000000", b"new")]);

        assert_eq!(read.get(&bucket, b"00000000").unwrap(), Some(b"old".to_vec()));
        let fresh = engine.begin_read().unwrap();
        assert_eq!(fresh.get(&bucket, b"00000000").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn write_txn_sees_own_writes() {
        let engine = MemoryEngine::new();
        let bucket = Bucket::root("entries");

        let mut txn = engine.begin_write().unwrap();
        txn.put(&bucket, b"00000000", b"payload").unwrap();
        assert_eq!(
            txn.get(&bucket, b"00000000").unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn locate_walks_bucket_in_order() {
        let engine = MemoryEngine::new();
        let bucket = Bucket::root("relationships").child(b"users").child(b"user_1");
        write(
            &engine,
            &bucket,
            &[
                (b"00000000", b"00000000"),
                (b"00000001", b"00000001"),
                (b"00000002", b"00000002"),
            ],
        );

        let read = engine.begin_read().unwrap();
        let (first, _) = read.locate(&bucket, Seek::First).unwrap().unwrap();
        assert_eq!(first, b"00000000");

        let (next, _) = read.locate(&bucket, Seek::Gt(&first)).unwrap().unwrap();
        assert_eq!(next, b"00000001");

        let (last, _) = read.locate(&bucket, Seek::Last).unwrap().unwrap();
        assert_eq!(last, b"00000002");

        let (prev, _) = read.locate(&bucket, Seek::Lt(&last)).unwrap().unwrap();
        assert_eq!(prev, b"00000001");

        assert!(read.locate(&bucket, Seek::Gt(b"00000002")).unwrap().is_none());
    }

    #[test]
    fn locate_is_confined_to_the_bucket() {
        let engine = MemoryEngine::new();
        let users = Bucket::root("relationships").child(b"users");
        write(&engine, &users.child(b"user_1"), &[(b"00000000", b"00000000")]);
        write(&engine, &users.child(b"user_2"), &[(b"00000001", b"00000001")]);

        let read = engine.begin_read().unwrap();
        let bucket = users.child(b"user_1");
        let (last, _) = read.locate(&bucket, Seek::Last).unwrap().unwrap();
        assert_eq!(last, b"00000000");
        assert!(read.locate(&bucket, Seek::Gt(b"00000000")).unwrap().is_none());
    }

    #[test]
    fn child_navigation() {
        let engine = MemoryEngine::new();
        let users = Bucket::root("relationships").child(b"users");
        for (value, id) in [
            (&b"user_1"[..], &b"00000000"[..]),
            (b"user_2", b"00000001"),
            (b"user_3", b"00000002"),
        ] {
            write(&engine, &users.child(value), &[(id, id)]);
        }

        let read = engine.begin_read().unwrap();
        assert_eq!(
            read.next_child(&users, None).unwrap(),
            Some(b"user_1".to_vec())
        );
        assert_eq!(
            read.next_child(&users, Some(b"user_1")).unwrap(),
            Some(b"user_2".to_vec())
        );
        assert_eq!(read.next_child(&users, Some(b"user_3")).unwrap(), None);

        assert_eq!(
            read.prev_child(&users, None).unwrap(),
            Some(b"user_3".to_vec())
        );
        assert_eq!(
            read.prev_child(&users, Some(b"user_3")).unwrap(),
            Some(b"user_2".to_vec())
        );
        assert_eq!(read.prev_child(&users, Some(b"user_1")).unwrap(), None);
    }
}
