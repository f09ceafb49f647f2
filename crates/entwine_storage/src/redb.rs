//! Persistent backend over the `redb` B+-tree engine.
//!
//! redb provides copy-on-write B-trees with MVCC: any number of snapshot
//! readers alongside a single writer, which is exactly the transaction
//! contract the core layer assumes. Each top-level bucket maps to one redb
//! table; nested bucket paths become encoded key prefixes within it.

use crate::error::StorageResult;
use crate::kv::{Bucket, KvEngine, KvRead, KvWrite};
use ::redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableError,
    WriteTransaction,
};
use std::ops::Bound;
use std::path::Path;

/// A disk-backed engine using redb.
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Opens the database file at `path`, creating it when permitted.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        let db = if create_if_missing {
            Database::create(path)?
        } else {
            Database::open(path)?
        };
        Ok(Self { db })
    }
}

impl KvEngine for RedbEngine {
    fn begin_read(&self) -> StorageResult<Box<dyn KvRead>> {
        Ok(Box::new(RedbRead {
            txn: self.db.begin_read()?,
        }))
    }

    fn begin_write(&self) -> StorageResult<Box<dyn KvWrite>> {
        Ok(Box::new(RedbWrite {
            txn: self.db.begin_write()?,
        }))
    }
}

fn definition(table: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(table)
}

fn probe_table<T>(
    table: &T,
    lo: Bound<Vec<u8>>,
    hi: Bound<Vec<u8>>,
    backward: bool,
) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let lo = lo.as_ref().map(|key| key.as_slice());
    let hi = hi.as_ref().map(|key| key.as_slice());
    let mut range = table.range::<&[u8]>((lo, hi))?;
    let entry = if backward { range.next_back() } else { range.next() };
    match entry {
        Some(Ok((key, value))) => Ok(Some((key.value().to_vec(), value.value().to_vec()))),
        Some(Err(err)) => Err(err.into()),
        None => Ok(None),
    }
}

struct RedbRead {
    txn: ReadTransaction,
}

impl KvRead for RedbRead {
    fn get(&self, bucket: &Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = match self.txn.open_table(definition(bucket.table())) {
            Ok(table) => table,
            // Reading a bucket nobody has written to yet is not an error.
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(table
            .get(bucket.key(key).as_slice())?
            .map(|guard| guard.value().to_vec()))
    }

    fn probe(
        &self,
        table: &str,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        backward: bool,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        let table = match self.txn.open_table(definition(table)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        probe_table(&table, lo, hi, backward)
    }
}

struct RedbWrite {
    txn: WriteTransaction,
}

impl KvRead for RedbWrite {
    fn get(&self, bucket: &Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let table = self.txn.open_table(definition(bucket.table()))?;
        let result = table
            .get(bucket.key(key).as_slice())?
            .map(|guard| guard.value().to_vec());
        Ok(result)
    }

    fn probe(
        &self,
        table: &str,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        backward: bool,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        let table = self.txn.open_table(definition(table))?;
        probe_table(&table, lo, hi, backward)
    }
}

impl KvWrite for RedbWrite {
    fn put(&mut self, bucket: &Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut table = self.txn.open_table(definition(bucket.table()))?;
        table.insert(bucket.key(key).as_slice(), value)?;
        Ok(())
    }

    fn delete(&mut self, bucket: &Bucket, key: &[u8]) -> StorageResult<()> {
        let mut table = self.txn.open_table(definition(bucket.table()))?;
        table.remove(bucket.key(key).as_slice())?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.txn.commit()?;
        Ok(())
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}
