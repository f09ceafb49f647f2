//! Cursors over the primary keyspace and relationship leaf buckets.

use crate::buckets;
use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use entwine_storage::{Bucket, KvRead, Seek, StorageError};

/// Position-stating navigation over one bucket's leaf keys.
///
/// Every step is a stateless probe against the backend keyed off the current
/// position, so the cursor stays coherent when the surrounding transaction
/// mutates the bucket between steps.
pub(crate) struct RawCursor<'txn> {
    read: &'txn dyn KvRead,
    bucket: Bucket,
    pos: Option<Vec<u8>>,
}

impl<'txn> RawCursor<'txn> {
    pub(crate) fn new(read: &'txn dyn KvRead, bucket: Bucket) -> Self {
        Self {
            read,
            bucket,
            pos: None,
        }
    }

    fn probe(&mut self, seek: Seek<'_>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let found = self.read.locate(&self.bucket, seek)?;
        if let Some((key, _)) = &found {
            self.pos = Some(key.clone());
        }
        Ok(found)
    }

    pub(crate) fn first(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.probe(Seek::First)
    }

    pub(crate) fn last(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.probe(Seek::Last)
    }

    pub(crate) fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.pos.clone() {
            Some(pos) => self.probe(Seek::Gt(&pos)),
            None => self.first(),
        }
    }

    pub(crate) fn prev(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.pos.clone() {
            Some(pos) => self.probe(Seek::Lt(&pos)),
            None => self.last(),
        }
    }

    pub(crate) fn seek_ge(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.probe(Seek::Ge(key))
    }

    pub(crate) fn seek_le(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.probe(Seek::Le(key))
    }
}

/// An iterating view over decoded records, scoped to one transaction.
///
/// Primary cursors walk `entries` directly; relationship cursors walk one
/// `relationships/<name>/<value>` leaf bucket and fetch each record by id.
/// Exhaustion in either direction is signalled with [`Error::EndOfEntries`].
///
/// The cursor borrows its transaction, so it cannot outlive it, and the
/// transaction cannot be mutated while a cursor is live.
pub struct Cursor<'txn, T: Entity> {
    txn: &'txn Transaction<T>,
    raw: RawCursor<'txn>,
    relationship: bool,
}

impl<'txn, T: Entity> Cursor<'txn, T> {
    pub(crate) fn primary(txn: &'txn Transaction<T>) -> Self {
        Self {
            txn,
            raw: RawCursor::new(txn.reader(), buckets::entries()),
            relationship: false,
        }
    }

    pub(crate) fn relationship(txn: &'txn Transaction<T>, name: &str, value: &str) -> Self {
        Self {
            txn,
            raw: RawCursor::new(txn.reader(), buckets::relationship_value(name, value)),
            relationship: true,
        }
    }

    fn resolve(&self, entry: Option<(Vec<u8>, Vec<u8>)>) -> Result<T> {
        let (key, value) = entry.ok_or(Error::EndOfEntries)?;
        if self.relationship {
            let id = EntityId::from_key(&key).ok_or_else(|| {
                Error::Storage(StorageError::corrupted("malformed id in relationship leaf"))
            })?;
            self.txn.get(id)
        } else {
            self.txn.context().check()?;
            Ok(serde_json::from_slice(&value)?)
        }
    }

    /// Moves to the first entry.
    pub fn first(&mut self) -> Result<T> {
        let entry = self.raw.first()?;
        self.resolve(entry)
    }

    /// Moves to the last entry.
    pub fn last(&mut self) -> Result<T> {
        let entry = self.raw.last()?;
        self.resolve(entry)
    }

    /// Moves to the first entry with id greater than or equal to `id`.
    pub fn seek(&mut self, id: EntityId) -> Result<T> {
        let entry = self.raw.seek_ge(&id.as_key())?;
        self.resolve(entry)
    }

    /// Moves one entry forward.
    pub fn next(&mut self) -> Result<T> {
        let entry = self.raw.next()?;
        self.resolve(entry)
    }

    /// Moves one entry backward.
    pub fn prev(&mut self) -> Result<T> {
        let entry = self.raw.prev()?;
        self.resolve(entry)
    }
}
