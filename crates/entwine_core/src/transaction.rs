//! The transaction view: the sole mutation boundary of a store.

use crate::buckets;
use crate::comparison::ComparisonCursor;
use crate::context::Context;
use crate::cursor::Cursor;
use crate::entity::{unix_nanos, Entity, EntityId, Relationships};
use crate::error::{Error, Result};
use crate::filter::{FilteringOpts, IteratingOpts};
use crate::index;
use crate::query;
use crate::store::StoreShared;
use entwine_storage::{KvRead, KvWrite, Seek, StorageError};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

pub(crate) enum TxnInner {
    Read(Box<dyn KvRead>),
    Write(Box<dyn KvWrite>),
}

/// A unit of atomic work against the store.
///
/// Transactions are handed to user closures by
/// [`crate::Store::transaction`], [`crate::Store::read_transaction`], and
/// [`crate::Store::batch`]. When the closure returns `Ok` the backend
/// transaction commits; on any error (or panic) it rolls back. Read
/// transactions reject every mutating call with [`Error::ReadOnly`].
///
/// Cursors and queries constructed from a transaction borrow it and cannot
/// outlive it.
pub struct Transaction<T: Entity> {
    inner: TxnInner,
    shared: Arc<StoreShared>,
    ctx: Context,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Transaction<T> {
    pub(crate) fn new(inner: TxnInner, shared: Arc<StoreShared>, ctx: Context) -> Self {
        Self {
            inner,
            shared,
            ctx,
            _entity: PhantomData,
        }
    }

    pub(crate) fn into_inner(self) -> TxnInner {
        self.inner
    }

    pub(crate) fn set_context(&mut self, ctx: Context) {
        self.ctx = ctx;
    }

    /// The context this transaction checks at suspension points.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn reader(&self) -> &dyn KvRead {
        match &self.inner {
            TxnInner::Read(read) => read.as_ref(),
            TxnInner::Write(write) => write.as_read(),
        }
    }

    fn writer(&mut self) -> Result<&mut dyn KvWrite> {
        match &mut self.inner {
            TxnInner::Write(write) => Ok(write.as_mut()),
            TxnInner::Read(_) => Err(Error::ReadOnly),
        }
    }

    pub(crate) fn require_relationship(&self, name: &str) -> Result<()> {
        if self.shared.relationships.iter().any(|r| r == name) {
            Ok(())
        } else {
            Err(Error::invalid_entry(format!(
                "relationship {name:?} is not registered"
            )))
        }
    }

    fn validate_arity(&self, relationships: &Relationships) -> Result<()> {
        let expected = self.shared.relationships.len();
        if relationships.len() == expected {
            Ok(())
        } else {
            Err(Error::invalid_entry(format!(
                "record declares {} relationship slots, store registered {expected}",
                relationships.len()
            )))
        }
    }

    fn allocate_id(&mut self) -> Result<EntityId> {
        let meta = buckets::meta();
        let writer = self.writer()?;
        let raw = match writer.get(&meta, buckets::NEXT_ID_KEY)? {
            Some(bytes) => EntityId::from_key(&bytes)
                .ok_or_else(|| {
                    Error::Storage(StorageError::corrupted("malformed next-id counter"))
                })?
                .as_u64(),
            None => 0,
        };
        let id = EntityId::from_u64(raw);
        writer.put(&meta, buckets::NEXT_ID_KEY, &EntityId::from_u64(raw + 1).as_key())?;
        Ok(id)
    }

    /// Inserts a record, assigning and stamping its id and timestamps.
    ///
    /// Returns the assigned id. Fails with [`Error::InvalidEntry`] when the
    /// record's relationship slot count does not match the store's registry.
    pub fn new_entry(&mut self, entity: &mut T) -> Result<EntityId> {
        self.ctx.check()?;
        let relationships = entity.relationships();
        self.validate_arity(&relationships)?;

        let id = self.allocate_id()?;
        let now = unix_nanos();
        entity.set_id(id);
        entity.set_created_at(now);
        entity.set_updated_at(now);

        let payload = serde_json::to_vec(entity)?;
        let shared = Arc::clone(&self.shared);
        let writer = self.writer()?;
        writer.put(&buckets::entries(), &id.as_key(), &payload)?;
        index::apply(
            writer,
            &shared.relationships,
            id,
            &Relationships::new(),
            &relationships,
        )?;
        Ok(id)
    }

    /// Loads the record stored under `id`.
    pub fn get(&self, id: EntityId) -> Result<T> {
        self.ctx.check()?;
        let payload = self
            .reader()
            .get(&buckets::entries(), &id.as_key())?
            .ok_or(Error::EntryNotFound)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Whether a record exists under `id`, without decoding it.
    pub fn exists(&self, id: EntityId) -> Result<bool> {
        self.ctx.check()?;
        Ok(self
            .reader()
            .get(&buckets::entries(), &id.as_key())?
            .is_some())
    }

    /// Replaces the record stored under `id`.
    ///
    /// The new record's relationship vector replaces the old one; index
    /// entries are adjusted by difference. A zero `createdAt` on the
    /// incoming record is backfilled from the stored one.
    pub fn edit(&mut self, id: EntityId, entity: &mut T) -> Result<()> {
        self.ctx.check()?;
        let current = self.get(id)?;

        let relationships = entity.relationships();
        self.validate_arity(&relationships)?;

        entity.set_id(id);
        if entity.created_at() == 0 {
            entity.set_created_at(current.created_at());
        }
        entity.set_updated_at(unix_nanos());

        let payload = serde_json::to_vec(entity)?;
        let old = current.relationships();
        let shared = Arc::clone(&self.shared);
        let writer = self.writer()?;
        writer.put(&buckets::entries(), &id.as_key(), &payload)?;
        index::apply(writer, &shared.relationships, id, &old, &relationships)?;
        Ok(())
    }

    /// Deletes the record stored under `id` and every index entry derived
    /// from its relationships.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        self.ctx.check()?;
        let current = self.get(id)?;
        let old = current.relationships();
        let shared = Arc::clone(&self.shared);
        let writer = self.writer()?;
        writer.delete(&buckets::entries(), &id.as_key())?;
        index::apply(writer, &shared.relationships, id, &old, &Relationships::new())?;
        Ok(())
    }

    /// Runs `f` with a cursor over the whole primary keyspace.
    pub fn cursor<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Cursor<'_, T>) -> Result<R>,
    {
        let mut cursor = Cursor::primary(self);
        f(&mut cursor)
    }

    /// Runs `f` with a cursor over one relationship value's entries.
    pub fn cursor_relationship<F, R>(&self, relationship: &str, value: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Cursor<'_, T>) -> Result<R>,
    {
        self.require_relationship(relationship)?;
        let mut cursor = Cursor::relationship(self, relationship, value);
        f(&mut cursor)
    }

    /// Runs `f` with a comparison cursor over a relationship's value
    /// dimension (see [`ComparisonCursor`]).
    pub fn cursor_comparison<P, F, R>(&self, relationship: &str, predicate: P, f: F) -> Result<R>
    where
        P: Fn(&str) -> Result<bool>,
        F: FnOnce(&mut ComparisonCursor<'_>) -> Result<R>,
    {
        self.require_relationship(relationship)?;
        let mut cursor = ComparisonCursor::new(self.reader(), relationship, &predicate);
        f(&mut cursor)
    }

    /// Calls `f` for every record matching `opts`, in id order (descending
    /// when `opts.reverse`).
    ///
    /// Returning `ControlFlow::Break` from the callback stops iteration
    /// successfully; returning an error aborts it.
    pub fn for_each<F>(&self, opts: &IteratingOpts, f: F) -> Result<()>
    where
        F: FnMut(EntityId, &T) -> Result<ControlFlow<()>>,
    {
        query::for_each(self, opts, f)
    }

    /// Collects the records matching `opts`, honoring limit, direction, and
    /// the `last_id` continuation token.
    ///
    /// Returns the records and the id of the last one delivered; feed that
    /// id back through [`FilteringOpts::last_id`] to fetch the next page.
    pub fn get_filtered(&self, opts: &FilteringOpts) -> Result<(Vec<T>, Option<EntityId>)> {
        query::get_filtered(self, opts)
    }

    /// The first record matching the filters, or [`Error::EntryNotFound`].
    pub fn get_first(&self, opts: &IteratingOpts) -> Result<T> {
        query::get_first(self, opts)
    }

    /// The last record matching the filters, or [`Error::EntryNotFound`].
    pub fn get_last(&self, opts: &IteratingOpts) -> Result<T> {
        query::get_last(self, opts)
    }

    /// Adds `value` to the sorted lookup set under `(lookup, key)`.
    pub fn set_lookup(&mut self, lookup: &str, key: &str, value: &str) -> Result<()> {
        self.ctx.check()?;
        let bucket = buckets::lookup(lookup, key);
        self.writer()?
            .put(&bucket, value.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    /// Returns the lookup set under `(lookup, key)` in sorted order.
    pub fn get_lookup(&self, lookup: &str, key: &str) -> Result<Vec<String>> {
        self.ctx.check()?;
        let bucket = buckets::lookup(lookup, key);
        let mut values = Vec::new();
        let mut pos: Option<Vec<u8>> = None;
        loop {
            let seek = match &pos {
                Some(previous) => Seek::Gt(previous),
                None => Seek::First,
            };
            match self.reader().locate(&bucket, seek)? {
                Some((leaf, _)) => {
                    let value = String::from_utf8(leaf.clone()).map_err(|_| {
                        Error::Storage(StorageError::corrupted("lookup value is not UTF-8"))
                    })?;
                    values.push(value);
                    pos = Some(leaf);
                }
                None => break,
            }
        }
        Ok(values)
    }

    /// Removes `value` from the lookup set under `(lookup, key)`.
    pub fn remove_lookup(&mut self, lookup: &str, key: &str, value: &str) -> Result<()> {
        self.ctx.check()?;
        let bucket = buckets::lookup(lookup, key);
        self.writer()?.delete(&bucket, value.as_bytes())?;
        Ok(())
    }
}
