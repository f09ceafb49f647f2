//! The store facade: opening, transaction runners, and thin wrappers.

use crate::batch::BatchCoordinator;
use crate::buckets;
use crate::comparison::ComparisonCursor;
use crate::config::Config;
use crate::context::Context;
use crate::cursor::Cursor;
use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::filter::{FilteringOpts, IteratingOpts};
use crate::transaction::{Transaction, TxnInner};
use entwine_storage::{KvEngine, RedbEngine, StorageError};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct StoreShared {
    pub(crate) name: String,
    pub(crate) engine: Box<dyn KvEngine>,
    pub(crate) relationships: Vec<String>,
}

/// An embedded, single-process document store for records of type `T`.
///
/// A store is created with a fixed, ordered list of relationship names; that
/// order defines the layout of every record's
/// [`relationships`](Entity::relationships) vector and is immutable for the
/// life of the on-disk data. Records are keyed by an auto-assigned
/// monotonically increasing id and indexed by every non-empty relationship
/// value they carry.
///
/// All mutation happens inside write transactions; reads may run inside
/// snapshot-isolated read transactions concurrent with one writer. The
/// top-level CRUD and query methods below are thin wrappers that open a
/// transaction per call; [`Store::batch`] coalesces concurrent writes into
/// shared transactions instead.
///
/// ```rust,ignore
/// let store: Store<Contact> = Store::open("contacts", dir, &["users", "tags"])?;
/// let mut contact = Contact::new("user_1", ["ops"]);
/// let id = store.new_entry(&mut contact)?;
/// let found = store.get(id)?;
/// ```
pub struct Store<T: Entity> {
    shared: Arc<StoreShared>,
    batch: BatchCoordinator<T>,
}

impl<T: Entity> Store<T> {
    /// Opens (or creates) the store named `name` inside `dir`, registering
    /// the given relationship names.
    pub fn open(name: &str, dir: &Path, relationships: &[&str]) -> Result<Self> {
        Self::open_with_config(name, dir, relationships, Config::default())
    }

    /// Opens a store with custom configuration.
    pub fn open_with_config(
        name: &str,
        dir: &Path,
        relationships: &[&str],
        config: Config,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(StorageError::from)?;
        let path = dir.join(format!("{name}.db"));
        let engine = RedbEngine::open(&path, config.create_if_missing)?;
        Self::open_with_engine(name, Box::new(engine), relationships, config)
    }

    /// Opens a store over an explicit backend engine.
    ///
    /// This is how tests run against [`entwine_storage::MemoryEngine`].
    pub fn open_with_engine(
        name: &str,
        engine: Box<dyn KvEngine>,
        relationships: &[&str],
        config: Config,
    ) -> Result<Self> {
        let config = config.normalize();
        let shared = Arc::new(StoreShared {
            name: name.to_string(),
            engine,
            relationships: relationships.iter().map(ToString::to_string).collect(),
        });
        validate_registry(&shared)?;
        debug!(store = name, relationships = ?shared.relationships, "store.open");

        let batch = BatchCoordinator::new(Arc::clone(&shared), config.batch_window, config.batch_limit);
        Ok(Self { shared, batch })
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The registered relationship names, in registration order.
    pub fn relationships(&self) -> &[String] {
        &self.shared.relationships
    }

    /// Runs `f` inside a write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and the context is
    /// still live; on any error (or panic) the backend rolls back. Opening
    /// the transaction blocks while another writer is active.
    pub fn transaction<F, R>(&self, ctx: Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<T>) -> Result<R>,
    {
        ctx.check()?;
        let writer = self.shared.engine.begin_write()?;
        let mut txn = Transaction::new(TxnInner::Write(writer), Arc::clone(&self.shared), ctx.clone());
        let result = f(&mut txn)?;
        ctx.check()?;
        match txn.into_inner() {
            TxnInner::Write(writer) => writer.commit()?,
            TxnInner::Read(_) => {}
        }
        Ok(result)
    }

    /// Runs `f` inside a read transaction over a snapshot of the store.
    ///
    /// Mutating calls on the transaction fail with [`Error::ReadOnly`].
    pub fn read_transaction<F, R>(&self, ctx: Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<T>) -> Result<R>,
    {
        ctx.check()?;
        let reader = self.shared.engine.begin_read()?;
        let mut txn = Transaction::new(TxnInner::Read(reader), Arc::clone(&self.shared), ctx);
        f(&mut txn)
    }

    /// Runs `f` as part of a coalesced write transaction shared with other
    /// concurrent `batch` callers, amortizing commit cost.
    ///
    /// Each caller receives its own closure's result; if the shared commit
    /// fails, every caller receives [`Error::BatchFailed`]. When any member
    /// of a batch fails, the shared transaction is rolled back and every
    /// member is re-run isolated in its own transaction, so closures may run
    /// more than once and must be `FnMut`.
    pub fn batch<F>(&self, ctx: Context, f: F) -> Result<()>
    where
        F: FnMut(&mut Transaction<T>) -> Result<()> + Send + 'static,
    {
        self.batch.run(ctx, f)
    }

    /// Inserts a record in its own transaction, returning the assigned id.
    pub fn new_entry(&self, entity: &mut T) -> Result<EntityId> {
        self.transaction(Context::background(), |txn| txn.new_entry(entity))
    }

    /// Loads the record stored under `id`.
    pub fn get(&self, id: EntityId) -> Result<T> {
        self.read_transaction(Context::background(), |txn| txn.get(id))
    }

    /// Whether a record exists under `id`.
    pub fn exists(&self, id: EntityId) -> Result<bool> {
        self.read_transaction(Context::background(), |txn| txn.exists(id))
    }

    /// Replaces the record stored under `id` in its own transaction.
    pub fn edit(&self, id: EntityId, entity: &mut T) -> Result<()> {
        self.transaction(Context::background(), |txn| txn.edit(id, entity))
    }

    /// Deletes the record stored under `id` in its own transaction.
    pub fn remove(&self, id: EntityId) -> Result<()> {
        self.transaction(Context::background(), |txn| txn.remove(id))
    }

    /// Calls `f` for every record matching `opts`; see
    /// [`Transaction::for_each`].
    pub fn for_each<F>(&self, opts: &IteratingOpts, f: F) -> Result<()>
    where
        F: FnMut(EntityId, &T) -> Result<ControlFlow<()>>,
    {
        self.read_transaction(Context::background(), |txn| txn.for_each(opts, f))
    }

    /// Collects the records matching `opts`; see
    /// [`Transaction::get_filtered`].
    pub fn get_filtered(&self, opts: &FilteringOpts) -> Result<(Vec<T>, Option<EntityId>)> {
        self.read_transaction(Context::background(), |txn| txn.get_filtered(opts))
    }

    /// The first record matching the filters.
    pub fn get_first(&self, opts: &IteratingOpts) -> Result<T> {
        self.read_transaction(Context::background(), |txn| txn.get_first(opts))
    }

    /// The last record matching the filters.
    pub fn get_last(&self, opts: &IteratingOpts) -> Result<T> {
        self.read_transaction(Context::background(), |txn| txn.get_last(opts))
    }

    /// Runs `f` with a cursor over the whole primary keyspace.
    pub fn cursor<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Cursor<'_, T>) -> Result<R>,
    {
        self.read_transaction(Context::background(), |txn| txn.cursor(f))
    }

    /// Runs `f` with a cursor over one relationship value's entries.
    pub fn cursor_relationship<F, R>(&self, relationship: &str, value: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Cursor<'_, T>) -> Result<R>,
    {
        self.read_transaction(Context::background(), |txn| {
            txn.cursor_relationship(relationship, value, f)
        })
    }

    /// Runs `f` with a comparison cursor over a relationship's values.
    pub fn cursor_comparison<P, F, R>(&self, relationship: &str, predicate: P, f: F) -> Result<R>
    where
        P: Fn(&str) -> Result<bool>,
        F: FnOnce(&mut ComparisonCursor<'_>) -> Result<R>,
    {
        self.read_transaction(Context::background(), |txn| {
            txn.cursor_comparison(relationship, predicate, f)
        })
    }

    /// Adds `value` to the sorted lookup set under `(lookup, key)`.
    pub fn set_lookup(&self, lookup: &str, key: &str, value: &str) -> Result<()> {
        self.transaction(Context::background(), |txn| txn.set_lookup(lookup, key, value))
    }

    /// Returns the lookup set under `(lookup, key)` in sorted order.
    pub fn get_lookup(&self, lookup: &str, key: &str) -> Result<Vec<String>> {
        self.read_transaction(Context::background(), |txn| txn.get_lookup(lookup, key))
    }

    /// Removes `value` from the lookup set under `(lookup, key)`.
    pub fn remove_lookup(&self, lookup: &str, key: &str, value: &str) -> Result<()> {
        self.transaction(Context::background(), |txn| {
            txn.remove_lookup(lookup, key, value)
        })
    }

    /// Closes the store, draining the batch worker and releasing the
    /// backend.
    pub fn close(self) -> Result<()> {
        debug!(store = %self.shared.name, "store.close");
        Ok(())
    }
}

impl<T: Entity> Drop for Store<T> {
    fn drop(&mut self) {
        self.batch.shutdown();
    }
}

/// Persists the relationship registry on first open and rejects a reopen
/// with different names; registration order defines the on-disk index
/// layout, so it must never drift.
fn validate_registry(shared: &Arc<StoreShared>) -> Result<()> {
    let meta = buckets::meta();
    let mut writer = shared.engine.begin_write()?;
    match writer.get(&meta, buckets::REGISTRY_KEY)? {
        Some(bytes) => {
            let stored: Vec<String> = serde_json::from_slice(&bytes)?;
            if stored != shared.relationships {
                return Err(Error::invalid_entry(format!(
                    "relationship registry mismatch: store holds {stored:?}, caller registered {:?}",
                    shared.relationships
                )));
            }
            Ok(())
        }
        None => {
            let payload = serde_json::to_vec(&shared.relationships)?;
            writer.put(&meta, buckets::REGISTRY_KEY, &payload)?;
            writer.commit()?;
            Ok(())
        }
    }
}
