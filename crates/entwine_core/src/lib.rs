//! # Entwine
//!
//! An embedded, single-process document store with relationship-based
//! secondary indexing and composable query filters.
//!
//! A store is registered with a record type and a fixed list of
//! *relationship names*. Records receive monotonically increasing ids, are
//! persisted as self-describing JSON keyed by that id, and every non-empty
//! relationship value they carry is maintained in a reverse index from
//! `(relationship, value)` to the set of record ids. Queries combine
//! equality ([`Filter::matches`]) and predicate ([`Filter::comparison`])
//! filters with AND semantics, iterate in id order in either direction, and
//! paginate through a `last_id` continuation token.
//!
//! ```rust,ignore
//! use entwine_core::{Entity, EntityId, EntityMeta, Filter, FilteringOpts, Relationships, Store};
//!
//! let store: Store<Contact> = Store::open("contacts", dir, &["users", "groups", "tags"])?;
//!
//! let mut contact = Contact::new("user_1", "group_a", ["vip"]);
//! let id = store.new_entry(&mut contact)?;
//!
//! let opts = FilteringOpts::new([
//!     Filter::matches("users", "user_1"),
//!     Filter::comparison("tags", |tag| Ok(tag != "blocked")),
//! ]);
//! let (matches, last_id) = store.get_filtered(&opts)?;
//! ```
//!
//! ## Transactions
//!
//! All work happens inside transactions over the storage backend's
//! single-writer MVCC contract: any number of snapshot readers alongside one
//! writer. [`Store::transaction`] and [`Store::read_transaction`] run a
//! closure and commit or roll back with it; [`Store::batch`] coalesces
//! concurrent write closures into shared transactions to amortize commit
//! cost. Cancellation flows through [`Context`], checked at every suspension
//! point.
//!
//! ## Iteration sentinels
//!
//! Cursor exhaustion surfaces as [`Error::EndOfEntries`] (comparison
//! cursors use [`Error::Break`]); both are control signals, not failures.
//! Iteration callbacks return [`std::ops::ControlFlow`] to stop early.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod buckets;
mod comparison;
mod config;
mod context;
mod cursor;
mod entity;
mod error;
mod filter;
mod index;
mod query;
mod store;
mod transaction;

pub use comparison::ComparisonCursor;
pub use config::Config;
pub use context::{CancelHandle, Context};
pub use cursor::Cursor;
pub use entity::{Entity, EntityId, EntityMeta, Relationships};
pub use error::{Error, Result};
pub use filter::{ComparisonPredicate, Filter, FilteringOpts, IteratingOpts};
pub use store::Store;
pub use transaction::Transaction;

pub use entwine_storage as storage;
