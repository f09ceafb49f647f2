//! # Entwine Storage
//!
//! Bucketed ordered key/value contract and backends for Entwine.
//!
//! This crate defines the storage seam the Entwine core is written against:
//! an ordered keyspace organized into hierarchical *buckets*, accessed through
//! snapshot-isolated read transactions and a single blocking write
//! transaction at a time.
//!
//! ## Design Principles
//!
//! - Backends are opaque ordered byte stores; Entwine owns all record
//!   interpretation.
//! - Navigation primitives are stateless point probes, so cursor position
//!   state lives entirely with the caller and mutation during iteration is
//!   coherent by construction.
//! - Write transactions observe their own prior writes; read transactions
//!   observe a snapshot taken when they began.
//!
//! ## Available Backends
//!
//! - [`RedbEngine`] - persistent storage over the `redb` B+-tree engine
//! - [`MemoryEngine`] - for testing and ephemeral storage

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod keycode;
mod kv;
mod memory;
mod redb;

pub use self::error::{StorageError, StorageResult};
pub use self::kv::{Bucket, KvEngine, KvRead, KvWrite, Seek};
pub use self::memory::MemoryEngine;
pub use self::redb::RedbEngine;
