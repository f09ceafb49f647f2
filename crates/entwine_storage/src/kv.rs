//! The bucketed ordered key/value contract.

use crate::error::StorageResult;
use crate::keycode;
use std::ops::Bound;

/// A path into the bucket hierarchy.
///
/// The first path segment names a top-level bucket (which backends map to a
/// table of their own); every further segment is folded into an
/// order-preserving key prefix. Leaf keys are appended raw, so iteration over
/// a bucket yields its leaf keys in byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    table: String,
    prefix: Vec<u8>,
}

impl Bucket {
    /// Creates a top-level bucket.
    pub fn root(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            prefix: Vec::new(),
        }
    }

    /// Returns the sub-bucket named `segment`.
    #[must_use]
    pub fn child(&self, segment: &[u8]) -> Self {
        let mut prefix = self.prefix.clone();
        keycode::push_segment(&mut prefix, segment);
        Self {
            table: self.table.clone(),
            prefix,
        }
    }

    /// Returns the top-level bucket name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the encoded key prefix shared by every key in this bucket.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Composes the full engine key for `leaf`.
    pub fn key(&self, leaf: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + leaf.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(leaf);
        key
    }

    /// Strips this bucket's prefix from a full engine key.
    ///
    /// Returns `None` if the key does not belong to this bucket.
    pub fn leaf<'k>(&self, full: &'k [u8]) -> Option<&'k [u8]> {
        full.strip_prefix(self.prefix.as_slice())
    }

    /// The exclusive upper bound of this bucket's keyspace, or `None` when
    /// the bucket spans the whole table.
    fn upper_bound(&self) -> Bound<Vec<u8>> {
        if self.prefix.is_empty() {
            return Bound::Unbounded;
        }
        // Encoded prefixes always end in the 0x00 0x00 terminator; bumping
        // the final byte yields the tightest exclusive bound.
        let mut bound = self.prefix.clone();
        *bound.last_mut().expect("non-empty prefix") = 0x01;
        Bound::Excluded(bound)
    }
}

/// Where to position a [`KvRead::locate`] probe within a bucket.
#[derive(Debug, Clone, Copy)]
pub enum Seek<'a> {
    /// The first entry.
    First,
    /// The last entry.
    Last,
    /// The first entry with key greater than or equal to the given key.
    Ge(&'a [u8]),
    /// The first entry with key strictly greater than the given key.
    Gt(&'a [u8]),
    /// The last entry with key less than or equal to the given key.
    Le(&'a [u8]),
    /// The last entry with key strictly less than the given key.
    Lt(&'a [u8]),
}

/// An ordered key/value engine.
///
/// Engines provide snapshot-isolated read transactions and at most one live
/// write transaction; [`KvEngine::begin_write`] blocks while another writer
/// is active.
pub trait KvEngine: Send + Sync {
    /// Begins a read transaction over a snapshot of the current state.
    fn begin_read(&self) -> StorageResult<Box<dyn KvRead>>;

    /// Begins the single write transaction, blocking until the write slot is
    /// free.
    fn begin_write(&self) -> StorageResult<Box<dyn KvWrite>>;
}

/// Read operations available inside any transaction.
///
/// All navigation is expressed through [`KvRead::probe`], a single bounded
/// range probe; the provided methods derive bucket-relative positioning from
/// it. Probes are stateless so callers own all cursor position state.
pub trait KvRead: Send {
    /// Returns the value stored under `key` in `bucket`.
    fn get(&self, bucket: &Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the first (or last, when `backward`) entry of `table` whose
    /// full key falls within the given bounds.
    fn probe(
        &self,
        table: &str,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        backward: bool,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>>;

    /// Positions within `bucket` per `seek`, returning the leaf key and
    /// value.
    fn locate(&self, bucket: &Bucket, seek: Seek<'_>) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        let upper = bucket.upper_bound();
        let (lo, hi, backward) = match seek {
            Seek::First => (Bound::Included(bucket.prefix().to_vec()), upper, false),
            Seek::Ge(key) => (Bound::Included(bucket.key(key)), upper, false),
            Seek::Gt(key) => (Bound::Excluded(bucket.key(key)), upper, false),
            Seek::Last => (Bound::Included(bucket.prefix().to_vec()), upper, true),
            Seek::Le(key) => (
                Bound::Included(bucket.prefix().to_vec()),
                Bound::Included(bucket.key(key)),
                true,
            ),
            Seek::Lt(key) => (
                Bound::Included(bucket.prefix().to_vec()),
                Bound::Excluded(bucket.key(key)),
                true,
            ),
        };

        match self.probe(bucket.table(), lo, hi, backward)? {
            Some((full, value)) => Ok(bucket.leaf(&full).map(|leaf| (leaf.to_vec(), value))),
            None => Ok(None),
        }
    }

    /// Returns the name of the first sub-bucket of `bucket` after `after`
    /// (or the first overall when `after` is `None`).
    fn next_child(&self, bucket: &Bucket, after: Option<&[u8]>) -> StorageResult<Option<Vec<u8>>> {
        let lo = match after {
            Some(child) => {
                let mut key = bucket.prefix().to_vec();
                key.extend_from_slice(&keycode::segment_past(child));
                Bound::Included(key)
            }
            None => Bound::Included(bucket.prefix().to_vec()),
        };

        match self.probe(bucket.table(), lo, bucket.upper_bound(), false)? {
            Some((full, _)) => decode_child(bucket, &full),
            None => Ok(None),
        }
    }

    /// Returns the name of the last sub-bucket of `bucket` before `before`
    /// (or the last overall when `before` is `None`).
    fn prev_child(&self, bucket: &Bucket, before: Option<&[u8]>) -> StorageResult<Option<Vec<u8>>> {
        let hi = match before {
            Some(child) => {
                let mut key = bucket.prefix().to_vec();
                keycode::push_segment(&mut key, child);
                Bound::Excluded(key)
            }
            None => bucket.upper_bound(),
        };

        match self
            .probe(bucket.table(), Bound::Included(bucket.prefix().to_vec()), hi, true)?
        {
            Some((full, _)) => decode_child(bucket, &full),
            None => Ok(None),
        }
    }
}

fn decode_child(bucket: &Bucket, full: &[u8]) -> StorageResult<Option<Vec<u8>>> {
    match bucket.leaf(full) {
        Some(rest) => {
            let (child, _) = keycode::decode_segment(rest)?;
            Ok(Some(child))
        }
        None => Ok(None),
    }
}

/// Write operations; only available inside the write transaction.
pub trait KvWrite: KvRead {
    /// Stores `value` under `key` in `bucket`.
    fn put(&mut self, bucket: &Bucket, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Deletes `key` from `bucket`. Deleting an absent key is a no-op.
    fn delete(&mut self, bucket: &Bucket, key: &[u8]) -> StorageResult<()>;

    /// Commits the transaction. Dropping a write transaction without
    /// committing rolls it back.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Reborrows this transaction for read operations.
    fn as_read(&self) -> &dyn KvRead;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_paths_are_prefix_free() {
        let users = Bucket::root("relationships").child(b"users");
        let user_1 = users.child(b"user_1");
        let user_12 = users.child(b"user_12");

        assert!(user_1.prefix().starts_with(users.prefix()));
        assert!(!user_12.prefix().starts_with(user_1.prefix()));
    }

    #[test]
    fn leaf_strips_only_own_prefix() {
        let a = Bucket::root("relationships").child(b"users").child(b"a");
        let b = Bucket::root("relationships").child(b"users").child(b"b");

        let key = a.key(b"00000000");
        assert_eq!(a.leaf(&key), Some(&b"00000000"[..]));
        assert_eq!(b.leaf(&key), None);
    }

    #[test]
    fn root_bucket_has_empty_prefix() {
        let entries = Bucket::root("entries");
        assert!(entries.prefix().is_empty());
        assert_eq!(entries.key(b"00000001"), b"00000001");
    }
}
