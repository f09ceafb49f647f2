//! Predicate-driven cursor over a relationship's value dimension.

use crate::buckets;
use crate::entity::EntityId;
use crate::error::{Error, Result};
use entwine_storage::{Bucket, KvRead, Seek, StorageError};
use std::collections::HashMap;

/// Walks the distinct values of one relationship, visiting the ids beneath
/// every value the predicate accepts.
///
/// Values are enumerated in byte order (reverse for the backward methods),
/// and the ids under each value in id order, so the overall walk is ordered
/// by (value, id). The predicate is evaluated once per distinct value and
/// its verdict memoized for the life of the cursor; predicates must be pure
/// within a transaction.
///
/// Exhaustion is signalled with [`Error::Break`], and a predicate may end
/// the walk early by returning `Err(Error::Break)` itself.
pub struct ComparisonCursor<'txn> {
    read: &'txn dyn KvRead,
    bucket: Bucket,
    predicate: &'txn dyn Fn(&str) -> Result<bool>,
    memo: HashMap<Vec<u8>, bool>,
    value: Option<Vec<u8>>,
    pos: Option<Vec<u8>>,
}

impl<'txn> ComparisonCursor<'txn> {
    pub(crate) fn new(
        read: &'txn dyn KvRead,
        relationship: &str,
        predicate: &'txn dyn Fn(&str) -> Result<bool>,
    ) -> Self {
        Self {
            read,
            bucket: buckets::relationship(relationship),
            predicate,
            memo: HashMap::new(),
            value: None,
            pos: None,
        }
    }

    fn accepts(&mut self, value: &[u8]) -> Result<bool> {
        if let Some(&verdict) = self.memo.get(value) {
            return Ok(verdict);
        }
        let text = std::str::from_utf8(value).map_err(|_| {
            Error::Storage(StorageError::corrupted("relationship value is not UTF-8"))
        })?;
        let verdict = (self.predicate)(text)?;
        self.memo.insert(value.to_vec(), verdict);
        Ok(verdict)
    }

    /// The first accepted value strictly after `after`, or from the start.
    fn next_accepted(&mut self, mut after: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        loop {
            match self.read.next_child(&self.bucket, after.as_deref())? {
                Some(value) => {
                    if self.accepts(&value)? {
                        return Ok(Some(value));
                    }
                    after = Some(value);
                }
                None => return Ok(None),
            }
        }
    }

    /// The last accepted value strictly before `before`, or from the end.
    fn prev_accepted(&mut self, mut before: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        loop {
            match self.read.prev_child(&self.bucket, before.as_deref())? {
                Some(value) => {
                    if self.accepts(&value)? {
                        return Ok(Some(value));
                    }
                    before = Some(value);
                }
                None => return Ok(None),
            }
        }
    }

    fn locate_id(&self, value: &[u8], seek: Seek<'_>) -> Result<Option<Vec<u8>>> {
        Ok(self
            .read
            .locate(&self.bucket.child(value), seek)?
            .map(|(key, _)| key))
    }

    fn settle(&mut self, value: Vec<u8>, id_key: Vec<u8>) -> Result<EntityId> {
        let id = EntityId::from_key(&id_key).ok_or_else(|| {
            Error::Storage(StorageError::corrupted("malformed id in relationship leaf"))
        })?;
        self.value = Some(value);
        self.pos = Some(id_key);
        Ok(id)
    }

    /// Walks accepted values forward starting at `value`, applying `seek`
    /// only within the starting value.
    fn forward_from(&mut self, mut value: Option<Vec<u8>>, seek: Seek<'_>) -> Result<EntityId> {
        let mut within = seek;
        while let Some(candidate) = value {
            if let Some(id_key) = self.locate_id(&candidate, within)? {
                return self.settle(candidate, id_key);
            }
            within = Seek::First;
            value = self.next_accepted(Some(candidate))?;
        }
        Err(Error::Break)
    }

    fn reverse_from(&mut self, mut value: Option<Vec<u8>>, seek: Seek<'_>) -> Result<EntityId> {
        let mut within = seek;
        while let Some(candidate) = value {
            if let Some(id_key) = self.locate_id(&candidate, within)? {
                return self.settle(candidate, id_key);
            }
            within = Seek::Last;
            value = self.prev_accepted(Some(candidate))?;
        }
        Err(Error::Break)
    }

    /// The first id under the first accepted value.
    pub fn first(&mut self) -> Result<EntityId> {
        let value = self.next_accepted(None)?;
        self.forward_from(value, Seek::First)
    }

    /// The last id under the last accepted value.
    pub fn last(&mut self) -> Result<EntityId> {
        let value = self.prev_accepted(None)?;
        self.reverse_from(value, Seek::Last)
    }

    /// The next id under the current value, rolling over to the next
    /// accepted value when the current one is exhausted.
    pub fn next(&mut self) -> Result<EntityId> {
        let Some(value) = self.value.clone() else {
            return self.first();
        };
        match self.pos.clone() {
            Some(pos) => self.forward_from(Some(value), Seek::Gt(&pos)),
            None => self.forward_from(Some(value), Seek::First),
        }
    }

    /// The previous id under the current value, rolling back to the previous
    /// accepted value when the current one is exhausted.
    pub fn prev(&mut self) -> Result<EntityId> {
        let Some(value) = self.value.clone() else {
            return self.last();
        };
        match self.pos.clone() {
            Some(pos) => self.reverse_from(Some(value), Seek::Lt(&pos)),
            None => self.reverse_from(Some(value), Seek::Last),
        }
    }

    /// Positions at the smallest accepted value greater than or equal to
    /// `relationship_value`; within an exactly-matching value, at the
    /// smallest id greater than or equal to `seek_id`.
    ///
    /// When the exact value is not accepted (or does not exist), the seek
    /// jumps to the next accepted value and `seek_id` is ignored.
    pub fn seek_forward(&mut self, relationship_value: &str, seek_id: EntityId) -> Result<EntityId> {
        let target = relationship_value.as_bytes().to_vec();
        let id_key = seek_id.as_key();

        let exact = self.locate_id(&target, Seek::First)?.is_some() && self.accepts(&target)?;
        if exact {
            self.forward_from(Some(target), Seek::Ge(&id_key))
        } else {
            let value = self.next_accepted(Some(target))?;
            self.forward_from(value, Seek::First)
        }
    }

    /// Positions at the greatest accepted value less than or equal to
    /// `relationship_value`; within an exactly-matching value, at the
    /// greatest id less than or equal to `seek_id`.
    ///
    /// When the exact value is not accepted (or does not exist), the seek
    /// jumps to the previous accepted value and `seek_id` is ignored.
    pub fn seek_reverse(&mut self, relationship_value: &str, seek_id: EntityId) -> Result<EntityId> {
        let target = relationship_value.as_bytes().to_vec();
        let id_key = seek_id.as_key();

        let exact = self.locate_id(&target, Seek::First)?.is_some() && self.accepts(&target)?;
        if exact {
            self.reverse_from(Some(target), Seek::Le(&id_key))
        } else {
            let value = self.prev_accepted(Some(target))?;
            self.reverse_from(value, Seek::Last)
        }
    }

    /// Resumes a forward walk after a pagination token: seeks `seek_id`
    /// within the first value of the bucket per [`Self::seek_forward`].
    pub(crate) fn resume_forward(&mut self, seek_id: EntityId) -> Result<EntityId> {
        match self.read.next_child(&self.bucket, None)? {
            Some(first) => {
                let text = String::from_utf8(first).map_err(|_| {
                    Error::Storage(StorageError::corrupted("relationship value is not UTF-8"))
                })?;
                self.seek_forward(&text, seek_id)
            }
            None => Err(Error::Break),
        }
    }

    /// Resumes a reverse walk before a pagination token, mirroring
    /// [`Self::resume_forward`].
    pub(crate) fn resume_reverse(&mut self, seek_id: EntityId) -> Result<EntityId> {
        match self.read.prev_child(&self.bucket, None)? {
            Some(last) => {
                let text = String::from_utf8(last).map_err(|_| {
                    Error::Storage(StorageError::corrupted("relationship value is not UTF-8"))
                })?;
                self.seek_reverse(&text, seek_id)
            }
            None => Err(Error::Break),
        }
    }
}
