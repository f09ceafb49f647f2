//! Filter planning and multi-filter iteration.
//!
//! The first filter in a list is the *primary*: it drives iteration and
//! produces candidate ids in order. Every remaining filter is a *secondary*,
//! evaluated per candidate without scanning its bucket: a `Match` secondary
//! is a single point probe, a `Comparison` secondary scans the relationship's
//! values (memoizing the predicate) and point-probes the candidate under each
//! accepted value. An empty filter list drives iteration straight off the
//! primary keyspace.

use crate::buckets;
use crate::comparison::ComparisonCursor;
use crate::cursor::RawCursor;
use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::filter::{ComparisonPredicate, Filter, FilteringOpts, IteratingOpts};
use crate::transaction::Transaction;
use entwine_storage::{Bucket, KvRead, StorageError};
use std::collections::HashMap;
use std::ops::ControlFlow;

enum Primary<'txn> {
    Entries(RawCursor<'txn>),
    Match(RawCursor<'txn>),
    Comparison(ComparisonCursor<'txn>),
}

impl Primary<'_> {
    /// Positions the cursor for the first candidate, honoring direction and
    /// the continuation token. Returns the candidate id key, or `None` when
    /// the walk is already exhausted.
    fn start(&mut self, reverse: bool, last_id: Option<EntityId>) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Entries(raw) | Self::Match(raw) => {
                let entry = match (last_id, reverse) {
                    (None, false) => raw.first()?,
                    (None, true) => raw.last()?,
                    (Some(last), false) => {
                        // Seek-then-step-one: resume strictly after the token.
                        let token = last.as_key();
                        match raw.seek_ge(&token)? {
                            Some((key, _)) if key == token => raw.next()?,
                            other => other,
                        }
                    }
                    (Some(last), true) => {
                        let token = last.as_key();
                        match raw.seek_le(&token)? {
                            Some((key, _)) if key == token => raw.prev()?,
                            other => other,
                        }
                    }
                };
                Ok(entry.map(|(key, _)| key))
            }
            Self::Comparison(cursor) => {
                let id = match (last_id, reverse) {
                    (None, false) => cursor.first(),
                    (None, true) => cursor.last(),
                    (Some(last), false) => match cursor.resume_forward(last) {
                        Ok(id) if id == last => cursor.next(),
                        other => other,
                    },
                    (Some(last), true) => match cursor.resume_reverse(last) {
                        Ok(id) if id == last => cursor.prev(),
                        other => other,
                    },
                };
                sentinel_to_none(id)
            }
        }
    }

    fn step(&mut self, reverse: bool) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Entries(raw) | Self::Match(raw) => {
                let entry = if reverse { raw.prev()? } else { raw.next()? };
                Ok(entry.map(|(key, _)| key))
            }
            Self::Comparison(cursor) => {
                let id = if reverse { cursor.prev() } else { cursor.next() };
                sentinel_to_none(id)
            }
        }
    }
}

fn sentinel_to_none(id: Result<EntityId>) -> Result<Option<Vec<u8>>> {
    match id {
        Ok(id) => Ok(Some(id.as_key().to_vec())),
        Err(err) if err.is_sentinel() => Ok(None),
        Err(err) => Err(err),
    }
}

enum Secondary<'f> {
    Match {
        bucket: Bucket,
    },
    Comparison {
        relationship: Bucket,
        predicate: &'f ComparisonPredicate,
        memo: HashMap<Vec<u8>, bool>,
    },
}

impl Secondary<'_> {
    fn accepts(&mut self, read: &dyn KvRead, id_key: &[u8]) -> Result<bool> {
        match self {
            Self::Match { bucket } => Ok(read.get(bucket, id_key)?.is_some()),
            Self::Comparison {
                relationship,
                predicate,
                memo,
            } => {
                let mut child = read.next_child(relationship, None)?;
                while let Some(value) = child {
                    let verdict = match memo.get(&value) {
                        Some(&verdict) => verdict,
                        None => {
                            let text = std::str::from_utf8(&value).map_err(|_| {
                                Error::Storage(StorageError::corrupted(
                                    "relationship value is not UTF-8",
                                ))
                            })?;
                            let verdict = predicate(text)?;
                            memo.insert(value.clone(), verdict);
                            verdict
                        }
                    };
                    if verdict && read.get(&relationship.child(&value), id_key)?.is_some() {
                        return Ok(true);
                    }
                    child = read.next_child(relationship, Some(&value))?;
                }
                Ok(false)
            }
        }
    }
}

fn plan<'q, T: Entity>(
    txn: &'q Transaction<T>,
    filters: &'q [Filter],
) -> Result<(Primary<'q>, Vec<Secondary<'q>>)> {
    for filter in filters {
        txn.require_relationship(filter.relationship())?;
    }

    let read = txn.reader();
    let mut filters = filters.iter();
    let primary = match filters.next() {
        None => Primary::Entries(RawCursor::new(read, buckets::entries())),
        Some(Filter::Match {
            relationship,
            value,
        }) => Primary::Match(RawCursor::new(
            read,
            buckets::relationship_value(relationship, value),
        )),
        Some(Filter::Comparison {
            relationship,
            predicate,
        }) => Primary::Comparison(ComparisonCursor::new(read, relationship, predicate.as_ref())),
    };

    let secondaries = filters
        .map(|filter| match filter {
            Filter::Match {
                relationship,
                value,
            } => Secondary::Match {
                bucket: buckets::relationship_value(relationship, value),
            },
            Filter::Comparison {
                relationship,
                predicate,
            } => Secondary::Comparison {
                relationship: buckets::relationship(relationship),
                predicate: predicate.as_ref(),
                memo: HashMap::new(),
            },
        })
        .collect();

    Ok((primary, secondaries))
}

/// Drives a filtered walk, delivering each accepted record to `deliver`.
fn run<T, F>(
    txn: &Transaction<T>,
    filters: &[Filter],
    reverse: bool,
    last_id: Option<EntityId>,
    limit: Option<u64>,
    mut deliver: F,
) -> Result<()>
where
    T: Entity,
    F: FnMut(EntityId, T) -> Result<ControlFlow<()>>,
{
    if limit == Some(0) {
        return Ok(());
    }

    let (mut primary, mut secondaries) = plan(txn, filters)?;
    let read = txn.reader();
    let entries = buckets::entries();
    let mut delivered = 0u64;
    let mut candidate = primary.start(reverse, last_id)?;

    'walk: while let Some(id_key) = candidate {
        txn.context().check()?;

        let mut accepted = true;
        for secondary in &mut secondaries {
            match secondary.accepts(read, &id_key) {
                Ok(true) => {}
                Ok(false) => {
                    accepted = false;
                    break;
                }
                // A predicate returning Break ends the whole walk cleanly.
                Err(err) if err.is_sentinel() => break 'walk,
                Err(err) => return Err(err),
            }
        }

        if accepted {
            let id = EntityId::from_key(&id_key).ok_or_else(|| {
                Error::Storage(StorageError::corrupted("malformed id in index bucket"))
            })?;
            let payload = read
                .get(&entries, &id_key)?
                .ok_or(Error::EntryNotFound)?;
            let record: T = serde_json::from_slice(&payload)?;
            match deliver(id, record)? {
                ControlFlow::Continue(()) => {}
                ControlFlow::Break(()) => break,
            }
            delivered += 1;
            if limit.is_some_and(|limit| delivered >= limit) {
                break;
            }
        }

        candidate = primary.step(reverse)?;
    }

    Ok(())
}

pub(crate) fn for_each<T, F>(txn: &Transaction<T>, opts: &IteratingOpts, mut f: F) -> Result<()>
where
    T: Entity,
    F: FnMut(EntityId, &T) -> Result<ControlFlow<()>>,
{
    run(txn, &opts.filters, opts.reverse, None, None, |id, record| {
        f(id, &record)
    })
}

pub(crate) fn get_filtered<T: Entity>(
    txn: &Transaction<T>,
    opts: &FilteringOpts,
) -> Result<(Vec<T>, Option<EntityId>)> {
    let mut records = Vec::new();
    // An empty page hands the caller's token back, so pagination loops can
    // thread the returned id unconditionally.
    let mut last_id = opts.last_id;
    run(
        txn,
        &opts.filters,
        opts.reverse,
        opts.last_id,
        opts.limit,
        |id, record| {
            records.push(record);
            last_id = Some(id);
            Ok(ControlFlow::Continue(()))
        },
    )?;
    Ok((records, last_id))
}

pub(crate) fn get_first<T: Entity>(txn: &Transaction<T>, opts: &IteratingOpts) -> Result<T> {
    single(txn, opts, false)
}

pub(crate) fn get_last<T: Entity>(txn: &Transaction<T>, opts: &IteratingOpts) -> Result<T> {
    single(txn, opts, true)
}

fn single<T: Entity>(txn: &Transaction<T>, opts: &IteratingOpts, reverse: bool) -> Result<T> {
    let mut found = None;
    run(txn, &opts.filters, reverse, None, Some(1), |_, record| {
        found = Some(record);
        Ok(ControlFlow::Break(()))
    })?;
    found.ok_or(Error::EntryNotFound)
}
