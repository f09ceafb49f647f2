//! Relationship index maintenance.
//!
//! Every write runs the stored record's old relationship vector against the
//! new one and applies the difference to the reverse index: removed values
//! lose their `relationships/<name>/<value>/<id>` entry, added values gain
//! one. The leaf key and value are both the record id, so iterating a value
//! bucket yields ids in id-sorted order. Empty strings never index.

use crate::buckets;
use crate::entity::{EntityId, Relationships};
use crate::error::Result;
use entwine_storage::KvWrite;
use std::collections::BTreeSet;

pub(crate) fn apply(
    writer: &mut dyn KvWrite,
    registry: &[String],
    id: EntityId,
    old: &Relationships,
    new: &Relationships,
) -> Result<()> {
    let key = id.as_key();
    for (slot, name) in registry.iter().enumerate() {
        let old_values = indexed_values(old, slot);
        let new_values = indexed_values(new, slot);

        for removed in old_values.difference(&new_values) {
            writer.delete(&buckets::relationship_value(name, removed), &key)?;
        }
        for added in new_values.difference(&old_values) {
            writer.put(&buckets::relationship_value(name, added), &key, &key)?;
        }
    }
    Ok(())
}

fn indexed_values<'r>(relationships: &'r Relationships, slot: usize) -> BTreeSet<&'r str> {
    relationships
        .slot(slot)
        .iter()
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entwine_storage::{KvEngine, MemoryEngine, Seek};

    const REGISTRY: [&str; 2] = ["users", "tags"];

    fn registry() -> Vec<String> {
        REGISTRY.iter().map(ToString::to_string).collect()
    }

    fn rels(user: &str, tags: &[&str]) -> Relationships {
        let mut r = Relationships::new();
        r.push(user);
        r.push_many(tags.iter().copied());
        r
    }

    fn indexed(engine: &MemoryEngine, name: &str, value: &str, id: EntityId) -> bool {
        let read = engine.begin_read().unwrap();
        read.get(&buckets::relationship_value(name, value), &id.as_key())
            .unwrap()
            .is_some()
    }

    #[test]
    fn insert_adds_every_value() {
        let engine = MemoryEngine::new();
        let id = EntityId::from_u64(0);

        let mut txn = engine.begin_write().unwrap();
        apply(
            txn.as_mut(),
            &registry(),
            id,
            &Relationships::new(),
            &rels("user_1", &["foo", "bar"]),
        )
        .unwrap();
        txn.commit().unwrap();

        assert!(indexed(&engine, "users", "user_1", id));
        assert!(indexed(&engine, "tags", "foo", id));
        assert!(indexed(&engine, "tags", "bar", id));
    }

    #[test]
    fn edit_applies_the_difference() {
        let engine = MemoryEngine::new();
        let id = EntityId::from_u64(0);
        let old = rels("user_1", &["foo", "bar"]);
        let new = rels("user_2", &["bar", "baz"]);

        let mut txn = engine.begin_write().unwrap();
        apply(txn.as_mut(), &registry(), id, &Relationships::new(), &old).unwrap();
        apply(txn.as_mut(), &registry(), id, &old, &new).unwrap();
        txn.commit().unwrap();

        assert!(!indexed(&engine, "users", "user_1", id));
        assert!(indexed(&engine, "users", "user_2", id));
        assert!(!indexed(&engine, "tags", "foo", id));
        assert!(indexed(&engine, "tags", "bar", id));
        assert!(indexed(&engine, "tags", "baz", id));
    }

    #[test]
    fn remove_clears_every_value() {
        let engine = MemoryEngine::new();
        let id = EntityId::from_u64(0);
        let old = rels("user_1", &["foo"]);

        let mut txn = engine.begin_write().unwrap();
        apply(txn.as_mut(), &registry(), id, &Relationships::new(), &old).unwrap();
        apply(txn.as_mut(), &registry(), id, &old, &Relationships::new()).unwrap();
        txn.commit().unwrap();

        assert!(!indexed(&engine, "users", "user_1", id));
        assert!(!indexed(&engine, "tags", "foo", id));

        // The emptied value bucket is gone entirely.
        let read = engine.begin_read().unwrap();
        assert!(read
            .locate(&buckets::relationship_value("users", "user_1"), Seek::First)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_strings_never_index() {
        let engine = MemoryEngine::new();
        let id = EntityId::from_u64(0);

        let mut txn = engine.begin_write().unwrap();
        apply(
            txn.as_mut(),
            &registry(),
            id,
            &Relationships::new(),
            &rels("", &["", "foo"]),
        )
        .unwrap();
        txn.commit().unwrap();

        assert!(!indexed(&engine, "users", "", id));
        assert!(!indexed(&engine, "tags", "", id));
        assert!(indexed(&engine, "tags", "foo", id));
    }

    #[test]
    fn duplicate_values_collapse() {
        let engine = MemoryEngine::new();
        let id = EntityId::from_u64(0);
        let tagged = rels("user_1", &["foo", "foo"]);

        let mut txn = engine.begin_write().unwrap();
        apply(txn.as_mut(), &registry(), id, &Relationships::new(), &tagged).unwrap();
        apply(txn.as_mut(), &registry(), id, &tagged, &Relationships::new()).unwrap();
        txn.commit().unwrap();

        assert!(!indexed(&engine, "tags", "foo", id));
    }
}
