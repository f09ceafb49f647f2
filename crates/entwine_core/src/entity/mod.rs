//! The entity model: record trait, embeddable metadata, relationship slots.

mod id;

pub use id::EntityId;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A record type storable in an Entwine store.
///
/// The store is parameterized by one `Entity` implementation; payloads are
/// serialized as self-describing JSON. The id and timestamps are stamped by
/// the store on write, so implementations usually embed [`EntityMeta`] and
/// delegate:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Contact {
///     #[serde(flatten)]
///     meta: EntityMeta,
///     #[serde(rename = "userID")]
///     user_id: String,
///     tags: Vec<String>,
/// }
///
/// impl Entity for Contact {
///     fn id(&self) -> EntityId { self.meta.id }
///     fn set_id(&mut self, id: EntityId) { self.meta.id = id; }
///     // ... created_at / updated_at likewise ...
///     fn relationships(&self) -> Relationships {
///         let mut r = Relationships::new();
///         r.push(&self.user_id);
///         r.push_many(&self.tags);
///         r
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    /// The assigned id, or the zero id before the first write.
    fn id(&self) -> EntityId;

    /// Stamps the assigned id.
    fn set_id(&mut self, id: EntityId);

    /// Creation time in nanoseconds since the Unix epoch.
    fn created_at(&self) -> i64;

    /// Stamps the creation time.
    fn set_created_at(&mut self, nanos: i64);

    /// Last write time in nanoseconds since the Unix epoch.
    fn updated_at(&self) -> i64;

    /// Stamps the last write time.
    fn set_updated_at(&mut self, nanos: i64);

    /// The record's relationship values, one slot per registered
    /// relationship, in registration order.
    fn relationships(&self) -> Relationships;
}

/// Embeddable store-managed fields.
///
/// Flatten this into a record struct to get the `id` / `createdAt` /
/// `updatedAt` JSON fields the store expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// The assigned entry id.
    #[serde(default)]
    pub id: EntityId,

    /// Creation time in nanoseconds since the Unix epoch.
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,

    /// Last write time in nanoseconds since the Unix epoch.
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

/// A record's relationship values.
///
/// Slots are ordered to match the store's registered relationship names. A
/// single-valued relationship contributes a one-element slot; a multi-valued
/// one contributes as many elements as it has values. Empty strings are
/// treated as "no value" and are never indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    slots: Vec<Vec<String>>,
}

impl Relationships {
    /// Creates an empty relationship vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single-valued slot.
    pub fn push(&mut self, value: impl Into<String>) {
        self.slots.push(vec![value.into()]);
    }

    /// Appends a multi-valued slot.
    pub fn push_many<I>(&mut self, values: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.slots.push(values.into_iter().map(Into::into).collect());
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The values of slot `index`, or an empty slice past the end.
    ///
    /// Treating missing slots as empty lets the indexer diff a record
    /// against the empty vector on insert and remove.
    #[must_use]
    pub fn slot(&self, index: usize) -> &[String] {
        self.slots.get(index).map_or(&[], Vec::as_slice)
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub(crate) fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationships_builder() {
        let mut r = Relationships::new();
        r.push("user_1");
        r.push("contact_1");
        r.push_many(["foo", "bar"]);

        assert_eq!(r.len(), 3);
        assert_eq!(r.slot(0), ["user_1"]);
        assert_eq!(r.slot(2), ["foo", "bar"]);
        assert!(r.slot(3).is_empty());
    }

    #[test]
    fn meta_serializes_with_camel_case_stamps() {
        let meta = EntityMeta {
            id: EntityId::from_u64(7),
            created_at: 123,
            updated_at: 456,
        };

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["id"], "00000007");
        assert_eq!(json["createdAt"], 123);
        assert_eq!(json["updatedAt"], 456);
    }

    #[test]
    fn meta_defaults_when_fields_absent() {
        let meta: EntityMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.id, EntityId::default());
        assert_eq!(meta.created_at, 0);
    }

    #[test]
    fn unix_nanos_is_monotonic_enough() {
        let a = unix_nanos();
        let b = unix_nanos();
        assert!(b >= a);
        assert!(a > 0);
    }
}
