//! On-disk bucket layout.
//!
//! Top-level buckets: `entries` (id → payload), `relationships`
//! (`<name>/<value>/` → id → id), `meta` (durable counters and the
//! relationship registry), and `lookups` (`<name>/<key>/` → value → value).

use entwine_storage::Bucket;

pub(crate) const ENTRIES: &str = "entries";
pub(crate) const RELATIONSHIPS: &str = "relationships";
pub(crate) const META: &str = "meta";
pub(crate) const LOOKUPS: &str = "lookups";

/// Meta key holding the next id to assign.
pub(crate) const NEXT_ID_KEY: &[u8] = b"next-id";
/// Meta key holding the registered relationship names.
pub(crate) const REGISTRY_KEY: &[u8] = b"relationships";

pub(crate) fn entries() -> Bucket {
    Bucket::root(ENTRIES)
}

pub(crate) fn meta() -> Bucket {
    Bucket::root(META)
}

pub(crate) fn relationship(name: &str) -> Bucket {
    Bucket::root(RELATIONSHIPS).child(name.as_bytes())
}

pub(crate) fn relationship_value(name: &str, value: &str) -> Bucket {
    relationship(name).child(value.as_bytes())
}

pub(crate) fn lookup(name: &str, key: &str) -> Bucket {
    Bucket::root(LOOKUPS)
        .child(name.as_bytes())
        .child(key.as_bytes())
}
