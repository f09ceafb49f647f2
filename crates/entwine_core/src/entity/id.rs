//! Entry identifier.

use crate::error::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const HEX_WIDTH: usize = 8;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Identifier of a stored entry.
///
/// Ids are assigned from a monotonic per-store counter and rendered as
/// fixed-width lowercase hex (`00000000`, `00000001`, …), so their byte order
/// equals their numeric order and cursor iteration over the primary bucket
/// yields entries in insertion order.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an id from its raw counter value.
    #[inline]
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Renders the fixed-width key form used on disk.
    #[must_use]
    pub fn as_key(self) -> [u8; HEX_WIDTH] {
        let mut key = [0u8; HEX_WIDTH];
        for (i, byte) in key.iter_mut().enumerate() {
            let shift = (HEX_WIDTH - 1 - i) * 4;
            *byte = HEX_DIGITS[((self.0 >> shift) & 0xf) as usize];
        }
        key
    }

    /// Parses the fixed-width key form.
    ///
    /// Returns `None` unless `key` is exactly eight lowercase hex digits.
    #[must_use]
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != HEX_WIDTH {
            return None;
        }
        if !key
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            return None;
        }
        let text = std::str::from_utf8(key).ok()?;
        u64::from_str_radix(text, 16).ok().map(Self)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = HEX_WIDTH)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // An unassigned id serializes as the empty string in records built by
        // hand; treat it as the zero id.
        if s.is_empty() {
            return Ok(Self(0));
        }
        Self::from_key(s.as_bytes())
            .ok_or_else(|| Error::invalid_entry(format!("malformed entry id {s:?}")))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fixed_width_hex() {
        assert_eq!(EntityId::from_u64(0).to_string(), "00000000");
        assert_eq!(EntityId::from_u64(1).to_string(), "00000001");
        assert_eq!(EntityId::from_u64(0xdead).to_string(), "0000dead");
    }

    #[test]
    fn key_roundtrip() {
        for raw in [0u64, 1, 2, 255, 0xffff_ffff] {
            let id = EntityId::from_u64(raw);
            assert_eq!(EntityId::from_key(&id.as_key()), Some(id));
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(EntityId::from_key(b"0000000"), None);
        assert_eq!(EntityId::from_key(b"000000000"), None);
        assert_eq!(EntityId::from_key(b"0000zzzz"), None);
        assert_eq!(EntityId::from_key(b"0000DEAD"), None);
    }

    #[test]
    fn byte_order_equals_numeric_order() {
        let ids: Vec<_> = [0u64, 1, 9, 10, 255, 4096]
            .iter()
            .map(|&raw| EntityId::from_u64(raw).as_key())
            .collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn parses_empty_as_zero() {
        assert_eq!("".parse::<EntityId>().unwrap(), EntityId::from_u64(0));
    }

    #[test]
    fn serde_string_form() {
        let id = EntityId::from_u64(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000003\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
