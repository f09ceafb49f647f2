//! Query filters and option shapes.

use crate::entity::EntityId;
use crate::error::Result;
use std::fmt;

/// Predicate over a relationship value.
///
/// Returning `Ok(true)` accepts the value; `Err(Error::Break)` stops the
/// enumeration it is driving. Predicates must be pure for the duration of a
/// transaction: their verdict per value is memoized.
pub type ComparisonPredicate = dyn Fn(&str) -> Result<bool> + Send + Sync;

/// A single query filter. Filters in a list are combined with logical AND.
pub enum Filter {
    /// Accepts records whose relationship slot contains the exact value.
    Match {
        /// The registered relationship name.
        relationship: String,
        /// The value that must be present.
        value: String,
    },

    /// Accepts records for which the predicate holds on at least one value
    /// in the relationship slot.
    Comparison {
        /// The registered relationship name.
        relationship: String,
        /// The value predicate.
        predicate: Box<ComparisonPredicate>,
    },
}

impl Filter {
    /// Creates an equality filter.
    pub fn matches(relationship: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            relationship: relationship.into(),
            value: value.into(),
        }
    }

    /// Creates a predicate filter.
    pub fn comparison<P>(relationship: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&str) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Comparison {
            relationship: relationship.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The relationship this filter applies to.
    #[must_use]
    pub fn relationship(&self) -> &str {
        match self {
            Self::Match { relationship, .. } | Self::Comparison { relationship, .. } => {
                relationship
            }
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match {
                relationship,
                value,
            } => f
                .debug_struct("Match")
                .field("relationship", relationship)
                .field("value", value)
                .finish(),
            Self::Comparison { relationship, .. } => f
                .debug_struct("Comparison")
                .field("relationship", relationship)
                .finish_non_exhaustive(),
        }
    }
}

/// Options for [`crate::Transaction::for_each`] and the first/last queries.
#[derive(Debug, Default)]
pub struct IteratingOpts {
    /// Filters combined with logical AND; empty means every entry.
    pub filters: Vec<Filter>,
    /// Iterate in descending id order.
    pub reverse: bool,
}

impl IteratingOpts {
    /// Creates options with the given filters and defaults otherwise.
    pub fn new(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
            reverse: false,
        }
    }
}

/// Options for [`crate::Transaction::get_filtered`].
#[derive(Debug, Default)]
pub struct FilteringOpts {
    /// Filters combined with logical AND; empty means every entry.
    pub filters: Vec<Filter>,
    /// Maximum number of records to return; `None` is unlimited.
    pub limit: Option<u64>,
    /// Resume strictly after this id (before it when iterating in reverse),
    /// as returned by a previous `get_filtered` call.
    pub last_id: Option<EntityId>,
    /// Iterate in descending id order.
    pub reverse: bool,
}

impl FilteringOpts {
    /// Creates options with the given filters and defaults otherwise.
    pub fn new(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}
