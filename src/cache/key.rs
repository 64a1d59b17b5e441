//! Content-addressed cache keys
//!
//! A [`Fingerprint`] is a SHA-256 digest over the canonical JSON form of the
//! normalized query plus any externally injected permission filters. Two
//! requests that could produce different output never share a key, and the
//! key is stable across processes so the persistent tier survives restarts.

use crate::error::Result;
use crate::query::ast::DiceQuery;
use crate::types::Filter;
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic hash of one complete semantic request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a query under the given permission filters
    ///
    /// Filters are sorted before hashing so that two requests differing only
    /// in filter order collide on the same key.
    pub fn of(query: &DiceQuery, permissions: &[Filter]) -> Result<Self> {
        let mut normalized = query.clone();
        normalized.filters.sort();
        let mut permissions = permissions.to_vec();
        permissions.sort();

        let payload = serde_json::to_vec(&(&normalized, &permissions))?;
        let digest = Sha256::digest(&payload);
        Ok(Self(hex::encode(digest)))
    }

    /// Hex form, used as the persistent tier's file name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinate, Value};

    fn query() -> DiceQuery {
        DiceQuery::new(
            vec!["sales.amount".into()],
            vec![Coordinate::new("date", vec![Some(Value::int(2024)), None])],
        )
    }

    #[test]
    fn test_identical_requests_collide() {
        let a = Fingerprint::of(&query(), &[]).unwrap();
        let b = Fingerprint::of(&query(), &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_every_semantic_field_feeds_the_key() {
        let base = Fingerprint::of(&query(), &[]).unwrap();

        let skip = Fingerprint::of(&query().with_skip_zero(), &[]).unwrap();
        assert_ne!(base, skip);

        let limited = Fingerprint::of(&query().with_limit(10), &[]).unwrap();
        assert_ne!(base, limited);

        let pivoted = Fingerprint::of(&query().with_pivot(vec![0]), &[]).unwrap();
        assert_ne!(base, pivoted);

        let formatted = Fingerprint::of(
            &query().with_format(crate::types::FormatType::Txt),
            &[],
        )
        .unwrap();
        assert_ne!(base, formatted);
    }

    #[test]
    fn test_permission_filters_feed_the_key() {
        let base = Fingerprint::of(&query(), &[]).unwrap();
        let restricted = Fingerprint::of(
            &query(),
            &[Filter::new("dept", vec![vec![Value::text("toys")]])],
        )
        .unwrap();
        assert_ne!(base, restricted);
    }

    #[test]
    fn test_filter_order_is_normalized() {
        let a = Filter::new("dept", vec![vec![Value::text("toys")]]);
        let b = Filter::new("region", vec![vec![Value::text("north")]]);

        let forward = Fingerprint::of(&query(), &[a.clone(), b.clone()]).unwrap();
        let backward = Fingerprint::of(&query(), &[b, a]).unwrap();
        assert_eq!(forward, backward);
    }
}
