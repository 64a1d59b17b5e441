//! In-memory hierarchy and fact-store backend
//!
//! A concrete implementation of the [`Hierarchy`] and [`SpaceBackend`]
//! collaborator seams backed by plain maps. Intended for tests and for
//! embedders whose data fits in memory; the enumeration order of
//! [`MemoryHierarchy::glob`] is the sorted order callers rely on for stable
//! column headers.

use crate::error::Result;
use crate::model::{Hierarchy, SpaceBackend};
use crate::types::{CoordKey, Coordinate, Filter, Value};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Hierarchy
// ============================================================================

/// A dimension hierarchy stored as an in-memory tree
#[derive(Debug, Default)]
pub struct MemoryHierarchy {
    root: Node,
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<Value, Node>,
}

impl MemoryHierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a full-depth member path
    pub fn insert(&mut self, key: &[Value]) {
        let mut node = &mut self.root;
        for value in key {
            node = node.children.entry(value.clone()).or_default();
        }
    }

    /// Build a hierarchy from an iterator of member paths
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a [Value]>) -> Self {
        let mut tree = Self::new();
        for key in keys {
            tree.insert(key);
        }
        tree
    }

    fn walk(node: &Node, pattern: &[Option<Value>], prefix: &mut CoordKey, out: &mut Vec<CoordKey>) {
        let Some(slot) = pattern.first() else {
            out.push(prefix.clone());
            return;
        };
        match slot {
            Some(value) => {
                if let Some(child) = node.children.get(value) {
                    prefix.push(value.clone());
                    Self::walk(child, &pattern[1..], prefix, out);
                    prefix.pop();
                }
            }
            None => {
                for (value, child) in &node.children {
                    prefix.push(value.clone());
                    Self::walk(child, &pattern[1..], prefix, out);
                    prefix.pop();
                }
            }
        }
    }
}

impl Hierarchy for MemoryHierarchy {
    fn glob(&self, pattern: &[Option<Value>]) -> Vec<CoordKey> {
        let mut out = Vec::new();
        let mut prefix = Vec::with_capacity(pattern.len());
        Self::walk(&self.root, pattern, &mut prefix, &mut out);
        out
    }
}

// ============================================================================
// Backend
// ============================================================================

/// One stored fact: a full-depth coordinate per dimension plus measure values
#[derive(Debug, Clone)]
struct Fact {
    coordinates: HashMap<String, CoordKey>,
    values: HashMap<String, f64>,
}

/// Additive in-memory fact store implementing [`SpaceBackend`]
///
/// Facts accumulate; `dice` aggregates them by summing measure values over
/// every fact whose per-dimension coordinates match the requested patterns
/// truncated to the requested depth. The backend counts `dice` calls so
/// tests can assert that guards fire before any fetch and that concurrent
/// identical queries coalesce.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    facts: RwLock<Vec<Fact>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryBackend {
    /// Create an empty fact store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artificial delay to every `dice` call (for concurrency tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Record one fact
    pub fn add(&self, coordinates: &[(&str, CoordKey)], values: &[(&str, f64)]) {
        self.facts.write().push(Fact {
            coordinates: coordinates
                .iter()
                .map(|(d, k)| (d.to_string(), k.clone()))
                .collect(),
            values: values.iter().map(|(m, v)| (m.to_string(), *v)).collect(),
        });
    }

    /// Number of `dice` calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn axis_key(fact: &Fact, coordinate: &Coordinate) -> Option<CoordKey> {
        let full = fact.coordinates.get(&coordinate.dimension)?;
        if full.len() < coordinate.depth() {
            return None;
        }
        let key = &full[..coordinate.depth()];
        for (slot, value) in coordinate.values.iter().zip(key) {
            if let Some(fixed) = slot {
                if fixed != value {
                    return None;
                }
            }
        }
        Some(key.to_vec())
    }

    fn passes_filters(fact: &Fact, filters: &[Filter]) -> bool {
        filters.iter().all(|filter| {
            let Some(full) = fact.coordinates.get(&filter.dimension) else {
                // filters on dimensions the fact does not carry do not apply
                return true;
            };
            filter
                .prefixes
                .iter()
                .any(|prefix| full.len() >= prefix.len() && &full[..prefix.len()] == prefix.as_slice())
        })
    }
}

#[async_trait]
impl SpaceBackend for MemoryBackend {
    async fn dice(
        &self,
        coordinates: &[Coordinate],
        measures: &[String],
        filters: &[Filter],
    ) -> Result<Vec<(Vec<CoordKey>, Vec<f64>)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let facts = self.facts.read();
        let mut merged: HashMap<Vec<CoordKey>, Vec<f64>> = HashMap::new();
        for fact in facts.iter() {
            if !Self::passes_filters(fact, filters) {
                continue;
            }
            let Some(key) = coordinates
                .iter()
                .map(|c| Self::axis_key(fact, c))
                .collect::<Option<Vec<CoordKey>>>()
            else {
                continue;
            };
            let entry = merged.entry(key).or_insert_with(|| vec![0.0; measures.len()]);
            for (slot, measure) in measures.iter().enumerate() {
                entry[slot] += fact.values.get(measure).copied().unwrap_or(0.0);
            }
        }
        Ok(merged.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
