//! Core vocabulary for hierarchical coordinates, filters and table cells
//!
//! A dimension position is addressed by a [`Coordinate`]: the dimension name
//! plus one slot per hierarchy level, where `None` marks a level that is not
//! yet fixed. A coordinate with no `None` slot is *frozen* and contributes a
//! single column; a coordinate with a wildcard tail is *free* and expands
//! into one column per revealed level.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// A concrete scalar at one level of a dimension hierarchy
///
/// Ordering is derived (integers before text) so that drill output and
/// column headers have a stable, repeatable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer-valued level (years, account numbers, ...)
    Int(i64),
    /// Text-valued level (month codes, department names, ...)
    Text(String),
}

impl Value {
    /// Create a text value
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Create an integer value
    pub fn int(i: i64) -> Self {
        Value::Int(i)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A fully concrete coordinate tuple, one value per hierarchy level
pub type CoordKey = Vec<Value>;

// ============================================================================
// Coordinates
// ============================================================================

/// A (dimension, value tuple) pair addressing a position in a hierarchy
///
/// `values[i]` is either a concrete value at level `i` or `None` meaning
/// "not yet fixed / wildcard below here". Once a `None` appears, every later
/// slot must be `None` as well; [`crate::query::DiceQuery::validate`]
/// enforces the invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Dimension name within the owning space
    pub dimension: String,
    /// One slot per requested level, `None` for wildcards
    pub values: Vec<Option<Value>>,
}

impl Coordinate {
    /// Create a coordinate from raw slots
    pub fn new(dimension: impl Into<String>, values: Vec<Option<Value>>) -> Self {
        Self {
            dimension: dimension.into(),
            values,
        }
    }

    /// Create a frozen coordinate (every level fixed)
    pub fn frozen(dimension: impl Into<String>, key: CoordKey) -> Self {
        Self {
            dimension: dimension.into(),
            values: key.into_iter().map(Some).collect(),
        }
    }

    /// Number of requested levels
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// True if every slot is concrete
    pub fn is_frozen(&self) -> bool {
        self.values.iter().all(|v| v.is_some())
    }

    /// Number of leading concrete slots before the first wildcard
    pub fn fixed_prefix_len(&self) -> usize {
        self.values
            .iter()
            .position(|v| v.is_none())
            .unwrap_or_else(|| self.depth())
    }

    /// Indices of wildcard slots
    pub fn free_positions(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// The concrete key, if the coordinate is frozen
    pub fn as_key(&self) -> Option<CoordKey> {
        self.values.iter().cloned().collect()
    }
}

// ============================================================================
// Filters
// ============================================================================

/// A dimension filter: keep facts whose coordinate starts with any of the
/// listed prefixes
///
/// Filters are passed through to the data-source collaborator and take part
/// in the cache fingerprint; caller filters and externally injected
/// permission filters apply identically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Dimension name the filter applies to
    pub dimension: String,
    /// Accepted coordinate prefixes (logical OR)
    pub prefixes: Vec<CoordKey>,
}

impl Filter {
    /// Create a filter
    pub fn new(dimension: impl Into<String>, prefixes: Vec<CoordKey>) -> Self {
        Self {
            dimension: dimension.into(),
            prefixes,
        }
    }
}

// ============================================================================
// Output formatting
// ============================================================================

/// Output rendering requested for measure cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    /// Raw numbers suitable for JSON payloads
    #[default]
    Json,
    /// Human-readable text with digit grouping
    Txt,
    /// Raw cell values for spreadsheet export
    Raw,
}

/// A single rendered table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Numeric measure cell
    Number(f64),
    /// Text cell (dimension labels, formatted measures)
    Text(String),
}

impl Cell {
    /// Total ordering used when sorting table rows by column
    pub fn compare(&self, other: &Cell) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Number(_), Cell::Text(_)) => Ordering::Less,
            (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
