//! Dice query definition and validation
//!
//! A [`DiceQuery`] is the raw request handed to the engine: qualified
//! measures, one coordinate per axis, optional filters, the pivot axis
//! selection and output shaping flags. Queries are serializable because the
//! cache fingerprint is derived from their canonical JSON form.

use crate::error::{Error, Result};
use crate::model::split_qualified;
use crate::types::{Coordinate, Filter, FormatType};
use serde::{Deserialize, Serialize};

/// Row ordering applied to the assembled table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column index to sort by
    pub column: usize,
    /// Sort descending instead of ascending
    #[serde(default)]
    pub descending: bool,
}

/// A raw dice request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceQuery {
    /// Qualified `space.measure` names; the first entry determines the
    /// owning space for dimension resolution
    pub measures: Vec<String>,

    /// One coordinate per query axis
    pub coordinates: Vec<Coordinate>,

    /// Caller-supplied dimension filters
    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Indices into `coordinates` whose drills become repeated column
    /// groups instead of rows
    #[serde(default)]
    pub pivot_on: Vec<usize>,

    /// Omit rows whose entire measure vector is zero
    #[serde(default)]
    pub skip_zero: bool,

    /// Upper bound on distinct aggregation keys; exceeding it aborts the
    /// query with a size-limit error
    #[serde(default)]
    pub limit: Option<usize>,

    /// Optional row ordering
    #[serde(default)]
    pub sort_by: Option<SortSpec>,

    /// Measure cell rendering
    #[serde(default)]
    pub format: FormatType,
}

impl DiceQuery {
    /// Create a query with default shaping flags
    pub fn new(measures: Vec<String>, coordinates: Vec<Coordinate>) -> Self {
        Self {
            measures,
            coordinates,
            filters: Vec::new(),
            pivot_on: Vec::new(),
            skip_zero: false,
            limit: None,
            sort_by: None,
            format: FormatType::default(),
        }
    }

    /// Select pivot axes by coordinate index
    pub fn with_pivot(mut self, pivot_on: Vec<usize>) -> Self {
        self.pivot_on = pivot_on;
        self
    }

    /// Add caller filters
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Omit all-zero rows
    pub fn with_skip_zero(mut self) -> Self {
        self.skip_zero = true;
        self
    }

    /// Bound the number of distinct aggregation keys
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort emitted rows by column
    pub fn with_sort(mut self, column: usize, descending: bool) -> Self {
        self.sort_by = Some(SortSpec { column, descending });
        self
    }

    /// Set the measure cell rendering
    pub fn with_format(mut self, format: FormatType) -> Self {
        self.format = format;
        self
    }

    /// The owning space, taken from the first measure
    pub fn space_name(&self) -> Result<&str> {
        let first = self
            .measures
            .first()
            .ok_or_else(|| Error::validation("measures list is empty"))?;
        Ok(split_qualified(first)?.0)
    }

    /// Check structural well-formedness before planning
    pub fn validate(&self) -> Result<()> {
        if self.measures.is_empty() {
            return Err(Error::validation("measures list is empty"));
        }
        for measure in &self.measures {
            split_qualified(measure)?;
        }

        for coordinate in &self.coordinates {
            if coordinate.dimension.is_empty() {
                return Err(Error::validation("coordinate has an empty dimension name"));
            }
            if coordinate.values.is_empty() {
                return Err(Error::validation(format!(
                    "coordinate on '{}' has no levels",
                    coordinate.dimension
                )));
            }
            // once a wildcard appears, the rest of the tail must be wildcards
            let prefix = coordinate.fixed_prefix_len();
            if coordinate.values[prefix..].iter().any(|v| v.is_some()) {
                return Err(Error::validation(format!(
                    "coordinate on '{}' fixes a level below a wildcard",
                    coordinate.dimension
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for &index in &self.pivot_on {
            if index >= self.coordinates.len() {
                return Err(Error::validation(format!(
                    "pivot index {} out of range ({} coordinates)",
                    index,
                    self.coordinates.len()
                )));
            }
            if !seen.insert(index) {
                return Err(Error::validation(format!(
                    "pivot index {} listed twice",
                    index
                )));
            }
        }

        if self.limit == Some(0) {
            return Err(Error::validation("limit cannot be 0"));
        }
        Ok(())
    }
}
