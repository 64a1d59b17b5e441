//! Query planner - axis splitting, mask collapsing and the size guard
//!
//! Turns a validated [`DiceQuery`] into an execution [`Plan`]:
//! - axes selected by `pivot_on` become repeated column groups, every other
//!   axis becomes a row grouping
//! - when one dimension appears on two axes at different depths, the deeper
//!   axis's drill list is masked by the shallower axis's fixed prefix and
//!   de-duplicated, and the patch is recorded for key assembly
//! - the product of drill lengths is checked against the configured maximum
//!   before any data-source call; the guard runs on the computed size, the
//!   cartesian products themselves stay lazy

use crate::error::{Error, Result};
use crate::model::Space;
use crate::query::ast::DiceQuery;
use crate::types::{CoordKey, Coordinate};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

// ============================================================================
// Plan
// ============================================================================

/// Derived, per-request execution plan
#[derive(Debug, Clone)]
pub struct Plan {
    /// Indices of row-grouping axes, in coordinate order
    pub regular_axes: Vec<usize>,

    /// Indices of pivot axes, in `pivot_on` order
    pub pivot_axes: Vec<usize>,

    /// `patched axis -> source axis` for duplicate-dimension collapsing.
    /// At key-assembly time the patched axis's masked prefix is overwritten
    /// with the source axis's concrete value for the current row/column.
    pub mask_patches: BTreeMap<usize, usize>,

    /// Expanded concrete tuples per axis, indexed by coordinate position
    pub drills: Vec<Vec<CoordKey>>,
}

impl Plan {
    /// Lazy cartesian product over the row-grouping axes' drills
    ///
    /// Items are aligned with [`Plan::regular_axes`]. With no regular axes
    /// the product yields a single empty combination.
    pub fn rows(&self) -> CartesianProduct<'_> {
        CartesianProduct::new(
            self.regular_axes
                .iter()
                .map(|&axis| self.drills[axis].as_slice())
                .collect(),
        )
    }

    /// Lazy cartesian product over the pivot axes' drills
    ///
    /// With no pivot axes the product yields a single empty combination,
    /// which assembles into exactly one measure column group per row.
    pub fn pivot_groups(&self) -> CartesianProduct<'_> {
        CartesianProduct::new(
            self.pivot_axes
                .iter()
                .map(|&axis| self.drills[axis].as_slice())
                .collect(),
        )
    }

    /// Total number of axes
    pub fn axis_count(&self) -> usize {
        self.drills.len()
    }
}

// ============================================================================
// Lazy cartesian product
// ============================================================================

/// Restartable odometer-style iterator over the product of drill lists
///
/// Nothing is materialized up front; each step clones only the per-axis
/// references, so oversized products can be rejected by size without ever
/// allocating them.
pub struct CartesianProduct<'a> {
    sources: Vec<&'a [CoordKey]>,
    indices: Vec<usize>,
    done: bool,
}

impl<'a> CartesianProduct<'a> {
    /// Create a product over the given drill lists
    pub fn new(sources: Vec<&'a [CoordKey]>) -> Self {
        let done = sources.iter().any(|s| s.is_empty());
        let indices = vec![0; sources.len()];
        Self {
            sources,
            indices,
            done,
        }
    }

    /// Number of combinations, if it fits in a `usize`
    pub fn size(&self) -> Option<usize> {
        self.sources
            .iter()
            .try_fold(1usize, |acc, s| acc.checked_mul(s.len()))
    }
}

impl<'a> Iterator for CartesianProduct<'a> {
    type Item = Vec<&'a CoordKey>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item: Vec<&'a CoordKey> = self
            .indices
            .iter()
            .zip(&self.sources)
            .map(|(&i, source)| &source[i])
            .collect();

        // advance the odometer, rightmost axis fastest
        self.done = true;
        for position in (0..self.sources.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.sources[position].len() {
                self.done = false;
                break;
            }
            self.indices[position] = 0;
        }
        Some(item)
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Builds execution plans for one space
pub struct Planner<'a> {
    space: &'a Space,
    max_product: usize,
}

impl<'a> Planner<'a> {
    /// Create a planner with the given combinatorial bound
    pub fn new(space: &'a Space, max_product: usize) -> Self {
        Self { space, max_product }
    }

    /// Build the execution plan for a validated query
    pub fn plan(&self, query: &DiceQuery) -> Result<Plan> {
        let coordinates = &query.coordinates;
        let pivot_set: HashSet<usize> = query.pivot_on.iter().copied().collect();

        let regular_axes: Vec<usize> = (0..coordinates.len())
            .filter(|i| !pivot_set.contains(i))
            .collect();
        let pivot_axes = query.pivot_on.clone();

        let mask_patches = Self::find_mask_patches(coordinates);

        let mut drills = Vec::with_capacity(coordinates.len());
        for (axis, coordinate) in coordinates.iter().enumerate() {
            let dimension = self.space.dimension(&coordinate.dimension)?;
            let mut drill = dimension.glob(coordinate)?;
            if let Some(&source) = mask_patches.get(&axis) {
                drill = mask_drill(drill, &coordinates[source]);
            }
            drills.push(drill);
        }

        let product = drills
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len()))
            .filter(|&p| p <= self.max_product)
            .ok_or_else(|| {
                Error::limit(format!(
                    "drill product exceeds maximum of {}",
                    self.max_product
                ))
            })?;

        debug!(
            axes = coordinates.len(),
            regular = regular_axes.len(),
            pivot = pivot_axes.len(),
            patches = mask_patches.len(),
            product,
            "query planned"
        );

        Ok(Plan {
            regular_axes,
            pivot_axes,
            mask_patches,
            drills,
        })
    }

    /// Record `deeper -> shallower` pairs for every dimension that appears
    /// on two axes with different depths
    fn find_mask_patches(coordinates: &[Coordinate]) -> BTreeMap<usize, usize> {
        let mut patches = BTreeMap::new();
        for (i, ci) in coordinates.iter().enumerate() {
            for (j, cj) in coordinates.iter().enumerate() {
                if i == j || ci.dimension != cj.dimension {
                    continue;
                }
                if cj.depth() < ci.depth() {
                    patches.entry(i).or_insert(j);
                }
            }
        }
        patches
    }
}

/// Overwrite the fixed positions of the source coordinate onto each drill
/// entry, then de-duplicate preserving order
pub(crate) fn mask_drill(drill: Vec<CoordKey>, source: &Coordinate) -> Vec<CoordKey> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(drill.len());
    for mut key in drill {
        for (position, slot) in source.values.iter().enumerate() {
            if position >= key.len() {
                break;
            }
            if let Some(value) = slot {
                key[position] = value.clone();
            }
        }
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
