//! Aggregation merger
//!
//! Measures in one query may span several spaces. The merger groups
//! qualified measures by owning space, fetches each space's aggregates once
//! with the full coordinate list and the combined filter set, and merges the
//! per-space partial vectors into a single mapping from coordinate key to
//! the full measure vector, zero-filled where a space had no data for a key.

use crate::error::{Error, Result};
use crate::model::{split_qualified, Catalog};
use crate::types::{CoordKey, Coordinate, Filter};
use std::collections::HashMap;
use tracing::debug;

/// Merged aggregates: one full-width measure vector per coordinate key
pub type MergedAggregates = HashMap<Vec<CoordKey>, Vec<f64>>;

/// Fetch and merge aggregates for a set of qualified measures
///
/// `filters` must already be the union of caller filters and injected
/// permission filters; they apply identically regardless of origin. If
/// `limit` is set the merge aborts with a size-limit error as soon as the
/// number of distinct keys exceeds it.
pub async fn merge_aggregates(
    catalog: &Catalog,
    measures: &[String],
    coordinates: &[Coordinate],
    filters: &[Filter],
    limit: Option<usize>,
) -> Result<MergedAggregates> {
    // group measures by owning space, remembering each measure's position
    // in the full output vector
    let mut groups: Vec<(String, Vec<(usize, String)>)> = Vec::new();
    for (position, qualified) in measures.iter().enumerate() {
        let (space_name, measure_name) = split_qualified(qualified)?;
        match groups.iter_mut().find(|(name, _)| name == space_name) {
            Some((_, members)) => members.push((position, measure_name.to_string())),
            None => groups.push((
                space_name.to_string(),
                vec![(position, measure_name.to_string())],
            )),
        }
    }

    let width = measures.len();
    let mut merged: MergedAggregates = HashMap::new();
    for (space_name, members) in &groups {
        let space = catalog.get(space_name)?;
        let names: Vec<String> = members
            .iter()
            .map(|(_, name)| {
                space.measure(name)?;
                Ok(name.clone())
            })
            .collect::<Result<_>>()?;

        let lines = space.dice(coordinates, &names, filters).await?;
        for (key, values) in lines {
            let entry = merged.entry(key).or_insert_with(|| vec![0.0; width]);
            for (slot, (position, _)) in members.iter().enumerate() {
                if let Some(value) = values.get(slot) {
                    entry[*position] = *value;
                }
            }
            if let Some(limit) = limit {
                if merged.len() > limit {
                    return Err(Error::limit(format!(
                        "aggregation produced more than {} distinct keys",
                        limit
                    )));
                }
            }
        }
    }

    debug!(
        spaces = groups.len(),
        measures = width,
        keys = merged.len(),
        "aggregates merged"
    );
    Ok(merged)
}
