//! Table assembler
//!
//! Expands a [`Plan`] plus merged aggregates into the final cross-tabulated
//! table: row keys from the regular axes, one measure column block per pivot
//! combination (cycling the measure list so blocks stay aligned), formatted
//! cells, nested headers and an optional trailing totals row.

use crate::error::{Error, Result};
use crate::model::{Catalog, Dimension, Formattable, Measure, Space};
use crate::query::ast::DiceQuery;
use crate::query::merge::MergedAggregates;
use crate::query::planner::Plan;
use crate::types::{Cell, CoordKey, Coordinate, Value};
use serde::{Deserialize, Serialize};

// ============================================================================
// Output types
// ============================================================================

/// Header metadata for one emitted column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column label (level name for dimensions, display name for measures)
    pub label: String,

    /// Column kind
    #[serde(rename = "type")]
    pub kind: ColumnKind,

    /// Unqualified measure name; measure columns only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,

    /// Formatted ancestor prefix for dimension columns, pivot column group
    /// for measure columns. Enables merged header cells in exports.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<String>,
}

/// Discriminates dimension and measure columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Row-grouping dimension column
    Dimension,
    /// Aggregated measure column
    Measure,
}

/// The assembled result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Emitted data rows
    pub data: Vec<Vec<Cell>>,

    /// One header entry per emitted column
    pub columns: Vec<Column>,

    /// Trailing totals row; present only when two or more rows were emitted
    pub totals: Option<Vec<Cell>>,
}

// ============================================================================
// Assembler
// ============================================================================

/// Renders a plan plus merged aggregates into a [`Table`]
pub struct Assembler<'a> {
    catalog: &'a Catalog,
    space: &'a Space,
    query: &'a DiceQuery,
    plan: &'a Plan,
}

impl<'a> Assembler<'a> {
    /// Create an assembler for one request
    pub fn new(
        catalog: &'a Catalog,
        space: &'a Space,
        query: &'a DiceQuery,
        plan: &'a Plan,
    ) -> Self {
        Self {
            catalog,
            space,
            query,
            plan,
        }
    }

    /// Assemble the final table
    pub fn assemble(&self, aggregates: &MergedAggregates) -> Result<Table> {
        let coordinates = &self.query.coordinates;
        let fmt = self.query.format;

        let dimensions: Vec<&Dimension> = coordinates
            .iter()
            .map(|c| self.space.dimension(&c.dimension))
            .collect::<Result<_>>()?;

        // measures keep their owning space's display label
        let mut measures: Vec<(Measure, String)> = Vec::with_capacity(self.query.measures.len());
        for qualified in &self.query.measures {
            let (owner, name) = self.catalog.space_for_measure(qualified)?;
            let measure = owner.measure(&name)?.clone();
            let label = format!("{} / {}", owner.label(), measure.label);
            measures.push((measure, label));
        }
        let width = measures.len();

        // dimension columns for the regular axes
        let mut columns: Vec<Column> = Vec::new();
        let mut row_layout: Vec<(usize, Vec<usize>)> = Vec::new();
        for &axis in &self.plan.regular_axes {
            let coordinate = &coordinates[axis];
            let positions = column_positions(coordinate);
            for &position in &positions {
                let prefix: Vec<Value> = coordinate.values[..position]
                    .iter()
                    .filter_map(|v| v.clone())
                    .collect();
                columns.push(Column {
                    label: dimensions[axis].levels()[position].clone(),
                    kind: ColumnKind::Dimension,
                    name: None,
                    parent: Some(dimensions[axis].parent_label(&prefix)),
                });
            }
            row_layout.push((axis, positions));
        }
        let dimension_columns = columns.len();

        // one measure column block per pivot combination, cycling the
        // measure list so each block aligns with it
        let groups: Vec<Vec<&CoordKey>> = self.plan.pivot_groups().collect();
        let group_labels: Vec<Option<String>> = groups
            .iter()
            .map(|group| self.group_label(group, &dimensions))
            .collect();
        for group_label in &group_labels {
            for (measure, label) in &measures {
                columns.push(Column {
                    label: label.clone(),
                    kind: ColumnKind::Measure,
                    name: Some(measure.name.clone()),
                    parent: group_label.clone(),
                });
            }
        }

        if let Some(sort) = &self.query.sort_by {
            if sort.column >= columns.len() {
                return Err(Error::validation(format!(
                    "sort column {} out of range ({} columns)",
                    sort.column,
                    columns.len()
                )));
            }
        }

        // rows
        let zeros = vec![0.0; width];
        let mut emitted: Vec<(Vec<Cell>, Vec<f64>)> = Vec::new();
        for row in self.plan.rows() {
            let mut numbers: Vec<f64> = Vec::with_capacity(groups.len() * width);
            for group in &groups {
                let key = self.assemble_key(&row, group);
                match aggregates.get(&key) {
                    Some(values) => numbers.extend_from_slice(values),
                    None => numbers.extend_from_slice(&zeros),
                }
            }
            if self.query.skip_zero && numbers.iter().all(|v| *v == 0.0) {
                continue;
            }

            let mut cells: Vec<Cell> = Vec::with_capacity(columns.len());
            for (slot, (axis, positions)) in row_layout.iter().enumerate() {
                let key = row[slot];
                for &position in positions {
                    cells.push(dimensions[*axis].format(&key[..=position], position, fmt));
                }
            }
            for (group_index, _) in groups.iter().enumerate() {
                for (measure_index, (measure, _)) in measures.iter().enumerate() {
                    cells.push(measure.format(&numbers[group_index * width + measure_index], 0, fmt));
                }
            }
            emitted.push((cells, numbers));
        }

        if let Some(sort) = &self.query.sort_by {
            emitted.sort_by(|a, b| a.0[sort.column].compare(&b.0[sort.column]));
            if sort.descending {
                emitted.reverse();
            }
        }

        // totals only make sense across two or more rows
        let totals = if emitted.len() > 1 {
            let mut sums = vec![0.0; groups.len() * width];
            for (_, numbers) in &emitted {
                for (index, value) in numbers.iter().enumerate() {
                    sums[index] += value;
                }
            }
            let mut row: Vec<Cell> = vec![Cell::Text(String::new()); dimension_columns];
            for (group_index, _) in groups.iter().enumerate() {
                for (measure_index, (measure, _)) in measures.iter().enumerate() {
                    row.push(measure.format(&sums[group_index * width + measure_index], 0, fmt));
                }
            }
            Some(row)
        } else {
            None
        };

        let data = emitted.into_iter().map(|(cells, _)| cells).collect();
        Ok(Table {
            data,
            columns,
            totals,
        })
    }

    /// Label of one pivot combination, used as the parent of its measure
    /// column block; `None` when the query has no pivot axes
    fn group_label(&self, group: &[&CoordKey], dimensions: &[&Dimension]) -> Option<String> {
        if group.is_empty() {
            return None;
        }
        Some(
            group
                .iter()
                .zip(&self.plan.pivot_axes)
                .map(|(key, &axis)| {
                    let coordinate = &self.query.coordinates[axis];
                    let offset = revealed_offset(coordinate);
                    dimensions[axis].render(key, offset)
                })
                .collect::<Vec<_>>()
                .join(" / "),
        )
    }

    /// Build the aggregate lookup key for one row/group combination,
    /// applying mask patches: a patched axis's masked prefix is overwritten
    /// with the source axis's concrete value for this combination
    fn assemble_key(&self, row: &[&CoordKey], group: &[&CoordKey]) -> Vec<CoordKey> {
        let mut key: Vec<CoordKey> = vec![CoordKey::new(); self.plan.axis_count()];
        for (slot, &axis) in self.plan.regular_axes.iter().enumerate() {
            key[axis] = row[slot].clone();
        }
        for (slot, &axis) in self.plan.pivot_axes.iter().enumerate() {
            key[axis] = group[slot].clone();
        }
        for (&patched, &source) in &self.plan.mask_patches {
            let overlap = key[source].len().min(key[patched].len());
            let prefix: Vec<Value> = key[source][..overlap].to_vec();
            for (position, value) in prefix.into_iter().enumerate() {
                key[patched][position] = value;
            }
        }
        key
    }
}

/// Column slots contributed by one axis: every wildcard position for a free
/// coordinate, the deepest level for a frozen one
fn column_positions(coordinate: &Coordinate) -> Vec<usize> {
    if coordinate.is_frozen() {
        vec![coordinate.depth() - 1]
    } else {
        coordinate.free_positions()
    }
}

/// First position revealed by a coordinate's drill (levels before it are
/// already spelled out by the fixed prefix)
fn revealed_offset(coordinate: &Coordinate) -> usize {
    if coordinate.is_frozen() {
        coordinate.depth().saturating_sub(1)
    } else {
        coordinate.fixed_prefix_len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::memory::{MemoryBackend, MemoryHierarchy};
    use crate::query::planner::Planner;
    use crate::types::FormatType;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        let mut date = MemoryHierarchy::new();
        date.insert(&[Value::int(2024), Value::text("01")]);
        date.insert(&[Value::int(2024), Value::text("02")]);
        let mut dept = MemoryHierarchy::new();
        dept.insert(&[Value::text("food")]);
        dept.insert(&[Value::text("toys")]);

        let mut catalog = Catalog::new();
        catalog.register(Space::new(
            "sales",
            "sales",
            vec![
                Dimension::new(
                    "date",
                    "date",
                    vec!["year".into(), "month".into()],
                    Arc::new(date),
                ),
                Dimension::new("dept", "dept", vec!["name".into()], Arc::new(dept)),
            ],
            vec![Measure::new("amount", "amount")],
            Arc::new(MemoryBackend::new()),
        ));
        catalog
    }

    fn month_coord() -> Coordinate {
        Coordinate::new("date", vec![Some(Value::int(2024)), None])
    }

    fn month_key(month: &str) -> CoordKey {
        vec![Value::int(2024), Value::text(month)]
    }

    fn assemble(query: &DiceQuery, aggregates: MergedAggregates) -> Result<Table> {
        let catalog = catalog();
        let space = catalog.get("sales").unwrap();
        let planner = Planner::new(&space, 1_000_000);
        let plan = planner.plan(query)?;
        Assembler::new(&catalog, &space, query, &plan).assemble(&aggregates)
    }

    #[test]
    fn test_rows_headers_and_totals() {
        let query = DiceQuery::new(vec!["sales.amount".into()], vec![month_coord()]);
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(vec![month_key("01")], vec![10.0]);
        aggregates.insert(vec![month_key("02")], vec![20.0]);

        let table = assemble(&query, aggregates).unwrap();
        assert_eq!(table.columns.len(), 2);
        assert_eq!(
            table.columns[0],
            Column {
                label: "month".into(),
                kind: ColumnKind::Dimension,
                name: None,
                parent: Some("date: 2024".into()),
            }
        );
        assert_eq!(table.columns[1].kind, ColumnKind::Measure);
        assert_eq!(table.columns[1].name.as_deref(), Some("amount"));
        assert_eq!(table.columns[1].parent, None);

        assert_eq!(
            table.data,
            vec![
                vec![Cell::Text("01".into()), Cell::Number(10.0)],
                vec![Cell::Text("02".into()), Cell::Number(20.0)],
            ]
        );
        assert_eq!(
            table.totals,
            Some(vec![Cell::Text(String::new()), Cell::Number(30.0)])
        );
    }

    #[test]
    fn test_totals_omitted_for_single_row() {
        let query = DiceQuery::new(
            vec!["sales.amount".into()],
            vec![Coordinate::frozen("date", vec![Value::int(2024)])],
        );
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(vec![vec![Value::int(2024)]], vec![30.0]);

        let table = assemble(&query, aggregates).unwrap();
        assert_eq!(table.data.len(), 1);
        assert!(table.totals.is_none());
        // frozen axis contributes exactly one column, labelled by its
        // deepest level
        assert_eq!(table.columns[0].label, "year");
        assert_eq!(table.data[0][0], Cell::Text("2024".into()));
    }

    #[test]
    fn test_skip_zero_drops_all_zero_rows() {
        let query =
            DiceQuery::new(vec!["sales.amount".into()], vec![month_coord()]).with_skip_zero();
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(vec![month_key("01")], vec![10.0]);
        // february absent -> zero-filled -> dropped

        let table = assemble(&query, aggregates).unwrap();
        assert_eq!(table.data.len(), 1);
        assert_eq!(table.data[0][0], Cell::Text("01".into()));
        assert!(table.totals.is_none());
    }

    #[test]
    fn test_unfiltered_row_count_is_full_product() {
        let query = DiceQuery::new(
            vec!["sales.amount".into()],
            vec![Coordinate::new("dept", vec![None]), month_coord()],
        );
        let table = assemble(&query, HashMap::new()).unwrap();
        assert_eq!(table.data.len(), 4); // 2 depts x 2 months, all zero-filled
    }

    #[test]
    fn test_pivot_column_groups_cycle_measures() {
        let query = DiceQuery::new(
            vec!["sales.amount".into()],
            vec![Coordinate::new("dept", vec![None]), month_coord()],
        )
        .with_pivot(vec![1]);

        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(
            vec![vec![Value::text("toys")], month_key("01")],
            vec![7.0],
        );

        let table = assemble(&query, aggregates).unwrap();
        // dept column + one measure column per month group
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[1].parent.as_deref(), Some("01"));
        assert_eq!(table.columns[2].parent.as_deref(), Some("02"));
        assert_eq!(table.columns[1].name.as_deref(), Some("amount"));

        // one row per dept; toys has january data in the first group
        assert_eq!(table.data.len(), 2);
        assert_eq!(
            table.data[1],
            vec![
                Cell::Text("toys".into()),
                Cell::Number(7.0),
                Cell::Number(0.0),
            ]
        );
        assert_eq!(
            table.totals,
            Some(vec![
                Cell::Text(String::new()),
                Cell::Number(7.0),
                Cell::Number(0.0),
            ])
        );
    }

    #[test]
    fn test_sort_by_measure_column_descending() {
        let query = DiceQuery::new(vec!["sales.amount".into()], vec![month_coord()])
            .with_sort(1, true);
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(vec![month_key("01")], vec![10.0]);
        aggregates.insert(vec![month_key("02")], vec![20.0]);

        let table = assemble(&query, aggregates).unwrap();
        assert_eq!(table.data[0][1], Cell::Number(20.0));
        assert_eq!(table.data[1][1], Cell::Number(10.0));
    }

    #[test]
    fn test_sort_column_out_of_range() {
        let query = DiceQuery::new(vec!["sales.amount".into()], vec![month_coord()])
            .with_sort(9, false);
        assert!(matches!(
            assemble(&query, HashMap::new()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_txt_format_renders_grouped_measures() {
        let query = DiceQuery::new(vec!["sales.amount".into()], vec![month_coord()])
            .with_format(FormatType::Txt);
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(vec![month_key("01")], vec![1234.5]);
        aggregates.insert(vec![month_key("02")], vec![1.0]);

        let table = assemble(&query, aggregates).unwrap();
        assert_eq!(table.data[0][1], Cell::Text("1 234.50".into()));
    }

    #[test]
    fn test_masked_axis_reads_source_value() {
        // axis 0 fixes year 2023 at depth 1; axis 1 drills months of 2024.
        // the patched lookup key must carry 2023 from axis 0.
        let query = DiceQuery::new(
            vec!["sales.amount".into()],
            vec![
                Coordinate::frozen("date", vec![Value::int(2023)]),
                month_coord(),
            ],
        );
        let mut aggregates: MergedAggregates = HashMap::new();
        aggregates.insert(
            vec![
                vec![Value::int(2023)],
                vec![Value::int(2023), Value::text("01")],
            ],
            vec![4.0],
        );

        let table = assemble(&query, aggregates).unwrap();
        let found: Vec<&Vec<Cell>> = table
            .data
            .iter()
            .filter(|row| row.contains(&Cell::Number(4.0)))
            .collect();
        assert_eq!(found.len(), 1);
    }
}
