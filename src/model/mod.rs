//! Space, dimension and measure model
//!
//! A [`Space`] is an immutable, named container of [`Dimension`]s and
//! [`Measure`]s bound to a data-source backend. Members are resolved through
//! explicit name maps with typed not-found errors; there is no dynamic
//! attribute dispatch. The [`Catalog`] is the registry of spaces and is
//! passed to the query engine by handle rather than living in a global.

use crate::error::{Error, Result};
use crate::types::{Cell, CoordKey, Coordinate, Filter, FormatType, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod memory;

// ============================================================================
// Collaborator seams
// ============================================================================

/// Dimension hierarchy lookup collaborator
///
/// Implementations enumerate the concrete children of a coordinate pattern.
/// The contract callers rely on:
/// - returned tuples have the same length as `pattern` and contain no holes
/// - every tuple matches the concrete slots of `pattern`
/// - output is sorted lexically so column order is repeatable
pub trait Hierarchy: Send + Sync {
    /// Enumerate existing concrete tuples consistent with `pattern`
    fn glob(&self, pattern: &[Option<Value>]) -> Vec<CoordKey>;
}

/// Aggregated data-source collaborator for one space
///
/// `dice` must return one line per coordinate key (one [`CoordKey`] per
/// requested axis, in axis order) that has any data, with the measure values
/// aligned to `measures`. Keys absent from the result are treated as
/// all-zero by the merger.
#[async_trait]
pub trait SpaceBackend: Send + Sync {
    /// Fetch aggregated measure vectors for the requested coordinate axes
    async fn dice(
        &self,
        coordinates: &[Coordinate],
        measures: &[String],
        filters: &[Filter],
    ) -> Result<Vec<(Vec<CoordKey>, Vec<f64>)>>;
}

/// Shared formatting capability implemented by dimensions and measures
pub trait Formattable {
    /// The raw value rendered by this member
    type Value: ?Sized;

    /// Render `value` for output. `offset` is the number of leading
    /// positions already consumed by parent headers; measures ignore it.
    fn format(&self, value: &Self::Value, offset: usize, fmt: FormatType) -> Cell;
}

// ============================================================================
// Dimension
// ============================================================================

/// A named hierarchy of ordered levels (level 0 = root)
#[derive(Clone)]
pub struct Dimension {
    name: String,
    label: String,
    levels: Vec<String>,
    hierarchy: Arc<dyn Hierarchy>,
}

impl Dimension {
    /// Create a dimension over a hierarchy collaborator
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        levels: Vec<String>,
        hierarchy: Arc<dyn Hierarchy>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            levels,
            hierarchy,
        }
    }

    /// Dimension name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ordered level names
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Number of hierarchy levels
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Expand a coordinate into the existing concrete tuples below it
    ///
    /// A frozen coordinate expands to exactly itself (single fixed column);
    /// a free coordinate delegates to the hierarchy collaborator.
    pub fn glob(&self, coordinate: &Coordinate) -> Result<Vec<CoordKey>> {
        if coordinate.depth() == 0 || coordinate.depth() > self.depth() {
            return Err(Error::validation(format!(
                "coordinate depth {} out of range for dimension '{}' (depth {})",
                coordinate.depth(),
                self.name,
                self.depth()
            )));
        }
        if let Some(key) = coordinate.as_key() {
            return Ok(vec![key]);
        }
        Ok(self.hierarchy.glob(&coordinate.values))
    }

    /// Expand a concrete prefix one level deeper, returning each child's
    /// value together with its rendered label
    pub fn drill(&self, prefix: &[Value]) -> Result<Vec<(Value, String)>> {
        if prefix.len() >= self.depth() {
            return Err(Error::validation(format!(
                "dimension '{}' has no levels below depth {}",
                self.name,
                self.depth()
            )));
        }
        let mut pattern: Vec<Option<Value>> = prefix.iter().cloned().map(Some).collect();
        pattern.push(None);

        let offset = prefix.len();
        Ok(self
            .hierarchy
            .glob(&pattern)
            .into_iter()
            .filter_map(|mut key| {
                let label = self.render(&key, offset);
                key.pop().map(|value| (value, label))
            })
            .collect())
    }

    /// Render the tail of a concrete key starting at `offset`
    pub fn render(&self, key: &[Value], offset: usize) -> String {
        let offset = offset.min(key.len());
        key[offset..]
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Header parent label for the given concrete ancestor prefix
    ///
    /// An empty prefix yields just the dimension label; otherwise the label
    /// followed by the formatted prefix, e.g. `date: 2024`.
    pub fn parent_label(&self, prefix: &[Value]) -> String {
        if prefix.is_empty() {
            self.label.clone()
        } else {
            format!("{}: {}", self.label, self.render(prefix, 0))
        }
    }
}

impl Formattable for Dimension {
    type Value = [Value];

    fn format(&self, value: &[Value], offset: usize, _fmt: FormatType) -> Cell {
        Cell::Text(self.render(value, offset))
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("levels", &self.levels)
            .finish()
    }
}

// ============================================================================
// Measure
// ============================================================================

/// A named numeric aggregate within a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Measure name, unqualified
    pub name: String,
    /// Display label
    pub label: String,
}

impl Measure {
    /// Create a measure
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }
}

impl Formattable for Measure {
    type Value = f64;

    fn format(&self, value: &f64, _offset: usize, fmt: FormatType) -> Cell {
        match fmt {
            FormatType::Json | FormatType::Raw => Cell::Number(*value),
            FormatType::Txt => Cell::Text(group_digits(*value)),
        }
    }
}

/// Render a number with thousands grouping and two decimals, e.g. `1 234.50`
fn group_digits(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = format!("{:.2}", value.abs());
    let (int_part, dec_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, dec_part)
}

// ============================================================================
// Space
// ============================================================================

/// Immutable named container of dimensions and measures bound to a backend
pub struct Space {
    name: String,
    label: String,
    dimensions: Vec<Dimension>,
    dimension_index: HashMap<String, usize>,
    measures: Vec<Measure>,
    measure_index: HashMap<String, usize>,
    backend: Arc<dyn SpaceBackend>,
}

impl Space {
    /// Create a space; member order is preserved for display purposes
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        dimensions: Vec<Dimension>,
        measures: Vec<Measure>,
        backend: Arc<dyn SpaceBackend>,
    ) -> Self {
        let dimension_index = dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name().to_string(), i))
            .collect();
        let measure_index = measures
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Self {
            name: name.into(),
            label: label.into(),
            dimensions,
            dimension_index,
            measures,
            measure_index,
            backend,
        }
    }

    /// Space name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// All dimensions, in registration order
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// All measures, in registration order
    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Look up a dimension by name
    pub fn dimension(&self, name: &str) -> Result<&Dimension> {
        self.dimension_index
            .get(name)
            .map(|&i| &self.dimensions[i])
            .ok_or_else(|| {
                Error::not_found(format!("space '{}' has no dimension '{}'", self.name, name))
            })
    }

    /// Look up a measure by unqualified name
    pub fn measure(&self, name: &str) -> Result<&Measure> {
        self.measure_index
            .get(name)
            .map(|&i| &self.measures[i])
            .ok_or_else(|| {
                Error::not_found(format!("space '{}' has no measure '{}'", self.name, name))
            })
    }

    /// Fetch aggregated measure vectors from the backend collaborator
    pub async fn dice(
        &self,
        coordinates: &[Coordinate],
        measures: &[String],
        filters: &[Filter],
    ) -> Result<Vec<(Vec<CoordKey>, Vec<f64>)>> {
        self.backend.dice(coordinates, measures, filters).await
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("measures", &self.measures)
            .finish()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Registry of spaces, constructed at startup and passed by handle
#[derive(Debug, Default)]
pub struct Catalog {
    spaces: HashMap<String, Arc<Space>>,
}

/// Per-space metadata snapshot for UI discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceSummary {
    /// Space name
    pub name: String,
    /// Display label
    pub label: String,
    /// Dimension name, label and depth triples
    pub dimensions: Vec<DimensionSummary>,
    /// Measure names and labels
    pub measures: Vec<Measure>,
}

/// Dimension metadata within a [`SpaceSummary`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSummary {
    /// Dimension name
    pub name: String,
    /// Display label
    pub label: String,
    /// Number of hierarchy levels
    pub depth: usize,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a space; replaces any previous space of the same name
    pub fn register(&mut self, space: Space) {
        self.spaces.insert(space.name().to_string(), Arc::new(space));
    }

    /// Look up a space by name
    pub fn get(&self, name: &str) -> Result<Arc<Space>> {
        self.spaces
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("space '{}' not found", name)))
    }

    /// Resolve a qualified `space.measure` name into its owning space and
    /// the unqualified measure name
    pub fn space_for_measure(&self, qualified: &str) -> Result<(Arc<Space>, String)> {
        let (space_name, measure_name) = split_qualified(qualified)?;
        let space = self.get(space_name)?;
        space.measure(measure_name)?;
        Ok((space, measure_name.to_string()))
    }

    /// Metadata snapshot of every registered space, sorted by name
    pub fn describe(&self) -> Vec<SpaceSummary> {
        let mut summaries: Vec<SpaceSummary> = self
            .spaces
            .values()
            .map(|space| SpaceSummary {
                name: space.name().to_string(),
                label: space.label().to_string(),
                dimensions: space
                    .dimensions()
                    .iter()
                    .map(|d| DimensionSummary {
                        name: d.name().to_string(),
                        label: d.label().to_string(),
                        depth: d.depth(),
                    })
                    .collect(),
                measures: space.measures().to_vec(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

/// Split a qualified `space.measure` name
pub fn split_qualified(name: &str) -> Result<(&str, &str)> {
    name.split_once('.')
        .filter(|(space, measure)| !space.is_empty() && !measure.is_empty())
        .ok_or_else(|| {
            Error::validation(format!(
                "measure '{}' is not qualified as '<space>.<measure>'",
                name
            ))
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::memory::{MemoryBackend, MemoryHierarchy};
    use super::*;

    fn date_dimension() -> Dimension {
        let mut tree = MemoryHierarchy::new();
        tree.insert(&[Value::int(2023), Value::text("12")]);
        tree.insert(&[Value::int(2024), Value::text("01")]);
        tree.insert(&[Value::int(2024), Value::text("02")]);
        Dimension::new(
            "date",
            "date",
            vec!["year".into(), "month".into()],
            Arc::new(tree),
        )
    }

    #[test]
    fn test_glob_frozen_returns_itself() {
        let dim = date_dimension();
        let key = vec![Value::int(2031), Value::text("07")];
        let coord = Coordinate::frozen("date", key.clone());
        // frozen coordinates are taken at face value, no existence check
        assert_eq!(dim.glob(&coord).unwrap(), vec![key]);
    }

    #[test]
    fn test_glob_free_expands_children_sorted() {
        let dim = date_dimension();
        let coord = Coordinate::new("date", vec![Some(Value::int(2024)), None]);
        let keys = dim.glob(&coord).unwrap();
        assert_eq!(
            keys,
            vec![
                vec![Value::int(2024), Value::text("01")],
                vec![Value::int(2024), Value::text("02")],
            ]
        );
    }

    #[test]
    fn test_glob_rejects_bad_depth() {
        let dim = date_dimension();
        let too_deep = Coordinate::new(
            "date",
            vec![Some(Value::int(2024)), None, None],
        );
        assert!(matches!(dim.glob(&too_deep), Err(Error::Validation(_))));
        let empty = Coordinate::new("date", vec![]);
        assert!(matches!(dim.glob(&empty), Err(Error::Validation(_))));
    }

    #[test]
    fn test_drill_lists_children_with_labels() {
        let dim = date_dimension();
        let children = dim.drill(&[]).unwrap();
        assert_eq!(
            children,
            vec![
                (Value::int(2023), "2023".to_string()),
                (Value::int(2024), "2024".to_string()),
            ]
        );

        let months = dim.drill(&[Value::int(2024)]).unwrap();
        assert_eq!(months[0], (Value::text("01"), "01".to_string()));

        assert!(dim.drill(&[Value::int(2024), Value::text("01")]).is_err());
    }

    #[test]
    fn test_parent_label() {
        let dim = date_dimension();
        assert_eq!(dim.parent_label(&[]), "date");
        assert_eq!(dim.parent_label(&[Value::int(2024)]), "date: 2024");
    }

    #[test]
    fn test_measure_format() {
        let measure = Measure::new("amount", "amount");
        assert_eq!(
            measure.format(&1234567.5, 0, FormatType::Txt),
            Cell::Text("1 234 567.50".into())
        );
        assert_eq!(
            measure.format(&-1234.0, 0, FormatType::Txt),
            Cell::Text("-1 234.00".into())
        );
        assert_eq!(measure.format(&2.5, 0, FormatType::Json), Cell::Number(2.5));
        assert_eq!(measure.format(&2.5, 0, FormatType::Raw), Cell::Number(2.5));
    }

    #[test]
    fn test_space_member_lookup() {
        let backend = Arc::new(MemoryBackend::new());
        let space = Space::new(
            "sales",
            "sales",
            vec![date_dimension()],
            vec![Measure::new("amount", "amount")],
            backend,
        );
        assert!(space.dimension("date").is_ok());
        assert!(matches!(space.dimension("dept"), Err(Error::NotFound(_))));
        assert!(space.measure("amount").is_ok());
        assert!(matches!(space.measure("count"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_catalog_resolution() {
        let mut catalog = Catalog::new();
        catalog.register(Space::new(
            "sales",
            "sales",
            vec![date_dimension()],
            vec![Measure::new("amount", "amount")],
            Arc::new(MemoryBackend::new()),
        ));

        assert!(catalog.get("sales").is_ok());
        assert!(matches!(catalog.get("stock"), Err(Error::NotFound(_))));

        let (space, name) = catalog.space_for_measure("sales.amount").unwrap();
        assert_eq!(space.name(), "sales");
        assert_eq!(name, "amount");

        assert!(matches!(
            catalog.space_for_measure("amount"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            catalog.space_for_measure("sales.missing"),
            Err(Error::NotFound(_))
        ));

        let summary = catalog.describe();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].dimensions[0].depth, 2);
    }
}
