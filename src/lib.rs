//! Dicebox - Pivot/dice query engine with a two-tier result cache
//!
//! This library answers multidimensional "dice" queries against hierarchical
//! dimensions and numeric measures, producing cross-tabulated (optionally
//! pivoted) tables. Expensive results are cached in a bounded in-process
//! generational cache backed by a persistent content-addressed store.
//!
//! # Architecture
//!
//! ```text
//! DiceQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Fingerprint │  Content hash over the full semantic request
//! └─────────────┘
//!      │ miss
//!      ▼
//! ┌─────────────┐
//! │    Plan     │  Axis split, mask collapsing, combinatorial guard
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Merge    │  Per-space aggregate fetch, zero-filled vector merge
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Assemble   │  Rows, pivot column groups, headers, totals
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Cache    │  Generational memory tier + compressed file store
//! └─────────────┘
//! ```
//!
//! The underlying data store is a collaborator behind the
//! [`model::SpaceBackend`] trait; dimension hierarchies sit behind
//! [`model::Hierarchy`]. An in-memory implementation of both lives in
//! [`model::memory`] for tests and embedders.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod types;

// Re-export main types
pub use cache::{Fingerprint, ResultCache};
pub use config::{CacheConfig, EngineConfig};
pub use error::{Error, Result};
pub use model::{Catalog, Dimension, Measure, Space};
pub use query::{DiceQuery, Engine, Table};
pub use types::{Cell, Coordinate, Filter, FormatType, Value};
