//! Query pipeline: AST, planning, aggregation merge, table assembly
//! and the engine that ties them to the cache.

pub mod ast;
pub mod engine;
pub mod merge;
pub mod planner;
pub mod table;

pub use ast::{DiceQuery, SortSpec};
pub use engine::Engine;
pub use merge::{merge_aggregates, MergedAggregates};
pub use planner::{CartesianProduct, Plan, Planner};
pub use table::{Assembler, Column, ColumnKind, Table};
