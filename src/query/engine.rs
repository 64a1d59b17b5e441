//! Query engine: the request-level orchestrator.
//!
//! One [`Engine`] instance serves all queries against a [`Catalog`]. A
//! dice request flows through:
//!
//! 1. query validation and fingerprinting,
//! 2. cache lookup (memory, then disk),
//! 3. a per-fingerprint single-flight gate so concurrent identical
//!    requests compute the result once,
//! 4. planning, aggregation merge and table assembly on a miss,
//! 5. cache write-back of the encoded table.
//!
//! Permission filters are supplied per call, merged with the query's own
//! filters for execution, and hashed into the fingerprint so callers
//! with different visibility never share cache entries.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{decode_table, encode_table, Fingerprint, ResultCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::Catalog;
use crate::query::ast::DiceQuery;
use crate::query::merge::merge_aggregates;
use crate::query::planner::Planner;
use crate::query::table::{Assembler, Table};
use crate::types::{Filter, Value};

// ============================================================================
// Engine
// ============================================================================

/// Shared, clone-cheap query engine over a catalog of spaces.
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
    cache: Arc<ResultCache>,
    config: EngineConfig,
    inflight: Arc<DashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl Engine {
    /// Build an engine; the config decides the combinatorial limit and
    /// both cache tiers.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Self {
        let cache = Arc::new(ResultCache::new(&config.cache));
        Self {
            catalog: Arc::new(catalog),
            cache,
            config,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// The catalog this engine serves.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Execute a dice query and assemble the result table.
    ///
    /// `permissions` are mandatory row filters injected by the caller's
    /// authorization layer; an empty slice means unrestricted access.
    pub async fn dice(&self, query: &DiceQuery, permissions: &[Filter]) -> Result<Table> {
        query.validate()?;
        let key = Fingerprint::of(query, permissions)?;

        if let Some(table) = self.cached(&key) {
            return Ok(table);
        }

        // single-flight: identical concurrent requests queue on the same
        // gate and all but the first are served from cache
        let gate = self
            .inflight
            .entry(key.clone())
            .or_default()
            .clone();
        let _permit = gate.lock().await;

        if let Some(table) = self.cached(&key) {
            debug!(key = %key, "served by concurrent computation");
            self.inflight.remove(&key);
            return Ok(table);
        }

        let started = Instant::now();
        let result = self.compute(query, permissions).await;
        if let Ok(table) = &result {
            match encode_table(table) {
                Ok(bytes) => self.cache.set(&key, bytes),
                Err(err) => warn!(key = %key, error = %err, "result encoding failed"),
            }
            debug!(
                key = %key,
                rows = table.data.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dice computed"
            );
        }
        self.inflight.remove(&key);
        result
    }

    /// Expand a dimension prefix one level, for interactive navigation.
    pub fn drill(
        &self,
        space: &str,
        dimension: &str,
        prefix: &[Value],
    ) -> Result<Vec<(Value, String)>> {
        self.catalog.get(space)?.dimension(dimension)?.drill(prefix)
    }

    /// Drop cached results; with `clean` the persistent tier is wiped too.
    pub fn reset_cache(&self, clean: bool) {
        self.cache.reset(clean);
    }

    fn cached(&self, key: &Fingerprint) -> Option<Table> {
        let bytes = self.cache.get(key)?;
        match decode_table(&bytes) {
            Ok(table) => {
                debug!(key = %key, "cache hit");
                Some(table)
            }
            Err(err) => {
                // a corrupt entry is treated as a miss and recomputed
                warn!(key = %key, error = %err, "cached result undecodable");
                None
            }
        }
    }

    async fn compute(&self, query: &DiceQuery, permissions: &[Filter]) -> Result<Table> {
        let space = self.catalog.get(query.space_name()?)?;
        let plan = Planner::new(&space, self.config.max_product).plan(query)?;

        let mut filters = query.filters.clone();
        filters.extend_from_slice(permissions);

        let aggregates = merge_aggregates(
            &self.catalog,
            &query.measures,
            &query.coordinates,
            &filters,
            query.limit,
        )
        .await?;

        Assembler::new(&self.catalog, &space, query, &plan).assemble(&aggregates)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("max_product", &self.config.max_product)
            .field("cache_enabled", &self.cache.is_enabled())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
