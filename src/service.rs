//! End-to-end query answering.
//!
//! ```text
//! raw query → CanonicalQuery ─┬─ render key hit ─────────────────────────► content
//!                             ├─ data key hit  → base table ─┐
//!                             └─ miss → filter → facts → reshape ─┴─► present → content
//!                                                                     (write both entries)
//! ```
//!
//! Cache writes happen only after the response is fully rendered, so a
//! failing request never leaves an entry behind. The two writes are
//! independent and no lock spans the read-compute-write sequence.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{BaseEntry, CacheEntry, ConcreteEntry, ResultCache};
use crate::error::{TabularError, TabularResult, ValidationError};
use crate::filter::FilterCompiler;
use crate::query::CanonicalQuery;
use crate::schema::{NameList, Schema};
use crate::store::{Fact, FactStore, StoreResult};
use crate::table::{Formats, LongTable, Tabulator};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    /// Rendered content was cached under the render key.
    Hit,
    /// The base table was cached under the data key.
    Base,
    /// Computed from facts.
    Miss,
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOutcome::Hit => write!(f, "hit"),
            CacheOutcome::Base => write!(f, "base"),
            CacheOutcome::Miss => write!(f, "miss"),
        }
    }
}

/// A rendered table.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub content: String,
    pub mimetype: String,
    pub cubes: Vec<String>,
    pub outcome: CacheOutcome,
}

/// Body returned for a rejected query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&ValidationError> for ErrorResponse {
    fn from(err: &ValidationError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Cleaned query, search body and a preview of every output format.
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub data: Value,
    pub query_body: Value,
    pub table: DebugTable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DebugTable {
    Formats(Formats),
    Error(String),
}

/// Answers queries against one schema, name-list, fact store and cache.
///
/// Holds only shared references; one instance can serve any number of
/// requests.
pub struct Service<'a> {
    schema: &'a Schema,
    names: &'a NameList,
    store: &'a dyn FactStore,
    cache: Option<&'a dyn ResultCache>,
}

impl<'a> Service<'a> {
    pub fn new(schema: &'a Schema, names: &'a NameList, store: &'a dyn FactStore) -> Self {
        Self {
            schema,
            names,
            store,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a dyn ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parse and validate a raw query string.
    pub fn parse(&self, raw: &str) -> Result<CanonicalQuery, ValidationError> {
        CanonicalQuery::parse(raw, self.schema, self.names)
    }

    /// Parse, then answer.
    pub fn handle(&self, raw: &str) -> TabularResult<Response> {
        let query = self.parse(raw)?;
        self.respond(&query)
    }

    /// Answer a validated query, reading and writing the cache.
    pub fn respond(&self, query: &CanonicalQuery) -> TabularResult<Response> {
        let render_key = query.render_key()?;
        let data_key = query.data_key()?;

        if let Some(CacheEntry::Concrete(entry)) = self.cache_get(&render_key)? {
            tracing::info!(%render_key, %data_key, outcome = %CacheOutcome::Hit, "served query");
            return Ok(Response {
                content: entry.content,
                mimetype: entry.mimetype,
                cubes: entry.cubes,
                outcome: CacheOutcome::Hit,
            });
        }

        let view = self.schema.get_filtered(&query.data);
        let (table, outcome) = match self.cache_get(&data_key)? {
            Some(CacheEntry::Base(entry)) => (LongTable::from_blob(&entry.data)?, CacheOutcome::Base),
            _ => (self.compute(query, &view)?, CacheOutcome::Miss),
        };

        let content = Tabulator::new(&view, self.names, query).render(&table)?;
        let mimetype = query.format.mimetype().to_string();

        if let Some(cache) = self.cache {
            cache.set(
                &render_key,
                &CacheEntry::Concrete(ConcreteEntry {
                    content: content.clone(),
                    mimetype: mimetype.clone(),
                    cubes: table.cubes.clone(),
                    definition: query.definition()?,
                    urlquery: Some(query.urlquery.clone()),
                }),
            )?;
            if outcome == CacheOutcome::Miss {
                cache.set(
                    &data_key,
                    &CacheEntry::Base(BaseEntry {
                        data: table.to_blob()?,
                        cubes: table.cubes.clone(),
                        definition: serde_json::to_value(query.data_definition())?,
                    }),
                )?;
            }
        }

        tracing::info!(%render_key, %data_key, %outcome, rows = table.len(), "served query");
        Ok(Response {
            content,
            mimetype,
            cubes: table.cubes,
            outcome,
        })
    }

    /// Build the base table straight from the fact store, bypassing the cache.
    pub fn base_table(&self, query: &CanonicalQuery) -> TabularResult<LongTable> {
        let view = self.schema.get_filtered(&query.data);
        self.compute(query, &view)
    }

    /// Everything that went into answering `raw`, without touching the cache.
    ///
    /// Validation failures are returned as errors; store and rendering
    /// failures are reported inside the report.
    pub fn debug(&self, raw: &str) -> TabularResult<DebugReport> {
        let query = self.parse(raw)?;
        let query_body = FilterCompiler::new(self.schema, &query).body();
        let view = self.schema.get_filtered(&query.data);
        let table = self
            .compute(&query, &view)
            .and_then(|table| {
                Tabulator::new(&view, self.names, &query)
                    .render_all(&table)
                    .map_err(TabularError::from)
            })
            .map_or_else(|e| DebugTable::Error(e.to_string()), DebugTable::Formats);
        Ok(DebugReport {
            data: query.definition()?,
            query_body,
            table,
        })
    }

    fn compute(&self, query: &CanonicalQuery, view: &Schema) -> TabularResult<LongTable> {
        let filter = FilterCompiler::new(self.schema, query).compile();
        let facts: Vec<Fact> = self
            .store
            .search(&filter)?
            .collect::<StoreResult<_>>()?;
        tracing::debug!(index = self.store.index(), facts = facts.len(), "fetched facts");
        if facts.is_empty() {
            return Ok(LongTable::default());
        }
        Ok(LongTable::from_facts(&facts, view, query))
    }

    fn cache_get(&self, key: &str) -> TabularResult<Option<CacheEntry>> {
        match self.cache {
            Some(cache) => Ok(cache.get(key)?),
            None => Ok(None),
        }
    }
}

/// The error body for a failed request, if the failure is the caller's.
pub fn error_response(err: &TabularError) -> Option<ErrorResponse> {
    match err {
        TabularError::Validation(e) => Some(ErrorResponse::from(e)),
        _ => None,
    }
}
