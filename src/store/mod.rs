//! Fact store access.
//!
//! A store answers a compiled filter with a finite, single-pass, lazily
//! produced stream of facts. The stream is not restartable; the tabulation
//! engine materializes it exactly once.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::filter::Filter;

/// One flat fact record as returned by the store.
pub type Fact = Map<String, Value>;

/// Errors raised while reading facts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read facts from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fact at {path}:{line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Fact at {path}:{line} is not an object")]
    NotAnObject { path: PathBuf, line: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazily produced facts matching a filter.
pub type FactStream<'a> = Box<dyn Iterator<Item = StoreResult<Fact>> + 'a>;

/// Source of facts.
pub trait FactStore: Send + Sync {
    /// Name of the index being searched, for logging.
    fn index(&self) -> &str;

    /// Stream every fact matching `filter`.
    fn search<'a>(&'a self, filter: &'a Filter) -> StoreResult<FactStream<'a>>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Facts held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactStore {
    index: String,
    facts: Vec<Fact>,
}

impl MemoryFactStore {
    pub fn new(index: impl Into<String>, facts: Vec<Fact>) -> Self {
        Self {
            index: index.into(),
            facts,
        }
    }

    /// Build from JSON values; non-object values are skipped.
    pub fn from_values(index: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        let facts = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self::new(index, facts)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl FactStore for MemoryFactStore {
    fn index(&self) -> &str {
        &self.index
    }

    fn search<'a>(&'a self, filter: &'a Filter) -> StoreResult<FactStream<'a>> {
        Ok(Box::new(
            self.facts
                .iter()
                .filter(move |fact| filter.matches(fact))
                .cloned()
                .map(Ok),
        ))
    }
}

// ============================================================================
// NDJSON file store
// ============================================================================

/// Facts read from a newline-delimited JSON file, one object per line.
///
/// The file is reopened on every search and read line by line; blank lines
/// are skipped.
#[derive(Debug, Clone)]
pub struct NdjsonFactStore {
    index: String,
    path: PathBuf,
}

impl NdjsonFactStore {
    pub fn new(index: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            index: index.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(&self, line_no: usize, line: &str) -> StoreResult<Fact> {
        let value: Value = serde_json::from_str(line).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            line: line_no,
            source,
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject {
                path: self.path.clone(),
                line: line_no,
            }),
        }
    }
}

impl FactStore for NdjsonFactStore {
    fn index(&self) -> &str {
        &self.index
    }

    fn search<'a>(&'a self, filter: &'a Filter) -> StoreResult<FactStream<'a>> {
        let file = File::open(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        let facts = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(i, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(source) => {
                        return Some(Err(StoreError::Io {
                            path: self.path.clone(),
                            source,
                        }))
                    }
                };
                if line.trim().is_empty() {
                    return None;
                }
                match self.parse_line(i + 1, &line) {
                    Ok(fact) if filter.matches(&fact) => Some(Ok(fact)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(Box::new(facts))
    }
}
