//! Long-form table: one row per region, time, statistic, measure and value.
//!
//! This is the base table shared by every presentation of one data
//! definition. It is built from raw facts in three stages:
//!
//! ```text
//! facts → unwrap measure values → keep selected columns → one row per measure value
//! ```

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cell::Cell;
use crate::error::TabularResult;
use crate::query::{CanonicalQuery, TimeSelector};
use crate::schema::Schema;
use crate::store::Fact;

/// One measure value of one region at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    pub region_id: String,
    pub time: String,
    pub statistic: String,
    pub measure: String,
    pub value: Cell,
    /// Selected dimensions present on the fact, dimension key → value key.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTable {
    pub rows: Vec<LongRow>,
    /// Distinct source cubes, in order of first appearance.
    pub cubes: Vec<String>,
}

impl LongTable {
    /// Reshape materialized facts.
    ///
    /// `schema` must be the query's filtered view: its statistics, measures
    /// and dimensions are exactly the ones projected.
    pub fn from_facts(facts: &[Fact], schema: &Schema, query: &CanonicalQuery) -> Self {
        let mut cubes: Vec<String> = Vec::new();
        for cube in facts.iter().filter_map(|f| f.get("cube").and_then(text)) {
            if !cubes.contains(&cube) {
                cubes.push(cube);
            }
        }

        let time_field = query.time_field();
        let mut rows = Vec::new();
        for statistic in schema.statistics() {
            let statistic_facts: Vec<&Fact> = facts
                .iter()
                .filter(|f| f.get("statistic").and_then(text).as_deref() == Some(statistic.key.as_str()))
                .collect();

            for measure in statistic.measures() {
                let mut measure_rows = Vec::new();
                for fact in &statistic_facts {
                    let value = match fact.get(&measure.key).map(unwrap_value) {
                        Some(value) if !value.is_null() => value,
                        _ => continue,
                    };
                    let dimensions = measure
                        .dimension_keys()
                        .filter_map(|d| {
                            dimension_value(fact, &measure.key, d).map(|v| (d.to_string(), v))
                        })
                        .collect();
                    measure_rows.push(LongRow {
                        region_id: fact.get("region_id").and_then(text).unwrap_or_default(),
                        time: fact.get(time_field).and_then(text).unwrap_or_default(),
                        statistic: statistic.key.clone(),
                        measure: measure.key.clone(),
                        value,
                        dimensions,
                    });
                }
                if query.time == TimeSelector::Last {
                    keep_latest(&mut measure_rows);
                }
                rows.extend(measure_rows);
            }
        }

        tracing::debug!(facts = facts.len(), rows = rows.len(), "built long table");
        Self { rows, cubes }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encode for the base cache entry.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Decode a base cache entry's table.
    pub fn from_blob(blob: &str) -> TabularResult<Self> {
        let bytes = STANDARD.decode(blob)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Drop every row not at the latest time present.
fn keep_latest(rows: &mut Vec<LongRow>) {
    if let Some(latest) = rows.iter().map(|r| r.time.clone()).max() {
        rows.retain(|r| r.time == latest);
    }
}

/// A measure value may be wrapped as `{"value": ..., ...}`.
fn unwrap_value(value: &Value) -> Cell {
    match value {
        Value::Object(map) => map.get("value").map_or(Cell::Null, Cell::from_json),
        other => Cell::from_json(other),
    }
}

/// A dimension value is stored flat under the dimension key, or nested
/// under `path.{measure}.{dimension}`.
fn dimension_value(fact: &Fact, measure: &str, dimension: &str) -> Option<String> {
    fact.get(dimension)
        .and_then(text)
        .or_else(|| {
            fact.get("path")?
                .get(measure)?
                .get(dimension)
                .and_then(text)
        })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
