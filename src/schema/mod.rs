//! Schema Index: the Statistic → Measure → Dimension → Value hierarchy.
//!
//! The hierarchy is loaded once from the external schema definition and is
//! read-only afterwards. Every level is an explicit typed node owning its
//! children in a key-ordered map, so lookups never depend on the shape of
//! the source JSON beyond the fields declared here.
//!
//! ```text
//! Schema
//!  └── Statistic (12411)
//!       └── Measure (BEVSTD, region_levels = [0, 1, 2, 3])
//!            └── Dimension (GES)
//!                 └── Value (GESM, GESW)
//! ```
//!
//! A pruned copy restricted to one query's data selection is produced by
//! [`Schema::get_filtered`]; downstream stages iterate that copy so they only
//! ever see the statistics, measures and dimensions the query selected.

mod names;
mod validate;

pub use names::NameList;

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::query::DataSelection;

/// Root of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub key: String,
    pub name: String,
    statistics: BTreeMap<String, Statistic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    measures: BTreeMap<String, Measure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub key: String,
    pub name: String,
    /// Region levels this measure is published for. `None` means unrestricted.
    pub region_levels: Option<BTreeSet<u8>>,
    dimensions: BTreeMap<String, Dimension>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub key: String,
    pub name: String,
    values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub key: String,
    pub name: String,
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Deserialize)]
struct RawStatistic {
    key: Option<String>,
    name: Option<String>,
    #[serde(default, alias = "title_de")]
    description: Option<String>,
    #[serde(default)]
    measures: BTreeMap<String, RawMeasure>,
}

#[derive(Deserialize)]
struct RawMeasure {
    key: Option<String>,
    name: Option<String>,
    #[serde(default)]
    region_levels: Option<Vec<u8>>,
    #[serde(default)]
    dimensions: BTreeMap<String, RawDimension>,
}

#[derive(Deserialize)]
struct RawDimension {
    key: Option<String>,
    name: Option<String>,
    #[serde(default)]
    values: Vec<RawValue>,
}

#[derive(Deserialize)]
struct RawValue {
    key: String,
    name: Option<String>,
}

fn key_and_name(map_key: &str, key: Option<String>, name: Option<String>) -> (String, String) {
    let key = key.unwrap_or_else(|| map_key.to_string());
    let name = name.unwrap_or_else(|| key.clone());
    (key, name)
}

impl Schema {
    /// Parse the schema definition JSON.
    ///
    /// The top level maps statistic keys to statistic objects; `key` fields
    /// default to the map key and `name` fields default to the key.
    pub fn from_json(storage_name: &str, json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, RawStatistic> = serde_json::from_str(json)?;
        Ok(Self::from_raw(storage_name, raw))
    }

    /// Build from an already parsed JSON value.
    pub fn from_value(
        storage_name: &str,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, RawStatistic> = serde_json::from_value(value)?;
        Ok(Self::from_raw(storage_name, raw))
    }

    fn from_raw(storage_name: &str, raw: BTreeMap<String, RawStatistic>) -> Self {
        let statistics = raw
            .into_iter()
            .map(|(map_key, s)| {
                let (key, name) = key_and_name(&map_key, s.key, s.name);
                let measures = s
                    .measures
                    .into_iter()
                    .map(|(map_key, m)| {
                        let (key, name) = key_and_name(&map_key, m.key, m.name);
                        let dimensions = m
                            .dimensions
                            .into_iter()
                            .map(|(map_key, d)| {
                                let (key, name) = key_and_name(&map_key, d.key, d.name);
                                let values = d
                                    .values
                                    .into_iter()
                                    .map(|v| Value {
                                        name: v.name.unwrap_or_else(|| v.key.clone()),
                                        key: v.key,
                                    })
                                    .collect();
                                (key.clone(), Dimension { key, name, values })
                            })
                            .collect();
                        let region_levels = m.region_levels.map(|l| l.into_iter().collect());
                        (
                            key.clone(),
                            Measure {
                                key,
                                name,
                                region_levels,
                                dimensions,
                            },
                        )
                    })
                    .collect();
                (
                    key.clone(),
                    Statistic {
                        key,
                        name,
                        description: s.description,
                        measures,
                    },
                )
            })
            .collect();

        Self {
            key: storage_name.to_string(),
            name: storage_name.to_string(),
            statistics,
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn statistics(&self) -> impl Iterator<Item = &Statistic> {
        self.statistics.values()
    }

    pub fn statistic(&self, key: &str) -> Option<&Statistic> {
        self.statistics.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.statistics.contains_key(key)
    }

    /// Look up a measure by its statistic and measure keys.
    pub fn measure(&self, statistic: &str, measure: &str) -> Option<&Measure> {
        self.statistic(statistic)?.measure(measure)
    }

    /// Return a copy pruned to the statistics, measures and dimensions named
    /// in `selection`. Dimension values are kept whole so labels for any
    /// value remain resolvable.
    pub fn get_filtered(&self, selection: &DataSelection) -> Schema {
        let statistics = self
            .statistics
            .iter()
            .filter_map(|(skey, statistic)| {
                let selected_measures = selection.statistic(skey)?;
                let measures = statistic
                    .measures
                    .iter()
                    .filter_map(|(mkey, measure)| {
                        let selected_dims = selected_measures.get(mkey)?;
                        let dimensions = measure
                            .dimensions
                            .iter()
                            .filter(|(dkey, _)| selected_dims.contains_key(*dkey))
                            .map(|(dkey, d)| (dkey.clone(), d.clone()))
                            .collect();
                        Some((
                            mkey.clone(),
                            Measure {
                                dimensions,
                                ..measure.clone()
                            },
                        ))
                    })
                    .collect();
                Some((
                    skey.clone(),
                    Statistic {
                        measures,
                        ..statistic.clone()
                    },
                ))
            })
            .collect();

        Schema {
            key: self.key.clone(),
            name: self.name.clone(),
            statistics,
        }
    }
}

impl Statistic {
    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.values()
    }

    pub fn measure(&self, key: &str) -> Option<&Measure> {
        self.measures.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.measures.contains_key(key)
    }
}

impl Measure {
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn dimension(&self, key: &str) -> Option<&Dimension> {
        self.dimensions.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.dimensions.contains_key(key)
    }

    pub fn dimension_keys(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    pub fn allows_level(&self, level: u8) -> bool {
        self.region_levels
            .as_ref()
            .map_or(true, |levels| levels.contains(&level))
    }
}

impl Dimension {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|v| v.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Display name of a value, falling back to the key itself.
    pub fn value_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.value(key).map_or(key, |v| v.name.as_str())
    }
}
