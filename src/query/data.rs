//! The `data` selection DSL.
//!
//! Each entry selects one measure of one statistic, optionally narrowed to
//! dimensions and dimension values:
//!
//! ```text
//! 12411:BEVSTD                      measure with no breakdown
//! 12411:BEVSTD(GES)                 broken down by GES, any value
//! 12411:BEVSTD(GES:GESM|GESW,NAT)   GES restricted to two values, plus NAT
//! ```
//!
//! Entries are grouped statistic → measure → dimension → values. Every level
//! is key-ordered so the serialized selection is identical no matter in which
//! order the entries were written.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+)(?:\(([^()]+)\))?$")
        .expect("entry pattern is valid")
});

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("token pattern is valid"));

/// Selected values per dimension. An empty set means "any value".
pub type DimensionSelection = BTreeMap<String, BTreeSet<String>>;

/// Selected dimensions per measure. An empty map means "no breakdown".
pub type MeasureSelection = BTreeMap<String, DimensionSelection>;

/// Statistic → measure → dimension → values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSelection(BTreeMap<String, MeasureSelection>);

impl DataSelection {
    /// Parse a list of entries, already split at top-level commas.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ValidationError> {
        let mut selection = Self::default();
        for entry in entries {
            selection.parse_entry(entry.as_ref())?;
        }
        Ok(selection)
    }

    fn parse_entry(&mut self, entry: &str) -> Result<(), ValidationError> {
        let malformed = || ValidationError::MalformedData(entry.to_string());
        let captures = ENTRY.captures(entry).ok_or_else(malformed)?;

        let statistic = &captures[1];
        let measure = &captures[2];
        let mut dimensions: Vec<(String, Vec<String>)> = Vec::new();

        if let Some(inner) = captures.get(3) {
            for part in inner.as_str().split(',') {
                let (dimension, values) = match part.split_once(':') {
                    Some((dimension, values)) => {
                        let values: Vec<String> = values.split('|').map(str::to_string).collect();
                        (dimension, values)
                    }
                    None => (part, Vec::new()),
                };
                if !TOKEN.is_match(dimension) || !values.iter().all(|v| TOKEN.is_match(v)) {
                    return Err(malformed());
                }
                dimensions.push((dimension.to_string(), values));
            }
        }

        self.insert(statistic, measure, dimensions);
        Ok(())
    }

    /// Add a measure selection, merging with anything already selected.
    pub fn insert<I, V>(&mut self, statistic: &str, measure: &str, dimensions: I)
    where
        I: IntoIterator<Item = (String, V)>,
        V: IntoIterator<Item = String>,
    {
        let selected = self
            .0
            .entry(statistic.to_string())
            .or_default()
            .entry(measure.to_string())
            .or_default();
        for (dimension, values) in dimensions {
            selected.entry(dimension).or_default().extend(values);
        }
    }

    pub fn statistics(&self) -> impl Iterator<Item = (&str, &MeasureSelection)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn statistic(&self, key: &str) -> Option<&MeasureSelection> {
        self.0.get(key)
    }

    pub fn measure(&self, statistic: &str, measure: &str) -> Option<&DimensionSelection> {
        self.0.get(statistic)?.get(measure)
    }

    pub fn statistic_keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of selected statistics.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Split a raw `data` value at commas that are not inside parentheses.
pub fn split_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}
