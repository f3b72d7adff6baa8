//! Query parsing and canonicalization.
//!
//! A raw URL query string becomes an immutable [`CanonicalQuery`]:
//!
//! ```text
//! raw string → decode → reject unknown keys → clean each argument
//!            → assemble typed fields → Schema::validate → CanonicalQuery
//! ```
//!
//! Two content hashes identify a query. The render key covers every field;
//! the data key covers only the fields that decide which facts are selected
//! and how the base table is built, so presentation variants share it.

mod argument;
mod data;
mod urlquery;

pub use argument::{argument, check_known, Argument, ListStyle, ARGUMENTS};
pub use data::{split_entries, DataSelection, DimensionSelection, MeasureSelection};
pub use urlquery::{parse_query_string, RawQuery};

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::schema::{NameList, Schema};

// ============================================================================
// Field types
// ============================================================================

/// Which regions to select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelector {
    All,
    Ids(BTreeSet<String>),
}

/// Which region levels to select (only applied when region is `all`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelSelector {
    All,
    Levels(BTreeSet<u8>),
}

/// Which points in time to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelector {
    All,
    /// Latest time available per measure.
    Last,
    Year(u16),
    /// Inclusive range, open on a side whose bound is `None`.
    Range {
        start: Option<u16>,
        end: Option<u16>,
    },
}

/// The fact field holding the time of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeField {
    Year,
    Date,
}

impl TimeField {
    pub fn field(&self) -> &'static str {
        match self {
            TimeField::Year => "year",
            TimeField::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Long,
    Region,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
}

impl OutputFormat {
    pub fn mimetype(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Csv | OutputFormat::Tsv => "text/plain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Labels {
    Id,
    Name,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Time,
    Region,
    Measure,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
        }
    }
}

// ============================================================================
// Canonical query
// ============================================================================

/// A validated, key-sorted, hashable query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalQuery {
    pub data: DataSelection,
    pub delimiter: Delimiter,
    pub dformat: TimeField,
    pub format: OutputFormat,
    pub labels: Labels,
    pub layout: Layout,
    pub level: LevelSelector,
    pub parent: Option<String>,
    pub region: RegionSelector,
    pub sort: SortKey,
    pub time: TimeSelector,
    /// The raw query string this was parsed from. Not part of either key.
    #[serde(skip)]
    pub urlquery: String,
}

/// The subset of a query that decides the base table.
#[derive(Debug, Serialize)]
pub struct DataDefinition<'a> {
    pub data: &'a DataSelection,
    pub dformat: TimeField,
    pub level: &'a LevelSelector,
    pub parent: &'a Option<String>,
    pub region: &'a RegionSelector,
    pub time: TimeSelector,
}

impl CanonicalQuery {
    /// Parse and validate a raw query string.
    pub fn parse(raw: &str, schema: &Schema, names: &NameList) -> Result<Self, ValidationError> {
        let query = Self::clean(raw)?;
        schema.validate(&query, names)?;
        Ok(query)
    }

    /// Parse a raw query string without consulting the schema.
    pub fn clean(raw: &str) -> Result<Self, ValidationError> {
        let parsed = parse_query_string(raw);
        check_known(&parsed)?;

        let cleaned = |name: &str| -> Result<Option<Vec<String>>, ValidationError> {
            argument(name).map_or(Ok(None), |arg| arg.clean(&parsed))
        };
        let single = |name: &str| -> Result<Option<String>, ValidationError> {
            Ok(cleaned(name)?.and_then(|v| v.into_iter().next()))
        };

        let region = match cleaned("region")? {
            None => RegionSelector::All,
            Some(ids) => RegionSelector::Ids(ids.into_iter().collect()),
        };

        let level = match cleaned("level")? {
            None => LevelSelector::Levels(BTreeSet::from([1])),
            Some(values) if values.iter().any(|v| v == "all") => {
                if values.len() > 1 {
                    return Err(ValidationError::MixedAll("level".into()));
                }
                LevelSelector::All
            }
            Some(values) => LevelSelector::Levels(
                values
                    .iter()
                    .map(|v| {
                        v.parse::<u8>().map_err(|_| ValidationError::InvalidValue {
                            param: "level".into(),
                            value: v.clone(),
                        })
                    })
                    .collect::<Result<BTreeSet<u8>, _>>()?,
            ),
        };

        let parent = single("parent")?;

        let time = match single("time")? {
            None => TimeSelector::Last,
            Some(value) => parse_time(&value)?,
        };

        let dformat = match single("dformat")?.as_deref() {
            Some("date") => TimeField::Date,
            _ => TimeField::Year,
        };
        let labels = match single("labels")?.as_deref() {
            Some("name") => Labels::Name,
            Some("both") => Labels::Both,
            _ => Labels::Id,
        };
        let layout = match single("layout")?.as_deref() {
            Some("region") => Layout::Region,
            Some("time") => Layout::Time,
            _ => Layout::Long,
        };
        let format = match single("format")?.as_deref() {
            Some("tsv") => OutputFormat::Tsv,
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Csv,
        };
        let delimiter = match single("delimiter")?.as_deref() {
            Some(";") => Delimiter::Semicolon,
            _ => Delimiter::Comma,
        };
        let sort = match single("sort")?.as_deref() {
            Some("region") => SortKey::Region,
            Some("measure") => SortKey::Measure,
            Some("value") => SortKey::Value,
            _ => SortKey::Time,
        };

        let data = match cleaned("data")? {
            Some(entries) => DataSelection::parse(&entries)?,
            None => return Err(ValidationError::MissingData),
        };

        Ok(Self {
            data,
            delimiter,
            dformat,
            format,
            labels,
            layout,
            level,
            parent,
            region,
            sort,
            time,
            urlquery: raw.trim_start_matches('?').to_string(),
        })
    }

    pub fn data_definition(&self) -> DataDefinition<'_> {
        DataDefinition {
            data: &self.data,
            dformat: self.dformat,
            level: &self.level,
            parent: &self.parent,
            region: &self.region,
            time: self.time,
        }
    }

    /// The full cleaned query as JSON, keys sorted at every level.
    pub fn definition(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Hash of the full canonical query.
    pub fn render_key(&self) -> Result<String, serde_json::Error> {
        Ok(definition_key(&self.definition()?))
    }

    /// Hash of only the data-defining subset.
    pub fn data_key(&self) -> Result<String, serde_json::Error> {
        Ok(definition_key(&serde_json::to_value(self.data_definition())?))
    }

    /// Field name of the time column in facts and tables.
    pub fn time_field(&self) -> &'static str {
        self.dformat.field()
    }
}

/// Lowercase hex SHA-256 of a definition's compact JSON. `Value` objects
/// keep their keys sorted, so the key never depends on parameter order.
fn definition_key(definition: &serde_json::Value) -> String {
    let digest = Sha256::digest(definition.to_string().as_bytes());
    format!("{:x}", digest)
}

fn parse_time(value: &str) -> Result<TimeSelector, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        param: "time".into(),
        value: value.to_string(),
    };
    let year = |s: &str| -> Result<Option<u16>, ValidationError> {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some).map_err(|_| invalid())
        }
    };

    match value {
        "all" => Ok(TimeSelector::All),
        "last" => Ok(TimeSelector::Last),
        _ => match value.split_once(':') {
            Some((start, end)) => Ok(TimeSelector::Range {
                start: year(start)?,
                end: year(end)?,
            }),
            None => year(value)?.map(TimeSelector::Year).ok_or_else(invalid),
        },
    }
}

// ============================================================================
// Serialization
// ============================================================================

impl Serialize for RegionSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RegionSelector::All => serializer.serialize_str("all"),
            RegionSelector::Ids(ids) => serializer.collect_seq(ids),
        }
    }
}

impl Serialize for LevelSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LevelSelector::All => serializer.serialize_str("all"),
            LevelSelector::Levels(levels) => serializer.collect_seq(levels),
        }
    }
}

impl fmt::Display for TimeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSelector::All => write!(f, "all"),
            TimeSelector::Last => write!(f, "last"),
            TimeSelector::Year(year) => write!(f, "{}", year),
            TimeSelector::Range { start, end } => {
                if let Some(start) = start {
                    write!(f, "{}", start)?;
                }
                write!(f, ":")?;
                if let Some(end) = end {
                    write!(f, "{}", end)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for TimeSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Delimiter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.as_char())
    }
}
