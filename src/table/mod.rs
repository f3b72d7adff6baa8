//! Tabulation Engine.
//!
//! Shapes facts into the rendered response. Stages run strictly in order;
//! raw facts enter at the first, a cached base table enters at the layout
//! transform:
//!
//! ```text
//! facts ─┬─ 1 unwrap values
//!        ├─ 2 restrict columns          LongTable::from_facts
//!        └─ 3 long-form reshape  ──────────────► base table (cacheable)
//!                                                     │
//!           4 layout transform  ◄─────────────────────┘
//!           5 labels
//!           6 type coercion                    Tabulator::frame
//!           7 deterministic sort
//!           8 column order
//!           9 serialization                    Tabulator::render
//! ```
//!
//! An empty base table flows through the same stages and yields a header-only
//! table of the layout's shape.

mod cell;
mod frame;
mod long;

pub use cell::Cell;
pub use frame::{Column, ColumnKey, Frame, PivotKey};
pub use long::{LongRow, LongTable};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::query::{CanonicalQuery, Labels, Layout, OutputFormat, SortKey};
use crate::schema::{NameList, Schema};

pub const REGION_ID: &str = "region_id";
pub const REGION_NAME: &str = "region_name";
pub const STATISTIC: &str = "statistic";
pub const MEASURE: &str = "measure";
pub const VALUE: &str = "value";

/// Display names of meta fields for `labels=name` and `labels=both`.
pub const FIELD_LABELS: &[(&str, &str)] = &[
    (REGION_ID, "ID_Region"),
    (REGION_NAME, "Region"),
    (VALUE, "Wert"),
    (STATISTIC, "Statistik"),
    (MEASURE, "Merkmal"),
    ("year", "Jahr"),
    ("date", "Datum"),
];

/// Every output encoding of one table, as shown in the debug report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Formats {
    pub csv: String,
    pub tsv: String,
    pub json: String,
}

/// Runs the presentation stages for one query.
pub struct Tabulator<'a> {
    schema: &'a Schema,
    names: &'a NameList,
    query: &'a CanonicalQuery,
}

impl<'a> Tabulator<'a> {
    /// `schema` may be the full schema or the query's filtered view; it is
    /// only consulted for display names.
    pub fn new(schema: &'a Schema, names: &'a NameList, query: &'a CanonicalQuery) -> Self {
        Self {
            schema,
            names,
            query,
        }
    }

    /// Encode in the query's output format.
    pub fn render(&self, table: &LongTable) -> Result<String, serde_json::Error> {
        self.encode(&self.frame(table), self.query.format)
    }

    /// Encode in every output format.
    pub fn render_all(&self, table: &LongTable) -> Result<Formats, serde_json::Error> {
        let frame = self.frame(table);
        Ok(Formats {
            csv: self.encode(&frame, OutputFormat::Csv)?,
            tsv: self.encode(&frame, OutputFormat::Tsv)?,
            json: self.encode(&frame, OutputFormat::Json)?,
        })
    }

    fn encode(&self, frame: &Frame, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Csv => Ok(frame.to_delimited(self.query.delimiter.as_char())),
            OutputFormat::Tsv => Ok(frame.to_delimited('\t')),
            OutputFormat::Json => frame.to_json(),
        }
    }

    /// Stages 4 to 8: layout, labels, coercion, sort, column order.
    pub fn frame(&self, table: &LongTable) -> Frame {
        let mut frame = match self.query.layout {
            Layout::Long => self.long_frame(table),
            Layout::Region | Layout::Time => self.wide_frame(table),
        };
        self.label_headers(&mut frame);
        frame.map_cells(Cell::coerce);
        self.sort(&mut frame);
        self.order_columns(&mut frame);
        tracing::debug!(
            rows = frame.len(),
            columns = frame.columns.len(),
            layout = ?self.query.layout,
            "tabulated"
        );
        frame
    }

    // =========================================================================
    // Layout
    // =========================================================================

    fn long_frame(&self, table: &LongTable) -> Frame {
        let rows = &table.rows;
        let mut columns = vec![Column::field(
            REGION_ID,
            rows.iter().map(|r| Cell::from(r.region_id.as_str())).collect(),
        )];
        if self.query.labels != Labels::Id {
            columns.push(Column::field(
                REGION_NAME,
                rows.iter()
                    .map(|r| Cell::from(self.names.label(&r.region_id)))
                    .collect(),
            ));
        }
        columns.push(Column::field(
            self.query.time_field(),
            rows.iter().map(|r| Cell::from(r.time.as_str())).collect(),
        ));
        if self.query.data.len() > 1 {
            columns.push(Column::field(
                STATISTIC,
                rows.iter().map(|r| self.statistic_label(&r.statistic)).collect(),
            ));
        }
        columns.push(Column::field(
            MEASURE,
            rows.iter()
                .map(|r| self.measure_label(&r.statistic, &r.measure))
                .collect(),
        ));
        columns.push(Column::field(
            VALUE,
            rows.iter().map(|r| r.value.clone()).collect(),
        ));

        let dimensions: BTreeSet<(&str, &str, &str)> = rows
            .iter()
            .flat_map(|r| {
                r.dimensions
                    .keys()
                    .map(move |d| (r.statistic.as_str(), r.measure.as_str(), d.as_str()))
            })
            .collect();
        for (statistic, measure, dimension) in dimensions {
            let cells = rows
                .iter()
                .map(|r| {
                    if r.statistic != statistic || r.measure != measure {
                        return Cell::Null;
                    }
                    r.dimensions.get(dimension).map_or(Cell::Null, |v| {
                        self.value_label(statistic, measure, dimension, v)
                    })
                })
                .collect();
            columns.push(Column::new(
                ColumnKey::Dimension {
                    statistic: statistic.to_string(),
                    measure: measure.to_string(),
                    dimension: dimension.to_string(),
                },
                cells,
            ));
        }

        Frame {
            index: None,
            columns,
        }
    }

    /// Pivot so the index field becomes the rows and every other
    /// combination becomes a column. Index values are sorted.
    fn wide_frame(&self, table: &LongTable) -> Frame {
        let (index_field, _) = self.pivot_fields();

        let mut index_values: BTreeSet<&str> = BTreeSet::new();
        let mut pivot: BTreeMap<PivotKey, BTreeMap<&str, Cell>> = BTreeMap::new();
        for row in &table.rows {
            let (index, suffix) = if index_field == REGION_ID {
                (row.region_id.as_str(), row.time.as_str())
            } else {
                (row.time.as_str(), row.region_id.as_str())
            };
            index_values.insert(index);
            let key = PivotKey {
                statistic: row.statistic.clone(),
                measure: row.measure.clone(),
                dimensions: row
                    .dimensions
                    .iter()
                    .map(|(d, v)| (d.clone(), v.clone()))
                    .collect(),
                suffix: suffix.to_string(),
            };
            let cells = pivot.entry(key).or_default();
            if cells.contains_key(index) {
                tracing::warn!(
                    index,
                    suffix,
                    measure = %row.measure,
                    "duplicate cell in pivot, keeping first"
                );
                continue;
            }
            cells.insert(index, row.value.clone());
        }

        let index = Column::field(
            index_field,
            index_values.iter().map(|&v| Cell::from(v)).collect(),
        );
        let mut columns = Vec::new();
        if index_field == REGION_ID && self.query.labels != Labels::Id {
            columns.push(Column::field(
                REGION_NAME,
                index_values
                    .iter()
                    .map(|&v| Cell::from(self.names.label(v)))
                    .collect(),
            ));
        }
        for (key, cells) in pivot {
            let cells = index_values
                .iter()
                .map(|&v| cells.get(v).cloned().unwrap_or(Cell::Null))
                .collect();
            columns.push(Column::new(ColumnKey::Pivot(key), cells));
        }

        Frame {
            index: Some(index),
            columns,
        }
    }

    /// (row index field, column suffix field) of a wide layout.
    fn pivot_fields(&self) -> (&'static str, &'static str) {
        let time = self.query.time_field();
        match self.query.layout {
            Layout::Time => (time, REGION_ID),
            Layout::Region | Layout::Long => (REGION_ID, time),
        }
    }

    // =========================================================================
    // Labels
    // =========================================================================

    fn label(&self, id: &str, name: &str) -> String {
        match self.query.labels {
            Labels::Id => id.to_string(),
            Labels::Name => name.to_string(),
            Labels::Both => format!("{} ({})", name, id),
        }
    }

    fn statistic_label(&self, statistic: &str) -> Cell {
        let name = self.schema.statistic(statistic).map_or(statistic, |s| s.name.as_str());
        Cell::from(self.label(statistic, name))
    }

    fn measure_label(&self, statistic: &str, measure: &str) -> Cell {
        Cell::from(self.label(measure, self.measure_name(statistic, measure)))
    }

    fn value_label(&self, statistic: &str, measure: &str, dimension: &str, value: &str) -> Cell {
        Cell::from(self.label(value, self.value_name(statistic, measure, dimension, value)))
    }

    fn measure_name<'s>(&'s self, statistic: &str, measure: &'s str) -> &'s str {
        self.schema
            .measure(statistic, measure)
            .map_or(measure, |m| m.name.as_str())
    }

    fn dimension_name<'s>(&'s self, statistic: &str, measure: &str, dimension: &'s str) -> &'s str {
        self.schema
            .measure(statistic, measure)
            .and_then(|m| m.dimension(dimension))
            .map_or(dimension, |d| d.name.as_str())
    }

    fn value_name<'s>(
        &'s self,
        statistic: &str,
        measure: &str,
        dimension: &str,
        value: &'s str,
    ) -> &'s str {
        self.schema
            .measure(statistic, measure)
            .and_then(|m| m.dimension(dimension))
            .map_or(value, |d| d.value_name(value))
    }

    fn field_header(&self, field: &str) -> String {
        if self.query.labels == Labels::Id {
            return field.to_string();
        }
        FIELD_LABELS
            .iter()
            .find(|(f, _)| *f == field)
            .map_or(field, |(_, label)| *label)
            .to_string()
    }

    fn header(&self, key: &ColumnKey) -> String {
        match key {
            ColumnKey::Field(field) => self.field_header(field),
            ColumnKey::Dimension {
                statistic,
                measure,
                dimension,
            } => {
                let id = format!("{}:{}({})", statistic, measure, dimension);
                let name = format!(
                    "{}: {}",
                    self.measure_name(statistic, measure),
                    self.dimension_name(statistic, measure, dimension)
                );
                self.label(&id, &name)
            }
            ColumnKey::Pivot(key) => {
                let (_, suffix_field) = self.pivot_fields();
                let dimensions = if key.dimensions.is_empty() {
                    String::new()
                } else {
                    let pairs: Vec<String> = key
                        .dimensions
                        .iter()
                        .map(|(d, v)| format!("{}:{}", d, v))
                        .collect();
                    format!("({})", pairs.join(","))
                };
                let id = format!(
                    "{}:{}{}-{}:{}",
                    key.statistic, key.measure, dimensions, suffix_field, key.suffix
                );

                let suffix = if suffix_field == REGION_ID {
                    self.names.label(&key.suffix)
                } else {
                    key.suffix.as_str()
                };
                let measure = self.measure_name(&key.statistic, &key.measure);
                let name = if key.dimensions.is_empty() {
                    format!("{} {}", measure, suffix)
                } else {
                    let values: Vec<&str> = key
                        .dimensions
                        .iter()
                        .map(|(d, v)| self.value_name(&key.statistic, &key.measure, d, v))
                        .collect();
                    format!("{}: {}, {}", measure, values.join(", "), suffix)
                };
                self.label(&id, &name)
            }
        }
    }

    /// Display names are not unique across statistics. A name shared by
    /// several data columns gets the statistic id appended.
    fn label_headers(&self, frame: &mut Frame) {
        for column in frame.index.iter_mut().chain(frame.columns.iter_mut()) {
            column.header = self.header(&column.key);
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for column in &frame.columns {
            *counts.entry(column.header.clone()).or_default() += 1;
        }
        for column in &mut frame.columns {
            if counts.get(&column.header).copied().unwrap_or(0) < 2 {
                continue;
            }
            if let Some(statistic) = column.key.statistic() {
                column.header = format!("{} [{}]", column.header, statistic);
            }
        }
    }

    // =========================================================================
    // Sort and column order
    // =========================================================================

    /// Rows are ordered by the `sort` field, then the layout's natural index
    /// fields, then every other column by header. A row index is sorted last.
    fn sort(&self, frame: &mut Frame) {
        let time = self.query.time_field();
        let main = match self.query.sort {
            SortKey::Time => time,
            SortKey::Region => REGION_ID,
            SortKey::Measure => MEASURE,
            SortKey::Value => VALUE,
        };
        let natural = match self.query.layout {
            Layout::Long | Layout::Region => [REGION_ID, time, MEASURE],
            Layout::Time => [time, REGION_ID, MEASURE],
        };

        let mut keys: Vec<usize> = std::iter::once(main)
            .chain(natural.into_iter().filter(|f| *f != main))
            .filter_map(|f| frame.position(f))
            .collect();
        let mut others: Vec<usize> = (0..frame.columns.len())
            .filter(|i| !keys.contains(i))
            .collect();
        others.sort_by(|&a, &b| frame.columns[a].header.cmp(&frame.columns[b].header));
        keys.extend(others);

        let mut order: Vec<usize> = (0..frame.len()).collect();
        order.sort_by(|&a, &b| {
            keys.iter()
                .map(|&c| frame.columns[c].cells[a].sort_cmp(&frame.columns[c].cells[b]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        if let Some(index) = &frame.index {
            let sorts_index = [main]
                .iter()
                .chain(natural.iter())
                .any(|f| matches!(&index.key, ColumnKey::Field(name) if name == f));
            if sorts_index {
                order.sort_by(|&a, &b| index.cells[a].sort_cmp(&index.cells[b]));
            }
        }
        frame.permute(&order);
    }

    /// A fixed prefix per layout, then every remaining column by header.
    fn order_columns(&self, frame: &mut Frame) {
        let time = self.query.time_field();
        let prefix = match self.query.layout {
            Layout::Long => vec![REGION_ID, REGION_NAME, time, MEASURE, VALUE],
            Layout::Region => vec![REGION_ID, REGION_NAME, time, MEASURE],
            Layout::Time => vec![time, REGION_ID, REGION_NAME, MEASURE],
        };

        let mut columns = std::mem::take(&mut frame.columns);
        let mut ordered = Vec::with_capacity(columns.len());
        for field in prefix {
            if let Some(i) = columns.iter().position(|c| c.is_field(field)) {
                ordered.push(columns.remove(i));
            }
        }
        columns.sort_by(|a, b| a.header.cmp(&b.header));
        ordered.extend(columns);
        frame.columns = ordered;
    }
}
