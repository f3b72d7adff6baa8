//! Column-major result frame and its encodings.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::cell::Cell;

/// What a column holds, independent of how its header is labelled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnKey {
    /// A meta field such as `region_id`, the time field, `measure` or `value`.
    Field(String),

    /// Long layout: the values of one dimension of one measure.
    Dimension {
        statistic: String,
        measure: String,
        dimension: String,
    },

    /// Wide layouts: one measure cell, broken down by dimension values and
    /// the meta field that is not the row index.
    Pivot(PivotKey),
}

impl ColumnKey {
    /// Statistic a data column belongs to; `None` for meta fields.
    pub fn statistic(&self) -> Option<&str> {
        match self {
            ColumnKey::Field(_) => None,
            ColumnKey::Dimension { statistic, .. } => Some(statistic),
            ColumnKey::Pivot(key) => Some(&key.statistic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PivotKey {
    pub statistic: String,
    pub measure: String,
    pub dimensions: Vec<(String, String)>,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: ColumnKey,
    pub header: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(key: ColumnKey, cells: Vec<Cell>) -> Self {
        Self {
            key,
            header: String::new(),
            cells,
        }
    }

    pub fn field(name: &str, cells: Vec<Cell>) -> Self {
        Self::new(ColumnKey::Field(name.to_string()), cells)
    }

    pub fn is_field(&self, name: &str) -> bool {
        matches!(&self.key, ColumnKey::Field(f) if f == name)
    }
}

/// A table with an optional row index, stored column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Row labels; only wide layouts carry one.
    pub index: Option<Column>,
    pub columns: Vec<Column>,
}

impl Frame {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index
            .as_ref()
            .or(self.columns.first())
            .map_or(0, |c| c.cells.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.is_field(field))
    }

    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_field(field))
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.index
            .iter()
            .chain(self.columns.iter())
            .map(|c| c.header.as_str())
    }

    /// Reorder every row so that row `i` becomes old row `order[i]`.
    pub fn permute(&mut self, order: &[usize]) {
        for column in self.index.iter_mut().chain(self.columns.iter_mut()) {
            column.cells = order.iter().map(|&i| column.cells[i].clone()).collect();
        }
    }

    pub fn map_cells(&mut self, f: impl Fn(Cell) -> Cell) {
        for column in self.index.iter_mut().chain(self.columns.iter_mut()) {
            column.cells = std::mem::take(&mut column.cells).into_iter().map(&f).collect();
        }
    }

    fn all_columns(&self) -> impl Iterator<Item = &Column> {
        self.index.iter().chain(self.columns.iter())
    }

    // =========================================================================
    // Encodings
    // =========================================================================

    /// Delimited text with a header row. Missing values are empty, fields
    /// are quoted only when they contain the delimiter, a quote or a line
    /// break, and every line ends with `\n`.
    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        let line = |out: &mut String, fields: Vec<String>| {
            let quoted: Vec<String> = fields.iter().map(|f| quote(f, delimiter)).collect();
            out.push_str(&quoted.join(&delimiter.to_string()));
            out.push('\n');
        };

        line(&mut out, self.headers().map(str::to_string).collect());
        for row in 0..self.len() {
            let fields = self
                .all_columns()
                .map(|c| c.cells[row].text().unwrap_or_default())
                .collect();
            line(&mut out, fields);
        }
        out
    }

    /// JSON table: `{"schema": [{"name", "type"}...], "data": [{...}...]}`
    /// with row keys in column order.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&JsonTable { frame: self })
    }
}

fn quote(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains(['"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn json_type(cells: &[Cell]) -> &'static str {
    let mut present = cells.iter().filter(|c| !c.is_null()).peekable();
    if present.peek().is_none() {
        return "any";
    }
    let (mut ints, mut numbers, mut strings) = (true, true, true);
    for cell in present {
        match cell {
            Cell::Int(_) => strings = false,
            Cell::Float(_) => {
                ints = false;
                strings = false;
            }
            Cell::Str(_) => {
                ints = false;
                numbers = false;
            }
            Cell::Null => {}
        }
    }
    match (ints, numbers, strings) {
        (true, _, _) => "integer",
        (_, true, _) => "number",
        (_, _, true) => "string",
        _ => "any",
    }
}

struct JsonTable<'a> {
    frame: &'a Frame,
}

struct JsonField<'a> {
    name: &'a str,
    kind: &'static str,
}

struct JsonRow<'a> {
    frame: &'a Frame,
    row: usize,
}

impl Serialize for JsonTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields: Vec<JsonField> = self
            .frame
            .all_columns()
            .map(|c| JsonField {
                name: &c.header,
                kind: json_type(&c.cells),
            })
            .collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("schema", &fields)?;
        map.serialize_entry("data", &JsonRows { frame: self.frame })?;
        map.end()
    }
}

impl Serialize for JsonField<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", self.name)?;
        map.serialize_entry("type", self.kind)?;
        map.end()
    }
}

struct JsonRows<'a> {
    frame: &'a Frame,
}

impl Serialize for JsonRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.frame.len()))?;
        for row in 0..self.frame.len() {
            seq.serialize_element(&JsonRow {
                frame: self.frame,
                row,
            })?;
        }
        seq.end()
    }
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for column in self.frame.all_columns() {
            map.serialize_entry(&column.header, &column.cells[self.row])?;
        }
        map.end()
    }
}
