//! In-memory table model and the processing pipeline.
//!
//! A [`DataTable`] always has unique column names and every row has exactly
//! one value per column. Processing never touches its input; it builds a new
//! table.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl CellValue {
    /// Null or text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(n) => write!(f, "{}", n),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// No non-empty values.
    Empty,
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Empty => "empty",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        }
    }

    /// Widen `self` to also admit values of type `other`.
    fn merge(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (Empty, t) | (t, Empty) => t,
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<CellValue>,
}

impl Row {
    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.values.get(index)
    }

    fn is_blank(&self) -> bool {
        self.values.iter().all(CellValue::is_blank)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl DataTable {
    /// Table with no columns and no rows. Returned by fail-open callers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from header names and rows, inferring column types.
    ///
    /// Fails on duplicate column names or a row whose length differs from
    /// the header.
    pub fn new(names: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, String> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(format!("duplicate column name '{}'", name));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(format!(
                    "row {} has {} values, expected {}",
                    i + 1,
                    row.len(),
                    names.len()
                ));
            }
        }
        let rows: Vec<Row> = rows.into_iter().map(|values| Row { values }).collect();
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column { name, ty: infer_column(&rows, i) })
            .collect();
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value at `row` (0-indexed) in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }
}

/// Classify a single trimmed, non-empty text value.
fn classify_text(s: &str) -> ColumnType {
    if s.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if s.parse::<f64>().map(|n| n.is_finite()).unwrap_or(false) {
        ColumnType::Float
    } else if parse_bool(s).is_some() {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn classify(value: &CellValue) -> ColumnType {
    match value {
        CellValue::Null => ColumnType::Empty,
        CellValue::Integer(_) => ColumnType::Integer,
        CellValue::Float(_) => ColumnType::Float,
        CellValue::Boolean(_) => ColumnType::Boolean,
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                ColumnType::Empty
            } else {
                classify_text(trimmed)
            }
        }
    }
}

fn infer_column(rows: &[Row], index: usize) -> ColumnType {
    rows.iter()
        .filter_map(|r| r.get(index))
        .fold(ColumnType::Empty, |acc, v| acc.merge(classify(v)))
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Convert a trimmed value to `ty`. Blank values become `Null`.
fn coerce(value: CellValue, ty: ColumnType) -> CellValue {
    let s = match value {
        CellValue::Text(s) => s,
        other => return other,
    };
    if s.is_empty() {
        return CellValue::Null;
    }
    let converted = match ty {
        ColumnType::Integer => s.parse().ok().map(CellValue::Integer),
        ColumnType::Float => s.parse().ok().map(CellValue::Float),
        ColumnType::Boolean => parse_bool(&s).map(CellValue::Boolean),
        ColumnType::Empty | ColumnType::Text => None,
    };
    converted.unwrap_or(CellValue::Text(s))
}

/// The fixed processing pipeline:
///
/// 1. trim every text value
/// 2. drop rows whose values are all blank
/// 3. convert each value to its column's inferred type (blank becomes null)
/// 4. re-infer column types
pub fn process(table: &DataTable) -> DataTable {
    let trimmed: Vec<Row> = table
        .rows
        .iter()
        .map(|row| Row {
            values: row
                .values
                .iter()
                .map(|v| match v {
                    CellValue::Text(s) => CellValue::Text(s.trim().to_string()),
                    other => other.clone(),
                })
                .collect(),
        })
        .filter(|row| !row.is_blank())
        .collect();

    let types: Vec<ColumnType> = (0..table.columns.len()).map(|i| infer_column(&trimmed, i)).collect();

    let rows: Vec<Row> = trimmed
        .into_iter()
        .map(|row| Row {
            values: row
                .values
                .into_iter()
                .zip(&types)
                .map(|(v, &ty)| coerce(v, ty))
                .collect(),
        })
        .collect();

    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| Column { name: c.name.clone(), ty: infer_column(&rows, i) })
        .collect();

    DataTable { columns, rows }
}
