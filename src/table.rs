use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Represents a cell value with type information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(String), // ISO 8601 format
    Error(String),
}

impl CellValue {
    /// Text rendering used by untyped formats such as CSV
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => dt.clone(),
            CellValue::Error(e) => format!("#{}", e),
        }
    }

    /// Infer a typed value from untyped text
    pub fn infer(text: &str) -> CellValue {
        if text.is_empty() {
            return CellValue::Empty;
        }
        if text.eq_ignore_ascii_case("true") {
            return CellValue::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return CellValue::Boolean(false);
        }
        match text.trim().parse::<f64>() {
            // "inf"/"NaN" parse as floats but read as words in a sheet
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::String(text.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

/// Rows of cells under named columns.
///
/// Equality compares column identifiers and cell values only; the remembered
/// source/destination paths are bookkeeping for default save targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    source_file: Option<PathBuf>,
    destination_file: Option<PathBuf>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.rows == other.rows
    }
}

impl Table {
    /// Create a table; short rows are padded with `Empty`, long rows are cut
    /// to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();

        Table {
            columns,
            rows,
            source_file: None,
            destination_file: None,
        }
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn with_destination_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination_file = Some(path.into());
        self
    }

    /// Column identifiers in display order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn destination_file(&self) -> Option<&Path> {
        self.destination_file.as_deref()
    }

    pub fn set_destination_file(&mut self, path: Option<PathBuf>) {
        self.destination_file = path;
    }
}

/// Convert column index (0-based) to Excel column letter (A, B, ..., Z, AA, AB, ...)
pub fn column_index_to_letter(index: u32) -> String {
    let mut result = String::new();
    let mut n = index + 1;

    while n > 0 {
        n -= 1;
        let c = (b'A' + (n % 26) as u8) as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}
