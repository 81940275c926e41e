//! Supported file formats and their encode/decode strategies.
//!
//! This module provides:
//! - Format resolution from a path's extension
//! - CSV encoding/decoding
//! - XLSX encoding (with column formatting) and decoding
//! - Format profiles: column widths and alignment recovered from a workbook

pub mod delimited;
pub mod profile;
pub mod workbook;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::CodecError;
use crate::table::Table;

pub use profile::{CellAlignment, ColumnFormat, FormatProfile, HorizontalAlign, VerticalAlign};

/// Bytes of an encoded file
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Columns that received a width or alignment from the profile
    pub formatted_columns: usize,
}

/// The fixed set of formats a table can be saved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Resolve the format from the path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<FileFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
        }
    }

    /// Whether the format carries column widths and alignment
    pub fn supports_formatting(&self) -> bool {
        matches!(self, FileFormat::Xlsx)
    }

    /// Serialize a table to the bytes of a complete file
    pub fn encode(
        &self,
        table: &Table,
        profile: Option<&FormatProfile>,
        delimiter: u8,
    ) -> Result<Encoded, CodecError> {
        match self {
            FileFormat::Csv => Ok(Encoded {
                bytes: delimited::encode_csv(table, delimiter)?,
                formatted_columns: 0,
            }),
            FileFormat::Xlsx => workbook::encode_xlsx(table, profile),
        }
    }

    /// Read a table back from a file of this format
    pub fn decode(&self, path: &Path, delimiter: u8) -> Result<Table, CodecError> {
        match self {
            FileFormat::Csv => {
                let file = File::open(path)?;
                delimited::decode_csv(BufReader::new(file), delimiter)
            }
            FileFormat::Xlsx => workbook::decode_xlsx(path),
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}
