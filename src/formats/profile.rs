//! Column display metadata carried across re-saves of a workbook.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use umya_spreadsheet::structs::{Alignment, HorizontalAlignmentValues, VerticalAlignmentValues};
use umya_spreadsheet::{reader, Worksheet};

use crate::error::{CodecError, FormatReadError};
use crate::table::column_index_to_letter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    General,
    Left,
    Center,
    CenterContinuous,
    Right,
    Fill,
    Justify,
    Distributed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
    Justify,
    Distributed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellAlignment {
    pub horizontal: Option<HorizontalAlign>,
    pub vertical: Option<VerticalAlign>,
    pub wrap_text: bool,
}

/// Width and alignment of a single column
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnFormat {
    pub width: Option<f64>,
    pub alignment: Option<CellAlignment>,
}

/// Per-column formatting keyed by column letter (A, B, ...)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatProfile {
    pub sheet_name: Option<String>,
    pub columns: BTreeMap<String, ColumnFormat>,
}

impl FormatProfile {
    pub fn new() -> Self {
        FormatProfile::default()
    }

    /// Builder-style helper for caller-supplied profiles
    pub fn with_width(mut self, column: &str, width: f64) -> Self {
        self.columns.entry(column.to_ascii_uppercase()).or_default().width = Some(width);
        self
    }

    pub fn with_alignment(mut self, column: &str, alignment: CellAlignment) -> Self {
        self.columns.entry(column.to_ascii_uppercase()).or_default().alignment = Some(alignment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.sheet_name.is_none()
    }

    pub fn width(&self, column: &str) -> Option<f64> {
        self.columns.get(column).and_then(|c| c.width)
    }

    /// Read the active (first) sheet's column widths and header-row alignment
    pub fn read_from(path: &Path) -> Result<FormatProfile, FormatReadError> {
        let bytes = std::fs::read(path).map_err(|e| FormatReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        FormatProfile::from_xlsx_bytes(&bytes).map_err(|e| FormatReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Same as [`FormatProfile::read_from`] for a workbook already in memory
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<FormatProfile, CodecError> {
        let book = reader::xlsx::read_reader(Cursor::new(bytes), true)
            .map_err(|e| CodecError::XlsxRead(e.to_string()))?;

        let sheet = book
            .get_sheet_collection()
            .first()
            .ok_or(CodecError::EmptyWorkbook)?;

        Ok(capture(sheet))
    }

    /// Apply widths and alignments to every populated row of each column.
    /// Alignment is never applied past the sheet's last populated column so
    /// no empty styled cells widen the data range. Returns the number of
    /// columns that received a width or an alignment.
    pub fn apply(&self, sheet: &mut Worksheet) -> usize {
        let highest_row = sheet.get_highest_row().max(1);
        let highest_column = sheet.get_highest_column();
        let mut applied = 0;

        for (letter, format) in &self.columns {
            let Some(col_num) = column_letter_to_number(letter) else {
                continue;
            };

            let mut touched = false;

            if let Some(width) = format.width {
                sheet.get_column_dimension_mut(letter).set_width(width);
                touched = true;
            }

            if let Some(alignment) = format.alignment.as_ref().filter(|_| col_num <= highest_column) {
                for row_num in 1..=highest_row {
                    let target = sheet
                        .get_cell_mut((col_num, row_num))
                        .get_style_mut()
                        .get_alignment_mut();
                    alignment.write_to(target);
                }
                touched = true;
            }

            if touched {
                applied += 1;
            }
        }

        applied
    }
}

/// Capture the formatting of a worksheet. Alignment comes from the header
/// cell, since that is the one cell every saved column is guaranteed to have.
pub fn capture(sheet: &Worksheet) -> FormatProfile {
    let mut columns = BTreeMap::new();

    for col_idx in 0..sheet.get_highest_column() {
        let letter = column_index_to_letter(col_idx);
        let col_num = col_idx + 1;

        let width = sheet
            .get_column_dimension(&letter)
            .map(|c| *c.get_width())
            .filter(|w| *w > 0.0);

        let alignment = sheet
            .get_cell((col_num, 1))
            .and_then(|cell| cell.get_style().get_alignment())
            .map(CellAlignment::read_from);

        if width.is_some() || alignment.is_some() {
            columns.insert(letter, ColumnFormat { width, alignment });
        }
    }

    FormatProfile {
        sheet_name: Some(sheet.get_name().to_string()),
        columns,
    }
}

impl CellAlignment {
    fn read_from(alignment: &Alignment) -> Self {
        let horizontal = match alignment.get_horizontal() {
            HorizontalAlignmentValues::General => None,
            HorizontalAlignmentValues::Left => Some(HorizontalAlign::Left),
            HorizontalAlignmentValues::Center => Some(HorizontalAlign::Center),
            HorizontalAlignmentValues::CenterContinuous => Some(HorizontalAlign::CenterContinuous),
            HorizontalAlignmentValues::Right => Some(HorizontalAlign::Right),
            HorizontalAlignmentValues::Fill => Some(HorizontalAlign::Fill),
            HorizontalAlignmentValues::Justify => Some(HorizontalAlign::Justify),
            HorizontalAlignmentValues::Distributed => Some(HorizontalAlign::Distributed),
        };

        let vertical = match alignment.get_vertical() {
            VerticalAlignmentValues::Top => Some(VerticalAlign::Top),
            VerticalAlignmentValues::Center => Some(VerticalAlign::Center),
            // Bottom is the workbook default
            VerticalAlignmentValues::Bottom => None,
            VerticalAlignmentValues::Justify => Some(VerticalAlign::Justify),
            VerticalAlignmentValues::Distributed => Some(VerticalAlign::Distributed),
        };

        CellAlignment {
            horizontal,
            vertical,
            wrap_text: *alignment.get_wrap_text(),
        }
    }

    fn write_to(&self, target: &mut Alignment) {
        if let Some(horizontal) = self.horizontal {
            target.set_horizontal(match horizontal {
                HorizontalAlign::General => HorizontalAlignmentValues::General,
                HorizontalAlign::Left => HorizontalAlignmentValues::Left,
                HorizontalAlign::Center => HorizontalAlignmentValues::Center,
                HorizontalAlign::CenterContinuous => HorizontalAlignmentValues::CenterContinuous,
                HorizontalAlign::Right => HorizontalAlignmentValues::Right,
                HorizontalAlign::Fill => HorizontalAlignmentValues::Fill,
                HorizontalAlign::Justify => HorizontalAlignmentValues::Justify,
                HorizontalAlign::Distributed => HorizontalAlignmentValues::Distributed,
            });
        }

        if let Some(vertical) = self.vertical {
            target.set_vertical(match vertical {
                VerticalAlign::Top => VerticalAlignmentValues::Top,
                VerticalAlign::Center => VerticalAlignmentValues::Center,
                VerticalAlign::Bottom => VerticalAlignmentValues::Bottom,
                VerticalAlign::Justify => VerticalAlignmentValues::Justify,
                VerticalAlign::Distributed => VerticalAlignmentValues::Distributed,
            });
        }

        target.set_wrap_text(self.wrap_text);
    }
}

/// Convert an Excel column letter to its 1-based number (A = 1, AA = 27)
fn column_letter_to_number(letter: &str) -> Option<u32> {
    if letter.is_empty() {
        return None;
    }

    letter.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter_to_number() {
        assert_eq!(column_letter_to_number("A"), Some(1));
        assert_eq!(column_letter_to_number("z"), Some(26));
        assert_eq!(column_letter_to_number("AA"), Some(27));
        assert_eq!(column_letter_to_number("BA"), Some(53));
        assert_eq!(column_letter_to_number(""), None);
        assert_eq!(column_letter_to_number("A1"), None);
    }

    #[test]
    fn test_capture_after_apply_keeps_widths_and_alignment() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
        sheet.get_cell_mut("A1").set_value_string("id");
        sheet.get_cell_mut("B1").set_value_string("label");

        let centered = CellAlignment {
            horizontal: Some(HorizontalAlign::Center),
            vertical: None,
            wrap_text: true,
        };
        let profile = FormatProfile::new()
            .with_width("A", 10.0)
            .with_width("b", 20.0)
            .with_alignment("B", centered);

        assert_eq!(profile.apply(sheet), 2);

        let captured = capture(sheet);
        assert_eq!(captured.width("A"), Some(10.0));
        assert_eq!(captured.width("B"), Some(20.0));
        assert_eq!(captured.columns["B"].alignment, Some(centered));
        assert_eq!(captured.sheet_name.as_deref(), Some("Sheet1"));
    }

    #[test]
    fn test_apply_counts_only_columns_it_changed() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
        sheet.get_cell_mut("A1").set_value_string("id");

        let right = CellAlignment {
            horizontal: Some(HorizontalAlign::Right),
            vertical: None,
            wrap_text: false,
        };
        let profile = FormatProfile::new()
            .with_alignment("A", right)
            // Past the last populated column, no width: nothing to write
            .with_alignment("D", right)
            .with_width("E", 8.0);

        assert_eq!(profile.apply(sheet), 2);
    }

    #[test]
    fn test_from_xlsx_bytes_rejects_garbage() {
        assert!(matches!(
            FormatProfile::from_xlsx_bytes(b"not a workbook"),
            Err(CodecError::XlsxRead(_))
        ));
    }
}
