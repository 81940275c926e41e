use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Cursor;
use std::path::Path;
use umya_spreadsheet::{new_file, writer, Worksheet};

use super::profile::FormatProfile;
use super::Encoded;
use crate::error::CodecError;
use crate::table::{CellValue, Table};

/// Name `new_file` gives its only sheet
const DEFAULT_SHEET: &str = "Sheet1";

/// Number format that marks a serial as a date for readers
const DATETIME_FORMAT_CODE: &str = "yyyy-mm-dd hh:mm:ss";

const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Encode a table as a single-sheet workbook, header in row 1.
///
/// When a profile is given its sheet name is reused and its column widths and
/// alignments are applied to the freshly written cells.
pub fn encode_xlsx(table: &Table, profile: Option<&FormatProfile>) -> Result<Encoded, CodecError> {
    let mut book = new_file();

    let sheet = book
        .get_sheet_by_name_mut(DEFAULT_SHEET)
        .ok_or(CodecError::EmptyWorkbook)?;

    if let Some(name) = profile.and_then(|p| p.sheet_name.as_deref()) {
        sheet.set_name(name);
    }

    write_cells(sheet, table);

    let formatted_columns = profile.map_or(0, |profile| profile.apply(sheet));

    let mut buffer = Cursor::new(Vec::new());
    writer::xlsx::write_writer(&book, &mut buffer)
        .map_err(|e| CodecError::XlsxWrite(e.to_string()))?;

    Ok(Encoded {
        bytes: buffer.into_inner(),
        formatted_columns,
    })
}

fn write_cells(sheet: &mut Worksheet, table: &Table) {
    // Excel uses 1-based indexing
    for (col_idx, header) in table.columns().iter().enumerate() {
        let col_num = (col_idx + 1) as u32;
        sheet.get_cell_mut((col_num, 1)).set_value_string(header);
    }

    // Readers size the sheet from its last non-empty cell, so an empty
    // bottom-right cell gets a blank string to keep trailing empty rows and
    // columns. `decode_xlsx` reads blank strings back as empty cells.
    let last_row = table.row_count() as u32 + 1;
    let last_col = table.col_count() as u32;
    if table.row_count() > 0
        && last_col > 0
        && table.get(table.row_count() - 1, table.col_count() - 1) == Some(&CellValue::Empty)
    {
        sheet.get_cell_mut((last_col, last_row)).set_value_string("");
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let row_num = row_idx as u32 + 2;

        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = (col_idx + 1) as u32;

            match cell {
                CellValue::Empty => {}
                CellValue::String(s) => {
                    sheet.get_cell_mut((col_num, row_num)).set_value_string(s);
                }
                CellValue::Number(n) => {
                    sheet.get_cell_mut((col_num, row_num)).set_value_number(*n);
                }
                CellValue::Boolean(b) => {
                    sheet.get_cell_mut((col_num, row_num)).set_value_bool(*b);
                }
                CellValue::DateTime(dt) => {
                    let cell = sheet.get_cell_mut((col_num, row_num));
                    match excel_serial(dt) {
                        Some(serial) => {
                            cell.set_value_number(serial);
                            cell.get_style_mut()
                                .get_number_format_mut()
                                .set_format_code(DATETIME_FORMAT_CODE);
                        }
                        // Not a date we can place on the Excel calendar
                        None => {
                            cell.set_value_string(dt);
                        }
                    }
                }
                CellValue::Error(e) => {
                    // Can't really set an error value, so set as string
                    sheet
                        .get_cell_mut((col_num, row_num))
                        .set_value_string(format!("#{}", e));
                }
            }
        }
    }
}

/// Decode the first sheet of a workbook; row 1 names the columns
pub fn decode_xlsx(path: &Path) -> Result<Table, CodecError> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| CodecError::XlsxRead(e.to_string()))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(CodecError::EmptyWorkbook)?;

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| CodecError::XlsxRead(format!("Failed to read sheet '{}': {}", first, e)))?;

    // Absolute positions, so leading empty rows/columns keep their place
    let Some((last_row, last_col)) = range.end() else {
        return Ok(Table::default());
    };

    let columns: Vec<String> = (0..=last_col)
        .map(|col| convert_cell_value(range.get_value((0, col))).to_text())
        .collect();

    let rows: Vec<Vec<CellValue>> = (1..=last_row)
        .map(|row| {
            (0..=last_col)
                .map(|col| convert_cell_value(range.get_value((row, col))))
                .collect()
        })
        .collect();

    Ok(Table::new(columns, rows))
}

/// Convert calamine Data to our CellValue
fn convert_cell_value(cell: Option<&Data>) -> CellValue {
    match cell {
        None => CellValue::Empty,
        Some(data) => match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) if s.is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => CellValue::DateTime(format_excel_datetime(dt.as_f64())),
            Data::DateTimeIso(s) => CellValue::DateTime(s.clone()),
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        },
    }
}

fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Parse an ISO 8601 date or datetime into an Excel serial (days since
/// 1899-12-30, time of day as the fraction)
fn excel_serial(text: &str) -> Option<f64> {
    let datetime = NaiveDateTime::parse_from_str(text, ISO_DATETIME)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })?;

    let elapsed = datetime.signed_duration_since(excel_epoch()?);
    let serial = elapsed.num_milliseconds() as f64 / 86_400_000.0;
    (serial >= 0.0).then_some(serial)
}

/// Format Excel datetime (days since 1899-12-30) to ISO 8601
fn format_excel_datetime(value: f64) -> String {
    let days = value.floor() as i64;
    let total_seconds = ((value.fract() * 86400.0).round() as u32).min(86_399);

    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return value.to_string();
    };
    let date = epoch + chrono::Duration::days(days);

    let time = chrono::NaiveTime::from_hms_opt(
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
    )
    .unwrap_or_default();

    NaiveDateTime::new(date, time)
        .format(ISO_DATETIME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_excel_datetime() {
        assert_eq!(format_excel_datetime(1.0), "1899-12-31T00:00:00");
        assert_eq!(format_excel_datetime(45000.5), "2023-03-15T12:00:00");
    }

    #[test]
    fn test_encoded_workbook_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let table = Table::new(
            vec!["sku".into(), "price".into(), "in_stock".into()],
            vec![
                vec!["A-1".into(), 9.99.into(), true.into()],
                vec!["B-2".into(), CellValue::Empty, false.into()],
            ],
        );

        std::fs::write(&path, encode_xlsx(&table, None).unwrap().bytes).unwrap();
        assert_eq!(decode_xlsx(&path).unwrap(), table);
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(excel_serial("2023-03-15T12:00:00"), Some(45000.5));
        assert_eq!(excel_serial("2023-03-15"), Some(45000.0));
        assert_eq!(excel_serial("1800-01-01"), None);
        assert_eq!(excel_serial("next tuesday"), None);
    }

    #[test]
    fn test_datetime_cells_stay_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dates.xlsx");

        let table = Table::new(
            vec!["when".into(), "label".into()],
            vec![
                vec![CellValue::DateTime("2023-03-15T12:00:00".into()), "noon".into()],
                vec![CellValue::DateTime("2024-02-29T00:00:00".into()), "leap".into()],
            ],
        );

        std::fs::write(&path, encode_xlsx(&table, None).unwrap().bytes).unwrap();
        assert_eq!(decode_xlsx(&path).unwrap(), table);
    }

    #[test]
    fn test_trailing_empty_rows_and_columns_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.xlsx");

        let table = Table::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                vec![1.0.into(), 2.0.into(), CellValue::Empty],
                vec![CellValue::Empty, CellValue::Empty, CellValue::Empty],
            ],
        );

        std::fs::write(&path, encode_xlsx(&table, None).unwrap().bytes).unwrap();
        let reloaded = decode_xlsx(&path).unwrap();

        assert_eq!(reloaded.row_count(), 2);
        assert_eq!(reloaded.col_count(), 3);
        assert_eq!(reloaded, table);
    }

    #[test]
    fn test_profile_sheet_name_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("named.xlsx");

        let table = Table::new(vec!["a".into()], vec![vec![1.0.into()]]);
        let profile = FormatProfile {
            sheet_name: Some("Inventory".to_string()),
            ..FormatProfile::default()
        };

        std::fs::write(&path, encode_xlsx(&table, Some(&profile)).unwrap().bytes).unwrap();

        let recovered = FormatProfile::read_from(&path).unwrap();
        assert_eq!(recovered.sheet_name.as_deref(), Some("Inventory"));
        assert_eq!(decode_xlsx(&path).unwrap(), table);
    }
}
