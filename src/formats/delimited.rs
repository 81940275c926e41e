use std::io::Read;

use crate::error::CodecError;
use crate::table::{CellValue, Table};

/// Encode a table as delimited text with a header row
pub fn encode_csv(table: &Table, delimiter: u8) -> Result<Vec<u8>, CodecError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(table.columns())?;

    for row in table.rows() {
        writer.write_record(row.iter().map(CellValue::to_text))?;
    }

    writer
        .into_inner()
        .map_err(|e| CodecError::Io(e.into_error()))
}

/// Decode delimited text; the first record names the columns
pub fn decode_csv<R: Read>(reader: R, delimiter: u8) -> Result<Table, CodecError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        // Tolerate ragged rows; Table pads or cuts them to the header width.
        .flexible(true)
        .from_reader(reader);

    let mut records = csv_reader.records();

    let columns: Vec<String> = match records.next() {
        Some(header) => header?.iter().map(str::to_string).collect(),
        None => return Ok(Table::default()),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(record.iter().map(CellValue::infer).collect());
    }

    Ok(Table::new(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["name".into(), "qty".into(), "active".into(), "note".into()],
            vec![
                vec!["widget".into(), 3.0.into(), true.into(), CellValue::Empty],
                vec!["gadget, large".into(), 2.5.into(), false.into(), "says \"hi\"".into()],
            ],
        )
    }

    #[test]
    fn test_encode_quotes_delimiters_and_quotes() {
        let bytes = encode_csv(&sample(), b',').unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(
            text,
            "name,qty,active,note\nwidget,3,TRUE,\n\"gadget, large\",2.5,FALSE,\"says \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_decode_restores_typed_cells() {
        let bytes = encode_csv(&sample(), b';').unwrap();
        let table = decode_csv(bytes.as_slice(), b';').unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_text_that_reads_as_another_type_is_retyped() {
        // CSV carries no types: a string is only a string if it could not be
        // anything else
        let table = Table::new(
            vec!["zip".into(), "flag".into(), "when".into(), "blank".into(), "name".into()],
            vec![vec![
                "02134".into(),
                "true".into(),
                CellValue::DateTime("2023-03-15T12:00:00".into()),
                "".into(),
                "Ada".into(),
            ]],
        );

        let bytes = encode_csv(&table, b',').unwrap();
        let reloaded = decode_csv(bytes.as_slice(), b',').unwrap();

        assert_eq!(
            reloaded.rows()[0],
            vec![
                CellValue::Number(2134.0),
                CellValue::Boolean(true),
                CellValue::String("2023-03-15T12:00:00".into()),
                CellValue::Empty,
                CellValue::String("Ada".into()),
            ]
        );
    }

    #[test]
    fn test_decode_empty_input_is_empty_table() {
        let table = decode_csv("".as_bytes(), b',').unwrap();
        assert_eq!(table.col_count(), 0);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_decode_ragged_rows() {
        let table = decode_csv("a,b\n1\n1,2,3\n".as_bytes(), b',').unwrap();
        assert_eq!(table.rows()[0], vec![CellValue::Number(1.0), CellValue::Empty]);
        assert_eq!(table.rows()[1], vec![CellValue::Number(1.0), CellValue::Number(2.0)]);
    }
}
