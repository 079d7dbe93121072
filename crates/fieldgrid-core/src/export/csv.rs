//! CSV file boundary for materialized rows.

use crate::export::{ExportError, Row};
use ::csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::{Read, Write};

///
/// CsvOptions
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub include_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_header: true,
        }
    }
}

impl CsvOptions {
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Write a header (when enabled) and every row. Cells containing the
/// delimiter, quotes or newlines are quoted. Returns the data rows written.
pub fn write_rows<W: Write>(
    out: W,
    headers: &[String],
    rows: &[Row],
    options: CsvOptions,
) -> Result<u64, ExportError> {
    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(out);

    if options.include_header {
        writer.write_record(headers)?;
    }

    let mut written = 0u64;
    for (index, row) in rows.iter().enumerate() {
        if row.cells.len() != headers.len() {
            return Err(ExportError::CellCount {
                line: index as u64 + 1,
                expected: headers.len(),
                found: row.cells.len(),
            });
        }
        writer.write_record(&row.cells)?;
        written += 1;
    }
    writer.flush()?;

    Ok(written)
}

///
/// CsvTable
///
/// A parsed file: the header row and the data rows, all as strings.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read a headed file. Every data row must have as many cells as the header.
pub fn read_table<R: Read>(input: R, options: CsvOptions) -> Result<CsvTable, ExportError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = record_cells(reader.headers()?);
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(ExportError::CellCount {
                line: index as u64 + 2,
                expected: headers.len(),
                found: record.len(),
            });
        }
        rows.push(record_cells(&record));
    }

    Ok(CsvTable { headers, rows })
}

fn record_cells(record: &StringRecord) -> Vec<String> {
    record.iter().map(|cell| cell.trim().to_string()).collect()
}
