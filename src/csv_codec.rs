use crate::value::{coerce, Table};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("CSV data has no header record")]
    MissingHeader,

    #[error("CSV header names column '{0}' more than once")]
    DuplicateColumn(String),
}

/// Writes the header record followed by one record per row, each ending in `\n`.
pub fn encode_table(table: &Table) -> Result<String, CodecError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|field| field.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| io::Error::new(e.error().kind(), e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Reads a table: the first record names the columns, every later record is a
/// row whose fields go through `coerce`.
pub fn decode_table(text: &str) -> Result<Table, CodecError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = records.next().ok_or(CodecError::MissingHeader)??;
    let columns: Vec<String> = header.iter().map(str::to_string).collect();
    if let Some(column) = Table::duplicate_column(&columns) {
        return Err(CodecError::DuplicateColumn(column.to_string()));
    }

    let mut table = Table::new(columns);
    for record in records {
        let record = record?;
        table.push_row(record.iter().map(coerce).collect());
    }

    Ok(table)
}
