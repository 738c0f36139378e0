//! Conversion between table rows and delimited text lines.
//!
//! Writing: every non-empty text field is wrapped in double quotes with embedded
//! quotes doubled; other values are written in their canonical text form, quoted only
//! when they would otherwise break the line. Timestamps leave as epoch milliseconds
//! typed `Long`.
//!
//! Reading: standard delimited-text parsing with quote unescaping. Records shorter
//! than the expected width are padded with empty fields.

use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::{Column, CqlValue, DataTypeTag, Field};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Build the field for one source cell, narrowing timestamps to epoch milliseconds.
pub fn field_from_value(value: CqlValue, column: &Column) -> Field {
    match (value, column.data_type) {
        (CqlValue::Timestamp(instant), _) => Field::new(
            CqlValue::Int64(instant.timestamp_millis()),
            &column.name,
            DataTypeTag::Long,
        ),
        (value, DataTypeTag::Timestamp) => Field::new(value, &column.name, DataTypeTag::Long),
        (value, data_type) => Field::new(value, &column.name, data_type),
    }
}

/// Pair a source row with its columns.
pub fn fields_from_row(row: Vec<CqlValue>, columns: &[Column]) -> Vec<Field> {
    row.into_iter()
        .zip(columns)
        .map(|(value, column)| field_from_value(value, column))
        .collect()
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn needs_quoting(text: &str, delimiter: u8) -> bool {
    text.bytes()
        .any(|b| b == delimiter || b == b'"' || b == b'\n' || b == b'\r')
}

fn encode_field(field: &Field, delimiter: u8) -> String {
    let text = field.value.to_string();
    if text.is_empty() {
        return text;
    }
    if field.data_type == DataTypeTag::Text || needs_quoting(&text, delimiter) {
        quote(&text)
    } else {
        text
    }
}

/// Serialize one row to a line, without the line terminator.
pub fn encode_row(fields: &[Field], delimiter: u8) -> String {
    let separator = char::from(delimiter).to_string();
    fields
        .iter()
        .map(|f| encode_field(f, delimiter))
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Header line of column names.
pub fn encode_header(columns: &[Column], delimiter: u8) -> String {
    let separator = char::from(delimiter).to_string();
    columns
        .iter()
        .map(|c| {
            if needs_quoting(&c.name, delimiter) {
                quote(&c.name)
            } else {
                c.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Parse the first data record of `text` into raw field tokens.
///
/// With `has_header`, the first line is read as the header and skipped, and the record
/// is padded with empty tokens to the header's width. Text holding only a header, or
/// nothing at all, yields no tokens.
pub fn decode_line(text: &str, delimiter: u8, has_header: bool) -> MigrationResult<Vec<String>> {
    let mut reader = RecordReader::new(text.as_bytes(), delimiter, has_header, None)?;
    match reader.next() {
        Some(record) => record,
        None => Ok(Vec::new()),
    }
}

/// Streams records out of delimited text.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    expected_fields: Option<usize>,
    header: Option<Vec<String>>,
}

impl RecordReader<BufReader<File>> {
    /// Open a delimited file.
    ///
    /// Without a header, `expected_fields` sets the width short records are padded to.
    /// With a header, the header's width is used instead.
    pub fn open(
        path: &Path,
        delimiter: u8,
        has_header: bool,
        expected_fields: Option<usize>,
    ) -> MigrationResult<Self> {
        let file = File::open(path).map_err(|e| MigrationError::FileAccess {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        RecordReader::new(BufReader::new(file), delimiter, has_header, expected_fields)
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap any reader.
    pub fn new(
        source: R,
        delimiter: u8,
        has_header: bool,
        expected_fields: Option<usize>,
    ) -> MigrationResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .flexible(true)
            .from_reader(source);

        let header = if has_header {
            Some(reader.headers()?.iter().map(str::to_string).collect::<Vec<_>>())
        } else {
            None
        };
        let expected_fields = header.as_ref().map(Vec::len).or(expected_fields);

        Ok(RecordReader {
            reader,
            expected_fields,
            header,
        })
    }

    /// Column names from the header line, when the file has one.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = MigrationResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
                if let Some(width) = self.expected_fields {
                    if fields.len() < width {
                        fields.resize(width, String::new());
                    }
                }
                Some(Ok(fields))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
