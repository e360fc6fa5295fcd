//! File parsing into generic row records
//!
//! Turns raw uploaded bytes plus the declared extension into an ordered
//! sequence of string-keyed rows. CSV is streamed in file order; XLSX/XLS
//! reads the first worksheet only and converts it wholesale — additional
//! worksheets are ignored (documented limitation). Row numbers reported
//! by the pipeline are 1-based positions in the returned sequence.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::types::ParseError;

/// One parsed input row: lowercased column header -> raw cell text.
///
/// Blank cells are not stored, so `get` returning `None` means "the source
/// omitted this field" — the distinction the parent-reference rule needs.
#[derive(Debug, Clone, Default)]
pub struct RowRecord {
    values: HashMap<String, String>,
}

impl RowRecord {
    pub fn set(&mut self, column: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.values.insert(column.to_string(), value.to_string());
        }
    }

    /// Trimmed cell value; `None` when the column is absent or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut row = RowRecord::default();
        for (column, value) in pairs {
            row.set(column, value);
        }
        row
    }
}

/// Parse file bytes into rows based on the declared extension.
pub fn parse(bytes: &[u8], extension: &str) -> Result<Vec<RowRecord>, ParseError> {
    match extension.trim_start_matches('.').to_lowercase().as_str() {
        "csv" => parse_csv(bytes),
        "xlsx" | "xls" => parse_workbook(bytes),
        other => Err(ParseError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RowRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Malformed {
            kind: "csv",
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed {
            kind: "csv",
            message: e.to_string(),
        })?;
        let mut row = RowRecord::default();
        for (idx, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                if !header.is_empty() {
                    row.set(header, value);
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<RowRecord>, ParseError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| ParseError::Malformed {
        kind: "workbook",
        message: e.to_string(),
    })?;

    // First worksheet only; the rest are ignored.
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            return Err(ParseError::Malformed {
                kind: "workbook",
                message: e.to_string(),
            })
        }
        None => return Ok(Vec::new()),
    };

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| cell_text(cell).trim().to_lowercase())
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for cells in row_iter {
        let mut row = RowRecord::default();
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                if !header.is_empty() {
                    row.set(header, &cell_text(cell));
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Excel stores most numbers as floats; render whole values as integers
        // so codes like 4012 do not become "4012.0".
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_keep_file_order() {
        let csv = b"code,name\nLOC-a,Hall A\nLOC-b,Hall B\nLOC-c,Hall C\n";
        let rows = parse(csv, "csv").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("code"), Some("LOC-a"));
        assert_eq!(rows[1].get("name"), Some("Hall B"));
        assert_eq!(rows[2].get("code"), Some("LOC-c"));
    }

    #[test]
    fn test_csv_headers_are_lowercased() {
        let csv = b"Code,NAME\nLOC-a,Hall A\n";
        let rows = parse(csv, "csv").unwrap();
        assert_eq!(rows[0].get("code"), Some("LOC-a"));
        assert_eq!(rows[0].get("name"), Some("Hall A"));
    }

    #[test]
    fn test_csv_blank_cells_read_as_absent() {
        let csv = b"code,name,parent\nLOC-a,Hall A,\n";
        let rows = parse(csv, "csv").unwrap();
        assert_eq!(rows[0].get("parent"), None);
    }

    #[test]
    fn test_empty_file_yields_no_rows() {
        let rows = parse(b"", "csv").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_header_only_file_yields_no_rows() {
        let rows = parse(b"code,name\n", "csv").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let err = parse(b"whatever", "pdf").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(ext) if ext == "pdf"));
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let rows = parse(b"code\nLOC-a\n", "CSV").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let csv = b"code,name,description\nLOC-a,Hall A\n";
        let rows = parse(csv, "csv").unwrap();
        assert_eq!(rows[0].get("name"), Some("Hall A"));
        assert_eq!(rows[0].get("description"), None);
    }

    #[test]
    fn test_corrupt_workbook_is_malformed() {
        let err = parse(b"definitely not a zip archive", "xlsx").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { kind: "workbook", .. }));
    }

    #[test]
    fn test_cell_text_renders_whole_floats_as_integers() {
        assert_eq!(cell_text(&Data::Float(4012.0)), "4012");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
