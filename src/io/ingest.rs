//! CSV ingest.
//!
//! Sweep files have one row per frequency point:
//!
//! ```text
//! frequency,re,im[,re_error,im_error]
//! ```
//!
//! `real`/`imag` are accepted for the data columns and `real_error`/`imag_error`
//! for the errors. Continuous-wave files carry the same data columns; their
//! frequency is given separately. An error of `inf` excludes a point from
//! the fit.
//!
//! Rows that fail to parse are skipped and reported with their line number,
//! so one bad row does not discard a long acquisition.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use num_complex::Complex64;

use crate::domain::Measurement;
use crate::error::{AppError, ResonatorError};

const FREQUENCY: &[&str] = &["frequency", "freq", "f"];
const REAL: &[&str] = &["re", "real"];
const IMAG: &[&str] = &["im", "imag"];
const REAL_ERROR: &[&str] = &["re_error", "real_error"];
const IMAG_ERROR: &[&str] = &["im_error", "imag_error"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the validated measurement plus the rows that were skipped.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub measurement: Measurement,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedData {
    pub fn rows_used(&self) -> usize {
        self.measurement.len()
    }
}

/// Continuous-wave samples (no frequency column).
#[derive(Debug, Clone)]
pub struct IngestedCw {
    pub data: Vec<Complex64>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a sweep CSV from disk.
pub fn load_measurement(path: &Path) -> Result<IngestedData, AppError> {
    read_measurement(open(path)?)
}

/// Parse a sweep CSV.
pub fn read_measurement(reader: impl Read) -> Result<IngestedData, AppError> {
    let table = read_table(reader, true)?;
    let measurement = Measurement::from_parts(table.frequency, &table.real, table.imag.as_deref())?;
    let measurement = match table.real_error {
        Some(real_error) => measurement.with_error_parts(&real_error, table.imag_error.as_deref())?,
        None if table.imag_error.is_some() => {
            return Err(AppError::new(2, "Column `im_error` requires a matching `re_error` column."));
        }
        None => measurement,
    };
    Ok(IngestedData {
        measurement,
        row_errors: table.row_errors,
        rows_read: table.rows_read,
    })
}

/// Load a continuous-wave CSV from disk.
pub fn load_cw(path: &Path) -> Result<IngestedCw, AppError> {
    read_cw(open(path)?)
}

/// Parse a continuous-wave CSV.
pub fn read_cw(reader: impl Read) -> Result<IngestedCw, AppError> {
    let table = read_table(reader, false)?;
    let imag = table.imag.ok_or(ResonatorError::NotComplex("data"))?;
    if table.real.is_empty() {
        return Err(AppError::new(3, "No valid rows in continuous-wave CSV."));
    }
    let data = table
        .real
        .iter()
        .zip(&imag)
        .map(|(&re, &im)| Complex64::new(re, im))
        .collect();
    Ok(IngestedCw {
        data,
        row_errors: table.row_errors,
        rows_read: table.rows_read,
    })
}

fn open(path: &Path) -> Result<File, AppError> {
    File::open(path).map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))
}

#[derive(Debug, Default)]
struct Table {
    frequency: Vec<f64>,
    real: Vec<f64>,
    imag: Option<Vec<f64>>,
    real_error: Option<Vec<f64>>,
    imag_error: Option<Vec<f64>>,
    row_errors: Vec<RowError>,
    rows_read: usize,
}

struct Columns {
    frequency: Option<usize>,
    real: usize,
    imag: Option<usize>,
    real_error: Option<usize>,
    imag_error: Option<usize>,
}

fn read_table(reader: impl Read, require_frequency: bool) -> Result<Table, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let frequency = find_column(&header_map, FREQUENCY);
    if require_frequency && frequency.is_none() {
        return Err(AppError::new(2, "Missing required column: `frequency`"));
    }
    let columns = Columns {
        frequency,
        real: find_column(&header_map, REAL)
            .ok_or_else(|| AppError::new(2, "Missing required column: `re`"))?,
        imag: find_column(&header_map, IMAG),
        real_error: find_column(&header_map, REAL_ERROR),
        imag_error: find_column(&header_map, IMAG_ERROR),
    };

    let mut table = Table {
        imag: columns.imag.map(|_| Vec::new()),
        real_error: columns.real_error.map(|_| Vec::new()),
        imag_error: columns.imag_error.map(|_| Vec::new()),
        ..Table::default()
    };

    for (idx, result) in reader.records().enumerate() {
        table.rows_read += 1;
        // File line from the reader, so comment lines are counted too.
        let position = match &result {
            Ok(record) => record.position(),
            Err(e) => e.position(),
        };
        let line = position.map_or(idx + 2, |p| p.line() as usize);
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &columns));
        match parsed {
            Ok(row) => table.push(row),
            Err(message) => table.row_errors.push(RowError { line, message }),
        }
    }

    if table.real.is_empty() {
        return Err(AppError::new(3, "No valid rows remain after parsing."));
    }
    Ok(table)
}

struct Row {
    frequency: Option<f64>,
    real: f64,
    imag: Option<f64>,
    real_error: Option<f64>,
    imag_error: Option<f64>,
}

impl Table {
    fn push(&mut self, row: Row) {
        if let Some(f) = row.frequency {
            self.frequency.push(f);
        }
        self.real.push(row.real);
        push_some(&mut self.imag, row.imag);
        push_some(&mut self.real_error, row.real_error);
        push_some(&mut self.imag_error, row.imag_error);
    }
}

fn push_some(column: &mut Option<Vec<f64>>, value: Option<f64>) {
    if let (Some(column), Some(value)) = (column.as_mut(), value) {
        column.push(value);
    }
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<Row, String> {
    let frequency = columns
        .frequency
        .map(|idx| parse_finite(record, idx, "frequency"))
        .transpose()?;
    if let Some(f) = frequency {
        if f <= 0.0 {
            return Err(format!("Frequency must be positive, got {f}"));
        }
    }
    Ok(Row {
        frequency,
        real: parse_finite(record, columns.real, "re")?,
        imag: columns.imag.map(|idx| parse_finite(record, idx, "im")).transpose()?,
        real_error: columns
            .real_error
            .map(|idx| parse_error(record, idx, "re_error"))
            .transpose()?,
        imag_error: columns
            .imag_error
            .map(|idx| parse_error(record, idx, "im_error"))
            .transpose()?,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn get_value<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_finite(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let s = get_value(record, idx, name)?;
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid `{name}` value '{s}'")),
    }
}

/// Errors may be `inf` but must be positive.
fn parse_error(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let s = get_value(record, idx, name)?;
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 => Ok(v),
        _ => Err(format!("Invalid `{name}` value '{s}': errors must be positive or inf")),
    }
}
