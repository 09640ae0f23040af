//! Loader for the broker's account-statement export.
//!
//! The export comes either as an Excel workbook (`Account.xls`/`.xlsx`) or as
//! the equivalent CSV download. Both carry the same columns: booking date,
//! value date, time, product, description, optional FX rate, mutation
//! currency plus an unnamed amount column, and a running balance pair. The
//! loader remaps those broker-native headers to canonical [`LedgerRecord`]
//! fields through an explicit schema table, validated up front, and returns
//! the rows sorted ascending by booking date.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use models::LedgerRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("malformed ledger: required column '{column}' is missing")]
    MalformedLedger { column: String },
    #[error("malformed ledger: column '{column}', row {row}: {reason}")]
    MalformedCell {
        column: String,
        row: usize,
        reason: String,
    },
    #[error("statement contains no ledger rows")]
    EmptyStatement,
    #[error("unsupported statement format: {0}")]
    UnsupportedFormat(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
}

/// Version of the broker-header mapping below. Bumped whenever the broker
/// changes its export layout.
pub const SCHEMA_VERSION: u32 = 1;

const DATE_FORMAT: &str = "%d-%m-%Y";

const COL_BOOKING_DATE: &str = "Datum";
const COL_VALUE_DATE: &str = "Valutadatum";
const COL_PRODUCT: &str = "Product";
const COL_DESCRIPTION: &str = "Omschrijving";
const COL_FX: &str = "FX";
const COL_CURRENCY: &str = "Mutatie";
const COL_BALANCE: &str = "Saldo";

/// Resolved column indices for one statement. The amount and balance figures
/// live in unnamed columns directly after their currency headers; the schema
/// names them explicitly instead of relying on positional `Unnamed:` labels.
#[derive(Debug, Clone)]
struct ColumnMap {
    booking_date: usize,
    value_date: usize,
    product: usize,
    description: usize,
    fx: usize,
    currency: usize,
    amount: usize,
    #[allow(dead_code)]
    balance: usize,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self, StatementError> {
        let mut idx: HashMap<&str, usize> = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            let h = h.trim();
            if !h.is_empty() {
                idx.entry(h).or_insert(i);
            }
        }

        let named = |header: &str| -> Result<usize, StatementError> {
            idx.get(header)
                .copied()
                .ok_or_else(|| StatementError::MalformedLedger {
                    column: header.to_string(),
                })
        };
        // The figure sits in the unnamed column right of its currency header.
        let paired = |header: &str| -> Result<usize, StatementError> {
            let i = named(header)? + 1;
            if i >= headers.len() || !headers[i].trim().is_empty() {
                return Err(StatementError::MalformedLedger {
                    column: format!("{} (amount)", header),
                });
            }
            Ok(i)
        };

        Ok(ColumnMap {
            booking_date: named(COL_BOOKING_DATE)?,
            value_date: named(COL_VALUE_DATE)?,
            product: named(COL_PRODUCT)?,
            description: named(COL_DESCRIPTION)?,
            fx: named(COL_FX)?,
            currency: named(COL_CURRENCY)?,
            amount: paired(COL_CURRENCY)?,
            balance: paired(COL_BALANCE)?,
        })
    }
}

/// Loads a statement, dispatching on the file extension.
pub fn load_statement<P: AsRef<Path>>(path: P) -> Result<Vec<LedgerRecord>, StatementError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "csv" => load_csv_statement(path),
        "xls" | "xlsx" => load_workbook_statement(path),
        other => Err(StatementError::UnsupportedFormat(other.to_string())),
    }
}

/// Loads the Excel flavour of the export via calamine.
pub fn load_workbook_statement<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<LedgerRecord>, StatementError> {
    let mut workbook = open_workbook_auto(path.as_ref())?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(StatementError::EmptyStatement)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let rows: Vec<&[Data]> = range.rows().collect();
    let (header_idx, headers) = find_header_row(&rows)?;
    let map = ColumnMap::resolve(&headers)?;

    let mut records = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(header_idx + 1) {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        records.push(parse_workbook_row(row, &map, i + 1)?);
    }
    finish(records)
}

/// Loads the CSV flavour of the export.
pub fn load_csv_statement<P: AsRef<Path>>(path: P) -> Result<Vec<LedgerRecord>, StatementError> {
    let file = std::fs::File::open(path)?;
    load_csv_reader(file)
}

pub fn load_csv_reader<R: Read>(reader: R) -> Result<Vec<LedgerRecord>, StatementError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let map = ColumnMap::resolve(&headers)?;

    let mut records = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: Vec<&str> = rec.iter().collect();
        records.push(parse_text_row(&row, &map, i + 2)?);
    }
    finish(records)
}

fn finish(mut records: Vec<LedgerRecord>) -> Result<Vec<LedgerRecord>, StatementError> {
    if records.is_empty() {
        return Err(StatementError::EmptyStatement);
    }
    // Stable, so same-day rows keep the broker's original order.
    records.sort_by_key(|r| r.booking_date);
    Ok(records)
}

fn find_header_row(rows: &[&[Data]]) -> Result<(usize, Vec<String>), StatementError> {
    for (i, row) in rows.iter().enumerate().take(10) {
        let headers: Vec<String> = row.iter().map(cell_to_string).collect();
        if headers.iter().any(|h| h.trim() == COL_BOOKING_DATE) {
            return Ok((i, headers));
        }
    }
    Err(StatementError::MalformedLedger {
        column: COL_BOOKING_DATE.to_string(),
    })
}

fn parse_workbook_row(
    row: &[Data],
    map: &ColumnMap,
    row_no: usize,
) -> Result<LedgerRecord, StatementError> {
    let text = |col: usize| -> String {
        row.get(col).map(cell_to_string).unwrap_or_default().trim().to_string()
    };

    Ok(LedgerRecord {
        booking_date: parse_date_cell(row, map.booking_date, COL_BOOKING_DATE, row_no)?,
        value_date: parse_date_cell(row, map.value_date, COL_VALUE_DATE, row_no)?,
        description: text(map.description),
        product: text(map.product),
        amount: parse_amount_cell(row, map.amount, row_no)?.unwrap_or(0.0),
        currency: text(map.currency),
        fx_rate: parse_rate_cell(row, map.fx, row_no)?,
    })
}

fn parse_text_row(
    row: &[&str],
    map: &ColumnMap,
    row_no: usize,
) -> Result<LedgerRecord, StatementError> {
    let field = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");

    let date = |col: usize, name: &str| -> Result<NaiveDate, StatementError> {
        parse_date_text(field(col)).ok_or_else(|| StatementError::MalformedCell {
            column: name.to_string(),
            row: row_no,
            reason: format!("unparseable date '{}'", field(col)),
        })
    };
    let number = |col: usize, name: &str| -> Result<Option<f64>, StatementError> {
        let raw = field(col);
        if raw.is_empty() {
            return Ok(None);
        }
        parse_comma_decimal(raw)
            .map(Some)
            .ok_or_else(|| StatementError::MalformedCell {
                column: name.to_string(),
                row: row_no,
                reason: format!("unparseable number '{}'", raw),
            })
    };

    Ok(LedgerRecord {
        booking_date: date(map.booking_date, COL_BOOKING_DATE)?,
        value_date: date(map.value_date, COL_VALUE_DATE)?,
        description: field(map.description).to_string(),
        product: field(map.product).to_string(),
        amount: number(map.amount, COL_CURRENCY)?.unwrap_or(0.0),
        currency: field(map.currency).to_string(),
        fx_rate: number(map.fx, COL_FX)?,
    })
}

// ------------------------
// Cell coercion helpers
// ------------------------

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn parse_date_cell(
    row: &[Data],
    col: usize,
    name: &str,
    row_no: usize,
) -> Result<NaiveDate, StatementError> {
    let bad = |reason: String| StatementError::MalformedCell {
        column: name.to_string(),
        row: row_no,
        reason,
    };

    match row.get(col) {
        Some(Data::String(s)) => {
            parse_date_text(s).ok_or_else(|| bad(format!("unparseable date '{}'", s)))
        }
        Some(Data::DateTime(dt)) => {
            excel_serial_date(dt.as_f64()).ok_or_else(|| bad("date out of range".to_string()))
        }
        Some(Data::Float(f)) => {
            excel_serial_date(*f).ok_or_else(|| bad("date out of range".to_string()))
        }
        Some(Data::Int(i)) => {
            excel_serial_date(*i as f64).ok_or_else(|| bad("date out of range".to_string()))
        }
        other => Err(bad(format!("unsupported date cell {:?}", other))),
    }
}

/// Excel serial dates count days from 1899-12-30.
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d"))
        .ok()
}

fn parse_amount_cell(
    row: &[Data],
    col: usize,
    row_no: usize,
) -> Result<Option<f64>, StatementError> {
    parse_number_cell(row, col, COL_CURRENCY, row_no)
}

fn parse_rate_cell(row: &[Data], col: usize, row_no: usize) -> Result<Option<f64>, StatementError> {
    parse_number_cell(row, col, COL_FX, row_no)
}

fn parse_number_cell(
    row: &[Data],
    col: usize,
    name: &str,
    row_no: usize,
) -> Result<Option<f64>, StatementError> {
    match row.get(col) {
        Some(Data::Float(f)) => Ok(Some(*f)),
        Some(Data::Int(i)) => Ok(Some(*i as f64)),
        Some(Data::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Data::String(s)) => {
            parse_comma_decimal(s).map(Some).ok_or_else(|| {
                StatementError::MalformedCell {
                    column: name.to_string(),
                    row: row_no,
                    reason: format!("unparseable number '{}'", s),
                }
            })
        }
        Some(Data::Empty) | None => Ok(None),
        other => Err(StatementError::MalformedCell {
            column: name.to_string(),
            row: row_no,
            reason: format!("unsupported number cell {:?}", other),
        }),
    }
}

/// Parses the broker's comma-decimal convention: `.` groups thousands,
/// `,` separates decimals (e.g. "1.234,56").
pub fn parse_comma_decimal(s: &str) -> Option<f64> {
    let cleaned = s
        .trim()
        .replace(' ', "")
        .replace('\u{A0}', "")
        .replace('.', "")
        .replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}
