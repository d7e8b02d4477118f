use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use std::{borrow::Cow, path::Path};

use crate::processor::{
    DashboardError, Dimension, Measure, ORDER_DATE, ParseError,
    dataset::{RowBatch, SchemaMap, parse_date, parse_measure},
};

/// Day zero of the 1900 date system as Excel counts it (leap-year bug included).
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Reads one sheet (the first when `sheet` is `None`) into a single batch.
///
/// Row numbers in rejected rows are 1-based sheet rows, counted from the top of
/// the sheet even when the header sits below blank rows.
pub(crate) fn read_sheet(
    path: &Path,
    sheet: Option<&str>,
) -> Result<RowBatch<'static>, DashboardError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.as_str() == name)
            .cloned()
            .ok_or_else(|| DashboardError::Parse(format!("sheet '{name}' not found")))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| DashboardError::Parse("workbook contains no sheets".to_string()))?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    // zero-based sheet row of the header
    let header_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range.rows();

    let headers: Vec<String> = rows
        .next()
        .ok_or(DashboardError::EmptyDataset)?
        .iter()
        .map(cell_text)
        .collect();
    let schema = SchemaMap::resolve(headers.as_slice())?;

    let mut batch = RowBatch::with_capacity(range.height().saturating_sub(1));

    for (idx, row) in rows.enumerate() {
        let row_number = header_row + idx + 2;

        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }

        let cell = |col: usize| row.get(col).unwrap_or(&Data::Empty);

        let Some(date) = cell_date(cell(schema.date)) else {
            batch.reject(ParseError {
                row: row_number,
                column: ORDER_DATE.to_string(),
                value: cell_text(cell(schema.date)),
                reason: "unrecognised date".to_string(),
            });
            continue;
        };

        let dimensions =
            Dimension::ALL.map(|d| Cow::Owned(cell_text(cell(schema.dimensions[d.index()]))));
        let measures = Measure::ALL.map(|m| cell_number(cell(schema.measures[m.index()])));
        batch.push(date, dimensions, measures);
    }

    Ok(batch)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        // whole numbers (e.g. postal codes, numeric names) render without a fraction
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn cell_number(cell: &Data) -> f64 {
    match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => parse_measure(s),
        _ => f64::NAN,
    }
}

fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => serial_to_date(dt.as_f64()),
        Data::Float(f) => serial_to_date(*f),
        Data::Int(i) => serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date(s),
        _ => None,
    }
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    excel_epoch().checked_add_signed(Duration::days(serial.trunc() as i64))
}
