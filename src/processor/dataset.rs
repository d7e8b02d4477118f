use chrono::{Datelike, NaiveDate};
use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{borrow::Cow, fs::File, path::Path};
use tracing::{info, warn};

use crate::processor::{
    DashboardError, Dimension, Measure, ORDER_DATE, ParseError, ParseSummary, Record,
    column::{Column, ColumnType},
    workbook,
};

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];

/// Positions of the required columns inside a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SchemaMap {
    pub(crate) date: usize,
    pub(crate) dimensions: [usize; 8],
    pub(crate) measures: [usize; 3],
    pub(crate) width: usize,
}

impl SchemaMap {
    /// Resolves every required header; any absent one is a fatal schema error.
    pub(crate) fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, DashboardError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.as_ref().trim().trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| DashboardError::MissingColumn(name.to_string()))
        };

        let date = find(ORDER_DATE)?;
        let mut dimensions = [0usize; 8];
        for dim in Dimension::ALL {
            dimensions[dim.index()] = find(dim.header())?;
        }
        let mut measures = [0usize; 3];
        for m in Measure::ALL {
            measures[m.index()] = find(m.header())?;
        }

        Ok(SchemaMap {
            date,
            dimensions,
            measures,
            width: headers.len(),
        })
    }
}

/// Rows parsed by one worker, in input order.
pub(crate) struct RowBatch<'a> {
    dates: Vec<i64>,
    dimensions: Vec<Vec<Cow<'a, str>>>,
    measures: Vec<Vec<f64>>,
    /// Lines consumed by this batch, kept or not
    lines: usize,
    errors: Vec<ParseError>,
}

impl<'a> RowBatch<'a> {
    pub(crate) fn with_capacity(rows: usize) -> Self {
        RowBatch {
            dates: Vec::with_capacity(rows),
            dimensions: (0..Dimension::ALL.len())
                .map(|_| Vec::with_capacity(rows))
                .collect(),
            measures: (0..Measure::ALL.len())
                .map(|_| Vec::with_capacity(rows))
                .collect(),
            lines: 0,
            errors: Vec::new(),
        }
    }

    /// Pushes one row of raw text fields laid out as `schema` says.
    ///
    /// A row whose order date cannot be read is rejected; unreadable measures
    /// are kept as `NaN`.
    pub(crate) fn push_fields(
        &mut self,
        fields: Vec<Cow<'a, str>>,
        schema: &SchemaMap,
        row: usize,
    ) {
        self.lines += 1;

        if fields.len() != schema.width {
            self.errors.push(ParseError {
                row,
                column: String::new(),
                value: String::new(),
                reason: format!("Expected {} fields, got {}", schema.width, fields.len()),
            });
            return;
        }

        let Some(date) = parse_date(&fields[schema.date]) else {
            self.errors.push(ParseError {
                row,
                column: ORDER_DATE.to_string(),
                value: fields[schema.date].to_string(),
                reason: "unrecognised date".to_string(),
            });
            return;
        };

        let measures = schema.measures.map(|idx| parse_measure(&fields[idx]));
        let mut fields: Vec<Option<Cow<'a, str>>> = fields.into_iter().map(Some).collect();
        let dimensions = schema
            .dimensions
            .map(|idx| trim_field(fields[idx].take().unwrap_or(Cow::Borrowed(""))));
        self.push(date, dimensions, measures);
    }

    /// Pushes one already-typed row.
    pub(crate) fn push(
        &mut self,
        date: NaiveDate,
        dimensions: [Cow<'a, str>; 8],
        measures: [f64; 3],
    ) {
        self.dates.push(date.num_days_from_ce() as i64);
        for (col, value) in self.dimensions.iter_mut().zip(dimensions) {
            col.push(value);
        }
        for (col, value) in self.measures.iter_mut().zip(measures) {
            col.push(value);
        }
    }

    pub(crate) fn reject(&mut self, error: ParseError) {
        self.lines += 1;
        self.errors.push(error);
    }

    fn row_count(&self) -> usize {
        self.dates.len()
    }
}

/// The immutable, columnar sales table of one session.
#[derive(Debug)]
pub struct Dataset {
    dates: Column,
    dimensions: Vec<Column>,
    measures: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Loads any supported file, picking the reader from the extension.
    ///
    /// `.csv` goes through the memory-mapped reader; spreadsheet formats
    /// (`xlsx`, `xlsm`, `xlsb`, `xls`, `ods`) go through calamine, reading
    /// `sheet` or the first sheet.
    pub fn load(path: &Path, sheet: Option<&str>) -> Result<(Self, ParseSummary), DashboardError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "txt" => Self::load_csv(path),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::load_workbook(path, sheet),
            other => Err(DashboardError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Loads a CSV file into memory using memory mapping
    ///
    /// Lines are split into newline-aligned chunks that are parsed in
    /// parallel; per-row problems are collected into the returned
    /// [`ParseSummary`] instead of aborting the load.
    ///
    /// # Errors
    /// Returns a [`DashboardError`] if:
    /// - File cannot be opened or mapped
    /// - A required column is missing from the header
    /// - No row survives parsing
    pub fn load_csv(path: &Path) -> Result<(Self, ParseSummary), DashboardError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap[..];

        // Parse header
        let header_end = memchr(b'\n', buf).unwrap_or(buf.len());
        let mut header_fields = Vec::new();
        split_fields(trim_line(&buf[..header_end]), &mut header_fields);
        let headers: Vec<Cow<'_, str>> = header_fields.into_iter().map(field_str).collect();
        let schema = SchemaMap::resolve(headers.as_slice())?;

        let data = if header_end < buf.len() {
            &buf[header_end + 1..]
        } else {
            &[][..]
        };

        let num_threads = rayon::current_num_threads().max(1);
        let chunks = find_chunk_boundaries(data, num_threads);

        // Estimate rows per chunk for preallocation
        let estimated_rows_per_chunk = {
            let avg_line_len = header_end.max(16) + 1;
            data.len() / num_threads / avg_line_len + 16
        };

        let mut batches: Vec<RowBatch<'_>> = chunks
            .par_iter()
            .map(|(start, end)| parse_chunk(&data[*start..*end], &schema, estimated_rows_per_chunk))
            .collect();

        // Chunk-local line numbers become file line numbers (header is line 1)
        let mut first_line = 2;
        for batch in &mut batches {
            for err in &mut batch.errors {
                err.row += first_line;
            }
            first_line += batch.lines;
        }

        let (dataset, summary) = Self::from_batches(batches)?;
        info!(
            path = %path.display(),
            rows = summary.rows_processed,
            rejected = summary.errors.len(),
            "loaded CSV dataset"
        );
        Ok((dataset, summary))
    }

    /// Loads a spreadsheet workbook through calamine.
    pub fn load_workbook(
        path: &Path,
        sheet: Option<&str>,
    ) -> Result<(Self, ParseSummary), DashboardError> {
        let batch = workbook::read_sheet(path, sheet)?;
        let (dataset, summary) = Self::from_batches(vec![batch])?;
        info!(
            path = %path.display(),
            rows = summary.rows_processed,
            rejected = summary.errors.len(),
            "loaded workbook dataset"
        );
        Ok((dataset, summary))
    }

    /// Builds a dataset from owned records, keeping their order.
    pub fn from_records(records: &[Record]) -> Result<Self, DashboardError> {
        let mut batch = RowBatch::with_capacity(records.len());
        for r in records {
            let dimensions = Dimension::ALL.map(|d| Cow::Borrowed(r.dimension(d)));
            let measures = Measure::ALL.map(|m| r.measure(m));
            batch.lines += 1;
            batch.push(r.order_date, dimensions, measures);
        }
        Self::from_batches(vec![batch]).map(|(dataset, _)| dataset)
    }

    /// Merges per-worker batches in order into flat columns.
    pub(crate) fn from_batches(
        batches: Vec<RowBatch<'_>>,
    ) -> Result<(Self, ParseSummary), DashboardError> {
        let mut dates = Column::new(ColumnType::Date);
        let mut dimensions: Vec<Column> = Dimension::ALL
            .iter()
            .map(|_| Column::new(ColumnType::Str))
            .collect();
        let mut measures: Vec<Column> = Measure::ALL
            .iter()
            .map(|_| Column::new(ColumnType::Float64))
            .collect();

        let mut total_rows = 0;
        let mut all_errors = Vec::new();

        for batch in batches {
            total_rows += batch.row_count();
            all_errors.extend(batch.errors);

            dates.push_chunk_date(batch.dates);
            for (col, values) in dimensions.iter_mut().zip(&batch.dimensions) {
                col.push_chunk_str(values.as_slice());
            }
            for (col, values) in measures.iter_mut().zip(batch.measures) {
                col.push_chunk_f64(values);
            }
        }

        for err in &all_errors {
            warn!(
                row = err.row,
                column = %err.column,
                value = %err.value,
                reason = %err.reason,
                "skipped row"
            );
        }

        if total_rows == 0 {
            return Err(DashboardError::EmptyDataset);
        }

        dates.flatten_in_place();
        dimensions.iter_mut().for_each(Column::flatten_in_place);
        measures.iter_mut().for_each(Column::flatten_in_place);

        Ok((
            Dataset {
                dates,
                dimensions,
                measures,
                row_count: total_rows,
            },
            ParseSummary {
                rows_processed: total_rows,
                errors: all_errors,
            },
        ))
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Order dates as day numbers, one per row.
    pub fn dates(&self) -> &[i64] {
        self.dates.dates()
    }

    pub fn order_date(&self, row: usize) -> NaiveDate {
        days_to_date(self.dates()[row])
    }

    /// Dictionary codes of a categorical column, one per row.
    pub fn codes(&self, dimension: Dimension) -> &[u32] {
        self.dimensions[dimension.index()].codes()
    }

    /// Distinct values of a categorical column in first-occurrence order.
    pub fn dictionary(&self, dimension: Dimension) -> &[String] {
        self.dimensions[dimension.index()].dictionary()
    }

    pub fn code_of(&self, dimension: Dimension, value: &str) -> Option<u32> {
        self.dimensions[dimension.index()].code_of(value)
    }

    pub fn value(&self, dimension: Dimension, row: usize) -> &str {
        let code = self.codes(dimension)[row];
        &self.dictionary(dimension)[code as usize]
    }

    pub fn measures(&self, measure: Measure) -> &[f64] {
        self.measures[measure.index()].values_f64()
    }

    pub fn measure(&self, measure: Measure, row: usize) -> f64 {
        self.measures(measure)[row]
    }

    pub fn record(&self, row: usize) -> RecordRef<'_> {
        RecordRef { dataset: self, row }
    }

    /// Earliest and latest order date; the defaults of the date pickers.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.dates().iter().copied().min()?;
        let max = self.dates().iter().copied().max()?;
        Some((days_to_date(min), days_to_date(max)))
    }
}

/// Borrowed view of one dataset row.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    dataset: &'a Dataset,
    row: usize,
}

impl<'a> RecordRef<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn order_date(&self) -> NaiveDate {
        self.dataset.order_date(self.row)
    }

    pub fn dimension(&self, dimension: Dimension) -> &'a str {
        self.dataset.value(dimension, self.row)
    }

    pub fn measure(&self, measure: Measure) -> f64 {
        self.dataset.measure(measure, self.row)
    }

    #[cfg(test)]
    pub(crate) fn to_record(&self) -> Record {
        Record {
            order_date: self.order_date(),
            region: self.dimension(Dimension::Region).to_string(),
            state: self.dimension(Dimension::State).to_string(),
            city: self.dimension(Dimension::City).to_string(),
            category: self.dimension(Dimension::Category).to_string(),
            sub_category: self.dimension(Dimension::SubCategory).to_string(),
            segment: self.dimension(Dimension::Segment).to_string(),
            ship_mode: self.dimension(Dimension::ShipMode).to_string(),
            customer_name: self.dimension(Dimension::CustomerName).to_string(),
            sales: self.measure(Measure::Sales),
            profit: self.measure(Measure::Profit),
            quantity: self.measure(Measure::Quantity),
        }
    }
}

pub(crate) fn days_to_date(days: i64) -> NaiveDate {
    i32::try_from(days)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .unwrap_or(NaiveDate::MIN)
}

/// Parses a date, ignoring any time-of-day suffix.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parses a measure; empty or malformed text becomes `NaN`.
pub(crate) fn parse_measure(raw: &str) -> f64 {
    let bytes = raw.trim().as_bytes();
    if bytes.is_empty() {
        return f64::NAN;
    }
    if let Ok(v) = atoi_simd::parse::<i64>(bytes) {
        return v as f64;
    }
    fast_float::parse::<f64, _>(bytes).unwrap_or(f64::NAN)
}

fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
    if data.is_empty() {
        return vec![];
    }

    let chunk_size = data.len() / num_chunks;
    let mut boundaries = Vec::with_capacity(num_chunks);
    let mut start = 0;

    for i in 0..num_chunks - 1 {
        let mut end = ((i + 1) * chunk_size).max(start);

        // Find next newline
        end = match memchr(b'\n', &data[end..]) {
            Some(pos) => end + pos + 1, // Include the newline
            None => data.len(),
        };

        if start < end {
            boundaries.push((start, end));
        }
        start = end;
    }

    // Last chunk gets everything remaining
    if start < data.len() {
        boundaries.push((start, data.len()));
    }

    boundaries
}

fn parse_chunk<'a>(chunk: &'a [u8], schema: &SchemaMap, estimated_rows: usize) -> RowBatch<'a> {
    let mut batch = RowBatch::with_capacity(estimated_rows);
    let mut raw_fields = Vec::with_capacity(schema.width);

    let mut start = 0;
    let line_ends = memchr_iter(b'\n', chunk).chain(
        // a final line without a trailing newline
        (!chunk.ends_with(b"\n")).then_some(chunk.len()),
    );

    for line_end in line_ends {
        let line = trim_line(&chunk[start..line_end]);
        start = line_end + 1;

        if line.is_empty() {
            batch.lines += 1;
            continue;
        }

        raw_fields.clear();
        split_fields(line, &mut raw_fields);
        let fields = raw_fields.drain(..).map(field_str).collect();

        // chunk-local, zero based; rebased once all chunks are done
        let row = batch.lines;
        batch.push_fields(fields, schema, row);
    }

    batch
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits one CSV line. Double-quoted fields may contain commas and `""` escapes.
fn split_fields<'a>(line: &'a [u8], out: &mut Vec<Cow<'a, [u8]>>) {
    if memchr(b'"', line).is_none() {
        let mut field_start = 0;
        for comma_pos in memchr_iter(b',', line) {
            out.push(Cow::Borrowed(&line[field_start..comma_pos]));
            field_start = comma_pos + 1;
        }
        out.push(Cow::Borrowed(&line[field_start..]));
        return;
    }

    let mut pos = 0;
    loop {
        if line.get(pos) == Some(&b'"') {
            // quoted field
            let mut value: Cow<'a, [u8]> = Cow::Borrowed(&[]);
            let mut seg_start = pos + 1;
            let mut i = pos + 1;
            loop {
                match memchr(b'"', &line[i..]) {
                    Some(q) => {
                        let q = i + q;
                        if line.get(q + 1) == Some(&b'"') {
                            // escaped quote, keep one
                            value.to_mut().extend_from_slice(&line[seg_start..=q]);
                            i = q + 2;
                            seg_start = i;
                        } else {
                            append(&mut value, &line[seg_start..q]);
                            i = q + 1;
                            break;
                        }
                    }
                    None => {
                        // unterminated, take the rest
                        append(&mut value, &line[seg_start..]);
                        i = line.len();
                        break;
                    }
                }
            }
            out.push(value);
            match memchr(b',', &line[i..]) {
                Some(c) => pos = i + c + 1,
                None => return,
            }
        } else {
            match memchr(b',', &line[pos..]) {
                Some(c) => {
                    out.push(Cow::Borrowed(&line[pos..pos + c]));
                    pos += c + 1;
                }
                None => {
                    out.push(Cow::Borrowed(&line[pos..]));
                    return;
                }
            }
        }
    }
}

fn append<'a>(value: &mut Cow<'a, [u8]>, bytes: &'a [u8]) {
    if value.is_empty() {
        *value = Cow::Borrowed(bytes);
    } else {
        value.to_mut().extend_from_slice(bytes);
    }
}

fn field_str(field: Cow<'_, [u8]>) -> Cow<'_, str> {
    match field {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
        Cow::Owned(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Cow::Owned(s),
            Err(e) => Cow::Owned(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        },
    }
}

/// Categorical cells are stored without surrounding whitespace.
fn trim_field(field: Cow<'_, str>) -> Cow<'_, str> {
    match field {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
        Cow::Owned(s) if s.trim().len() != s.len() => Cow::Owned(s.trim().to_string()),
        owned => owned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> Vec<String> {
        let mut out = Vec::new();
        split_fields(line.as_bytes(), &mut out);
        out.into_iter().map(|f| field_str(f).into_owned()).collect()
    }

    #[test]
    fn split_plain_line() {
        assert_eq!(split("a,b,,c"), vec!["a", "b", "", "c"]);
    }

    #[test]
    fn split_quoted_fields() {
        assert_eq!(
            split(r#"1,"Smith, John","say ""hi""",x"#),
            vec!["1", "Smith, John", r#"say "hi""#, "x"]
        );
        assert_eq!(split(r#""a","b""#), vec!["a", "b"]);
        assert_eq!(split(r#"a,"""#), vec!["a", ""]);
    }

    #[test]
    fn fields_are_trimmed() {
        assert_eq!(trim_field(Cow::Borrowed(" West ")), "West");
        assert_eq!(trim_field(Cow::Owned("Smith, Jo\t".to_string())), "Smith, Jo");
        assert_eq!(trim_field(Cow::Borrowed("   ")), "");
    }

    #[test]
    fn parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2016, 11, 8).unwrap();
        assert_eq!(parse_date("2016-11-08"), Some(expected));
        assert_eq!(parse_date("11/8/2016"), Some(expected));
        assert_eq!(parse_date("2016-11-08 00:00:00"), Some(expected));
        assert_eq!(parse_date("2016-11-08T10:15:00"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn parse_measure_values() {
        assert_eq!(parse_measure("3"), 3.0);
        assert_eq!(parse_measure(" -12.5 "), -12.5);
        assert!(parse_measure("").is_nan());
        assert!(parse_measure("n/a").is_nan());
    }

    #[test]
    fn chunk_boundaries_cover_data() {
        let data = b"a\nbb\nccc\ndddd\ne";
        let chunks = find_chunk_boundaries(data, 3);
        assert_eq!(chunks.first().map(|c| c.0), Some(0));
        assert_eq!(chunks.last().map(|c| c.1), Some(data.len()));
        for w in chunks.windows(2) {
            assert_eq!(w[0].1, w[1].0);
            assert_eq!(data[w[0].1 - 1], b'\n');
        }
    }

    #[test]
    fn schema_reports_missing_column() {
        let headers = ["Order Date", "Region", "State"];
        match SchemaMap::resolve(&headers) {
            Err(DashboardError::MissingColumn(name)) => assert_eq!(name, "City"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn days_round_trip() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        assert_eq!(days_to_date(date.num_days_from_ce() as i64), date);
    }
}
