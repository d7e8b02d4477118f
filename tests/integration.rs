use std::io::Write;

use chrono::NaiveDate;
use sales_dashboard::{
    DashboardConfig, DashboardError, DashboardSnapshot, Dataset, Dimension, FilterEngine,
    FilterEvent, FilterSelection, FilteredView, Measure, Session, session,
};
use tempfile::NamedTempFile;

const HEADER: &str = "Row ID,Order Date,Region,State,City,Category,Sub-Category,Segment,Ship Mode,Customer Name,Sales,Profit,Quantity";

const SHEET_HEADERS: [&str; 12] = [
    "Order Date",
    "Region",
    "State",
    "City",
    "Category",
    "Sub-Category",
    "Segment",
    "Ship Mode",
    "Customer Name",
    "Sales",
    "Profit",
    "Quantity",
];

const SHEET_DIMENSIONS: [&str; 8] = [
    "West",
    "Washington",
    "Seattle",
    "Technology",
    "Phones",
    "Consumer",
    "Same Day",
    "Pat Lee",
];

fn csv_file(body: &str) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(tmp, "{}", body).unwrap();
    tmp
}

fn superstore() -> NamedTempFile {
    csv_file(&format!(
        "{HEADER}\n\
         1,11/8/2016,South,Kentucky,Henderson,Furniture,Bookcases,Consumer,Second Class,Claire Gute,261.96,41.9136,2\n\
         2,11/8/2016,South,Kentucky,Henderson,Furniture,Chairs,Consumer,Second Class,Claire Gute,731.94,219.582,3\n\
         3,6/12/2016,West,California,Los Angeles,Office Supplies,Labels,Corporate,Second Class,Darrin Van Huff,14.62,6.8714,2\n\
         4,10/11/2015,South,Florida,Fort Lauderdale,Furniture,Tables,Consumer,Standard Class,Sean O'Donnell,957.5775,-383.031,5\n\
         5,10/11/2015,South,Florida,Fort Lauderdale,Office Supplies,Storage,Consumer,Standard Class,Sean O'Donnell,22.368,2.5164,2\n\
         6,6/9/2014,West,California,Los Angeles,Furniture,Furnishings,Consumer,Standard Class,Brosina Hoffman,48.86,14.1694,7\n\
         7,6/9/2014,West,California,Los Angeles,Technology,Phones,Consumer,Standard Class,Brosina Hoffman,907.152,90.7152,6\n\
         8,4/15/2017,East,Pennsylvania,Philadelphia,Technology,Phones,Home Office,First Class,\"Zuschuss, Carroll\",371.168,-41.7564,4\n"
    ))
}

#[test]
fn test_load_superstore_csv() {
    let tmp = superstore();
    let (ds, summary) = Dataset::load(tmp.path(), None).unwrap();

    assert_eq!(summary.rows_processed, 8);
    assert!(summary.errors.is_empty());
    assert_eq!(ds.row_count(), 8);
    assert_eq!(
        ds.record(7).dimension(Dimension::CustomerName),
        "Zuschuss, Carroll"
    );
    assert_eq!(ds.record(3).measure(Measure::Profit), -383.031);
    assert_eq!(
        ds.date_span(),
        Some((
            NaiveDate::from_ymd_opt(2014, 6, 9).unwrap(),
            NaiveDate::from_ymd_opt(2017, 4, 15).unwrap()
        ))
    );
    assert_eq!(ds.dictionary(Dimension::Region), ["South", "West", "East"]);
}

#[test]
fn test_default_selection_keeps_every_row() {
    let tmp = superstore();
    let (ds, _) = Dataset::load_csv(tmp.path()).unwrap();

    let view = FilterEngine::apply(&ds, &FilterSelection::for_dataset(&ds));
    assert_eq!(view, FilteredView::all(&ds));

    let snapshot = DashboardSnapshot::compute(&view, 10);
    // 3315.6455 sales, -49.0194 profit, 31 items
    assert_eq!(snapshot.kpi_total_sales, 3315);
    assert_eq!(snapshot.kpi_total_profit, -49);
    assert_eq!(snapshot.kpi_total_quantity, 31);

    let top: Vec<&str> = snapshot
        .top10_customers
        .iter()
        .map(|g| g.key.as_str())
        .collect();
    assert_eq!(
        top,
        [
            "Darrin Van Huff",
            "Zuschuss, Carroll",
            "Brosina Hoffman",
            "Sean O'Donnell",
            "Claire Gute"
        ]
    );

    let months: Vec<&str> = snapshot
        .monthly_timeseries
        .iter()
        .map(|b| b.label.as_str())
        .collect();
    assert_eq!(
        months,
        ["2014 : Jun", "2015 : Oct", "2016 : Jun", "2016 : Nov", "2017 : Apr"]
    );
}

#[test]
fn test_cascading_filters_on_loaded_file() {
    let tmp = superstore();
    let (ds, _) = Dataset::load_csv(tmp.path()).unwrap();

    let sel = FilterSelection::for_dataset(&ds)
        .with_regions(["South"])
        .with_states(["Florida", "California"]);
    let view = FilterEngine::apply(&ds, &sel);
    assert_eq!(view.rows(), [3, 4]);

    let sel = FilterSelection::for_dataset(&ds).with_cities(["Los Angeles", "Philadelphia"]);
    let snapshot = DashboardSnapshot::compute(&FilterEngine::apply(&ds, &sel), 10);
    assert_eq!(snapshot.row_count, 4);
    let west = snapshot.region_sales.get("West").unwrap();
    assert!((west - 970.632).abs() < 1e-9);
    assert_eq!(snapshot.category_sales.rows.len(), 3);
}

#[test]
fn test_missing_column_is_fatal() {
    let tmp = csv_file("Order Date,Region,State,City,Sales\n2016-01-01,East,Ohio,Akron,3\n");
    match Dataset::load_csv(tmp.path()) {
        Err(DashboardError::MissingColumn(name)) => assert_eq!(name, "Category"),
        other => panic!("expected missing column, got {other:?}"),
    }
}

#[test]
fn test_bad_rows_are_reported_not_fatal() {
    let tmp = csv_file(&format!(
        "{HEADER}\n\
         1,2016-01-04,East,Ohio,Akron,Furniture,Chairs,Consumer,First Class,Al,10,1,1\n\
         2,2016-01-05,East,Ohio,Akron,Furniture,Chairs,Consumer,First Class,Al,20,2,2\n\
         3,someday,East,Ohio,Akron,Furniture,Chairs,Consumer,First Class,Al,30,3,3\n\
         4,2016-01-07,East,Ohio,Akron\n\
         5,2016-01-08,East,Ohio,Akron,Furniture,Chairs,Consumer,First Class,Al,,4,n/a\n"
    ));
    let (ds, summary) = Dataset::load_csv(tmp.path()).unwrap();

    assert_eq!(ds.row_count(), 3);
    assert_eq!(summary.rows_processed, 3);
    let rows: Vec<usize> = summary.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, [4, 5]);
    assert_eq!(summary.errors[0].column, "Order Date");
    assert_eq!(summary.errors[0].value, "someday");

    // empty and malformed measures are missing, not zero rows
    let view = FilteredView::all(&ds);
    let snapshot = DashboardSnapshot::compute(&view, 10);
    assert_eq!(snapshot.kpi_total_sales, 30);
    assert_eq!(snapshot.kpi_total_profit, 7);
    assert_eq!(snapshot.kpi_total_quantity, 3);
}

#[test]
fn test_windows_line_endings() {
    let tmp = csv_file(&format!(
        "{HEADER}\r\n1,2016-01-04,East,Ohio,Akron,Furniture,Chairs,Consumer,First Class,Al,10,1,1\r\n"
    ));
    let (ds, _) = Dataset::load_csv(tmp.path()).unwrap();
    assert_eq!(ds.record(0).measure(Measure::Quantity), 1.0);
}

#[test]
fn test_csv_categories_are_trimmed() {
    let tmp = csv_file(&format!(
        "{HEADER}\n\
         1,2016-01-04, West ,Oregon,  Salem,Furniture,Chairs,Consumer,First Class,\" Al \",10,1,1\n\
         2,2016-01-05,West,Oregon,Salem,Furniture,Chairs,Consumer,First Class,Al,20,1,1\n"
    ));
    let (ds, _) = Dataset::load_csv(tmp.path()).unwrap();
    assert_eq!(ds.dictionary(Dimension::Region), ["West"]);
    assert_eq!(ds.dictionary(Dimension::City), ["Salem"]);
    assert_eq!(ds.dictionary(Dimension::CustomerName), ["Al"]);

    let sel = FilterSelection::for_dataset(&ds)
        .with_regions(["West"])
        .with_cities(["Salem"]);
    assert_eq!(FilterEngine::apply(&ds, &sel).rows(), [0, 1]);
}

#[test]
fn test_header_only_is_empty_dataset() {
    let tmp = csv_file(&format!("{HEADER}\n"));
    assert!(matches!(
        Dataset::load_csv(tmp.path()),
        Err(DashboardError::EmptyDataset)
    ));
}

#[test]
fn test_unsupported_extension() {
    let tmp = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
    assert!(matches!(
        Dataset::load(tmp.path(), None),
        Err(DashboardError::UnsupportedFormat(ext)) if ext == "parquet"
    ));
}

#[test]
fn test_session_over_file() {
    let tmp = superstore();
    let config = DashboardConfig {
        top_n: 2,
        ..DashboardConfig::default()
    };
    let (mut session, _) = Session::open(tmp.path(), &config).unwrap();

    let snap = session.handle(FilterEvent::parse("region West").unwrap());
    assert_eq!(snap.row_count, 3);
    assert_eq!(snap.top10_subcategories.len(), 2);
    assert_eq!(snap.top10_subcategories[1].key, "Phones");

    let snap = session.handle(FilterEvent::parse("start 2016-01-01").unwrap());
    assert_eq!(snap.row_count, 1);

    let snap = session.handle(FilterEvent::parse("end 2015-01-01").unwrap());
    assert_eq!(snap.row_count, 0);
    assert_eq!(snap.kpi_total_sales, 0);

    let snap = session.handle(FilterEvent::Reset);
    assert_eq!(snap.row_count, 8);
}

#[test]
fn test_load_xlsx_workbook() {
    use rust_xlsxwriter::Workbook;

    let mut book = Workbook::new();
    let sheet = book.add_worksheet();
    sheet.set_name("Orders").unwrap();
    for (col, h) in SHEET_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *h).unwrap();
    }
    // row 1: serial date, row 2: ISO text date, row 3: unreadable date
    sheet.write_number(1, 0, 44256.0).unwrap();
    sheet.write_string(2, 0, "2021-04-02").unwrap();
    sheet.write_string(3, 0, "later").unwrap();
    for row in 1..=3u32 {
        for (i, d) in SHEET_DIMENSIONS.iter().enumerate() {
            sheet.write_string(row, 1 + i as u16, *d).unwrap();
        }
        sheet.write_number(row, 9, 100.0 * row as f64).unwrap();
        sheet.write_number(row, 10, 10.0).unwrap();
        sheet.write_number(row, 11, 1.0).unwrap();
    }

    let tmp = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    book.save(tmp.path()).unwrap();

    let (ds, summary) = Dataset::load(tmp.path(), Some("Orders")).unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].row, 4);
    assert_eq!(
        ds.record(0).order_date(),
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
    );
    assert_eq!(
        ds.record(1).order_date(),
        NaiveDate::from_ymd_opt(2021, 4, 2).unwrap()
    );
    assert_eq!(ds.record(1).measure(Measure::Sales), 200.0);

    assert!(matches!(
        Dataset::load(tmp.path(), Some("Returns")),
        Err(DashboardError::Parse(_))
    ));
}

#[test]
fn test_xlsx_rows_numbered_from_sheet_top() {
    use rust_xlsxwriter::Workbook;

    let mut book = Workbook::new();
    let sheet = book.add_worksheet();
    // rows 1 and 2 of the sheet stay blank; the header is on row 3
    for (col, h) in SHEET_HEADERS.iter().enumerate() {
        sheet.write_string(2, col as u16, *h).unwrap();
    }
    for row in 3..=5u32 {
        if row == 5 {
            sheet.write_string(row, 0, "soon").unwrap();
        } else {
            sheet.write_string(row, 0, "2021-04-02").unwrap();
        }
        for (i, d) in SHEET_DIMENSIONS.iter().enumerate() {
            sheet.write_string(row, 1 + i as u16, *d).unwrap();
        }
        sheet.write_number(row, 9, 50.0).unwrap();
        sheet.write_number(row, 10, 5.0).unwrap();
        sheet.write_number(row, 11, 1.0).unwrap();
    }

    let tmp = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    book.save(tmp.path()).unwrap();

    let (ds, summary) = Dataset::load(tmp.path(), None).unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(summary.errors.len(), 1);
    // zero-based index 5 is the sixth row a spreadsheet user sees
    assert_eq!(summary.errors[0].row, 6);
    assert_eq!(summary.errors[0].value, "soon");
}

#[test]
fn test_shared_dataset_loads_once() {
    let first = superstore();
    let second = csv_file(&format!(
        "{HEADER}\n1,1/2/2017,East,Ohio,Akron,Technology,Phones,Consumer,First Class,Pat Doe,10,1,1\n"
    ));

    let loaded = session::load_shared(first.path(), None).unwrap();
    assert_eq!(loaded.row_count(), 8);

    let again = session::load_shared(second.path(), None).unwrap();
    assert!(std::sync::Arc::ptr_eq(&loaded, &again));
    assert_eq!(again.row_count(), 8);
    assert!(std::sync::Arc::ptr_eq(&loaded, &session::shared_dataset().unwrap()));
}
