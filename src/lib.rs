//! # sales_dashboard
//!
//! The computational core of an interactive sales dashboard: a columnar
//! sales table, a cascading Region → State → City filter engine and the
//! aggregations behind every chart and KPI card. It supports:
//!
//! - Memory-mapped CSV loading, parsed in parallel with Rayon
//! - Spreadsheet loading (`xlsx`, `xls`, `xlsb`, `ods`) through calamine
//! - Dictionary-encoded categorical columns
//! - SIMD-accelerated date-range filtering and NaN-skipping sums
//! - Cached dashboard snapshots per filter selection
//!
//! # Features
//!
//! - **Filtering**: inclusive order-date range plus region, state and city
//!   multiselects combined by a fixed cascade rule
//! - **Aggregations**: KPI totals, grouped sums, top-N rankings, monthly
//!   time series, a Sub-Category × month pivot and scatter data
//! - **Snapshots**: every table under a stable name, serializable to JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use sales_dashboard::{Dataset, DashboardSnapshot, FilterEngine, FilterSelection};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (dataset, summary) = Dataset::load(Path::new("superstore.csv"), None)?;
//!     println!("{} rows, {} rejected", summary.rows_processed, summary.errors.len());
//!
//!     let selection = FilterSelection::for_dataset(&dataset)
//!         .with_regions(["West"])
//!         .with_states(["California"]);
//!     let view = FilterEngine::apply(&dataset, &selection);
//!
//!     let snapshot = DashboardSnapshot::compute(&view, 10);
//!     println!("Total sales: {}", snapshot.kpi_total_sales);
//!     for group in &snapshot.category_sales.rows {
//!         println!("{} => {:.2}", group.key, group.value);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod helpers;

pub mod config;
pub mod processor;
pub mod session;
pub mod synthetic;

pub use config::DashboardConfig;
pub use processor::{
    DashboardError, Dimension, Measure, ParseError, ParseSummary, Record,
    dataset::{Dataset, RecordRef},
    filter::{CascadeRule, DateRange, FilterEngine, FilterOptions, FilterSelection, FilteredView},
    snapshot::{DashboardSnapshot, SnapshotCache},
};
pub use session::{FilterEvent, Session};
