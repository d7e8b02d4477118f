use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub mod aggregate;
pub mod column;
pub mod dataset;
pub mod filter;
pub mod snapshot;
mod workbook;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema/parse error: {0}")]
    Parse(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("Dataset contains no rows")]
    EmptyDataset,

    #[error("Shared dataset already initialised")]
    AlreadyInitialized,
}

/// Outcome of loading a dataset: rows kept plus the rows that were rejected.
#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

/// A rejected input row. `row` is the 1-based line (CSV) or sheet row, header included.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Header of the order date column.
pub const ORDER_DATE: &str = "Order Date";

/// Categorical columns of a sales record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Dimension {
    Region,
    State,
    City,
    Category,
    SubCategory,
    Segment,
    ShipMode,
    CustomerName,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Region,
        Dimension::State,
        Dimension::City,
        Dimension::Category,
        Dimension::SubCategory,
        Dimension::Segment,
        Dimension::ShipMode,
        Dimension::CustomerName,
    ];

    /// Column header in the source spreadsheet.
    pub fn header(self) -> &'static str {
        match self {
            Dimension::Region => "Region",
            Dimension::State => "State",
            Dimension::City => "City",
            Dimension::Category => "Category",
            Dimension::SubCategory => "Sub-Category",
            Dimension::Segment => "Segment",
            Dimension::ShipMode => "Ship Mode",
            Dimension::CustomerName => "Customer Name",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Numeric columns of a sales record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Measure {
    Sales,
    Profit,
    Quantity,
}

impl Measure {
    pub const ALL: [Measure; 3] = [Measure::Sales, Measure::Profit, Measure::Quantity];

    pub fn header(self) -> &'static str {
        match self {
            Measure::Sales => "Sales",
            Measure::Profit => "Profit",
            Measure::Quantity => "Quantity",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// One owned sales row.
///
/// Measures are `f64`; `NaN` marks a value that was missing in the source and
/// is skipped by every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub order_date: NaiveDate,
    pub region: String,
    pub state: String,
    pub city: String,
    pub category: String,
    pub sub_category: String,
    pub segment: String,
    pub ship_mode: String,
    pub customer_name: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: f64,
}

impl Record {
    pub fn dimension(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Region => &self.region,
            Dimension::State => &self.state,
            Dimension::City => &self.city,
            Dimension::Category => &self.category,
            Dimension::SubCategory => &self.sub_category,
            Dimension::Segment => &self.segment,
            Dimension::ShipMode => &self.ship_mode,
            Dimension::CustomerName => &self.customer_name,
        }
    }

    pub fn measure(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Sales => self.sales,
            Measure::Profit => self.profit,
            Measure::Quantity => self.quantity,
        }
    }
}
