//! Aggregations over a [`FilteredView`].
//!
//! Every function is a pure reduction: an empty view gives empty tables and
//! zero totals. Missing measures (`NaN`) contribute nothing to any sum.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::processor::{Dimension, Measure, filter::FilteredView};

/// Canonical month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupValue {
    pub key: String,
    pub value: f64,
}

/// One measure summed per value of a dimension, in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedSums {
    pub dimension: Dimension,
    pub measure: Measure,
    pub rows: Vec<GroupValue>,
}

impl GroupedSums {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.key == key).map(|r| r.value)
    }
}

/// Headline totals, truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Kpis {
    pub total_sales: i64,
    pub total_profit: i64,
    pub total_quantity: i64,
}

/// A group with every measure summed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedGroup {
    pub key: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: f64,
}

/// Sales of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    /// `"YYYY : Mon"`
    pub label: String,
    pub sales: f64,
}

/// Sub-Category × month table of summed sales.
///
/// A `None` cell means the sub-category had no rows in that month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPivot {
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub label: String,
    pub cells: [Option<f64>; 12],
}

impl MonthPivot {
    pub fn cell(&self, label: &str, month: u32) -> Option<f64> {
        let row = self.rows.iter().find(|r| r.label == label)?;
        row.cells.get(month.checked_sub(1)? as usize).copied().flatten()
    }
}

/// One row for the Sales vs Profit scatter plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub sales: f64,
    pub profit: f64,
    pub quantity: f64,
    pub category: String,
}

/// Sums `measure` per value of `dimension`.
pub fn group_sum(
    view: &FilteredView<'_>,
    dimension: Dimension,
    measure: Measure,
) -> GroupedSums {
    let rows = group_all(view, dimension)
        .into_iter()
        .map(|(key, sums)| GroupValue {
            key,
            value: sums[measure.index()],
        })
        .collect();

    GroupedSums {
        dimension,
        measure,
        rows,
    }
}

pub fn category_sales(view: &FilteredView<'_>) -> GroupedSums {
    group_sum(view, Dimension::Category, Measure::Sales)
}

pub fn region_sales(view: &FilteredView<'_>) -> GroupedSums {
    group_sum(view, Dimension::Region, Measure::Sales)
}

pub fn segment_sales(view: &FilteredView<'_>) -> GroupedSums {
    group_sum(view, Dimension::Segment, Measure::Sales)
}

pub fn ship_mode_sales(view: &FilteredView<'_>) -> GroupedSums {
    group_sum(view, Dimension::ShipMode, Measure::Sales)
}

/// Total of one measure over the view, summed in row order like every group.
pub fn total(view: &FilteredView<'_>, measure: Measure) -> f64 {
    let column = view.dataset().measures(measure);
    let mut sum = Sum::default();
    for &row in view.rows() {
        sum.add(column[row]);
    }
    sum.value()
}

pub fn kpis(view: &FilteredView<'_>) -> Kpis {
    Kpis {
        total_sales: total(view, Measure::Sales).trunc() as i64,
        total_profit: total(view, Measure::Profit).trunc() as i64,
        total_quantity: total(view, Measure::Quantity).trunc() as i64,
    }
}

/// The `n` groups with the largest sales, returned smallest first.
///
/// Equal sales keep the order in which the groups first appear.
pub fn top_n_by_sales(
    view: &FilteredView<'_>,
    dimension: Dimension,
    n: usize,
) -> Vec<RankedGroup> {
    let mut groups: Vec<RankedGroup> = group_all(view, dimension)
        .into_iter()
        .map(|(key, [sales, profit, quantity])| RankedGroup {
            key,
            sales,
            profit,
            quantity,
        })
        .collect();

    groups.sort_by(|a, b| b.sales.total_cmp(&a.sales));
    groups.truncate(n);
    groups.sort_by(|a, b| a.sales.total_cmp(&b.sales));
    groups
}

/// Monthly sales, oldest month first.
pub fn monthly_sales(view: &FilteredView<'_>) -> Vec<MonthBucket> {
    let dataset = view.dataset();
    let sales = dataset.measures(Measure::Sales);
    let mut buckets: BTreeMap<(i32, u32), Sum> = BTreeMap::new();

    for &row in view.rows() {
        let date = dataset.order_date(row);
        buckets
            .entry((date.year(), date.month()))
            .or_default()
            .add(sales[row]);
    }

    buckets
        .into_iter()
        .map(|((year, month), sales)| MonthBucket {
            year,
            month,
            label: month_label(year, month),
            sales: sales.value(),
        })
        .collect()
}

/// Renders a month bucket key as `"YYYY : Mon"`.
pub fn month_label(year: i32, month: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => first.format("%Y : %b").to_string(),
        None => format!("{year} : ?"),
    }
}

/// Summed sales per (Sub-Category, calendar month), all twelve months as columns.
///
/// Rows are sorted by sub-category name.
pub fn subcategory_month_pivot(view: &FilteredView<'_>) -> MonthPivot {
    let dataset = view.dataset();
    let codes = dataset.codes(Dimension::SubCategory);
    let dictionary = dataset.dictionary(Dimension::SubCategory);
    let sales = dataset.measures(Measure::Sales);

    let mut cells: BTreeMap<&str, [Option<Sum>; 12]> = BTreeMap::new();
    for &row in view.rows() {
        let label = dictionary[codes[row] as usize].as_str();
        let month = dataset.order_date(row).month0() as usize;
        let cell = &mut cells.entry(label).or_insert([None; 12])[month];
        cell.get_or_insert_with(Sum::default).add(sales[row]);
    }

    MonthPivot {
        columns: MONTH_NAMES.iter().map(|m| m.to_string()).collect(),
        rows: cells
            .into_iter()
            .map(|(label, cells)| PivotRow {
                label: label.to_string(),
                cells: cells.map(|cell| cell.map(Sum::value)),
            })
            .collect(),
    }
}

pub fn scatter_points(view: &FilteredView<'_>) -> Vec<ScatterPoint> {
    view.iter()
        .map(|r| ScatterPoint {
            sales: r.measure(Measure::Sales),
            profit: r.measure(Measure::Profit),
            quantity: r.measure(Measure::Quantity),
            category: r.dimension(Dimension::Category).to_string(),
        })
        .collect()
}

/// All three measures summed per value of `dimension`, first-occurrence order.
fn group_all(view: &FilteredView<'_>, dimension: Dimension) -> Vec<(String, [f64; 3])> {
    let dataset = view.dataset();
    let codes = dataset.codes(dimension);
    let dictionary = dataset.dictionary(dimension);
    let columns = Measure::ALL.map(|m| dataset.measures(m));

    // slot per dictionary code, usize::MAX until first seen
    let mut slot = vec![usize::MAX; dictionary.len()];
    let mut groups: Vec<(String, [Sum; 3])> = Vec::new();

    for &row in view.rows() {
        let code = codes[row] as usize;
        if slot[code] == usize::MAX {
            slot[code] = groups.len();
            groups.push((dictionary[code].clone(), [Sum::default(); 3]));
        }
        let sums = &mut groups[slot[code]].1;
        for (sum, column) in sums.iter_mut().zip(columns) {
            sum.add(column[row]);
        }
    }

    groups
        .into_iter()
        .map(|(key, sums)| (key, sums.map(Sum::value)))
        .collect()
}

/// Neumaier-compensated running sum that skips `NaN`.
///
/// The error does not grow with the row count, so `0.1` taken ten times
/// totals exactly `1.0`.
#[derive(Debug, Clone, Copy, Default)]
struct Sum {
    total: f64,
    compensation: f64,
}

impl Sum {
    #[inline]
    fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let next = self.total + value;
        if self.total.abs() >= value.abs() {
            self.compensation += (self.total - next) + value;
        } else {
            self.compensation += (value - next) + self.total;
        }
        self.total = next;
    }

    fn value(self) -> f64 {
        self.total + self.compensation
    }
}
