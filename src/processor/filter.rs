use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::{
    helpers::simd_helpers::filter_i64_between,
    processor::{
        Dimension,
        dataset::{Dataset, RecordRef},
    },
};

/// Inclusive order-date bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// The full span of the dataset's order dates.
    pub fn covering(dataset: &Dataset) -> Self {
        let (start, end) = dataset
            .date_span()
            .unwrap_or((NaiveDate::MIN, NaiveDate::MAX));
        DateRange { start, end }
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The user's current filter configuration.
///
/// The three sets are stored exactly as chosen; narrowing states and cities by
/// the selected regions happens only when the selection is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSelection {
    pub dates: DateRange,
    pub regions: BTreeSet<String>,
    pub states: BTreeSet<String>,
    pub cities: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new(dates: DateRange) -> Self {
        FilterSelection {
            dates,
            regions: BTreeSet::new(),
            states: BTreeSet::new(),
            cities: BTreeSet::new(),
        }
    }

    /// Whole date span, no categorical restriction.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        Self::new(DateRange::covering(dataset))
    }

    pub fn with_regions<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_states<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cities<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cities = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn set(&self, dimension: Dimension) -> Option<&BTreeSet<String>> {
        match dimension {
            Dimension::Region => Some(&self.regions),
            Dimension::State => Some(&self.states),
            Dimension::City => Some(&self.cities),
            _ => None,
        }
    }

    pub fn cascade_rule(&self) -> CascadeRule {
        CascadeRule::select(
            !self.regions.is_empty(),
            !self.states.is_empty(),
            !self.cities.is_empty(),
        )
    }
}

/// How the Region → State → City selections combine, one entry per
/// combination of non-empty sets.
///
/// A single non-empty set constrains alone; two or more non-empty sets are
/// ANDed, with State and City evaluated against the region-restricted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CascadeRule {
    /// R=F S=F C=F
    Unrestricted,
    /// R=T S=F C=F
    RegionOnly,
    /// R=F S=T C=F
    StateOnly,
    /// R=F S=F C=T
    CityOnly,
    /// R=F S=T C=T
    StateAndCity,
    /// R=T S=T C=T, state and city within the chosen regions
    StateAndCityWithinRegions,
    /// R=T S=F C=T
    RegionAndCity,
    /// R=T S=T C=F
    RegionAndState,
}

/// Indexed by `region << 2 | state << 1 | city`.
const CASCADE_TABLE: [CascadeRule; 8] = [
    CascadeRule::Unrestricted,              // F F F
    CascadeRule::CityOnly,                  // F F T
    CascadeRule::StateOnly,                 // F T F
    CascadeRule::StateAndCity,              // F T T
    CascadeRule::RegionOnly,                // T F F
    CascadeRule::RegionAndCity,             // T F T
    CascadeRule::RegionAndState,            // T T F
    CascadeRule::StateAndCityWithinRegions, // T T T
];

impl CascadeRule {
    pub fn select(region: bool, state: bool, city: bool) -> Self {
        CASCADE_TABLE[(region as usize) << 2 | (state as usize) << 1 | city as usize]
    }

    /// Dimensions whose sets restrict rows under this rule.
    pub fn constrained(self) -> &'static [Dimension] {
        match self {
            CascadeRule::Unrestricted => &[],
            CascadeRule::RegionOnly => &[Dimension::Region],
            CascadeRule::StateOnly => &[Dimension::State],
            CascadeRule::CityOnly => &[Dimension::City],
            CascadeRule::StateAndCity => &[Dimension::State, Dimension::City],
            CascadeRule::StateAndCityWithinRegions => {
                &[Dimension::Region, Dimension::State, Dimension::City]
            }
            CascadeRule::RegionAndCity => &[Dimension::Region, Dimension::City],
            CascadeRule::RegionAndState => &[Dimension::Region, Dimension::State],
        }
    }
}

/// Rows of a dataset that passed a selection, in dataset order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    dataset: &'a Dataset,
    rows: Vec<usize>,
}

impl<'a> FilteredView<'a> {
    /// Every row of the dataset.
    pub fn all(dataset: &'a Dataset) -> Self {
        FilteredView {
            dataset,
            rows: (0..dataset.row_count()).collect(),
        }
    }

    pub fn empty(dataset: &'a Dataset) -> Self {
        FilteredView {
            dataset,
            rows: Vec::new(),
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordRef<'a>> + '_ {
        self.rows.iter().map(|&row| self.dataset.record(row))
    }
}

impl PartialEq for FilteredView<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.dataset, other.dataset) && self.rows == other.rows
    }
}

impl Eq for FilteredView<'_> {}

/// Choices offered by each multiselect, narrowed the way the selections cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    /// Regions present in the date range
    pub regions: Vec<String>,
    /// States present in the date range and the selected regions
    pub states: Vec<String>,
    /// Cities present in the date range, selected regions and selected states
    pub cities: Vec<String>,
}

pub struct FilterEngine;

impl FilterEngine {
    /// Applies the date range, then the cascade rule for the categorical sets.
    ///
    /// An inverted range (`start > end`) yields an empty view. Values absent
    /// from the dataset simply match nothing.
    pub fn apply<'a>(dataset: &'a Dataset, selection: &FilterSelection) -> FilteredView<'a> {
        let Some(rows) = Self::date_rows(dataset, &selection.dates) else {
            return FilteredView::empty(dataset);
        };

        let rule = selection.cascade_rule();
        let mut rows = rows;
        for &dimension in rule.constrained() {
            if let Some(values) = selection.set(dimension) {
                retain_members(dataset, dimension, values, &mut rows);
            }
        }

        debug!(
            ?rule,
            rows = rows.len(),
            total = dataset.row_count(),
            "applied filter selection"
        );
        FilteredView { dataset, rows }
    }

    /// Options for the region, state and city pickers under `selection`.
    pub fn options(dataset: &Dataset, selection: &FilterSelection) -> FilterOptions {
        let mut rows = Self::date_rows(dataset, &selection.dates).unwrap_or_default();
        let regions = distinct(dataset, Dimension::Region, &rows);

        if !selection.regions.is_empty() {
            retain_members(dataset, Dimension::Region, &selection.regions, &mut rows);
        }
        let states = distinct(dataset, Dimension::State, &rows);

        if !selection.states.is_empty() {
            retain_members(dataset, Dimension::State, &selection.states, &mut rows);
        }
        let cities = distinct(dataset, Dimension::City, &rows);

        FilterOptions {
            regions,
            states,
            cities,
        }
    }

    fn date_rows(dataset: &Dataset, range: &DateRange) -> Option<Vec<usize>> {
        if range.is_inverted() {
            warn!(
                start = %range.start,
                end = %range.end,
                "date range is inverted, nothing matches"
            );
            return None;
        }
        let lo = range.start.num_days_from_ce() as i64;
        let hi = range.end.num_days_from_ce() as i64;
        Some(filter_i64_between(dataset.dates(), lo, hi))
    }
}

/// Keeps rows whose value of `dimension` is one of `values`.
fn retain_members(
    dataset: &Dataset,
    dimension: Dimension,
    values: &BTreeSet<String>,
    rows: &mut Vec<usize>,
) {
    let mut wanted = vec![false; dataset.dictionary(dimension).len()];
    for code in values.iter().filter_map(|v| dataset.code_of(dimension, v)) {
        wanted[code as usize] = true;
    }
    let codes = dataset.codes(dimension);
    rows.retain(|&row| wanted[codes[row] as usize]);
}

/// Distinct values over `rows`, in order of first appearance.
fn distinct(dataset: &Dataset, dimension: Dimension, rows: &[usize]) -> Vec<String> {
    let codes = dataset.codes(dimension);
    let dictionary = dataset.dictionary(dimension);
    let mut seen = vec![false; dictionary.len()];
    let mut out = Vec::new();
    for &row in rows {
        let code = codes[row] as usize;
        if !seen[code] {
            seen[code] = true;
            out.push(dictionary[code].clone());
        }
    }
    out
}
