//! Process-wide dataset handle and the per-user filter session.

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use std::{collections::BTreeSet, path::Path, sync::Arc};
use tracing::debug;

use crate::{
    config::DashboardConfig,
    processor::{
        DashboardError, ParseSummary,
        dataset::{Dataset, parse_date},
        filter::{FilterEngine, FilterOptions, FilterSelection},
        snapshot::{DashboardSnapshot, SnapshotCache},
    },
};

static DATASET: OnceCell<Arc<Dataset>> = OnceCell::new();

/// Publishes `dataset` as the shared, read-only table for this process.
///
/// Succeeds once; later calls return [`DashboardError::AlreadyInitialized`].
pub fn init_dataset(dataset: Dataset) -> Result<Arc<Dataset>, DashboardError> {
    let shared = Arc::new(dataset);
    DATASET
        .set(Arc::clone(&shared))
        .map_err(|_| DashboardError::AlreadyInitialized)?;
    Ok(shared)
}

pub fn shared_dataset() -> Option<Arc<Dataset>> {
    DATASET.get().cloned()
}

/// Loads `path` once and shares it; later calls reuse the first load.
pub fn load_shared(path: &Path, sheet: Option<&str>) -> Result<Arc<Dataset>, DashboardError> {
    DATASET
        .get_or_try_init(|| Dataset::load(path, sheet).map(|(dataset, _)| Arc::new(dataset)))
        .cloned()
}

/// A change made through one of the dashboard's filter widgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    SetStart(NaiveDate),
    SetEnd(NaiveDate),
    SetRegions(BTreeSet<String>),
    SetStates(BTreeSet<String>),
    SetCities(BTreeSet<String>),
    /// Back to the full date span with no categorical restriction
    Reset,
}

impl FilterEvent {
    /// Parses one line of the textual event syntax:
    /// `start 2021-01-01`, `end 2021-12-31`, `region East,West`,
    /// `state Texas`, `city Houston`, `reset`.
    ///
    /// A list command without values clears that set.
    pub fn parse(line: &str) -> Result<Self, DashboardError> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let date = |rest: &str| {
            parse_date(rest).ok_or_else(|| DashboardError::Parse(format!("invalid date '{rest}'")))
        };
        let list = |rest: &str| -> BTreeSet<String> {
            rest.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        };

        match command.to_ascii_lowercase().as_str() {
            "start" => Ok(FilterEvent::SetStart(date(rest)?)),
            "end" => Ok(FilterEvent::SetEnd(date(rest)?)),
            "region" | "regions" => Ok(FilterEvent::SetRegions(list(rest))),
            "state" | "states" => Ok(FilterEvent::SetStates(list(rest))),
            "city" | "cities" => Ok(FilterEvent::SetCities(list(rest))),
            "reset" => Ok(FilterEvent::Reset),
            other => Err(DashboardError::Parse(format!("unknown command '{other}'"))),
        }
    }
}

/// One user's dashboard: the current selection and the snapshots it produced.
#[derive(Debug)]
pub struct Session {
    dataset: Arc<Dataset>,
    selection: FilterSelection,
    cache: SnapshotCache,
    top_n: usize,
    parallel: bool,
}

impl Session {
    pub fn new(dataset: Arc<Dataset>, config: &DashboardConfig) -> Self {
        let selection = FilterSelection::for_dataset(&dataset);
        Session {
            dataset,
            selection,
            cache: SnapshotCache::new(config.cache_capacity),
            top_n: config.top_n,
            parallel: config.parallel_aggregates,
        }
    }

    /// Loads a file into a session of its own, outside the shared handle.
    pub fn open(
        path: &Path,
        config: &DashboardConfig,
    ) -> Result<(Self, ParseSummary), DashboardError> {
        let (dataset, summary) = Dataset::load(path, config.sheet.as_deref())?;
        Ok((Self::new(Arc::new(dataset), config), summary))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: FilterSelection) {
        self.selection = selection;
    }

    pub fn options(&self) -> FilterOptions {
        FilterEngine::options(&self.dataset, &self.selection)
    }

    /// Snapshot of the current selection, computed on a cache miss.
    pub fn refresh(&self) -> Arc<DashboardSnapshot> {
        if let Some(hit) = self.cache.get(&self.selection) {
            debug!("snapshot cache hit");
            return hit;
        }

        let view = FilterEngine::apply(&self.dataset, &self.selection);
        let snapshot = Arc::new(if self.parallel {
            DashboardSnapshot::compute_parallel(&view, self.top_n)
        } else {
            DashboardSnapshot::compute(&view, self.top_n)
        });
        self.cache.put(self.selection.clone(), Arc::clone(&snapshot));
        snapshot
    }

    /// Applies one widget change and re-runs the pipeline.
    ///
    /// Changing the regions leaves the chosen states and cities untouched.
    pub fn handle(&mut self, event: FilterEvent) -> Arc<DashboardSnapshot> {
        debug!(?event, "filter event");
        match event {
            FilterEvent::SetStart(date) => self.selection.dates.start = date,
            FilterEvent::SetEnd(date) => self.selection.dates.end = date,
            FilterEvent::SetRegions(values) => self.selection.regions = values,
            FilterEvent::SetStates(values) => self.selection.states = values,
            FilterEvent::SetCities(values) => self.selection.cities = values,
            FilterEvent::Reset => self.selection = FilterSelection::for_dataset(&self.dataset),
        }
        self.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Record;

    fn rec(date: (i32, u32, u32), region: &str, state: &str, city: &str, sales: f64) -> Record {
        Record {
            order_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            region: region.into(),
            state: state.into(),
            city: city.into(),
            category: "Technology".into(),
            sub_category: "Phones".into(),
            segment: "Corporate".into(),
            ship_mode: "First Class".into(),
            customer_name: "Pat".into(),
            sales,
            profit: 0.0,
            quantity: 1.0,
        }
    }

    fn session() -> Session {
        let ds = Dataset::from_records(&[
            rec((2022, 1, 3), "East", "New York", "Albany", 100.0),
            rec((2022, 2, 3), "West", "California", "Fresno", 200.0),
            rec((2022, 3, 3), "West", "Oregon", "Salem", 400.0),
        ])
        .unwrap();
        Session::new(Arc::new(ds), &DashboardConfig::default())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_events() {
        assert_eq!(
            FilterEvent::parse("start 2022-02-01").unwrap(),
            FilterEvent::SetStart(date(2022, 2, 1))
        );
        assert_eq!(
            FilterEvent::parse("END 12/31/2022").unwrap(),
            FilterEvent::SetEnd(date(2022, 12, 31))
        );
        assert_eq!(
            FilterEvent::parse("region East, West").unwrap(),
            FilterEvent::SetRegions(["East".to_string(), "West".to_string()].into())
        );
        assert_eq!(
            FilterEvent::parse("city").unwrap(),
            FilterEvent::SetCities(BTreeSet::new())
        );
        assert_eq!(FilterEvent::parse("  reset ").unwrap(), FilterEvent::Reset);
        assert!(FilterEvent::parse("start yesterday").is_err());
        assert!(FilterEvent::parse("zoom 3").is_err());
    }

    #[test]
    fn events_rerun_the_pipeline() {
        let mut s = session();
        assert_eq!(s.refresh().kpi_total_sales, 700);

        let snap = s.handle(FilterEvent::SetRegions(["West".to_string()].into()));
        assert_eq!(snap.kpi_total_sales, 600);

        let snap = s.handle(FilterEvent::SetStart(date(2022, 3, 1)));
        assert_eq!(snap.kpi_total_sales, 400);

        let snap = s.handle(FilterEvent::Reset);
        assert_eq!(snap.kpi_total_sales, 700);
        assert_eq!(s.selection(), &FilterSelection::for_dataset(s.dataset()));
    }

    #[test]
    fn region_change_keeps_state_selection() {
        let mut s = session();
        s.handle(FilterEvent::SetStates(["Oregon".to_string()].into()));
        let snap = s.handle(FilterEvent::SetRegions(["East".to_string()].into()));

        // Oregon is not in the East, so the AND of both sets is empty
        assert_eq!(snap.row_count, 0);
        assert!(s.selection().states.contains("Oregon"));

        let snap = s.handle(FilterEvent::SetRegions(BTreeSet::new()));
        assert_eq!(snap.kpi_total_sales, 400);
    }

    #[test]
    fn repeated_selection_hits_cache() {
        let mut s = session();
        let first = s.handle(FilterEvent::SetCities(["Fresno".to_string()].into()));
        s.handle(FilterEvent::SetCities(BTreeSet::new()));
        let again = s.handle(FilterEvent::SetCities(["Fresno".to_string()].into()));
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn options_follow_selection() {
        let mut s = session();
        s.handle(FilterEvent::SetRegions(["West".to_string()].into()));
        let opts = s.options();
        assert_eq!(opts.regions, ["East", "West"]);
        assert_eq!(opts.states, ["California", "Oregon"]);
    }

    #[test]
    fn shared_dataset_initialises_once() {
        let ds = Dataset::from_records(&[rec((2022, 1, 3), "East", "Ohio", "Akron", 1.0)]).unwrap();
        let other =
            Dataset::from_records(&[rec((2022, 1, 3), "West", "Utah", "Provo", 2.0)]).unwrap();

        let shared = init_dataset(ds).unwrap();
        assert!(Arc::ptr_eq(&shared, &shared_dataset().unwrap()));
        assert!(matches!(
            init_dataset(other),
            Err(DashboardError::AlreadyInitialized)
        ));

        // already set, so the path is never opened
        let loaded = load_shared(Path::new("no/such/orders.csv"), None).unwrap();
        assert!(Arc::ptr_eq(&shared, &loaded));
    }
}
