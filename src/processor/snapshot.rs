use lru::LruCache;
use serde::Serialize;
use std::{cell::RefCell, num::NonZeroUsize, sync::Arc};

use crate::processor::{
    DashboardError, Dimension,
    aggregate::{self, GroupedSums, MonthBucket, MonthPivot, RankedGroup, ScatterPoint},
    filter::{FilterSelection, FilteredView},
};

/// Every table the dashboard renders for one filtered view.
///
/// Field names are the stable names the presentation layer looks tables up by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub row_count: usize,
    pub kpi_total_sales: i64,
    pub kpi_total_profit: i64,
    pub kpi_total_quantity: i64,
    pub category_sales: GroupedSums,
    pub region_sales: GroupedSums,
    pub top10_customers: Vec<RankedGroup>,
    pub top10_subcategories: Vec<RankedGroup>,
    pub monthly_timeseries: Vec<MonthBucket>,
    pub segment_sales: GroupedSums,
    pub shipmode_sales: GroupedSums,
    pub subcategory_month_pivot: MonthPivot,
    pub sales_profit_scatter: Vec<ScatterPoint>,
}

impl DashboardSnapshot {
    /// Runs every aggregation one after the other.
    pub fn compute(view: &FilteredView<'_>, top_n: usize) -> Self {
        let kpis = aggregate::kpis(view);

        DashboardSnapshot {
            row_count: view.len(),
            kpi_total_sales: kpis.total_sales,
            kpi_total_profit: kpis.total_profit,
            kpi_total_quantity: kpis.total_quantity,
            category_sales: aggregate::category_sales(view),
            region_sales: aggregate::region_sales(view),
            top10_customers: aggregate::top_n_by_sales(view, Dimension::CustomerName, top_n),
            top10_subcategories: aggregate::top_n_by_sales(view, Dimension::SubCategory, top_n),
            monthly_timeseries: aggregate::monthly_sales(view),
            segment_sales: aggregate::segment_sales(view),
            shipmode_sales: aggregate::ship_mode_sales(view),
            subcategory_month_pivot: aggregate::subcategory_month_pivot(view),
            sales_profit_scatter: aggregate::scatter_points(view),
        }
    }

    /// Same result as [`compute`](Self::compute), with the independent
    /// aggregations spread over the rayon pool.
    pub fn compute_parallel(view: &FilteredView<'_>, top_n: usize) -> Self {
        let ((kpis, (category_sales, region_sales)), (top10_customers, top10_subcategories)) =
            rayon::join(
                || {
                    rayon::join(
                        || aggregate::kpis(view),
                        || {
                            (
                                aggregate::category_sales(view),
                                aggregate::region_sales(view),
                            )
                        },
                    )
                },
                || {
                    rayon::join(
                        || aggregate::top_n_by_sales(view, Dimension::CustomerName, top_n),
                        || aggregate::top_n_by_sales(view, Dimension::SubCategory, top_n),
                    )
                },
            );

        let ((monthly_timeseries, (segment_sales, shipmode_sales)), (pivot, scatter)) =
            rayon::join(
                || {
                    rayon::join(
                        || aggregate::monthly_sales(view),
                        || {
                            (
                                aggregate::segment_sales(view),
                                aggregate::ship_mode_sales(view),
                            )
                        },
                    )
                },
                || {
                    rayon::join(
                        || aggregate::subcategory_month_pivot(view),
                        || aggregate::scatter_points(view),
                    )
                },
            );

        DashboardSnapshot {
            row_count: view.len(),
            kpi_total_sales: kpis.total_sales,
            kpi_total_profit: kpis.total_profit,
            kpi_total_quantity: kpis.total_quantity,
            category_sales,
            region_sales,
            top10_customers,
            top10_subcategories,
            monthly_timeseries,
            segment_sales,
            shipmode_sales,
            subcategory_month_pivot: pivot,
            sales_profit_scatter: scatter,
        }
    }

    pub fn to_json(&self) -> Result<String, DashboardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Snapshots memoized by the selection that produced them.
///
/// Single-threaded like the session that owns it; lookups do not bump recency.
#[derive(Debug)]
pub struct SnapshotCache {
    cache: RefCell<LruCache<FilterSelection, Arc<DashboardSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &FilterSelection) -> Option<Arc<DashboardSnapshot>> {
        self.cache.borrow().peek(key).cloned()
    }

    pub fn put(&self, key: FilterSelection, value: Arc<DashboardSnapshot>) {
        self.cache.borrow_mut().put(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }
}
