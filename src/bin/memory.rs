use std::path::PathBuf;

use anyhow::{Context, Result};
use sales_dashboard::{Dataset, DashboardSnapshot, FilterEngine, FilterSelection};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn main() -> Result<()> {
    let _profiler = dhat::Profiler::new_heap();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/superstore_1m.csv"));

    let (dataset, summary) =
        Dataset::load(&path, None).with_context(|| format!("loading {}", path.display()))?;
    println!("Loaded {} rows ({} rejected)", summary.rows_processed, summary.errors.len());

    // One full pass: the default selection over every row
    let selection = FilterSelection::for_dataset(&dataset);
    let view = FilterEngine::apply(&dataset, &selection);
    let snapshot = DashboardSnapshot::compute(&view, 10);
    println!("Total sales: {}", snapshot.kpi_total_sales);

    println!("Memory benchmark finished. See dhat-heap.json for details");
    Ok(())
}
