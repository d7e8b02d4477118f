use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use jemallocator::Jemalloc;
use sales_dashboard::{
    DashboardConfig, DashboardSnapshot, FilterEvent, Session,
    processor::aggregate::{GroupedSums, MONTH_NAMES, RankedGroup},
    session,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Filter a sales table and print the dashboard's KPIs and tables.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// TOML config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sales data (CSV, XLSX, XLS, XLSB or ODS).
    data: Option<PathBuf>,

    /// Worksheet to read from a workbook.
    #[arg(long)]
    sheet: Option<String>,

    /// First order date included.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last order date included.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Region to keep (repeatable).
    #[arg(long = "region")]
    regions: Vec<String>,

    /// State to keep (repeatable).
    #[arg(long = "state")]
    states: Vec<String>,

    /// City to keep (repeatable).
    #[arg(long = "city")]
    cities: Vec<String>,

    /// Rows kept by the top-N tables.
    #[arg(long)]
    top_n: Option<usize>,

    /// Compute aggregations in parallel.
    #[arg(long)]
    parallel: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Read filter events (`region East,West`, `start 2016-01-01`, `reset`, ...) from stdin.
    #[arg(long)]
    interactive: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    if let Some(data) = &args.data {
        config.data_path = Some(data.clone());
    }
    if args.sheet.is_some() {
        config.sheet = args.sheet.clone();
    }
    if let Some(n) = args.top_n {
        config.top_n = n;
    }
    config.parallel_aggregates |= args.parallel;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Some(data_path) = config.data_path.clone() else {
        bail!("no data file given (pass DATA or set data_path in the config)");
    };

    let dataset = session::load_shared(&data_path, config.sheet.as_deref())
        .with_context(|| format!("loading {}", data_path.display()))?;
    let mut session = Session::new(Arc::clone(&dataset), &config);

    let mut selection = session.selection().clone();
    if let Some(start) = args.start {
        selection.dates.start = start;
    }
    if let Some(end) = args.end {
        selection.dates.end = end;
    }
    selection = selection
        .with_regions(args.regions)
        .with_states(args.states)
        .with_cities(args.cities);
    session.set_selection(selection);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_snapshot(&mut out, &session.refresh(), args.format)?;

    if args.interactive {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match FilterEvent::parse(&line) {
                Ok(event) => {
                    let snapshot = session.handle(event);
                    print_snapshot(&mut out, &snapshot, args.format)?;
                }
                Err(e) => writeln!(out, "error: {e}")?,
            }
            out.flush()?;
        }
    }

    Ok(())
}

fn print_snapshot(
    out: &mut impl Write,
    snapshot: &DashboardSnapshot,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", snapshot.to_json()?)?,
        OutputFormat::Text => render_text(out, snapshot)?,
    }
    Ok(())
}

fn render_text(out: &mut impl Write, s: &DashboardSnapshot) -> io::Result<()> {
    writeln!(out, "Rows: {}", s.row_count)?;
    writeln!(out, "Total Sales:    {}", s.kpi_total_sales)?;
    writeln!(out, "Total Profit:   {}", s.kpi_total_profit)?;
    writeln!(out, "Total Quantity: {}", s.kpi_total_quantity)?;

    grouped(out, "Sales by Category", &s.category_sales)?;
    grouped(out, "Sales by Region", &s.region_sales)?;
    ranked(out, "Top Customers", &s.top10_customers)?;
    ranked(out, "Top Sub-Categories", &s.top10_subcategories)?;

    writeln!(out, "\nMonthly Sales")?;
    for bucket in &s.monthly_timeseries {
        writeln!(out, "  {:<12} {:>14.2}", bucket.label, bucket.sales)?;
    }

    grouped(out, "Sales by Segment", &s.segment_sales)?;
    grouped(out, "Sales by Ship Mode", &s.shipmode_sales)?;

    writeln!(out, "\nSub-Category Sales by Month")?;
    write!(out, "  {:<14}", "")?;
    for month in MONTH_NAMES {
        write!(out, " {:>10}", &month[..3])?;
    }
    writeln!(out)?;
    for row in &s.subcategory_month_pivot.rows {
        write!(out, "  {:<14}", row.label)?;
        for cell in row.cells {
            match cell {
                Some(v) => write!(out, " {v:>10.2}")?,
                None => write!(out, " {:>10}", "-")?,
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "\nSales vs Profit: {} points", s.sales_profit_scatter.len())?;
    writeln!(out)
}

fn grouped(out: &mut impl Write, title: &str, sums: &GroupedSums) -> io::Result<()> {
    writeln!(out, "\n{title}")?;
    for row in &sums.rows {
        writeln!(out, "  {:<24} {:>14.2}", row.key, row.value)?;
    }
    Ok(())
}

fn ranked(out: &mut impl Write, title: &str, groups: &[RankedGroup]) -> io::Result<()> {
    writeln!(out, "\n{title}")?;
    for g in groups {
        writeln!(
            out,
            "  {:<24} {:>14.2} {:>12.2} {:>8}",
            g.key, g.sales, g.profit, g.quantity
        )?;
    }
    Ok(())
}
