use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sales_dashboard::synthetic;

/// Writes a synthetic superstore CSV.
#[derive(Parser)]
struct Args {
    /// Output file.
    #[arg(default_value = "data/superstore_1m.csv")]
    path: PathBuf,

    /// Number of orders to generate.
    #[arg(long, default_value_t = 1_000_000)]
    rows: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = args.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let records = synthetic::records(args.rows, args.seed);
    synthetic::write_csv(&args.path, &records)
        .with_context(|| format!("writing {}", args.path.display()))?;

    println!("Sample CSV generated: {} ({} rows)", args.path.display(), args.rows);
    Ok(())
}
