//! Synthetic superstore-shaped sales data for benchmarks and demos.

use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::processor::{DashboardError, Dimension, Measure, ORDER_DATE, Record};

const GEOGRAPHY: [(&str, &str, &[&str]); 10] = [
    ("East", "New York", &["New York City", "Albany", "Buffalo"]),
    ("East", "Pennsylvania", &["Philadelphia", "Pittsburgh"]),
    ("East", "Ohio", &["Columbus", "Cleveland", "Toledo"]),
    ("West", "California", &["Los Angeles", "San Francisco", "San Diego"]),
    ("West", "Washington", &["Seattle", "Spokane"]),
    ("Central", "Texas", &["Houston", "Dallas", "San Antonio"]),
    ("Central", "Illinois", &["Chicago", "Springfield"]),
    ("South", "Georgia", &["Atlanta", "Columbus"]),
    ("South", "Florida", &["Miami", "Jacksonville", "Tampa"]),
    ("South", "Virginia", &["Richmond", "Arlington"]),
];

const PRODUCTS: [(&str, &[&str]); 3] = [
    ("Furniture", &["Bookcases", "Chairs", "Furnishings", "Tables"]),
    (
        "Office Supplies",
        &["Appliances", "Art", "Binders", "Envelopes", "Labels", "Paper", "Storage"],
    ),
    ("Technology", &["Accessories", "Copiers", "Machines", "Phones"]),
];

const SEGMENTS: [&str; 3] = ["Consumer", "Corporate", "Home Office"];
const SHIP_MODES: [&str; 4] = ["Standard Class", "Second Class", "First Class", "Same Day"];
const FIRST_NAMES: [&str; 8] = [
    "Claire", "Sean", "Darrin", "Brosina", "Andrew", "Irene", "Harold", "Pete",
];
const LAST_NAMES: [&str; 8] = [
    "Gute", "Miller", "Van Huff", "Hoffman", "Allen", "Maddox", "Pawlan", "Kriz",
];

/// Four years of orders, 2014 through 2017.
const DAYS: i64 = 4 * 365;

/// `rows` random records; the same `seed` always yields the same records.
pub fn records(rows: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let first_day = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap_or(NaiveDate::MIN);

    (0..rows)
        .map(|_| {
            let (region, state, cities) = GEOGRAPHY[rng.random_range(0..GEOGRAPHY.len())];
            let city = cities[rng.random_range(0..cities.len())];
            let (category, subs) = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
            let sub_category = subs[rng.random_range(0..subs.len())];

            let quantity = rng.random_range(1..=14) as f64;
            let unit_price: f64 = rng.random_range(2.0..500.0);
            let sales = (unit_price * quantity * 100.0).round() / 100.0;
            let margin: f64 = rng.random_range(-0.4..0.45);

            Record {
                order_date: first_day + Duration::days(rng.random_range(0..DAYS)),
                region: region.to_string(),
                state: state.to_string(),
                city: city.to_string(),
                category: category.to_string(),
                sub_category: sub_category.to_string(),
                segment: SEGMENTS[rng.random_range(0..SEGMENTS.len())].to_string(),
                ship_mode: SHIP_MODES[rng.random_range(0..SHIP_MODES.len())].to_string(),
                customer_name: format!(
                    "{} {}",
                    FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())],
                    LAST_NAMES[rng.random_range(0..LAST_NAMES.len())]
                ),
                sales,
                profit: (sales * margin * 10_000.0).round() / 10_000.0,
                quantity,
            }
        })
        .collect()
}

/// Writes records as a CSV with the dashboard's header row.
pub fn write_csv(path: &Path, records: &[Record]) -> Result<(), DashboardError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let headers: Vec<&str> = std::iter::once(ORDER_DATE)
        .chain(Dimension::ALL.iter().map(|d| d.header()))
        .chain(Measure::ALL.iter().map(|m| m.header()))
        .collect();
    writeln!(writer, "{}", headers.join(","))?;

    for r in records {
        write!(writer, "{}", r.order_date.format("%m/%d/%Y"))?;
        for dim in Dimension::ALL {
            write!(writer, ",{}", quote(r.dimension(dim)))?;
        }
        for m in Measure::ALL {
            let value = r.measure(m);
            if value.is_nan() {
                write!(writer, ",")?;
            } else {
                write!(writer, ",{value}")?;
            }
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

fn quote(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}
