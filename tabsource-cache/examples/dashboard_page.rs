//! A minimal dashboard page backed by the table cache
//!
//! Writes a small CSV into a temp directory, configures it as a source
//! and loads it twice to show the second load being served from cache.
//!
//! Run with: cargo run --example dashboard_page

use std::sync::Arc;

use anyhow::Result;

use tabsource_cache::{CacheConfig, FsStorage, LoadOptions, SourceSpec, TableCache};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ratings.csv");
    std::fs::write(
        &path,
        "movie,year,rating\nHeat,1995,8.3\nRonin,1998,7.2\nThief,1981,7.4\n",
    )?;

    let config = CacheConfig::default().with_source("ratings", SourceSpec::new(&path));
    let cache = TableCache::new(config, Arc::new(FsStorage::new()));

    let table = cache.load("ratings", &LoadOptions::default())?;
    println!("{}", table.schema());
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("  {}", cells.join(" | "));
    }

    // Served from cache; no storage read happens here.
    let again = cache.load("ratings", &LoadOptions::default())?;
    println!("second load identical: {}", Arc::ptr_eq(&table, &again));
    println!("stats: {:?}", cache.stats());

    Ok(())
}
