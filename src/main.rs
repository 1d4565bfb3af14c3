use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use memory_inspector::config::{load_config, validate_config, MonitorConfig};
use memory_inspector::memory::regions::filter::presets;
use memory_inspector::memory::RegionFilter;
use memory_inspector::process::ProcessMemory;
use memory_inspector::{
    MemoryScanner, ProcessHandle, ScanOptions, SearchResult, Value, ValueKind, ValueMonitor,
};

fn usage() -> &'static str {
    "usage: memory-inspector [pid] [i32 value]"
}

/// Matches watched after a search
const WATCH_LIMIT: usize = 10;
const WATCH_ROUNDS: usize = 5;

/// Polls the first matches a few times and logs whatever changes
fn watch<P: ProcessMemory>(handle: &P, results: &[SearchResult], config: &MonitorConfig) {
    let monitor = ValueMonitor::new();
    for result in results.iter().take(WATCH_LIMIT) {
        if let Err(e) = monitor.track(result.address, result.value_size) {
            warn!(address = %result.address, error = %e, "Cannot track match");
        }
    }
    // The first poll only records the current values
    monitor.poll(handle);

    for round in 1..=WATCH_ROUNDS {
        std::thread::sleep(config.poll_interval());
        for change in monitor.poll(handle) {
            info!(
                round,
                address = %change.address,
                old = %hex::encode(&change.old_value),
                new = %hex::encode(&change.new_value),
                "Value changed"
            );
        }
    }
}

fn main() -> Result<()> {
    let config = load_config().context("failed to load configuration")?;
    validate_config(&config).context("invalid configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting memory-inspector v{}", env!("CARGO_PKG_VERSION"));
    info!(backend = memory_inspector::os::BACKEND, arch = std::env::consts::ARCH, "Platform");

    let mut args = std::env::args().skip(1);
    let pid = match args.next() {
        Some(arg) => arg
            .parse::<u32>()
            .with_context(|| format!("invalid pid {:?}; {}", arg, usage()))?,
        None => std::process::id(),
    };
    let needle = args
        .next()
        .map(|arg| Value::parse(ValueKind::I32, &arg))
        .transpose()
        .with_context(usage)?;

    let handle =
        ProcessHandle::open(pid).with_context(|| format!("failed to open process {}", pid))?;
    let scanner = MemoryScanner::with_options(&handle, ScanOptions::from(&config.scanner));

    let regions = scanner.enumerate();
    let mut by_category: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    for region in &regions {
        let entry = by_category.entry(region.category.to_string()).or_default();
        entry.0 += 1;
        entry.1 += region.size;
    }
    for (category, (count, bytes)) in &by_category {
        info!(%category, count, bytes, "Regions");
    }

    let writable = RegionFilter::new(presets::mutable_data());
    info!(
        total = regions.len(),
        writable = writable.count(&regions),
        writable_bytes = writable.total_size(&regions),
        "Enumerated {}",
        handle
    );

    if let Some(value) = needle {
        let results = scanner.search_value(&value);
        info!(value = %value, matches = results.len(), "Search complete");
        for result in results.iter().take(WATCH_LIMIT) {
            info!(address = %result.address, context = %hex::encode(&result.context), "Match");
        }
        if results.len() > WATCH_LIMIT {
            warn!("{} further matches not shown", results.len() - WATCH_LIMIT);
        }
        if !results.is_empty() {
            watch(&handle, &results, &config.monitor);
        }
    }

    Ok(())
}
