//! Regenerates every destination's circuit index.
//!
//! Run with: cargo run --bin generate-circuit-index -- --public-dir public

use anyhow::{bail, Context, Result};
use circuit_index::{IndexConfig, Reconciler, RunSummary};
use clap::Parser;
use log::{info, LevelFilter};
use std::path::PathBuf;

/// Scan GPX circuits, link them to POIs and zones, and write per-destination indexes
#[derive(Parser, Debug)]
#[command(name = "generate-circuit-index")]
#[command(version)]
struct Cli {
    /// Public directory holding circuits/, map.geojson and destinations.json
    #[arg(long, default_value = "public")]
    public_dir: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with one subdirectory of track files per destination
    #[arg(long)]
    circuits_dir: Option<PathBuf>,

    /// GeoJSON file of zone polygons
    #[arg(long)]
    zones: Option<PathBuf>,

    /// Destination registry JSON file
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Directory POI files named in the registry are read from
    #[arg(long)]
    poi_dir: Option<PathBuf>,

    /// POI match distance in meters
    #[arg(long)]
    threshold: Option<f64>,

    /// Bounding-box buffer in degrees
    #[arg(long)]
    buffer: Option<f64>,

    /// Only process these destinations (repeatable)
    #[arg(long = "only", value_name = "DESTINATION")]
    only: Vec<String>,

    /// Also write identifiers recovered from the previous index into the GPX file
    #[arg(long)]
    tag_recovered: bool,

    /// Show what would change without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Log debug details
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn index_config(&self) -> Result<IndexConfig> {
        let mut config = match &self.config {
            Some(path) => IndexConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => IndexConfig::from_root(&self.public_dir),
        };

        if let Some(dir) = &self.circuits_dir {
            config.circuits_dir = dir.clone();
        }
        if let Some(path) = &self.zones {
            config.zones_path = path.clone();
        }
        if let Some(path) = &self.registry {
            config.registry_path = path.clone();
        }
        if let Some(dir) = &self.poi_dir {
            config.poi_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.proximity_threshold_m = threshold;
        }
        if let Some(buffer) = self.buffer {
            config.bbox_buffer_deg = buffer;
        }
        config.tag_recovered |= self.tag_recovered;
        config.dry_run |= self.dry_run;

        if !(config.proximity_threshold_m > 0.0) {
            bail!("threshold must be positive, got {}", config.proximity_threshold_m);
        }
        if !(config.bbox_buffer_deg >= 0.0) {
            bail!("buffer must not be negative, got {}", config.bbox_buffer_deg);
        }
        Ok(config)
    }

    fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let verb = if dry_run { "would index" } else { "indexed" };
    for report in &summary.reports {
        println!(
            "{:<20} {} {:>4} circuits  ({} embedded, {} recovered, {} new, {} files tagged) -> {}",
            report.destination,
            verb,
            report.entries.len(),
            report.embedded,
            report.recovered,
            report.minted,
            report.rewritten,
            report.index_path.display(),
        );
    }
    for (destination, err) in &summary.failures {
        println!("{:<20} FAILED: {}", destination, err);
    }
    println!("{} circuits across {} destinations", summary.total_circuits(), summary.reports.len());
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();

    let config = cli.index_config()?;
    let reconciler = Reconciler::new(config).context("setting up the index run")?;

    info!("Loaded {} zones", reconciler.zones().len());

    let summary = reconciler.run(&cli.only)?;
    print_summary(&summary, reconciler.config().dry_run);

    if !summary.is_success() {
        bail!(
            "{} of {} destinations failed",
            summary.failures.len(),
            summary.failures.len() + summary.reports.len()
        );
    }
    Ok(())
}
