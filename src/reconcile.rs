//! # Index Reconciliation
//!
//! Rebuilds each destination's circuit index from its track files while
//! keeping circuit identifiers stable across runs.
//!
//! ## Identifier Lifecycle
//!
//! For each track file, the first of these that applies wins:
//! 1. **Embedded** - the file already carries a `[HW-ID:HW-<digits>]` marker
//! 2. **Recovered** - a previous index entry has a file with the same name,
//!    possibly in another subfolder
//! 3. **Minted** - a fresh `HW-<milliseconds>` identifier, written back into the file
//!
//! Once a marker is embedded the file stays on path 1, so rerunning on an
//! unchanged directory rewrites nothing and produces the same index bytes.
//!
//! ## Derived Fields
//!
//! Distance, matched POIs and zone are recomputed on every run. The zone is
//! taken from the first matched POI that has one, else from the zone polygon
//! containing the track's first point. Only `transport` is carried over from
//! the previous entry with the same identifier.

use crate::error::{CircuitIndexError, Result};
use crate::geo_utils::{format_km, track_distance};
use crate::index::{load_previous_index, write_atomic, write_index, CircuitEntry};
use crate::pois::{load_pois, load_registry, DestinationRegistry, PoiIndex};
use crate::track::{self, Branding};
use crate::zones::{load_zones, resolve_zone, Zone};
use crate::{GeoPoint, IndexConfig};
use chrono::Utc;
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ============================================================================
// Identifiers
// ============================================================================

/// How a track file's identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdResolution {
    /// Read from the marker embedded in the file
    Embedded,
    /// Reused from a previous index entry with the same filename
    Recovered,
    /// Newly issued
    Minted,
}

/// Issues `HW-<unix milliseconds>` identifiers, strictly increasing within a run.
#[derive(Debug, Default)]
pub struct IdentifierMinter {
    last: AtomicI64,
}

impl IdentifierMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new identifier. If the clock has not moved past the last issued
    /// value, the last value plus one is used instead.
    pub fn mint(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        format!("HW-{}", now.max(previous + 1))
    }
}

/// Resolve the identifier for a track file.
///
/// `previous` must be this destination's previous index only; filenames are
/// not unique across destinations.
pub fn resolve_identifier(
    text: &str,
    filename: &str,
    previous: &[CircuitEntry],
    minter: &IdentifierMinter,
) -> (String, IdResolution) {
    if let Some(id) = track::embedded_identifier(text) {
        return (id.to_string(), IdResolution::Embedded);
    }

    let recovered = previous
        .iter()
        .find(|entry| !entry.id.is_empty() && entry.file_name() == Some(filename));
    if let Some(entry) = recovered {
        return (entry.id.clone(), IdResolution::Recovered);
    }

    (minter.mint(), IdResolution::Minted)
}

// ============================================================================
// Reports
// ============================================================================

/// Result of indexing one track file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    pub entry: CircuitEntry,
    pub resolution: IdResolution,
    /// New file bytes when an identifier marker was injected
    pub rewritten: Option<Vec<u8>>,
}

/// What happened to one destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationReport {
    pub destination: String,
    pub index_path: PathBuf,
    pub entries: Vec<CircuitEntry>,
    pub embedded: usize,
    pub recovered: usize,
    pub minted: usize,
    pub rewritten: usize,
}

impl DestinationReport {
    fn record(&mut self, outcome: &TrackOutcome) {
        match outcome.resolution {
            IdResolution::Embedded => self.embedded += 1,
            IdResolution::Recovered => self.recovered += 1,
            IdResolution::Minted => self.minted += 1,
        }
        if outcome.rewritten.is_some() {
            self.rewritten += 1;
        }
    }
}

/// What happened to every destination in a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<DestinationReport>,
    /// Destinations that could not be processed, with the reason
    pub failures: Vec<(String, CircuitIndexError)>,
}

impl RunSummary {
    pub fn total_circuits(&self) -> usize {
        self.reports.iter().map(|r| r.entries.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Run-wide state: configuration plus the zones and registry shared read-only
/// by every destination.
pub struct Reconciler {
    config: IndexConfig,
    zones: Vec<Zone>,
    registry: DestinationRegistry,
    branding: Branding,
    minter: IdentifierMinter,
}

impl Reconciler {
    /// Load zones and the destination registry. Both fail soft.
    pub fn new(config: IndexConfig) -> Result<Self> {
        let zones = load_zones(&config.zones_path);
        let registry = load_registry(&config.registry_path);
        Self::with_inputs(config, zones, registry)
    }

    /// Build from already-loaded zones and registry.
    pub fn with_inputs(
        config: IndexConfig,
        zones: Vec<Zone>,
        registry: DestinationRegistry,
    ) -> Result<Self> {
        let branding = Branding::new(&config.branding)?;
        Ok(Self {
            config,
            zones,
            registry,
            branding,
            minter: IdentifierMinter::new(),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Process every destination directory, or only those named in `only`.
    ///
    /// Fails before touching any file if the circuits directory is missing or
    /// a requested destination does not exist. After that, a failure in one
    /// destination is recorded in the summary and does not affect the others.
    pub fn run(&self, only: &[String]) -> Result<RunSummary> {
        let mut destinations = self.destinations()?;
        if let Some(unknown) = only.iter().find(|name| !destinations.contains(*name)) {
            return Err(CircuitIndexError::UnknownDestination {
                name: unknown.clone(),
                path: self.config.circuits_dir.clone(),
            });
        }
        if !only.is_empty() {
            destinations.retain(|d| only.contains(d));
        }

        #[cfg(feature = "parallel")]
        let results: Vec<(String, Result<DestinationReport>)> = destinations
            .into_par_iter()
            .map(|d| {
                let result = self.process_destination(&d);
                (d, result)
            })
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(String, Result<DestinationReport>)> = destinations
            .into_iter()
            .map(|d| {
                let result = self.process_destination(&d);
                (d, result)
            })
            .collect();

        let mut summary = RunSummary::default();
        for (destination, result) in results {
            match result {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!("Failed to process destination '{}': {}", destination, e);
                    summary.failures.push((destination, e));
                }
            }
        }
        Ok(summary)
    }

    /// Destination subdirectories of the circuits directory, sorted by name.
    fn destinations(&self) -> Result<Vec<String>> {
        let root = &self.config.circuits_dir;
        if !root.is_dir() {
            return Err(CircuitIndexError::RootNotFound { path: root.clone() });
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(root).map_err(|e| CircuitIndexError::io(root, e))? {
            let entry = entry.map_err(|e| CircuitIndexError::io(root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!("Skipping destination with non UTF-8 name {:?}", name),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Rebuild one destination's index and inject missing identifiers.
    ///
    /// Track files are rewritten before the index is replaced; if anything
    /// fails, the previous index file is left as it was.
    fn process_destination(&self, destination: &str) -> Result<DestinationReport> {
        let dir = self.config.destination_dir(destination);
        let index_path = self.config.index_path(destination);
        info!("Processing destination: {}", destination);

        let pois = PoiIndex::new(load_pois(destination, &self.registry, &self.config.poi_dir));
        let previous = load_previous_index(&index_path, destination);
        let files = self.track_files(&dir)?;

        let mut report = DestinationReport {
            destination: destination.to_string(),
            index_path: index_path.clone(),
            ..Default::default()
        };

        for filename in &files {
            let path = dir.join(filename);
            let raw = fs::read(&path).map_err(|e| CircuitIndexError::io(&path, e))?;
            let outcome = self.index_track(destination, filename, &raw, &pois, &previous);

            match outcome.resolution {
                IdResolution::Recovered => {
                    info!("  Matched existing ID for {}: {}", filename, outcome.entry.id)
                }
                IdResolution::Minted => {
                    info!("  Generated new ID for {}: {}", filename, outcome.entry.id)
                }
                IdResolution::Embedded => {}
            }

            if let Some(rewritten) = &outcome.rewritten {
                if self.config.dry_run {
                    info!("  Would update {} with ID {}", filename, outcome.entry.id);
                } else {
                    write_atomic(&path, rewritten)?;
                    info!("  Updated {} with ID {}", filename, outcome.entry.id);
                }
            }

            report.record(&outcome);
            report.entries.push(outcome.entry);
        }

        if self.config.dry_run {
            info!("Would save index for {} with {} circuits", destination, report.entries.len());
        } else {
            write_index(&index_path, &report.entries)?;
            info!("Saved index for {} with {} circuits", destination, report.entries.len());
        }

        Ok(report)
    }

    /// Track filenames in a destination directory, sorted.
    fn track_files(&self, dir: &Path) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| CircuitIndexError::io(dir, e))? {
            let entry = entry.map_err(|e| CircuitIndexError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() || !self.is_track_file(&path) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push(name),
                Err(name) => warn!("Skipping track file with non UTF-8 name {:?}", name),
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_track_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.config.track_extension))
    }

    /// Build the index entry for one track file from its raw bytes. Does no I/O.
    ///
    /// Bytes that are not valid UTF-8 are scanned as U+FFFD and kept as they
    /// are in any rewritten file.
    pub fn index_track(
        &self,
        destination: &str,
        filename: &str,
        raw: &[u8],
        pois: &PoiIndex,
        previous: &[CircuitEntry],
    ) -> TrackOutcome {
        let text = String::from_utf8_lossy(raw);
        let (id, resolution) = resolve_identifier(&text, filename, previous, &self.minter);

        let fallback = track::fallback_name(filename);
        let metadata = track::extract_metadata(&text, &fallback, &self.branding);

        let write_back = match resolution {
            IdResolution::Minted => true,
            IdResolution::Recovered => self.config.tag_recovered,
            IdResolution::Embedded => false,
        };
        let rewritten = if write_back {
            let injected = track::inject_identifier(raw, &id, &metadata.name, &self.config.site_url);
            if injected.is_none() {
                warn!(
                    "  {}/{} has no <metadata> or <gpx> element to hold ID {}, file left unchanged",
                    destination, filename, id
                );
            }
            injected
        } else {
            None
        };

        let points = track::parse_track(&text);
        let poi_ids = pois.match_track(
            &points,
            self.config.proximity_threshold_m,
            self.config.bbox_buffer_deg,
        );
        let zone = circuit_zone(&poi_ids, pois, &points, &self.zones);

        let transport = previous
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.transport.clone())
            .filter(|t| !t.is_empty());

        let entry = CircuitEntry {
            id,
            name: metadata.name,
            file: format!("{}/{}", destination, filename),
            description: metadata.description,
            distance: format_km(track_distance(&points)),
            is_official: true,
            has_real_track: true,
            zone,
            poi_ids,
            transport,
        };

        TrackOutcome { entry, resolution, rewritten }
    }
}

/// Zone of the first matched POI if it has one, else the zone containing the start point.
pub fn circuit_zone(
    poi_ids: &[String],
    pois: &PoiIndex,
    track: &[GeoPoint],
    zones: &[Zone],
) -> Option<String> {
    poi_ids
        .first()
        .and_then(|id| pois.get(id))
        .and_then(|poi| poi.zone.clone())
        .or_else(|| {
            track
                .first()
                .and_then(|start| resolve_zone(*start, zones))
                .map(str::to_string)
        })
}
