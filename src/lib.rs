//! # Circuit Index
//!
//! Builds the per-destination circuit index for the History Walk map.
//!
//! This library provides:
//! - Tolerant GPX scanning (track points, name, description, identifier marker)
//! - Great-circle track distances and point-in-polygon zone lookup
//! - POI-to-track proximity matching with an R-tree bounding-box prune
//! - Idempotent index reconciliation with stable `HW-<timestamp>` identifiers
//!
//! ## Features
//!
//! - **`parallel`** - Process destination directories in parallel with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use circuit_index::{geo_utils, track, GeoPoint};
//!
//! let gpx = r#"<gpx><trk><trkseg>
//!     <trkpt lat="33.8000" lon="10.8500"/>
//!     <trkpt lon="10.8550" lat="33.8000"/>
//! </trkseg></trk></gpx>"#;
//!
//! let points = track::parse_track(gpx);
//! assert_eq!(points.len(), 2);
//! assert_eq!(points[1], GeoPoint::new(33.8, 10.855));
//!
//! let meters = geo_utils::track_distance(&points);
//! assert!(meters > 400.0 && meters < 500.0);
//! ```
//!
//! ## Coordinate Conventions
//!
//! Track points and POIs are [`GeoPoint`]s (latitude first). Zone rings are
//! sequences of [`PlanarPoint`]s (`x` = longitude, `y` = latitude), matching
//! GeoJSON order. Track points only enter polygon tests through
//! [`GeoPoint::to_planar`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error;
pub use error::{CircuitIndexError, Result};

pub mod geo_utils;
pub mod markup;
pub mod track;

pub mod zones;
pub use zones::{load_zones, resolve_zone, Zone};

pub mod pois;
pub use pois::{
    load_pois, load_registry, match_pois_exhaustive, match_pois_on_track, DestinationRegistry,
    Poi, PoiIndex,
};

pub mod index;
pub use index::{load_previous_index, write_index, CircuitEntry};

pub mod reconcile;
pub use reconcile::{
    circuit_zone, resolve_identifier, DestinationReport, IdResolution, IdentifierMinter,
    Reconciler, RunSummary, TrackOutcome,
};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use circuit_index::GeoPoint;
/// let point = GeoPoint::new(33.8076, 10.8451); // Houmt Souk
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A planar coordinate in GeoJSON order: `x` is longitude, `y` is latitude.
pub type PlanarPoint = geo::Coord<f64>;

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has finite coordinates within the latitude/longitude range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Convert to planar `[lon, lat]` order for polygon tests.
    pub fn to_planar(self) -> PlanarPoint {
        PlanarPoint { x: self.longitude, y: self.latitude }
    }
}

/// Bounding box of a set of geographic points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. Returns `None` for empty input.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Grow the box by the given number of degrees on every side.
    pub fn expand(&self, degrees: f64) -> Self {
        Self {
            min_lat: self.min_lat - degrees,
            max_lat: self.max_lat + degrees,
            min_lng: self.min_lng - degrees,
            max_lng: self.max_lng + degrees,
        }
    }

    /// Whether the box lies inside [-90, 90] x [-180, 180] without wrapping.
    pub fn is_within_globe(&self) -> bool {
        self.min_lat >= -90.0 && self.max_lat <= 90.0 && self.min_lng >= -180.0 && self.max_lng <= 180.0
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for one index generation run.
///
/// Every path and threshold the generator needs lives here; nothing is read
/// from process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root holding one subdirectory of track files per destination.
    /// Index files are written next to those subdirectories as `<destination>.json`.
    pub circuits_dir: PathBuf,

    /// GeoJSON feature collection of zone polygons.
    pub zones_path: PathBuf,

    /// Destination registry (`{"maps": {"<id>": {"file": ...}}}`).
    pub registry_path: PathBuf,

    /// Directory the registry's POI file names are resolved against.
    pub poi_dir: PathBuf,

    /// Maximum distance between a POI and any track point for a match.
    /// Default: 50.0 meters
    pub proximity_threshold_m: f64,

    /// Degrees added on every side of a track's bounding box before pruning POIs.
    /// Default: 0.002 (~200 meters)
    pub bbox_buffer_deg: f64,

    /// Track file extension, matched case-insensitively. Default: "gpx"
    pub track_extension: String,

    /// Source-tool watermark stripped from circuit names. Default: "Wikiloc"
    pub branding: String,

    /// `href` of the link element that carries the identifier marker.
    pub site_url: String,

    /// Also write identifiers recovered from the previous index back into the file.
    /// Default: false (only newly minted identifiers are written)
    pub tag_recovered: bool,

    /// Compute everything but write no files.
    pub dry_run: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::from_root("public")
    }
}

impl IndexConfig {
    /// Default configuration with all paths under one public directory.
    pub fn from_root(public_dir: impl AsRef<Path>) -> Self {
        let root = public_dir.as_ref();
        Self {
            circuits_dir: root.join("circuits"),
            zones_path: root.join("map.geojson"),
            registry_path: root.join("destinations.json"),
            poi_dir: root.to_path_buf(),
            proximity_threshold_m: 50.0,
            bbox_buffer_deg: 0.002,
            track_extension: "gpx".to_string(),
            branding: "Wikiloc".to_string(),
            site_url: "https://stefanmartin1967.github.io/history-walk/".to_string(),
            tag_recovered: false,
            dry_run: false,
        }
    }

    /// Read a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CircuitIndexError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| CircuitIndexError::json(path, e))
    }

    /// Index file for a destination.
    pub fn index_path(&self, destination: &str) -> PathBuf {
        self.circuits_dir.join(format!("{}.json", destination))
    }

    /// Directory holding a destination's track files.
    pub fn destination_dir(&self, destination: &str) -> PathBuf {
        self.circuits_dir.join(destination)
    }
}

// ============================================================================
// Tests
// ============================================================================
