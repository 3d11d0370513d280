//! Named zone polygons and point-to-zone lookup.
//!
//! Zones come from a GeoJSON feature collection. Only `Polygon` features with
//! a string `name` property are kept, and only their exterior ring is used.
//! When zones overlap, the first one in file order wins.
//!
//! ## Example
//! ```rust
//! use circuit_index::{zones, GeoPoint};
//!
//! let geojson = r#"{"type": "FeatureCollection", "features": [{
//!     "type": "Feature",
//!     "properties": {"name": "Midoun"},
//!     "geometry": {"type": "Polygon", "coordinates": [[[10, 33], [11, 33], [11, 34], [10, 34], [10, 33]]]}
//! }]}"#;
//!
//! let zones = zones::parse_zones(geojson).unwrap();
//! assert_eq!(zones::resolve_zone(GeoPoint::new(33.5, 10.5), &zones), Some("Midoun"));
//! assert_eq!(zones::resolve_zone(GeoPoint::new(35.0, 10.5), &zones), None);
//! ```

use crate::error::{CircuitIndexError, Result};
use crate::geo_utils::point_in_polygon;
use crate::{GeoPoint, PlanarPoint};
use geo::LineString;
use geojson::{GeoJson, Value};
use log::{debug, info, warn};
use std::path::Path;

/// A named region, bounded by an exterior ring in `[lon, lat]` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub boundary: LineString<f64>,
}

impl Zone {
    /// Whether the zone's exterior ring contains `point`.
    pub fn contains(&self, point: GeoPoint) -> bool {
        point_in_polygon(point.to_planar(), &self.boundary.0)
    }
}

/// Load zones from a GeoJSON file.
///
/// Never fails: a missing or malformed file yields an empty list and a warning.
pub fn load_zones(path: &Path) -> Vec<Zone> {
    if !path.exists() {
        warn!("Zone boundary file not found at {}, circuits will only get zones from POIs", path.display());
        return Vec::new();
    }

    match try_load_zones(path) {
        Ok(zones) => {
            info!("Loaded {} zones from {}", zones.len(), path.display());
            zones
        }
        Err(e) => {
            warn!("Ignoring zone boundary file: {}", e);
            Vec::new()
        }
    }
}

/// Load zones from a GeoJSON file, reporting why it could not be used.
pub fn try_load_zones(path: &Path) -> Result<Vec<Zone>> {
    let content = std::fs::read_to_string(path).map_err(|e| CircuitIndexError::io(path, e))?;
    parse_zones(&content).map_err(|reason| CircuitIndexError::GeoJson {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse zones from GeoJSON text. Errors describe why the document is unusable.
pub fn parse_zones(content: &str) -> std::result::Result<Vec<Zone>, String> {
    let geojson: GeoJson = content.parse().map_err(|e: geojson::Error| e.to_string())?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err("expected a FeatureCollection".to_string());
    };

    let zones = collection
        .features
        .iter()
        .filter_map(|feature| {
            let geometry = feature.geometry.as_ref()?;
            let Value::Polygon(rings) = &geometry.value else {
                debug!("Skipping non-polygon zone feature");
                return None;
            };
            let Some(name) = feature.property("name").and_then(|v| v.as_str()) else {
                debug!("Skipping unnamed zone polygon");
                return None;
            };
            let exterior = rings.first()?;
            let coords: Vec<PlanarPoint> = exterior
                .iter()
                .filter(|position| position.len() >= 2)
                .map(|position| PlanarPoint { x: position[0], y: position[1] })
                .collect();

            Some(Zone { name: name.to_string(), boundary: LineString::new(coords) })
        })
        .collect();

    Ok(zones)
}

/// Name of the first zone containing `point`, in load order.
pub fn resolve_zone(point: GeoPoint, zones: &[Zone]) -> Option<&str> {
    zones
        .iter()
        .find(|zone| zone.contains(point))
        .map(|zone| zone.name.as_str())
}
